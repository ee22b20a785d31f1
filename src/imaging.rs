//! Image format checks, PNG normalisation and scale-to-fit resizing.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::debug;

/// The 8 byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Errors returned when decoding or encoding image bytes.
#[derive(Debug)]
pub enum ImagingError {
    /// Not enough bytes to be any kind of image.
    TooShort,
    /// The bytes aren't an image format we understand.
    Decode(String),
    /// Re-encoding failed.
    Encode(String),
}

impl std::fmt::Display for ImagingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "Image data is too short"),
            Self::Decode(err) => write!(f, "Failed to decode image: {err}"),
            Self::Encode(err) => write!(f, "Failed to encode image: {err}"),
        }
    }
}

impl std::error::Error for ImagingError {}

/// Returns true when the bytes start with the PNG signature.
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

fn decode(bytes: &[u8]) -> Result<(Option<ImageFormat>, DynamicImage), ImagingError> {
    if bytes.len() < 4 {
        debug!("Image is too short");
        return Err(ImagingError::TooShort);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| {
            debug!("Failed to guess image format: {}", err);
            ImagingError::Decode(err.to_string())
        })?;
    let format = reader.format();
    let image = reader.decode().map_err(|err| {
        debug!("Failed to decode image: {}", err);
        ImagingError::Decode(err.to_string())
    })?;
    Ok((format, image))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImagingError> {
    let mut output = Cursor::new(Vec::new());
    image
        .write_to(&mut output, ImageFormat::Png)
        .map_err(|err| ImagingError::Encode(err.to_string()))?;
    Ok(output.into_inner())
}

/// Ensures image bytes are a valid PNG, converting if possible.
pub fn normalize_to_png(bytes: &[u8]) -> Result<Vec<u8>, ImagingError> {
    let (format, image) = decode(bytes)?;
    if format == Some(ImageFormat::Png) {
        return Ok(bytes.to_vec());
    }
    debug!("Converting {:?} image to PNG", format);
    encode_png(&image)
}

/// Target dimensions when fitting `width`x`height` into the bounding box.
///
/// The scale is `min(max_width / width, max_height / height)`, applied both
/// up and down, and each side is truncated like a canvas size would be.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width.max(1), height.max(1));
    }
    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    // nudge so 511.99999... lands on 512
    let scaled = |side: u32| ((f64::from(side) * scale + 1e-9).floor() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Resizes an image to fit within the bounding box, returning PNG bytes.
pub fn resize(bytes: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>, ImagingError> {
    let (_, image) = decode(bytes)?;
    let (width, height) = fit_dimensions(image.width(), image.height(), max_width, max_height);
    if (width, height) == (image.width(), image.height()) {
        return encode_png(&image);
    }
    debug!(
        "Resizing image from {}x{} to {}x{}",
        image.width(),
        image.height(),
        width,
        height
    );
    encode_png(&image.resize_exact(width, height, FilterType::Triangle))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 10]));
        encode_png(&DynamicImage::ImageRgb8(image)).expect("encode png")
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([1, 2, 3])));
        let mut output = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new(&mut output);
        encoder.encode_image(&image).expect("encode jpeg");
        output
    }

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        let image = image::load_from_memory(bytes).expect("decode");
        (image.width(), image.height())
    }

    #[test]
    fn fit_dimensions_scales_to_the_tighter_side() {
        assert_eq!(fit_dimensions(1024, 768, 512, 512), (512, 384));
        assert_eq!(fit_dimensions(768, 1024, 512, 512), (384, 512));
        assert_eq!(fit_dimensions(100, 50, 512, 512), (512, 256));
        assert_eq!(fit_dimensions(512, 512, 512, 512), (512, 512));
        assert_eq!(fit_dimensions(3000, 1, 512, 512), (512, 1));
    }

    #[test]
    fn resize_produces_png_in_the_box() {
        let resized = resize(&png_bytes(1024, 768), 512, 512).expect("resize");
        assert!(is_png(&resized));
        assert_eq!(dimensions(&resized), (512, 384));

        let jpeg = resize(&jpeg_bytes(64, 128), 512, 512).expect("resize jpeg");
        assert!(is_png(&jpeg));
        assert_eq!(dimensions(&jpeg), (256, 512));
    }

    #[test]
    fn normalize_passes_png_through_and_converts_jpeg() {
        let png = png_bytes(8, 8);
        assert_eq!(normalize_to_png(&png).expect("png"), png);

        let converted = normalize_to_png(&jpeg_bytes(8, 8)).expect("jpeg");
        assert!(is_png(&converted));
        assert_eq!(dimensions(&converted), (8, 8));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(normalize_to_png(&[]), Err(ImagingError::TooShort)));
        assert!(normalize_to_png(b"This is not an image.").is_err());
        assert!(resize(&[0x89, 0x50, 0x4E, 0x47, 0x00], 512, 512).is_err());
    }
}
