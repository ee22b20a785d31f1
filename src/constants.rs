//! Shared constants for things
//!

use std::time::Duration;

/// Key of the single latest-image slot
pub const LATEST_IMAGE_KEY: &str = "latestImage";

/// Default text-to-image model
pub const DEFAULT_TEXT_TO_IMAGE_MODEL: &str = "@cf/stabilityai/stable-diffusion-xl-base-1.0";

/// Default image-to-image model
pub const DEFAULT_IMAGE_TO_IMAGE_MODEL: &str = "@cf/runwayml/stable-diffusion-v1-5-img2img";

/// Default Workers AI REST base, must end in a slash so `Url::join` keeps the path.
pub const DEFAULT_WORKERS_AI_BASE: &str = "https://api.cloudflare.com/client/v4/";

/// Default number of diffusion steps
pub const DEFAULT_NUM_STEPS: u8 = 20;
/// Bounds for `num_steps`
pub const MIN_NUM_STEPS: u8 = 1;
/// Upper bound for `num_steps`, the hosted models reject more.
pub const MAX_NUM_STEPS: u8 = 20;

/// Default strength for base generation
pub const DEFAULT_STRENGTH: f32 = 1.0;
/// Default strength for img2img deltas
pub const DEFAULT_DELTA_STRENGTH: f32 = 0.75;
/// Lower bound for `strength`
pub const MIN_STRENGTH: f32 = 0.1;
/// Upper bound for `strength`
pub const MAX_STRENGTH: f32 = 1.0;

/// Default guidance scale
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

/// Bounding box the base image is fitted into before img2img
pub const DELTA_MAX_WIDTH: u32 = 512;
/// See [DELTA_MAX_WIDTH]
pub const DELTA_MAX_HEIGHT: u32 = 512;

/// Separator between the stored prompt and the delta text
pub const PROMPT_SEPARATOR: &str = ". ";

/// Filename offered by `/download`
pub const DOWNLOAD_FILENAME: &str = "generated.png";

/// Default timeout for calls to the image model
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Largest request body we accept, base64 images get big.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Custom header carrying the tracked prompt of the latest image
pub const X_DELTAIMAGE_PROMPT: &str = "x-deltaimage-prompt";

/// Cache-Control value for the latest image, it changes under the same URL.
pub const LATEST_IMAGE_CACHE_CONTROL: &str = "no-cache";
