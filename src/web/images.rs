use std::time::SystemTime;

use axum::body::Body;
use axum::http::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED,
};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use httpdate::{fmt_http_date, parse_http_date};

use crate::constants::{DOWNLOAD_FILENAME, LATEST_IMAGE_CACHE_CONTROL, X_DELTAIMAGE_PROMPT};
use crate::error::DeltaImageError;
use crate::store::LatestImageRecord;

/// Cache headers derived from the latest-image record.
#[derive(Clone, Debug)]
pub(crate) struct ImageCacheHeaders {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
    modified_at: SystemTime,
}

impl ImageCacheHeaders {
    /// Builds cache headers from the stored record.
    ///
    /// `Last-Modified` only has whole seconds, `modified_at` and the ETag keep
    /// the full timestamp so two writes in the same second never compare equal.
    pub(crate) fn from_record(record: &LatestImageRecord) -> Self {
        let modified_at = SystemTime::from(record.updated_at);
        let etag = build_etag(record.image.len(), &record.updated_at);
        let last_modified = HeaderValue::from_str(&fmt_http_date(modified_at)).ok();
        Self {
            etag,
            last_modified,
            modified_at,
        }
    }

    /// Returns the ETag header value, if available.
    pub(crate) fn etag(&self) -> Option<&HeaderValue> {
        self.etag.as_ref()
    }

    /// Returns the Last-Modified header value, if available.
    pub(crate) fn last_modified(&self) -> Option<&HeaderValue> {
        self.last_modified.as_ref()
    }
}

/// Applies image cache headers to a response builder.
pub(crate) fn apply_cache_headers(mut builder: Builder, cache: &ImageCacheHeaders) -> Builder {
    builder = builder.header(CACHE_CONTROL, LATEST_IMAGE_CACHE_CONTROL);
    if let Some(etag) = cache.etag() {
        builder = builder.header(ETAG, etag.clone());
    }
    if let Some(last_modified) = cache.last_modified() {
        builder = builder.header(LAST_MODIFIED, last_modified.clone());
    }
    builder
}

/// Returns true when the request matches a not-modified response.
///
/// `If-None-Match` wins over `If-Modified-Since` when both are sent.
pub(crate) fn is_not_modified(headers: &HeaderMap, cache: &ImageCacheHeaders) -> bool {
    if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
        if let Ok(value) = if_none_match.to_str() {
            let value = value.trim();
            if value == "*" {
                return true;
            }
            if let Some(etag) = cache.etag().and_then(|value| value.to_str().ok())
                && value.split(',').any(|candidate| candidate.trim() == etag)
            {
                return true;
            }
        }
        return false;
    }

    if let Some(if_modified_since) = headers.get(IF_MODIFIED_SINCE)
        && let Ok(value) = if_modified_since.to_str()
        && let Ok(since) = parse_http_date(value)
        && cache.modified_at <= since
    {
        return true;
    }
    false
}

/// Builds a 304 response that preserves cache headers.
pub(crate) fn not_modified_response(cache: &ImageCacheHeaders) -> Result<Response, DeltaImageError> {
    let builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    let builder = apply_cache_headers(builder, cache);
    builder.body(Body::empty()).map_err(DeltaImageError::from)
}

/// A freshly generated PNG, never cached.
pub(crate) fn png_response(image: Vec<u8>) -> Result<Response, DeltaImageError> {
    Response::builder()
        .header(CONTENT_TYPE, "image/png")
        .header(CACHE_CONTROL, "no-store")
        .body(Body::from(image))
        .map_err(DeltaImageError::from)
}

/// The stored image, either inline or as a `generated.png` attachment.
pub(crate) fn latest_image_response(
    headers: &HeaderMap,
    record: LatestImageRecord,
    attachment: bool,
) -> Result<Response, DeltaImageError> {
    let cache_headers = ImageCacheHeaders::from_record(&record);
    if is_not_modified(headers, &cache_headers) {
        return not_modified_response(&cache_headers);
    }

    let mut builder = Response::builder().header(CONTENT_TYPE, "image/png");
    builder = apply_cache_headers(builder, &cache_headers);
    if attachment {
        builder = builder.header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
        );
    } else if let Ok(value) = HeaderValue::from_str(&record.prompt) {
        builder = builder.header(X_DELTAIMAGE_PROMPT, value);
    }
    builder
        .body(Body::from(record.image))
        .map_err(DeltaImageError::from)
}

fn build_etag(size: usize, updated_at: &DateTime<Utc>) -> Option<HeaderValue> {
    let value = format!(
        "W/\"{}-{}.{:09}\"",
        size,
        updated_at.timestamp(),
        updated_at.timestamp_subsec_nanos()
    );
    HeaderValue::from_str(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn record() -> LatestImageRecord {
        LatestImageRecord {
            image: vec![1, 2, 3],
            prompt: "a red fox".to_string(),
            updated_at: Utc
                .with_ymd_and_hms(2026, 10, 19, 12, 30, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn last_modified_matches_record() {
        let cache = ImageCacheHeaders::from_record(&record());
        assert_eq!(
            cache.last_modified().expect("header"),
            "Mon, 19 Oct 2026 12:30:00 GMT"
        );
    }

    #[test]
    fn if_modified_since_is_honoured() {
        let cache = ImageCacheHeaders::from_record(&record());
        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, &cache));

        headers.insert(
            IF_MODIFIED_SINCE,
            HeaderValue::from_static("Mon, 19 Oct 2026 12:30:00 GMT"),
        );
        assert!(is_not_modified(&headers, &cache));

        headers.insert(
            IF_MODIFIED_SINCE,
            HeaderValue::from_static("Mon, 19 Oct 2026 12:29:59 GMT"),
        );
        assert!(!is_not_modified(&headers, &cache));

        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("yesterday"));
        assert!(!is_not_modified(&headers, &cache));
    }

    fn record_at_millis(image: &[u8], millis: u32) -> LatestImageRecord {
        LatestImageRecord {
            image: image.to_vec(),
            updated_at: record()
                .updated_at
                .with_nanosecond(millis * 1_000_000)
                .expect("valid nanos"),
            ..record()
        }
    }

    #[test]
    fn etag_tracks_the_full_timestamp() {
        let first = ImageCacheHeaders::from_record(&record_at_millis(b"first", 250));
        let second = ImageCacheHeaders::from_record(&record_at_millis(b"second", 750));

        assert_eq!(first.last_modified(), second.last_modified());
        assert_eq!(first.etag().expect("etag"), "W/\"5-1792413000.250000000\"");
        assert_ne!(first.etag(), second.etag());
    }

    #[test]
    fn overwrite_in_the_same_second_is_not_304() {
        let first = ImageCacheHeaders::from_record(&record_at_millis(b"first", 250));
        let second = ImageCacheHeaders::from_record(&record_at_millis(b"second", 750));

        let mut headers = HeaderMap::new();
        headers.insert(
            IF_MODIFIED_SINCE,
            first.last_modified().expect("last modified").clone(),
        );
        assert!(!is_not_modified(&headers, &second));

        headers.insert(IF_NONE_MATCH, first.etag().expect("etag").clone());
        assert!(!is_not_modified(&headers, &second));

        headers.insert(IF_NONE_MATCH, second.etag().expect("etag").clone());
        assert!(is_not_modified(&headers, &second));
    }

    #[test]
    fn if_none_match_skips_the_date_check() {
        let cache = ImageCacheHeaders::from_record(&record());
        let mut headers = HeaderMap::new();
        headers.insert(
            IF_MODIFIED_SINCE,
            HeaderValue::from_static("Mon, 19 Oct 2026 12:30:00 GMT"),
        );
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("W/\"3-0.000000000\""));
        assert!(!is_not_modified(&headers, &cache));

        headers.insert(
            IF_NONE_MATCH,
            HeaderValue::from_static("W/\"9-1.000000000\", W/\"3-1792413000.000000000\""),
        );
        assert!(is_not_modified(&headers, &cache));

        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(is_not_modified(&headers, &cache));
    }
}
