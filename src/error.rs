//! Error handling

use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::info;

/// definitions for the deltaimage application.
#[derive(Debug)]
pub enum DeltaImageError {
    /// Missing or malformed required field
    InvalidInput(String),
    /// The request body went over the size limit
    PayloadTooLarge(String),
    /// A delta was requested but there's no image to apply it to
    MissingBaseImage,
    /// The image model call failed, carries the underlying message
    GenerationFailed(String),
    /// When a requested resource is not found, carries the response text
    NotFound(String),
    /// When DB operations fail
    DatabaseError(sea_orm::DbErr),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for DeltaImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
            Self::PayloadTooLarge(message) => write!(f, "Payload too large: {message}"),
            Self::MissingBaseImage => write!(f, "No base image available"),
            Self::GenerationFailed(message) => write!(f, "Error generating image: {message}"),
            Self::NotFound(message) => write!(f, "Not found: {message}"),
            Self::DatabaseError(err) => write!(f, "Database error: {err}"),
            Self::InternalServerError(message) => write!(f, "Internal server error: {message}"),
        }
    }
}

impl std::error::Error for DeltaImageError {}

impl From<sea_orm::DbErr> for DeltaImageError {
    fn from(err: sea_orm::DbErr) -> Self {
        DeltaImageError::DatabaseError(err)
    }
}

impl From<std::io::Error> for DeltaImageError {
    fn from(err: std::io::Error) -> Self {
        DeltaImageError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for DeltaImageError {
    fn from(err: axum::http::Error) -> Self {
        DeltaImageError::InternalServerError(err.to_string())
    }
}

fn plain_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

impl IntoResponse for DeltaImageError {
    fn into_response(self) -> Response {
        match self {
            DeltaImageError::InvalidInput(message) => {
                info!("Bad request received: {}", message);
                plain_response(StatusCode::BAD_REQUEST, message)
            }
            DeltaImageError::PayloadTooLarge(message) => {
                info!("Oversized request body: {}", message);
                plain_response(StatusCode::PAYLOAD_TOO_LARGE, message)
            }
            DeltaImageError::MissingBaseImage => {
                info!("Delta requested without a base image");
                plain_response(StatusCode::NOT_FOUND, "No base image available".to_string())
            }
            DeltaImageError::NotFound(message) => {
                info!("404 {}", message);
                plain_response(StatusCode::NOT_FOUND, message)
            }
            DeltaImageError::GenerationFailed(message) => {
                tracing::error!("Image generation failed: {}", message);
                plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error generating image: {message}"),
                )
            }
            DeltaImageError::DatabaseError(err) => {
                tracing::error!("Database error: {}", err);
                plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            DeltaImageError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let cases = [
            (
                DeltaImageError::InvalidInput("Invalid prompt".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DeltaImageError::PayloadTooLarge("Request body too large".to_string()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (DeltaImageError::MissingBaseImage, StatusCode::NOT_FOUND),
            (
                DeltaImageError::NotFound("No image found".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                DeltaImageError::GenerationFailed("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                DeltaImageError::InternalServerError("oops".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), status);
            assert_eq!(
                response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
                "*"
            );
        }
    }

    #[test]
    fn generation_failure_display_carries_message() {
        let err = DeltaImageError::GenerationFailed("model offline".to_string());
        assert_eq!(err.to_string(), "Error generating image: model offline");
    }
}
