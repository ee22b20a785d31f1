pub(crate) use crate::error::DeltaImageError;
pub(crate) use crate::web::AppState;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::State;
pub(crate) use axum::http::{HeaderMap, HeaderValue, StatusCode, header::CONTENT_TYPE};
pub(crate) use axum::response::{IntoResponse, Response};
pub(crate) use tracing::{debug, info};
