//! Database entities
pub mod latest_image;
