use super::prelude::*;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) has_latest: bool,
    pub(crate) latest_prompt: String,
}

/// handles the / GET
pub(crate) async fn root_handler(
    State(state): State<AppState>,
) -> Result<IndexTemplate, DeltaImageError> {
    let latest = state.generator.store().get().await?;
    Ok(IndexTemplate {
        has_latest: latest.is_some(),
        latest_prompt: latest.map(|record| record.prompt).unwrap_or_default(),
    })
}

pub(crate) async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

pub(crate) async fn not_found_handler() -> DeltaImageError {
    DeltaImageError::NotFound("Not Found".to_string())
}
