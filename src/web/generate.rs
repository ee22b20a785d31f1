use axum::extract::{Form, FromRequest, Json, Multipart, Request};

use super::images::{latest_image_response, png_response};
use super::prelude::*;
use crate::request::{DeltaRequest, FieldValue, GenerationRequest, RawFields};

/// Request body fields, from a multipart form, urlencoded form or JSON object.
#[derive(Debug)]
pub(crate) struct SubmittedFields(pub(crate) RawFields);

fn invalid(message: impl Into<String>) -> DeltaImageError {
    DeltaImageError::InvalidInput(message.into())
}

/// Keeps 413 from the body limit, everything else the extractors reject is a 400.
fn rejected(status: StatusCode, message: String) -> DeltaImageError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        DeltaImageError::PayloadTooLarge(message)
    } else {
        invalid(message)
    }
}

async fn multipart_fields(mut multipart: Multipart) -> Result<RawFields, DeltaImageError> {
    let mut fields = RawFields::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| rejected(err.status(), err.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = if field.file_name().is_some() {
            let bytes = field.bytes().await.map_err(|err| rejected(err.status(), err.body_text()))?;
            FieldValue::Binary(bytes.to_vec())
        } else {
            FieldValue::Text(field.text().await.map_err(|err| rejected(err.status(), err.body_text()))?)
        };
        fields.insert(name, value);
    }
    Ok(fields)
}

impl<S> FromRequest<S> for SubmittedFields
where
    S: Send + Sync,
{
    type Rejection = DeltaImageError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(request, state)
                .await
                .map_err(|err| rejected(err.status(), err.body_text()))?;
            return multipart_fields(multipart).await.map(Self);
        }
        if content_type.starts_with("application/json") {
            let Json(value) = Json::<serde_json::Value>::from_request(request, state)
                .await
                .map_err(|err| rejected(err.status(), err.body_text()))?;
            return RawFields::from_json(value).map(Self);
        }
        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, state)
                .await
                .map_err(|err| rejected(err.status(), err.body_text()))?;
            return Ok(Self(RawFields::from_pairs(pairs)));
        }
        Err(invalid(format!(
            "Unsupported content type {:?}, send a form or JSON",
            content_type
        )))
    }
}

/// POST /generate
pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    SubmittedFields(fields): SubmittedFields,
) -> Result<Response, DeltaImageError> {
    let request = GenerationRequest::from_fields(&fields)?;
    let image = state.generator.generate(&request).await?;
    png_response(image)
}

/// POST /img2img
pub(crate) async fn img2img_handler(
    State(state): State<AppState>,
    SubmittedFields(fields): SubmittedFields,
) -> Result<Response, DeltaImageError> {
    let request = DeltaRequest::from_fields(&fields)?;
    let image = state.generator.apply_delta(&request).await?;
    png_response(image)
}

/// GET /download
pub(crate) async fn download_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, DeltaImageError> {
    let Some(record) = state.generator.store().get().await? else {
        return Err(DeltaImageError::NotFound("No image found".to_string()));
    };
    info!("Downloading latest image ({} bytes)", record.image.len());
    latest_image_response(&headers, record, true)
}

/// GET /latest
pub(crate) async fn latest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, DeltaImageError> {
    let Some(record) = state.generator.store().get().await? else {
        return Err(DeltaImageError::NotFound("No image found".to_string()));
    };
    latest_image_response(&headers, record, false)
}
