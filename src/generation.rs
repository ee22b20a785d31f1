//! Generation orchestration: turns validated requests into model calls and
//! keeps the latest-image slot up to date.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::constants::{
    DEFAULT_IMAGE_TO_IMAGE_MODEL, DEFAULT_TEXT_TO_IMAGE_MODEL, DELTA_MAX_HEIGHT, DELTA_MAX_WIDTH,
    PROMPT_SEPARATOR,
};
use crate::error::DeltaImageError;
use crate::imaging;
use crate::request::{DeltaRequest, GenerationRequest};
use crate::store::ImageStore;

/// Parameters for a text-to-image call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextToImageParams {
    /// the prompt
    pub prompt: String,
    /// omitted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// diffusion steps
    pub num_steps: u8,
    /// strength
    pub strength: f32,
    /// guidance scale, the hosted models call it `guidance`
    #[serde(rename = "guidance")]
    pub guidance_scale: f32,
    /// omitted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl From<&GenerationRequest> for TextToImageParams {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            num_steps: request.num_steps,
            strength: request.strength,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
        }
    }
}

/// Parameters for an image-to-image call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageToImageParams {
    /// the (possibly combined) prompt
    pub prompt: String,
    /// base64 PNG the model starts from
    pub image_b64: String,
    /// how far the output may drift from the input
    pub strength: f32,
    /// omitted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_steps: Option<u8>,
    /// omitted when unset
    #[serde(rename = "guidance", skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f32>,
    /// omitted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A hosted image model, called once per request.
///
/// Errors end up in the response body, so their context chain should read
/// well to a caller.
#[async_trait]
pub trait ImageModel: Send + Sync + std::fmt::Debug {
    /// Generates an image from text.
    async fn text_to_image(
        &self,
        model: &str,
        params: &TextToImageParams,
    ) -> Result<Vec<u8>, anyhow::Error>;

    /// Generates an image from a prompt and a base image.
    async fn image_to_image(
        &self,
        model: &str,
        params: &ImageToImageParams,
    ) -> Result<Vec<u8>, anyhow::Error>;
}

/// Which model ids to run
#[derive(Clone, Debug)]
pub struct ModelIds {
    /// text-to-image model
    pub text_to_image: String,
    /// image-to-image model
    pub image_to_image: String,
}

impl Default for ModelIds {
    fn default() -> Self {
        Self {
            text_to_image: DEFAULT_TEXT_TO_IMAGE_MODEL.to_string(),
            image_to_image: DEFAULT_IMAGE_TO_IMAGE_MODEL.to_string(),
        }
    }
}

/// Combines the stored prompt with the delta text.
///
/// A blank stored prompt yields the delta alone.
pub fn compose_prompt(stored: &str, delta: &str) -> String {
    let stored = stored.trim().trim_end_matches('.').trim_end();
    let delta = delta.trim();
    if stored.is_empty() {
        return delta.to_string();
    }
    format!("{stored}{PROMPT_SEPARATOR}{delta}")
}

/// Runs generations against a model and records the result in a store.
#[derive(Clone, Debug)]
pub struct Generator {
    model: Arc<dyn ImageModel>,
    store: Arc<dyn ImageStore>,
    models: ModelIds,
}

impl Generator {
    /// Builds a generator
    pub fn new(model: Arc<dyn ImageModel>, store: Arc<dyn ImageStore>, models: ModelIds) -> Self {
        Self {
            model,
            store,
            models,
        }
    }

    /// The store the generator writes to
    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// Generates a base image and makes it the latest one.
    #[instrument(skip_all, fields(prompt = %request.prompt))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>, DeltaImageError> {
        request.validate()?;
        let params = TextToImageParams::from(request);
        debug!("text-to-image params: {:?}", params);

        let output = self
            .model
            .text_to_image(&self.models.text_to_image, &params)
            .await
            .map_err(|err| generation_failed(&err))?;
        let image = to_png(&output)?;

        self.remember(&image, &request.prompt).await;
        info!("Generated base image ({} bytes)", image.len());
        Ok(image)
    }

    /// Applies a delta to the inline or stored image and makes the result the latest one.
    #[instrument(skip_all, fields(delta = %request.delta))]
    pub async fn apply_delta(&self, request: &DeltaRequest) -> Result<Vec<u8>, DeltaImageError> {
        request.validate()?;
        let (base_image, prompt) = match &request.base_image {
            Some(image) => (image.clone(), request.delta.trim().to_string()),
            None => {
                let record = self
                    .store
                    .get()
                    .await?
                    .ok_or(DeltaImageError::MissingBaseImage)?;
                let prompt = compose_prompt(&record.prompt, &request.delta);
                (record.image, prompt)
            }
        };

        let base_image = imaging::resize(&base_image, DELTA_MAX_WIDTH, DELTA_MAX_HEIGHT)
            .map_err(|err| DeltaImageError::InvalidInput(format!("Invalid base image: {err}")))?;

        let params = ImageToImageParams {
            prompt,
            image_b64: general_purpose::STANDARD.encode(&base_image),
            strength: request.strength,
            num_steps: request.num_steps,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
        };
        debug!(
            "img2img prompt={:?} strength={} num_steps={:?} guidance={:?} seed={:?}",
            params.prompt, params.strength, params.num_steps, params.guidance_scale, params.seed
        );

        let output = self
            .model
            .image_to_image(&self.models.image_to_image, &params)
            .await
            .map_err(|err| generation_failed(&err))?;
        let image = to_png(&output)?;

        self.remember(&image, &params.prompt).await;
        info!("Applied delta ({} bytes)", image.len());
        Ok(image)
    }

    /// Generates a base image, then applies each delta to the previous result.
    ///
    /// Returns the final image. Stops at the first failure.
    pub async fn render_sequence(
        &self,
        base: &GenerationRequest,
        deltas: &[DeltaRequest],
    ) -> Result<Vec<u8>, DeltaImageError> {
        let mut image = self.generate(base).await?;
        for (step, delta) in deltas.iter().enumerate() {
            info!("Applying delta {}/{}", step + 1, deltas.len());
            image = self.apply_delta(delta).await?;
        }
        Ok(image)
    }

    /// Store failures don't fail the request, the caller still gets the image.
    async fn remember(&self, image: &[u8], prompt: &str) {
        if let Err(err) = self.store.put(image, prompt).await {
            error!("Failed to store latest image: {}", err);
        }
    }
}

fn generation_failed(err: &anyhow::Error) -> DeltaImageError {
    DeltaImageError::GenerationFailed(format!("{err:#}"))
}

fn to_png(output: &[u8]) -> Result<Vec<u8>, DeltaImageError> {
    imaging::normalize_to_png(output).map_err(|err| {
        DeltaImageError::GenerationFailed(format!("Model returned an unusable image: {err}"))
    })
}
