//! Cloudflare Workers AI client.
//!
//! Calls `POST {api_base}/accounts/{account_id}/ai/run/{model}` with the JSON
//! parameter object. Diffusion models answer with raw image bytes; anything
//! else comes back in the usual Cloudflare JSON envelope.

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::cli::WorkersAiOptions;
use crate::generation::{ImageModel, ImageToImageParams, TextToImageParams};

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<EnvelopeResult>,
    #[serde(default)]
    errors: Vec<EnvelopeMessage>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResult {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

/// [ImageModel] backed by the Workers AI REST API.
#[derive(Clone, Debug)]
pub struct WorkersAiClient {
    client: reqwest::Client,
    account_url: Url,
    api_token: String,
}

impl WorkersAiClient {
    /// Builds a client from the CLI options
    pub fn new(options: &WorkersAiOptions) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout())
            .build()?;
        Self::with_client(
            client,
            &options.api_base,
            &options.account_id,
            &options.api_token,
        )
    }

    /// Builds a client around an existing reqwest client
    pub fn with_client(
        client: reqwest::Client,
        api_base: &str,
        account_id: &str,
        api_token: &str,
    ) -> Result<Self, anyhow::Error> {
        let mut base = Url::parse(api_base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let account_url = base.join(&format!("accounts/{}/ai/run/", account_id.trim()))?;
        Ok(Self {
            client,
            account_url,
            api_token: api_token.to_string(),
        })
    }

    /// The URL a model is run at
    pub fn model_url(&self, model: &str) -> Result<Url, url::ParseError> {
        self.account_url.join(model.trim_start_matches('/'))
    }

    async fn run<P: Serialize + Sync>(
        &self,
        model: &str,
        params: &P,
    ) -> Result<Vec<u8>, anyhow::Error> {
        let url = self
            .model_url(model)
            .with_context(|| format!("Invalid model id {model}"))?;
        debug!("Running {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(params)
            .send()
            .await
            .context("Request to Workers AI failed")?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let bytes = response
            .bytes()
            .await
            .context("Failed reading Workers AI response")?;

        interpret_response(status.as_u16(), &content_type, &bytes)
    }
}

/// Turns a model response into image bytes or an error.
fn interpret_response(
    status: u16,
    content_type: &str,
    bytes: &[u8],
) -> Result<Vec<u8>, anyhow::Error> {
    let success = (200..300).contains(&status);
    if success && content_type.starts_with("image/") {
        return Ok(bytes.to_vec());
    }

    let envelope: Envelope = if content_type.contains("json") {
        serde_json::from_slice(bytes).with_context(|| {
            format!(
                "Workers AI returned status {status} with unparseable JSON: {}",
                String::from_utf8_lossy(bytes)
            )
        })?
    } else if success {
        // some models answer with a bare octet-stream
        return Ok(bytes.to_vec());
    } else {
        Envelope::default()
    };

    if !envelope.errors.is_empty() {
        let messages: Vec<String> = envelope
            .errors
            .iter()
            .map(|err| match err.code {
                Some(code) => format!("{} ({})", err.message, code),
                None => err.message.clone(),
            })
            .collect();
        bail!(messages.join("; "));
    }
    if !success {
        bail!(
            "Workers AI error {status}: {}",
            String::from_utf8_lossy(bytes)
        );
    }

    let image = envelope
        .result
        .and_then(|result| result.image)
        .ok_or_else(|| anyhow!("Workers AI response contained no image"))?;
    general_purpose::STANDARD
        .decode(image.as_bytes())
        .context("Failed to base64-decode image")
}

#[async_trait]
impl ImageModel for WorkersAiClient {
    async fn text_to_image(
        &self,
        model: &str,
        params: &TextToImageParams,
    ) -> Result<Vec<u8>, anyhow::Error> {
        self.run(model, params).await
    }

    async fn image_to_image(
        &self,
        model: &str,
        params: &ImageToImageParams,
    ) -> Result<Vec<u8>, anyhow::Error> {
        self.run(model, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> WorkersAiClient {
        WorkersAiClient::with_client(reqwest::Client::new(), base, "acct", "token")
            .expect("client")
    }

    #[test]
    fn model_url_keeps_the_full_path() {
        let expected = "https://api.cloudflare.com/client/v4/accounts/acct/ai/run/@cf/runwayml/stable-diffusion-v1-5-img2img";
        for base in [
            "https://api.cloudflare.com/client/v4/",
            "https://api.cloudflare.com/client/v4",
        ] {
            let url = client(base)
                .model_url(crate::constants::DEFAULT_IMAGE_TO_IMAGE_MODEL)
                .expect("url");
            assert_eq!(url.as_str(), expected);
        }
    }

    #[test]
    fn raw_images_pass_through() {
        let bytes = [0x89, 0x50, 0x4E, 0x47];
        assert_eq!(
            interpret_response(200, "image/png", &bytes).expect("image"),
            bytes.to_vec()
        );
        assert_eq!(
            interpret_response(200, "application/octet-stream", &bytes).expect("octets"),
            bytes.to_vec()
        );
    }

    #[test]
    fn envelope_images_are_decoded() {
        let body = br#"{"success":true,"errors":[],"result":{"image":"aGVsbG8="}}"#;
        assert_eq!(
            interpret_response(200, "application/json", body).expect("image"),
            b"hello".to_vec()
        );
    }

    #[test]
    fn envelope_errors_become_messages() {
        let body = br#"{"success":false,"errors":[{"code":3030,"message":"Capacity temporarily exceeded"}],"result":null}"#;
        assert_eq!(
            interpret_response(429, "application/json", body)
                .expect_err("error")
                .to_string(),
            "Capacity temporarily exceeded (3030)"
        );
        let err = interpret_response(502, "text/html", b"bad gateway")
            .expect_err("error")
            .to_string();
        assert!(err.contains("502"));
        assert!(err.contains("bad gateway"));
    }

    #[test]
    fn broken_envelopes_keep_the_parse_error() {
        let err = interpret_response(200, "application/json", b"{not json")
            .expect_err("error");
        let message = format!("{err:#}");
        assert!(message.starts_with("Workers AI returned status 200 with unparseable JSON"));
        assert!(err.downcast_ref::<serde_json::Error>().is_some());

        let err = interpret_response(200, "application/json", br#"{"result":{}}"#)
            .expect_err("error");
        assert_eq!(err.to_string(), "Workers AI response contained no image");
    }
}
