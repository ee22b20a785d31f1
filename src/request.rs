//! Parsing and validation of generation requests.
//!
//! Request bodies arrive as multipart forms, urlencoded forms or JSON objects
//! and are flattened into [RawFields] before validation. Required text fields
//! are strict; numeric fields are permissive, anything that doesn't parse is
//! treated as unset and falls back to its default.

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose;
use regex::Regex;
use serde_json::Value;

use crate::constants::{
    DEFAULT_DELTA_STRENGTH, DEFAULT_GUIDANCE_SCALE, DEFAULT_NUM_STEPS, DEFAULT_STRENGTH,
    MAX_NUM_STEPS, MAX_STRENGTH, MIN_NUM_STEPS, MIN_STRENGTH,
};
use crate::error::DeltaImageError;

static DATA_URL_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^data:[^;,]*;base64,").ok());

/// A single submitted field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A text value: form field or JSON string
    Text(String),
    /// A non-string JSON value, kept in its JSON text form
    Scalar(String),
    /// An uploaded file part
    Binary(Vec<u8>),
}

/// Named fields from a request body, the last value wins on repeats.
#[derive(Clone, Debug, Default)]
pub struct RawFields {
    fields: HashMap<String, FieldValue>,
}

impl RawFields {
    /// Creates an empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Builds the field set from a JSON body, which must be an object.
    pub fn from_json(value: Value) -> Result<Self, DeltaImageError> {
        let Value::Object(map) = value else {
            return Err(DeltaImageError::InvalidInput(
                "Request body must be a JSON object".to_string(),
            ));
        };
        let mut fields = Self::new();
        for (name, value) in map {
            match value {
                Value::Null => {}
                Value::String(text) => fields.insert(name, FieldValue::Text(text)),
                other => fields.insert(name, FieldValue::Scalar(other.to_string())),
            }
        }
        Ok(fields)
    }

    /// Builds the field set from urlencoded pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields = Self::new();
        for (name, value) in pairs {
            fields.insert(name, FieldValue::Text(value.into()));
        }
        fields
    }

    fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Only real text counts, numbers and files don't.
    fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    fn numeric(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Text(text) | FieldValue::Scalar(text) => Some(text.as_str()),
            FieldValue::Binary(_) => None,
        }
    }

    fn required_text(&self, name: &str) -> Result<String, DeltaImageError> {
        let value = match self.get(name) {
            None => return Err(DeltaImageError::InvalidInput(format!("Missing {name}"))),
            Some(FieldValue::Text(text)) => text.trim(),
            Some(_) => return Err(DeltaImageError::InvalidInput(format!("Invalid {name}"))),
        };
        if value.is_empty() {
            return Err(DeltaImageError::InvalidInput(format!("Invalid {name}")));
        }
        Ok(value.to_string())
    }

    fn optional_text(&self, name: &str) -> Option<String> {
        self.text(name)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }

    fn num_steps(&self) -> Option<u8> {
        let steps = parse_integer(self.numeric("num_steps")?)?;
        Some(steps.clamp(i64::from(MIN_NUM_STEPS), i64::from(MAX_NUM_STEPS)) as u8)
    }

    fn strength(&self) -> Option<f32> {
        parse_float(self.numeric("strength")?).map(|value| value.clamp(MIN_STRENGTH, MAX_STRENGTH))
    }

    fn guidance_scale(&self) -> Option<f32> {
        parse_float(self.numeric("guidance_scale")?)
    }

    fn seed(&self) -> Option<u64> {
        u64::try_from(parse_integer(self.numeric("seed")?)?).ok()
    }

    /// Inline base image from `image_b64` or `image`, `None` when neither is usable.
    fn base_image(&self) -> Result<Option<Vec<u8>>, DeltaImageError> {
        for name in ["image_b64", "image"] {
            match self.get(name) {
                Some(FieldValue::Binary(bytes)) if !bytes.is_empty() => {
                    return Ok(Some(bytes.clone()));
                }
                Some(FieldValue::Text(text)) if !text.trim().is_empty() => {
                    return decode_base64_image(text).map(Some);
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Integer parse that also accepts decimals and truncates them.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok().filter(|value| value.is_finite())?;
    Some(value.trunc() as i64)
}

fn parse_float(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Decodes base64 image text, with or without a `data:image/...;base64,` prefix.
pub fn decode_base64_image(text: &str) -> Result<Vec<u8>, DeltaImageError> {
    let text = text.trim();
    let payload = match DATA_URL_PREFIX.as_ref().and_then(|re| re.find(text)) {
        Some(prefix) => &text[prefix.end()..],
        None => text,
    };
    general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|err| DeltaImageError::InvalidInput(format!("Invalid base image: {err}")))
}

fn check_text(name: &str, value: &str) -> Result<(), DeltaImageError> {
    if value.trim().is_empty() {
        return Err(DeltaImageError::InvalidInput(format!("Invalid {name}")));
    }
    Ok(())
}

fn check_num_steps(steps: u8) -> Result<(), DeltaImageError> {
    if !(MIN_NUM_STEPS..=MAX_NUM_STEPS).contains(&steps) {
        return Err(DeltaImageError::InvalidInput(format!(
            "num_steps must be between {MIN_NUM_STEPS} and {MAX_NUM_STEPS}"
        )));
    }
    Ok(())
}

fn check_strength(strength: f32) -> Result<(), DeltaImageError> {
    if !(MIN_STRENGTH..=MAX_STRENGTH).contains(&strength) {
        return Err(DeltaImageError::InvalidInput(format!(
            "strength must be between {MIN_STRENGTH} and {MAX_STRENGTH}"
        )));
    }
    Ok(())
}

fn check_guidance_scale(guidance_scale: f32) -> Result<(), DeltaImageError> {
    if !guidance_scale.is_finite() {
        return Err(DeltaImageError::InvalidInput(
            "guidance_scale must be a finite number".to_string(),
        ));
    }
    Ok(())
}

/// A base generation from a text prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    /// never empty
    pub prompt: String,
    /// things the model should steer away from
    pub negative_prompt: Option<String>,
    /// diffusion steps, 1..=20
    pub num_steps: u8,
    /// 0.1..=1.0
    pub strength: f32,
    /// how closely the model follows the prompt
    pub guidance_scale: f32,
    /// fixed seed for reproducible output
    pub seed: Option<u64>,
}

impl GenerationRequest {
    /// A request with every optional field at its default
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            num_steps: DEFAULT_NUM_STEPS,
            strength: DEFAULT_STRENGTH,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
        }
    }

    /// Validates the submitted fields
    pub fn from_fields(fields: &RawFields) -> Result<Self, DeltaImageError> {
        let prompt = fields.required_text("prompt")?;
        Ok(Self {
            prompt,
            negative_prompt: fields.optional_text("negative_prompt"),
            num_steps: fields.num_steps().unwrap_or(DEFAULT_NUM_STEPS),
            strength: fields.strength().unwrap_or(DEFAULT_STRENGTH),
            guidance_scale: fields.guidance_scale().unwrap_or(DEFAULT_GUIDANCE_SCALE),
            seed: fields.seed(),
        })
    }

    /// Checks a request built in code, where nothing has been clamped.
    pub fn validate(&self) -> Result<(), DeltaImageError> {
        check_text("prompt", &self.prompt)?;
        check_num_steps(self.num_steps)?;
        check_strength(self.strength)?;
        check_guidance_scale(self.guidance_scale)
    }
}

/// An img2img modification of the latest (or an uploaded) image.
#[derive(Clone, Debug, PartialEq)]
pub struct DeltaRequest {
    /// description of the change, never empty
    pub delta: String,
    /// inline base image, otherwise the stored one is used
    pub base_image: Option<Vec<u8>>,
    /// diffusion steps, model default when unset
    pub num_steps: Option<u8>,
    /// how far the output may drift from the base image
    pub strength: f32,
    /// model default when unset
    pub guidance_scale: Option<f32>,
    /// fixed seed for reproducible output
    pub seed: Option<u64>,
}

impl DeltaRequest {
    /// A delta against the stored image with defaults everywhere
    pub fn new(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            base_image: None,
            num_steps: None,
            strength: DEFAULT_DELTA_STRENGTH,
            guidance_scale: None,
            seed: None,
        }
    }

    /// Validates the submitted fields
    pub fn from_fields(fields: &RawFields) -> Result<Self, DeltaImageError> {
        let delta = fields.required_text("delta")?;
        Ok(Self {
            delta,
            base_image: fields.base_image()?,
            num_steps: fields.num_steps(),
            strength: fields.strength().unwrap_or(DEFAULT_DELTA_STRENGTH),
            guidance_scale: fields.guidance_scale(),
            seed: fields.seed(),
        })
    }

    /// Checks a request built in code, where nothing has been clamped.
    pub fn validate(&self) -> Result<(), DeltaImageError> {
        check_text("delta", &self.delta)?;
        if let Some(steps) = self.num_steps {
            check_num_steps(steps)?;
        }
        check_strength(self.strength)?;
        match self.guidance_scale {
            Some(guidance_scale) => check_guidance_scale(guidance_scale),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_is_required_text() {
        let missing = GenerationRequest::from_fields(&RawFields::new());
        assert!(matches!(missing, Err(DeltaImageError::InvalidInput(_))));

        let numeric = RawFields::from_json(json!({"prompt": 42})).expect("object");
        assert!(matches!(
            GenerationRequest::from_fields(&numeric),
            Err(DeltaImageError::InvalidInput(_))
        ));

        let mut file = RawFields::new();
        file.insert("prompt", FieldValue::Binary(b"a red fox".to_vec()));
        assert!(GenerationRequest::from_fields(&file).is_err());

        let blank = RawFields::from_pairs([("prompt", "   ")]);
        assert!(GenerationRequest::from_fields(&blank).is_err());
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let fields = RawFields::from_json(json!({"prompt": " a red fox "})).expect("object");
        let request = GenerationRequest::from_fields(&fields).expect("valid");
        assert_eq!(request, GenerationRequest::new("a red fox"));
    }

    #[test]
    fn unparsable_numbers_behave_like_missing_ones() {
        let garbage = RawFields::from_pairs([
            ("prompt", "a red fox"),
            ("num_steps", "abc"),
            ("strength", "strong"),
            ("guidance_scale", "NaN"),
            ("seed", "-4"),
        ]);
        let omitted = RawFields::from_pairs([("prompt", "a red fox")]);
        assert_eq!(
            GenerationRequest::from_fields(&garbage).expect("garbage"),
            GenerationRequest::from_fields(&omitted).expect("omitted"),
        );
    }

    #[test]
    fn numbers_are_parsed_and_clamped() {
        let fields = RawFields::from_json(json!({
            "prompt": "a red fox",
            "negative_prompt": "blurry",
            "num_steps": 50,
            "strength": "0.01",
            "guidance_scale": 9,
            "seed": "1234",
        }))
        .expect("object");
        let request = GenerationRequest::from_fields(&fields).expect("valid");
        assert_eq!(request.negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(request.num_steps, MAX_NUM_STEPS);
        assert_eq!(request.strength, MIN_STRENGTH);
        assert_eq!(request.guidance_scale, 9.0);
        assert_eq!(request.seed, Some(1234));

        let fields = RawFields::from_pairs([("prompt", "x"), ("num_steps", "12.7")]);
        let request = GenerationRequest::from_fields(&fields).expect("valid");
        assert_eq!(request.num_steps, 12);
    }

    #[test]
    fn delta_is_required() {
        let fields = RawFields::from_pairs([("image_b64", "aGVsbG8=")]);
        assert!(matches!(
            DeltaRequest::from_fields(&fields),
            Err(DeltaImageError::InvalidInput(_))
        ));
    }

    #[test]
    fn delta_defaults_leave_model_options_unset() {
        let fields = RawFields::from_pairs([("delta", "in snow"), ("num_steps", "abc")]);
        let request = DeltaRequest::from_fields(&fields).expect("valid");
        assert_eq!(request, DeltaRequest::new("in snow"));
        assert_eq!(request.strength, DEFAULT_DELTA_STRENGTH);
    }

    #[test]
    fn inline_images_are_decoded() {
        let fields = RawFields::from_pairs([
            ("delta", "in snow"),
            ("image_b64", "data:image/png;base64,aGVsbG8="),
        ]);
        let request = DeltaRequest::from_fields(&fields).expect("valid");
        assert_eq!(request.base_image.as_deref(), Some(&b"hello"[..]));

        let mut fields = RawFields::from_pairs([("delta", "in snow")]);
        fields.insert("image", FieldValue::Binary(vec![1, 2, 3]));
        let request = DeltaRequest::from_fields(&fields).expect("valid");
        assert_eq!(request.base_image, Some(vec![1, 2, 3]));

        let blank = RawFields::from_pairs([("delta", "in snow"), ("image_b64", "")]);
        let request = DeltaRequest::from_fields(&blank).expect("valid");
        assert!(request.base_image.is_none());

        let broken = RawFields::from_pairs([("delta", "in snow"), ("image_b64", "!!!")]);
        assert!(matches!(
            DeltaRequest::from_fields(&broken),
            Err(DeltaImageError::InvalidInput(_))
        ));
    }

    #[test]
    fn json_body_must_be_an_object() {
        assert!(RawFields::from_json(json!(["prompt"])).is_err());
        let fields = RawFields::from_json(json!({"prompt": null})).expect("object");
        assert!(GenerationRequest::from_fields(&fields).is_err());
    }

    #[test]
    fn hand_built_requests_are_checked() {
        assert!(GenerationRequest::new("a red fox").validate().is_ok());
        assert!(DeltaRequest::new("in snow").validate().is_ok());

        let invalid = [
            GenerationRequest::new("   "),
            GenerationRequest {
                num_steps: 50,
                ..GenerationRequest::new("a red fox")
            },
            GenerationRequest {
                num_steps: 0,
                ..GenerationRequest::new("a red fox")
            },
            GenerationRequest {
                strength: 2.0,
                ..GenerationRequest::new("a red fox")
            },
            GenerationRequest {
                guidance_scale: f32::NAN,
                ..GenerationRequest::new("a red fox")
            },
        ];
        for request in invalid {
            assert!(
                matches!(request.validate(), Err(DeltaImageError::InvalidInput(_))),
                "{request:?} should be rejected"
            );
        }

        let invalid = [
            DeltaRequest::new(" \t "),
            DeltaRequest {
                num_steps: Some(21),
                ..DeltaRequest::new("in snow")
            },
            DeltaRequest {
                strength: 0.0,
                ..DeltaRequest::new("in snow")
            },
            DeltaRequest {
                guidance_scale: Some(f32::INFINITY),
                ..DeltaRequest::new("in snow")
            },
        ];
        for request in invalid {
            assert!(
                matches!(request.validate(), Err(DeltaImageError::InvalidInput(_))),
                "{request:?} should be rejected"
            );
        }
    }

    #[test]
    fn parsed_requests_always_validate() {
        let fields = RawFields::from_json(json!({
            "prompt": "a red fox",
            "delta": "in snow",
            "num_steps": 500,
            "strength": 9,
        }))
        .expect("object");
        assert!(
            GenerationRequest::from_fields(&fields)
                .expect("valid")
                .validate()
                .is_ok()
        );
        assert!(
            DeltaRequest::from_fields(&fields)
                .expect("valid")
                .validate()
                .is_ok()
        );
    }
}
