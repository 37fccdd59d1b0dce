//! Recognition gateway: report image → candidate panel.
//!
//! The model's JSON is read leniently, but conservatively: any indicator the
//! model lists as missing, or whose value is not a readable number, is null.
//! Bounds are not checked here; [`PanelExtraction::validate`] promotes the
//! candidate through the Panel Schema.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use bloodgas_core::schema::{parse_numeric, FieldNormalizer, PanelField};
use bloodgas_core::{
    parse_model_json, BloodGasError, BloodGasResult, CandidatePanel, Panel, ValidationError, Weight,
};

use crate::client::{InlineImage, ModelClient, ModelRequest};
use crate::config::ServiceConfig;
use crate::prompts::make_extraction_prompt;

/// Outcome of one recognition call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelExtraction {
    pub panel: CandidatePanel,
    /// In [0, 1]
    pub confidence: f64,
    /// Null indicators, canonical order, no duplicates
    #[serde(serialize_with = "serialize_keys")]
    pub missing_fields: Vec<PanelField>,
    pub extracted_at: DateTime<Utc>,
    /// Caller's weight, passed through unchanged
    pub weight: Weight,
}

fn serialize_keys<S: Serializer>(fields: &[PanelField], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(fields.iter().map(|f| f.key()))
}

impl PanelExtraction {
    /// Promote the candidate to a validated panel.
    pub fn validate(&self) -> BloodGasResult<Panel> {
        self.panel.validate()
    }

    pub fn to_json(&self) -> BloodGasResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Keys in the recognition payload that are not indicators.
const META_KEYS: [&str; 3] = ["confidence", "missing_fields", "extracted_at"];

/// Map `image/jpg` to `image/jpeg`; reject anything that is not an image type.
pub fn normalize_mime(mime_type: &str) -> Result<String, ValidationError> {
    let mime = mime_type.trim().to_lowercase();
    match mime.as_str() {
        "" => Ok("image/jpeg".to_string()),
        "image/jpg" | "image/pjpeg" => Ok("image/jpeg".to_string()),
        m if m.starts_with("image/") && m.len() > "image/".len() => Ok(mime),
        _ => Err(ValidationError::Malformed {
            field: "mime_type".into(),
            reason: format!("expected an image MIME type, got '{}'", mime_type.trim()),
        }),
    }
}

/// Names the model reported as unreadable, resolved to indicators.
fn reported_missing(payload: &Map<String, Value>, normalizer: &FieldNormalizer) -> Vec<PanelField> {
    let names: Vec<String> = match payload.get("missing_fields") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    names
        .iter()
        .filter_map(|name| {
            let field = normalizer.resolve_fuzzy(name);
            if field.is_none() {
                tracing::debug!(name = %name, "Dropping unknown missing-field name");
            }
            field
        })
        .collect()
}

fn reported_confidence(payload: &Map<String, Value>) -> Option<f64> {
    parse_numeric("confidence", payload.get("confidence")?)
        .ok()
        .flatten()
        .map(|c| c.clamp(0.0, 1.0))
}

/// Build the extraction from a parsed recognition payload.
pub fn interpret_payload(
    payload: &Map<String, Value>,
    normalizer: &FieldNormalizer,
    weight: Weight,
) -> PanelExtraction {
    let mut panel = CandidatePanel::new();

    // Canonical keys first, so an alias never overrides them.
    for field in PanelField::ALL {
        if let Some(value) = payload.get(field.key()) {
            panel.set(field, parse_numeric(field.key(), value).ok().flatten());
        }
    }
    for (key, value) in payload {
        if META_KEYS.contains(&key.as_str()) {
            continue;
        }
        let Some(field) = normalizer.resolve(key) else {
            continue;
        };
        if panel.get(field).is_none() {
            panel.set(field, parse_numeric(field.key(), value).ok().flatten());
        }
    }

    for field in reported_missing(payload, normalizer) {
        if panel.get(field).is_some() {
            tracing::debug!(field = field.key(), "Nulling value the model marked as missing");
        }
        panel.set(field, None);
    }

    let confidence = reported_confidence(payload)
        .unwrap_or_else(|| panel.present_count() as f64 / PanelField::COUNT as f64);

    PanelExtraction {
        missing_fields: panel.absent_fields(),
        panel,
        confidence,
        extracted_at: Utc::now(),
        weight,
    }
}

/// Sends report images to the model and interprets the reply.
pub struct RecognitionGateway<'a> {
    client: &'a dyn ModelClient,
    config: &'a ServiceConfig,
    normalizer: FieldNormalizer,
}

impl<'a> RecognitionGateway<'a> {
    pub fn new(client: &'a dyn ModelClient, config: &'a ServiceConfig) -> Self {
        Self {
            client,
            config,
            normalizer: FieldNormalizer::new(),
        }
    }

    /// Recognise the 18 indicators in a report image.
    ///
    /// Upstream, parse and timeout failures are returned as typed errors;
    /// the caller may retry or fall back to manual entry.
    pub async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
        weight: Weight,
    ) -> BloodGasResult<PanelExtraction> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "extract",
            %request_id,
            model = self.client.model_name(),
            image_bytes = image.len()
        );
        self.extract_inner(image, mime_type, weight)
            .instrument(span)
            .await
    }

    async fn extract_inner(
        &self,
        image: &[u8],
        mime_type: &str,
        weight: Weight,
    ) -> BloodGasResult<PanelExtraction> {
        let started = Instant::now();

        if image.is_empty() {
            return Err(ValidationError::Malformed {
                field: "image".into(),
                reason: "image is empty".into(),
            }
            .into());
        }
        let mime = normalize_mime(mime_type)?;

        let budget = self.config.extraction;
        let request = ModelRequest::new(make_extraction_prompt(), budget)
            .with_image(InlineImage::from_bytes(mime, image));

        let raw = match tokio::time::timeout(budget.timeout, self.client.generate(&request)).await {
            Err(_) => {
                tracing::warn!(budget_ms = budget.timeout_ms(), "Recognition call timed out");
                return Err(BloodGasError::Timeout {
                    budget_ms: budget.timeout_ms(),
                });
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Recognition call failed");
                return Err(e.into());
            }
            Ok(Ok(text)) => text,
        };

        let payload = parse_model_json(&raw).inspect_err(|_| {
            tracing::warn!(response_chars = raw.len(), "Recognition output is not valid JSON");
        })?;
        let extraction = interpret_payload(&payload, &self.normalizer, weight);

        tracing::info!(
            present = extraction.panel.present_count(),
            missing = extraction.missing_fields.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction complete"
        );
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockModelClient;
    use bloodgas_core::ErrorKind;
    use serde_json::json;
    use std::time::Duration;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_mime() {
        assert_eq!(normalize_mime("image/jpg").unwrap(), "image/jpeg");
        assert_eq!(normalize_mime(" IMAGE/PNG ").unwrap(), "image/png");
        assert_eq!(normalize_mime("").unwrap(), "image/jpeg");
        let err = normalize_mime("application/pdf").unwrap_err();
        assert_eq!(err.field(), "mime_type");
    }

    #[test]
    fn test_listed_missing_field_is_nulled() {
        let extraction = interpret_payload(
            &payload(json!({"ph": 7.31, "k": 3.2, "missing_fields": ["K+", "Lactate"], "confidence": 0.8})),
            &FieldNormalizer::new(),
            Weight::Unavailable,
        );
        assert_eq!(extraction.panel.get(PanelField::Ph), Some(7.31));
        assert_eq!(extraction.panel.get(PanelField::K), None);
        assert!(extraction.missing_fields.contains(&PanelField::K));
        assert!(extraction.missing_fields.contains(&PanelField::Lac));
        assert_eq!(extraction.missing_fields.len(), 17);
        assert_eq!(extraction.confidence, 0.8);
    }

    #[test]
    fn test_missing_fields_canonical_and_deduplicated() {
        let extraction = interpret_payload(
            &payload(json!({
                "ph": 7.4, "po2": 90, "pco2": 40, "na": 140, "k": 4.0, "ca": 1.2,
                "glu": 5.0, "lac": 1.0, "hct": 40, "ca_74": 1.2, "hco3_act": 24,
                "hco3_std": 24, "ctco2": 25, "be_ecf": 0, "be_b": 0, "so2c": 98,
                "thbc": null, "temp": "illegible",
                "missing_fields": ["temp", "thbc", "thbc", "not-a-field"]
            })),
            &FieldNormalizer::new(),
            Weight::Available(70.0),
        );
        assert_eq!(extraction.missing_fields, vec![PanelField::Thbc, PanelField::Temp]);
        assert_eq!(extraction.weight, Weight::Available(70.0));
    }

    #[test]
    fn test_unlisted_null_is_added_and_confidence_heuristic() {
        let extraction = interpret_payload(
            &payload(json!({"ph": 7.2, "be_ecf": -8, "missing_fields": []})),
            &FieldNormalizer::new(),
            Weight::Unavailable,
        );
        assert_eq!(extraction.missing_fields.len(), 16);
        assert!((extraction.confidence - 2.0 / 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_clamped_and_aliases_accepted() {
        let extraction = interpret_payload(
            &payload(json!({"pH": "7.25", "lactate": 3.3, "confidence": 1.7})),
            &FieldNormalizer::new(),
            Weight::Unavailable,
        );
        assert_eq!(extraction.confidence, 1.0);
        assert_eq!(extraction.panel.get(PanelField::Ph), Some(7.25));
        assert_eq!(extraction.panel.get(PanelField::Lac), Some(3.3));
    }

    #[test]
    fn test_serialized_shape() {
        let extraction = interpret_payload(
            &payload(json!({"ca_74": 1.1})),
            &FieldNormalizer::new(),
            Weight::Unavailable,
        );
        let json = serde_json::to_value(&extraction).unwrap();
        assert_eq!(json["panel"]["ca_74"], 1.1);
        assert!(json["panel"]["ph"].is_null());
        assert_eq!(json["panel"].as_object().unwrap().len(), 18);
        assert_eq!(json["missing_fields"][0], "ph");
        assert!(json["weight"].is_null());
        assert!(json["extracted_at"].is_string());
    }

    #[tokio::test]
    async fn test_extract_sends_inline_image() {
        let client = MockModelClient::new("mock-vision").with_reply(
            "```json\n{\"ph\": 7.15, \"be_ecf\": -12, \"thbc\": 75, \"confidence\": 0.95, \"missing_fields\": []}\n```",
        );
        let config = ServiceConfig::new("k").unwrap();
        let gateway = RecognitionGateway::new(&client, &config);

        let extraction = gateway
            .extract(b"jpeg-bytes", "image/jpg", Weight::Available(70.0))
            .await
            .unwrap();
        assert_eq!(extraction.panel.get(PanelField::BeEcf), Some(-12.0));
        assert_eq!(extraction.confidence, 0.95);
        assert_eq!(extraction.missing_fields.len(), 15);
        assert_eq!(extraction.validate().unwrap().present_count(), 3);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let image = requests[0].image.as_ref().unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(requests[0].budget.max_output_tokens, 2048);
    }

    #[tokio::test]
    async fn test_extract_failures_are_typed() {
        let config = ServiceConfig::new("k").unwrap();

        let client = MockModelClient::new("m").with_reply("I cannot read this image.");
        let err = RecognitionGateway::new(&client, &config)
            .extract(b"x", "image/png", Weight::Unavailable)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.is_retryable());

        let client = MockModelClient::new("m").with_failure(429, "quota exceeded");
        let err = RecognitionGateway::new(&client, &config)
            .extract(b"x", "image/png", Weight::Unavailable)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BloodGasError::Upstream {
                status: Some(429),
                message: "quota exceeded".into()
            }
        );

        let err = RecognitionGateway::new(&client, &config)
            .extract(b"", "image/png", Weight::Unavailable)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_timeout() {
        let client = MockModelClient::new("m")
            .with_reply("{}")
            .with_delay(Duration::from_millis(200));
        let config = ServiceConfig::new("k").unwrap().with_extraction_budget(
            crate::config::GenerationBudget::extraction().with_timeout(Duration::from_millis(20)),
        );
        let err = RecognitionGateway::new(&client, &config)
            .extract(b"x", "image/png", Weight::Unavailable)
            .await
            .unwrap_err();
        assert_eq!(err, BloodGasError::Timeout { budget_ms: 20 });
    }
}
