//! Service configuration.
//!
//! Built once at startup and passed by reference into the gateway and the
//! orchestrator. Nothing here is mutated per request.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bloodgas_core::schema::Range;
use bloodgas_core::{BloodGasError, BloodGasResult, TransfusionTarget};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sampling temperatures are kept low to bias the model toward determinism.
pub const TEMPERATURE_RANGE: Range = Range::new(0.1, 0.3);

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";
pub const ENV_MISSING_FIELD_POLICY: &str = "BLOODGAS_MISSING_FIELD_POLICY";
pub const ENV_TRANSFUSION_TARGET: &str = "BLOODGAS_TRANSFUSION_TARGET";

/// Generation parameters and time budget for one kind of model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationBudget {
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub timeout: Duration,
    /// Ask the service for `application/json` output
    pub json_mode: bool,
}

impl GenerationBudget {
    /// Image recognition: short output, 60 s.
    pub fn extraction() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 2048,
            timeout: Duration::from_secs(60),
            json_mode: false,
        }
    }

    /// Full narrative analysis: large output, 120 s.
    pub fn analysis() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 16384,
            timeout: Duration::from_secs(120),
            json_mode: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = TEMPERATURE_RANGE.clamp(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// What to do with indicators the recognition step could not read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingFieldPolicy {
    /// Add an informational alert naming the unresolved indicators.
    #[default]
    Annotate,
    /// Annotate, and also withhold every dosage section that depends on one.
    BlockDosage,
}

impl FromStr for MissingFieldPolicy {
    type Err = BloodGasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "annotate" => Ok(MissingFieldPolicy::Annotate),
            "block_dosage" | "block-dosage" => Ok(MissingFieldPolicy::BlockDosage),
            other => Err(BloodGasError::Configuration(format!(
                "{ENV_MISSING_FIELD_POLICY} must be 'annotate' or 'block_dosage', got '{other}'"
            ))),
        }
    }
}

/// Immutable process-wide configuration.
#[derive(Clone)]
pub struct ServiceConfig {
    api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub extraction: GenerationBudget,
    pub analysis: GenerationBudget,
    pub missing_field_policy: MissingFieldPolicy,
    pub transfusion_target: TransfusionTarget,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("extraction", &self.extraction)
            .field("analysis", &self.analysis)
            .field("missing_field_policy", &self.missing_field_policy)
            .field("transfusion_target", &self.transfusion_target)
            .finish()
    }
}

impl ServiceConfig {
    /// Configuration with a model credential. A blank key is rejected here,
    /// never later per request.
    pub fn new(api_key: impl Into<String>) -> BloodGasResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BloodGasError::Configuration(format!(
                "{ENV_API_KEY} is empty"
            )));
        }
        Ok(Self {
            api_key: Some(api_key.trim().to_string()),
            ..Self::offline()
        })
    }

    /// Configuration without a credential, usable for rules-only analysis.
    pub fn offline() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            extraction: GenerationBudget::extraction(),
            analysis: GenerationBudget::analysis(),
            missing_field_policy: MissingFieldPolicy::default(),
            transfusion_target: TransfusionTarget::default(),
        }
    }

    /// Load `.env`, then read the process environment. The credential is required.
    pub fn from_env() -> BloodGasResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ServiceConfig::from_env`] but a missing credential is allowed.
    pub fn from_env_offline() -> BloodGasResult<Self> {
        dotenv::dotenv().ok();
        Self::offline().apply_overrides(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> BloodGasResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY).ok_or_else(|| {
            BloodGasError::Configuration(format!("{ENV_API_KEY} is not set"))
        })?;
        Self::new(api_key)?.apply_overrides(lookup)
    }

    fn apply_overrides<F>(mut self, lookup: F) -> BloodGasResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(model) = present(ENV_MODEL) {
            self.model = model.trim().to_string();
        }
        if let Some(url) = present(ENV_BASE_URL) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(policy) = present(ENV_MISSING_FIELD_POLICY) {
            self.missing_field_policy = policy.parse()?;
        }
        if let Some(target) = present(ENV_TRANSFUSION_TARGET) {
            let g_l = target.trim().parse::<f64>().map_err(|_| {
                BloodGasError::Configuration(format!(
                    "{ENV_TRANSFUSION_TARGET} must be a number of g/L, got '{target}'"
                ))
            })?;
            self.transfusion_target = TransfusionTarget::for_surgical_risk(g_l)
                .map_err(|e| BloodGasError::Configuration(e.to_string()))?;
        }
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_missing_field_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.missing_field_policy = policy;
        self
    }

    pub fn with_transfusion_target(mut self, target: TransfusionTarget) -> Self {
        self.transfusion_target = target;
        self
    }

    pub fn with_extraction_budget(mut self, budget: GenerationBudget) -> Self {
        self.extraction = budget;
        self
    }

    pub fn with_analysis_budget(mut self, budget: GenerationBudget) -> Self {
        self.analysis = budget;
        self
    }

    /// The model credential, or a configuration error if none was supplied.
    pub fn api_key(&self) -> BloodGasResult<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            BloodGasError::Configuration(format!("{ENV_API_KEY} is not set"))
        })
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[(ENV_API_KEY, "k")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key().unwrap(), "k");
        assert_eq!(config.extraction.max_output_tokens, 2048);
        assert_eq!(config.extraction.timeout_ms(), 60_000);
        assert_eq!(config.analysis.max_output_tokens, 16384);
        assert_eq!(config.analysis.timeout_ms(), 120_000);
        assert!(config.analysis.json_mode);
        assert_eq!(config.missing_field_policy, MissingFieldPolicy::Annotate);
        assert_eq!(config.transfusion_target.g_l(), 100.0);
    }

    #[test]
    fn test_missing_or_blank_key_is_configuration_error() {
        let err = ServiceConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, BloodGasError::Configuration(_)));

        let err = ServiceConfig::from_lookup(lookup(&[(ENV_API_KEY, "   ")])).unwrap_err();
        assert!(matches!(err, BloodGasError::Configuration(_)));
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_MODEL, "gemini-2.0-flash"),
            (ENV_BASE_URL, "http://localhost:9000/v1beta/"),
            (ENV_MISSING_FIELD_POLICY, "block_dosage"),
            (ENV_TRANSFUSION_TARGET, "80"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url, "http://localhost:9000/v1beta");
        assert_eq!(config.missing_field_policy, MissingFieldPolicy::BlockDosage);
        assert_eq!(config.transfusion_target.g_l(), 80.0);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_MISSING_FIELD_POLICY, "ignore"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BloodGasError::Configuration(_)));

        let err = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_TRANSFUSION_TARGET, "60"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BloodGasError::Configuration(_)));
    }

    #[test]
    fn test_temperature_clamped() {
        assert_eq!(GenerationBudget::analysis().with_temperature(0.9).temperature, 0.3);
        assert_eq!(GenerationBudget::analysis().with_temperature(0.0).temperature, 0.1);
        assert_eq!(GenerationBudget::analysis().with_temperature(0.2).temperature, 0.2);
    }

    #[test]
    fn test_offline_has_no_credential() {
        let config = ServiceConfig::offline();
        assert!(!config.has_credential());
        assert!(matches!(config.api_key(), Err(BloodGasError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ServiceConfig::new("secret-key").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }
}
