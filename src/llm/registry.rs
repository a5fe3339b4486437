// =============================================================================
// Model registry — every usable model described as plain data
// =============================================================================
//
// Two axes actually change request construction: whether the provider
// accepts a strict JSON schema response_format, and whether it wants
// `max_completion_tokens` instead of `max_tokens`. Everything else (base
// URL, key env var) is just configuration.
// =============================================================================

use serde::Serialize;
use tracing::{info, warn};

/// Static description of one chat-completions model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelConfig {
    /// Registry key, what DEFAULT_AI_MODEL selects.
    pub key: &'static str,
    /// Human-readable name for logs.
    pub name: &'static str,
    pub provider: &'static str,
    /// Wire model id sent in the request body.
    pub model_id: &'static str,
    /// Environment variable holding the API key.
    pub api_key_env: &'static str,
    /// Base URL; the OpenAI default applies when `None`.
    pub base_url: Option<&'static str>,
    /// Provider honors `response_format: json_schema` with strict mode.
    pub supports_json_schema: bool,
    /// Provider exposes a reasoning mode (informational only).
    pub supports_reasoning: bool,
    /// Provider wants `max_completion_tokens` instead of `max_tokens`.
    pub use_max_completion_tokens: bool,
}

impl ModelConfig {
    pub fn resolved_base_url(&self) -> &str {
        self.base_url.unwrap_or("https://api.openai.com/v1")
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    pub fn is_available(&self) -> bool {
        self.api_key().is_some()
    }
}

const MODELS: &[ModelConfig] = &[
    ModelConfig {
        key: "gpt-5.1",
        name: "GPT-5.1",
        provider: "openai",
        model_id: "gpt-5.1-2025-11-13",
        api_key_env: "OPENAI_API_KEY",
        base_url: None,
        supports_json_schema: true,
        supports_reasoning: true,
        use_max_completion_tokens: true,
    },
    ModelConfig {
        key: "gpt-4o-mini",
        name: "GPT-4o Mini",
        provider: "openai",
        model_id: "gpt-4o-mini",
        api_key_env: "OPENAI_API_KEY",
        base_url: None,
        supports_json_schema: true,
        supports_reasoning: false,
        use_max_completion_tokens: false,
    },
    ModelConfig {
        key: "deepseek",
        name: "DeepSeek V3",
        provider: "deepseek",
        model_id: "deepseek-chat",
        api_key_env: "DEEPSEEK_API_KEY",
        base_url: Some("https://api.deepseek.com"),
        supports_json_schema: false,
        supports_reasoning: false,
        use_max_completion_tokens: false,
    },
    ModelConfig {
        key: "deepseek-reasoner",
        name: "DeepSeek R1 (Reasoner)",
        provider: "deepseek",
        model_id: "deepseek-reasoner",
        api_key_env: "DEEPSEEK_API_KEY",
        base_url: Some("https://api.deepseek.com"),
        supports_json_schema: false,
        supports_reasoning: true,
        use_max_completion_tokens: false,
    },
];

const DEFAULT_MODEL: &str = "deepseek";

/// Chooses the current model and enumerates fallbacks.
pub struct ModelRegistry {
    current: &'static str,
}

impl ModelRegistry {
    /// Resolve the preferred model key, falling back to the default when the
    /// requested model is unknown or has no API key configured.
    pub fn new(preferred: &str) -> Self {
        let current = match Self::lookup(preferred) {
            Some(config) if config.is_available() => config.key,
            Some(_) => {
                warn!(
                    model = preferred,
                    default = DEFAULT_MODEL,
                    "preferred model has no API key — using default"
                );
                DEFAULT_MODEL
            }
            None => {
                if preferred != DEFAULT_MODEL {
                    warn!(
                        model = preferred,
                        default = DEFAULT_MODEL,
                        "unknown model key — using default"
                    );
                }
                DEFAULT_MODEL
            }
        };

        info!(model = current, "model registry initialised");
        Self { current }
    }

    pub fn lookup(key: &str) -> Option<&'static ModelConfig> {
        MODELS.iter().find(|m| m.key == key)
    }

    pub fn current(&self) -> &'static ModelConfig {
        Self::lookup(self.current).expect("current model always resolves")
    }

    /// Fallback chain: every *other* model with a configured key, in
    /// registry order.
    pub fn fallbacks(&self) -> Vec<&'static ModelConfig> {
        MODELS
            .iter()
            .filter(|m| m.key != self.current && m.is_available())
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_models() {
        assert!(ModelRegistry::lookup("deepseek").is_some());
        assert!(ModelRegistry::lookup("gpt-4o-mini").is_some());
        assert!(ModelRegistry::lookup("claude-opus").is_none());
    }

    #[test]
    fn schema_axis_is_data() {
        let gpt = ModelRegistry::lookup("gpt-5.1").unwrap();
        assert!(gpt.supports_json_schema);
        assert!(gpt.use_max_completion_tokens);

        let ds = ModelRegistry::lookup("deepseek").unwrap();
        assert!(!ds.supports_json_schema);
        assert!(!ds.use_max_completion_tokens);
        assert_eq!(ds.resolved_base_url(), "https://api.deepseek.com");
    }

    #[test]
    fn unknown_preference_falls_back_to_default() {
        let registry = ModelRegistry::new("definitely-not-a-model");
        assert_eq!(registry.current().key, DEFAULT_MODEL);
    }

    #[test]
    fn default_base_url_is_openai() {
        let gpt = ModelRegistry::lookup("gpt-4o-mini").unwrap();
        assert_eq!(gpt.resolved_base_url(), "https://api.openai.com/v1");
    }
}
