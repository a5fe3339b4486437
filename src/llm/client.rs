// =============================================================================
// Decision client — multi-provider chat completions with fallback chain
// =============================================================================
//
// One logical decision call walks a chain of models: the configured model
// first, then every other model with a key, then the original once more.
// Recoverable failures (non-2xx, parse error, schema violation) advance the
// chain after an exponential pause; when the whole chain fails the safe
// default HOLD comes back with confidence 0. Token usage is recorded for
// every completed HTTP call, including ones whose payload then failed to
// parse.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use super::decision::{decision_schema, parse_decision, schema_prompt_block, Decision};
use super::registry::{ModelConfig, ModelRegistry};
use super::usage::UsageTracker;

const MAX_ATTEMPTS: usize = 3;
const LLM_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_OUTPUT_TOKENS: u32 = 1000;
/// Low temperature for repeatable decisions.
const TEMPERATURE: f64 = 0.3;

/// Metadata attached to every usage row from one call site.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub purpose: String,
    pub ticker: Option<String>,
    pub cycle_id: Option<String>,
}

pub struct DecisionClient {
    http: reqwest::Client,
    registry: ModelRegistry,
    usage: Arc<UsageTracker>,
}

impl DecisionClient {
    pub fn new(preferred_model: &str, usage: Arc<UsageTracker>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .expect("failed to build LLM HTTP client"),
            registry: ModelRegistry::new(preferred_model),
            usage,
        }
    }

    /// Ask for a structured trade decision. Never errors: the worst outcome
    /// is the safe default HOLD.
    #[instrument(skip_all, fields(purpose = %call.purpose, ticker = ?call.ticker))]
    pub async fn decide(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        call: &CallContext,
    ) -> Decision {
        let primary = self.registry.current();
        let fallbacks = self.registry.fallbacks();

        let mut last_error = String::from("no model attempted");

        for attempt in 0..MAX_ATTEMPTS {
            // Chain position: primary, then fallbacks in order, then primary
            // again as the last resort.
            let model = if attempt == 0 {
                primary
            } else if attempt <= fallbacks.len() {
                fallbacks[attempt - 1]
            } else {
                primary
            };

            if !model.is_available() {
                last_error = format!("{} has no API key", model.key);
                continue;
            }

            info!(
                attempt = attempt + 1,
                max = MAX_ATTEMPTS,
                model = model.name,
                model_id = model.model_id,
                "requesting decision"
            );

            match self.request_once(model, system_instruction, user_prompt, call).await {
                Ok(decision) => {
                    info!(
                        model = model.name,
                        operation = decision.operation_name(),
                        symbol = ?decision.symbol(),
                        confidence = decision.confidence(),
                        "decision received"
                    );
                    return decision;
                }
                Err(e) => {
                    last_error = e.to_string();
                    error!(
                        attempt = attempt + 1,
                        model = model.name,
                        error = %last_error,
                        "decision attempt failed"
                    );
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                let pause = Duration::from_secs(1 << attempt);
                tokio::time::sleep(pause).await;
            }
        }

        error!(error = %last_error, "all decision attempts failed — holding");
        Decision::safe_default(&last_error)
    }

    /// One provider round-trip: build the request per the model's
    /// capabilities, account tokens, parse the decision.
    async fn request_once(
        &self,
        model: &'static ModelConfig,
        system_instruction: &str,
        user_prompt: &str,
        call: &CallContext,
    ) -> Result<Decision> {
        let api_key = model
            .api_key()
            .with_context(|| format!("{} key missing", model.api_key_env))?;

        // Schema-capable providers get a terse instruction; the rest carry
        // the schema inline.
        let system_content = if model.supports_json_schema {
            format!(
                "You are a professional trading AI. Analyze the data and respond ONLY with \
                 valid JSON according to the required schema.\n\n{system_instruction}"
            )
        } else {
            format!(
                "You are a professional trading AI. {system_instruction}\n\n{}",
                schema_prompt_block()
            )
        };

        let mut body = json!({
            "model": model.model_id,
            "messages": [
                {"role": "system", "content": system_content},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": TEMPERATURE,
        });

        if model.use_max_completion_tokens {
            body["max_completion_tokens"] = json!(MAX_OUTPUT_TOKENS);
        } else {
            body["max_tokens"] = json!(MAX_OUTPUT_TOKENS);
        }

        body["response_format"] = if model.supports_json_schema {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "trade_decision",
                    "strict": true,
                    "schema": decision_schema(),
                }
            })
        } else {
            json!({"type": "json_object"})
        };

        let url = format!(
            "{}/chat/completions",
            model.resolved_base_url().trim_end_matches('/')
        );

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .context("chat completion body is not JSON")?;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        if !status.is_success() {
            anyhow::bail!("provider returned {status}: {payload}");
        }

        // Account tokens even when the content fails to parse below.
        let usage = &payload["usage"];
        let record = UsageTracker::build_record(
            model.model_id,
            usage["prompt_tokens"].as_i64().unwrap_or(0),
            usage["completion_tokens"].as_i64().unwrap_or(0),
            &call.purpose,
            call.ticker.clone(),
            call.cycle_id.clone(),
            elapsed_ms,
        );
        self.usage.track(record).await;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.is_empty())
            .with_context(|| format!("empty response from {}", model.name))?;

        let decision = parse_decision(content)
            .with_context(|| format!("{} produced an invalid decision", model.name))?;

        if decision.confidence() < 0.3 {
            warn!(
                model = model.name,
                confidence = decision.confidence(),
                "low-confidence decision from provider"
            );
        }

        Ok(decision)
    }
}

impl std::fmt::Debug for DecisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionClient")
            .field("current_model", &self.registry.current().key)
            .finish()
    }
}
