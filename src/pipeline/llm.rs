//! Text generation: the one capability the relay borrows from an LLM.
//!
//! Everything upstream of this module only sees [`TextGenerator`]:
//! `generate(prompt) -> text`. The production implementation,
//! [`LlmGenerator`], wraps an `edgequake_llm` provider and adds the retry,
//! timeout and empty-answer handling. Tests substitute a canned generator.
//!
//! ## Retry Strategy
//!
//! Provider errors under load (429 / 503) are usually transient. Exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`) spaces the retries: with the
//! 500 ms default and 2 retries the waits are 500 ms then 1 s. A single wait
//! never exceeds 60 s.

use crate::config::RelayConfig;
use crate::error::GenerationError;
use crate::prompts::ASSISTANT_SYSTEM_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Default model when the caller names a provider but no model.
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";

/// `generate(prompt) -> text`.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, GenerationError>>;
}

/// Generator that always fails with [`GenerationError::NotConfigured`].
///
/// Used by a server started without credentials so compile routes keep
/// working while generation routes answer with a clear error.
#[derive(Debug, Clone)]
pub struct UnconfiguredGenerator {
    hint: String,
}

impl UnconfiguredGenerator {
    pub fn new(hint: impl Into<String>) -> Self {
        Self { hint: hint.into() }
    }
}

impl TextGenerator for UnconfiguredGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, GenerationError>> {
        let err = GenerationError::NotConfigured {
            provider: "none".to_string(),
            hint: self.hint.clone(),
        };
        async move { Err(err) }.boxed()
    }
}

/// LLM-backed generator with retries and a per-call timeout.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl LlmGenerator {
    /// Wrap an already-resolved provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &RelayConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
        }
    }

    /// Resolve the provider once from `config` and the environment.
    ///
    /// Fails with [`GenerationError::NotConfigured`] when no credential can
    /// be found; callers are expected to do this at startup, not per request.
    pub fn from_config(config: &RelayConfig) -> Result<Self, GenerationError> {
        let provider = resolve_provider(config)?;
        info!("LLM provider ready");
        Ok(Self::new(provider, config))
    }

    async fn generate_with_retries(&self, prompt: &str) -> Result<String, GenerationError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(ASSISTANT_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let mut last_err: Option<GenerationError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "LLM retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.api_timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "LLM: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    if response.content.trim().is_empty() {
                        warn!("LLM attempt {} returned an empty response", attempt + 1);
                        last_err = Some(GenerationError::EmptyResponse);
                        continue;
                    }
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    warn!("LLM attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(GenerationError::Failed {
                        attempts: attempt + 1,
                        detail: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "LLM attempt {} timed out after {}s",
                        attempt + 1,
                        self.api_timeout.as_secs()
                    );
                    last_err = Some(GenerationError::Timeout {
                        secs: self.api_timeout.as_secs(),
                    });
                }
            }
        }

        Err(match last_err {
            Some(GenerationError::Failed { detail, .. }) => GenerationError::Failed {
                attempts: self.max_retries + 1,
                detail,
            },
            Some(other) => other,
            None => GenerationError::Failed {
                attempts: self.max_retries + 1,
                detail: "Unknown error".to_string(),
            },
        })
    }
}

impl TextGenerator for LlmGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, GenerationError>> {
        self.generate_with_retries(prompt).boxed()
    }
}

/// Longest single wait between retries.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Exponential backoff before retry `attempt` (1-based), capped at
/// [`MAX_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Build `CompletionOptions` from the relay config.
fn build_options(config: &RelayConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, GenerationError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| GenerationError::NotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name` + optional `config.model`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`GEMINI_API_KEY`**: the relay's home provider.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &RelayConfig) -> Result<Arc<dyn LLMProvider>, GenerationError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let default_model = if name == "gemini" {
            DEFAULT_GEMINI_MODEL
        } else {
            DEFAULT_OPENAI_MODEL
        };
        let model = config.model.as_deref().unwrap_or(default_model);
        return create_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        env_non_empty("EDGEQUAKE_LLM_PROVIDER"),
        env_non_empty("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    if env_non_empty("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| GenerationError::NotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
