//! Vision Extractor: one page image in, one [`TrademarkRecord`] out.
//!
//! The extractor makes exactly one model call per page. There is no retry
//! loop: a failed page is reported and the caller decides when to re-run the
//! job. Quota and rate-limit failures are classified separately so they can
//! be surfaced as retryable.

use crate::config::ScanConfig;
use crate::error::{PageError, ScanError};
use crate::model::TrademarkRecord;
use crate::pipeline::{encode, postprocess};
use crate::prompts::{DEFAULT_EXTRACTION_PROMPT, PAGE_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default vision model when only `GEMINI_API_KEY` is available.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Substrings that mark a provider error as quota / rate limiting.
const QUOTA_MARKERS: &[&str] = &[
    "429",
    "quota",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "resource_exhausted",
    "too many requests",
];

/// Extracts a structured record from a rendered page (PNG bytes).
///
/// An empty brand name in the returned record means "no brand on this page"
/// and is not an error.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, page: usize, png: &[u8]) -> Result<TrademarkRecord, PageError>;
}

/// [`VisionExtractor`] backed by an `edgequake_llm` provider.
pub struct LlmVisionExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmVisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ScanConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl VisionExtractor for LlmVisionExtractor {
    async fn extract(&self, page: usize, png: &[u8]) -> Result<TrademarkRecord, PageError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(PAGE_INSTRUCTION, vec![encode::png_image_data(png)]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| {
                let err = classify_failure(page, e.to_string());
                warn!("Page {}: {}", page, err);
                err
            })?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        postprocess::parse_record(page, &response.content)
    }
}

/// Map a provider error message onto the page error taxonomy.
pub fn classify_failure(page: usize, detail: String) -> PageError {
    let lower = detail.to_lowercase();
    if QUOTA_MARKERS.iter().any(|m| lower.contains(m)) {
        PageError::RateLimited { page, detail }
    } else {
        PageError::ExtractionFailed { page, detail }
    }
}

fn build_options(config: &ScanConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the vision provider, most specific first:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` + `config.model`.
/// 3. `TMSCAN_LLM_PROVIDER` + `TMSCAN_MODEL`, when both are set.
/// 4. `GEMINI_API_KEY` → gemini with [`DEFAULT_GEMINI_MODEL`] unless a model is set.
/// 5. `ProviderFactory::from_env()` auto-detection.
pub fn resolve_provider(config: &ScanConfig) -> Result<Arc<dyn LLMProvider>, ScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        non_empty_env("TMSCAN_LLM_PROVIDER"),
        non_empty_env("TMSCAN_MODEL"),
    ) {
        return create_vision_provider(&prov, &model);
    }

    if non_empty_env("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or TMSCAN_LLM_PROVIDER and TMSCAN_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
