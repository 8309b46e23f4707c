//! Configuration for scan runs and matching.
//!
//! Every knob lives in [`ScanConfig`], built through [`ScanConfigBuilder`].
//! The builder clamps what can be clamped and rejects what cannot
//! (zero batch size, threshold above 100).

use crate::error::ScanError;
use crate::matching::DEFAULT_THRESHOLD;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default number of pages per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Configuration for a scan run.
///
/// # Example
/// ```rust
/// use trademark_scan::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .batch_size(5)
///     .dpi(200)
///     .model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size, 5);
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Pages per batch. Batches run one after another; the pages inside a
    /// batch run concurrently. Default: 10.
    pub batch_size: usize,

    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on the longest rendered edge, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Vision model identifier, e.g. "gemini-2.5-flash".
    pub model: Option<String>,

    /// Provider name understood by `edgequake_llm::ProviderFactory`.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0, extraction wants determinism.
    pub temperature: f32,

    /// Maximum tokens per page answer. Default: 2048.
    pub max_tokens: usize,

    /// Custom extraction prompt. If None, uses [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub system_prompt: Option<String>,

    /// Per-page timeout covering render, extract, crop and persist.
    /// `0` disables it. Default: 120.
    pub page_timeout_secs: u64,

    /// Timeout for fetching the source PDF. `0` disables it. Default: 120.
    pub download_timeout_secs: u64,

    /// Minimum fuzzy similarity for a match. Range 0–100. Default: 70.
    pub match_threshold: u8,

    /// Where cropped logos are written. No cropping when `None`.
    pub logo_dir: Option<PathBuf>,

    /// Parent directory for per-run temp dirs. System temp when `None`.
    pub work_dir: Option<PathBuf>,

    /// Capacity of the best-effort progress queue. Default: 64.
    pub progress_queue: usize,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dpi: 150,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            system_prompt: None,
            page_timeout_secs: 120,
            download_timeout_secs: 120,
            match_threshold: DEFAULT_THRESHOLD,
            logo_dir: None,
            work_dir: None,
            progress_queue: 64,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("batch_size", &self.batch_size)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("match_threshold", &self.match_threshold)
            .field("logo_dir", &self.logo_dir)
            .field("work_dir", &self.work_dir)
            .field("progress_queue", &self.progress_queue)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl ScanConfig {
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn match_threshold(mut self, threshold: u8) -> Self {
        self.config.match_threshold = threshold;
        self
    }

    pub fn logo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.logo_dir = Some(dir.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn progress_queue(mut self, capacity: usize) -> Self {
        self.config.progress_queue = capacity.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(ScanError::InvalidConfig("Batch size must be ≥ 1".into()));
        }
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ScanError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.match_threshold > 100 {
            return Err(ScanError::InvalidConfig(format!(
                "Match threshold must be 0–100, got {}",
                c.match_threshold
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ScanConfig::default();
        assert_eq!(c.batch_size, 10);
        assert_eq!(c.dpi, 150);
        assert_eq!(c.match_threshold, 70);
        assert_eq!(c.page_timeout_secs, 120);
        assert_eq!(c.temperature, 0.0);
        assert!(c.logo_dir.is_none());
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ScanConfig::builder().dpi(1000).build().unwrap();
        assert_eq!(c.dpi, 400);
        let c = ScanConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = ScanConfig::builder().batch_size(0).build().unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn threshold_above_100_rejected() {
        let err = ScanConfig::builder().match_threshold(101).build().unwrap_err();
        assert!(err.to_string().contains("101"));
        assert!(ScanConfig::builder().match_threshold(100).build().is_ok());
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", ScanConfig::default());
        assert!(dbg.contains("batch_size: 10"));
    }
}
