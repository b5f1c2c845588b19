//! Configuration types for Markdown asset migration.
//!
//! All migration behaviour is controlled through [`MigrationConfig`], built
//! via its [`MigrationConfigBuilder`]. One struct for every knob keeps runs
//! reproducible: two migrations with equal configs make the same requests.

use crate::assets::AssetStore;
use crate::error::MigrateError;
use crate::pipeline::vision::VisionOracle;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default destination collection name.
pub const DEFAULT_COLLECTION: &str = "markdown-images";

/// Configuration for one Markdown asset migration.
///
/// Built via [`MigrationConfig::builder()`] or using
/// [`MigrationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md_assets::{MigrationConfig, StoreCredentials};
///
/// let config = MigrationConfig::builder()
///     .store_url("https://assets.example.com")
///     .credentials(StoreCredentials::Token("secret".into()))
///     .collection_name("handbook")
///     .describe(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct MigrationConfig {
    /// Name of the destination collection. Created if absent. Default: `markdown-images`.
    pub collection_name: String,

    /// Base URL of the asset store REST API.
    pub store_url: Option<String>,

    /// Credentials sent with every store request.
    pub credentials: Option<StoreCredentials>,

    /// Pre-constructed store. Takes precedence over `store_url`/`credentials`.
    pub store: Option<Arc<dyn AssetStore>>,

    /// Generate alt text for images whose alt text is empty or generic. Default: false.
    pub describe: bool,

    /// Which vision backend writes the alt text. Default: [`VisionBackend::Llm`].
    pub vision_backend: VisionBackend,

    /// LLM provider name for the `Llm` backend (e.g. "openai", "gemini").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed vision backend. Takes precedence over everything above.
    pub oracle: Option<Arc<dyn VisionOracle>>,

    /// URL of the `generate` route for the `Endpoint` backend.
    pub vision_endpoint: Option<String>,

    /// Bearer token for the `Endpoint` backend.
    pub vision_api_key: Option<String>,

    /// Custom alt-text instruction. If None, uses the built-in prompt.
    pub instruction: Option<String>,

    /// Sampling temperature for LLM descriptions. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per description. Default: 120.
    pub max_tokens: usize,

    /// Maximum alt-text length in characters. Default: 100.
    pub max_alt_len: usize,

    /// Longest edge of the image sent to the vision backend. Default: 800.
    pub oracle_max_dimension: u32,

    /// JPEG quality of the image sent to the vision backend. Default: 75.
    pub oracle_jpeg_quality: u8,

    /// Maximum characters of before/after context per side. Default: 300.
    pub context_max_chars: usize,

    /// Retries per description on backend failure. Default: 2, at most 10.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Timeout for every HTTP request (store, remote images, vision). Default: 30.
    pub request_timeout_secs: u64,

    /// Read each upload back from the store and compare sizes. Default: false.
    pub verify_uploads: bool,

    /// Scan and report only; contact neither store nor vision backend. Default: false.
    pub dry_run: bool,

    /// Receives per-phase and per-reference events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION.to_string(),
            store_url: None,
            credentials: None,
            store: None,
            describe: false,
            vision_backend: VisionBackend::default(),
            provider_name: None,
            model: None,
            provider: None,
            oracle: None,
            vision_endpoint: None,
            vision_api_key: None,
            instruction: None,
            temperature: 0.2,
            max_tokens: 120,
            max_alt_len: 100,
            oracle_max_dimension: 800,
            oracle_jpeg_quality: 75,
            context_max_chars: 300,
            max_retries: 2,
            retry_backoff_ms: 500,
            request_timeout_secs: 30,
            verify_uploads: false,
            dry_run: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("collection_name", &self.collection_name)
            .field("store_url", &self.store_url)
            .field("credentials", &self.credentials)
            .field("store", &self.store.as_ref().map(|_| "<dyn AssetStore>"))
            .field("describe", &self.describe)
            .field("vision_backend", &self.vision_backend)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("oracle", &self.oracle.as_ref().map(|_| "<dyn VisionOracle>"))
            .field("vision_endpoint", &self.vision_endpoint)
            .field("max_alt_len", &self.max_alt_len)
            .field("oracle_max_dimension", &self.oracle_max_dimension)
            .field("oracle_jpeg_quality", &self.oracle_jpeg_quality)
            .field("max_retries", &self.max_retries)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("verify_uploads", &self.verify_uploads)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl MigrationConfig {
    /// Create a new builder for `MigrationConfig`.
    pub fn builder() -> MigrationConfigBuilder {
        MigrationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`MigrationConfig`].
#[derive(Debug)]
pub struct MigrationConfigBuilder {
    config: MigrationConfig,
}

impl MigrationConfigBuilder {
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.config.store_url = Some(url.into());
        self
    }

    pub fn credentials(mut self, credentials: StoreCredentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.config.store = Some(store);
        self
    }

    pub fn describe(mut self, v: bool) -> Self {
        self.config.describe = v;
        self
    }

    pub fn vision_backend(mut self, backend: VisionBackend) -> Self {
        self.config.vision_backend = backend;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn VisionOracle>) -> Self {
        self.config.oracle = Some(oracle);
        self
    }

    pub fn vision_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.vision_endpoint = Some(url.into());
        self
    }

    pub fn vision_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.vision_api_key = Some(key.into());
        self
    }

    pub fn instruction(mut self, prompt: impl Into<String>) -> Self {
        self.config.instruction = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(16);
        self
    }

    pub fn max_alt_len(mut self, n: usize) -> Self {
        self.config.max_alt_len = n.max(16);
        self
    }

    pub fn oracle_max_dimension(mut self, px: u32) -> Self {
        self.config.oracle_max_dimension = px.max(64);
        self
    }

    pub fn oracle_jpeg_quality(mut self, q: u8) -> Self {
        self.config.oracle_jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn context_max_chars(mut self, n: usize) -> Self {
        self.config.context_max_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn verify_uploads(mut self, v: bool) -> Self {
        self.config.verify_uploads = v;
        self
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.config.dry_run = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MigrationConfig, MigrateError> {
        let c = &self.config;
        if c.collection_name.trim().is_empty() {
            return Err(MigrateError::InvalidConfig(
                "Collection name must not be empty".into(),
            ));
        }
        if c.describe
            && c.oracle.is_none()
            && c.vision_backend == VisionBackend::Endpoint
            && c.vision_endpoint.is_none()
        {
            return Err(MigrateError::InvalidConfig(
                "The endpoint vision backend needs a vision endpoint URL".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which vision backend produces alt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionBackend {
    /// An `edgequake-llm` chat provider (OpenAI, Anthropic, Gemini, Ollama, …). (default)
    #[default]
    Llm,
    /// A self-hosted JSON `generate` endpoint.
    Endpoint,
}

/// Credentials for the asset store.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreCredentials {
    /// `Authorization: Bearer <token>`.
    Token(String),
    /// HTTP basic auth.
    Basic { username: String, password: String },
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreCredentials::Token(_) => f.write_str("Token(<redacted>)"),
            StoreCredentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = MigrationConfig::default();
        assert_eq!(c.collection_name, "markdown-images");
        assert!(!c.describe);
        assert_eq!(c.max_alt_len, 100);
        assert_eq!(c.oracle_max_dimension, 800);
        assert_eq!(c.request_timeout_secs, 30);
        assert_eq!(c.vision_backend, VisionBackend::Llm);
    }

    #[test]
    fn builder_clamps() {
        let c = MigrationConfig::builder()
            .oracle_jpeg_quality(0)
            .oracle_max_dimension(10)
            .request_timeout_secs(0)
            .temperature(9.0)
            .max_retries(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(c.oracle_jpeg_quality, 1);
        assert_eq!(c.oracle_max_dimension, 64);
        assert_eq!(c.request_timeout_secs, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_retries, 10);
    }

    #[test]
    fn empty_collection_rejected() {
        let err = MigrationConfig::builder()
            .collection_name("  ")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Collection name"));
    }

    #[test]
    fn endpoint_backend_needs_url() {
        let err = MigrationConfig::builder()
            .describe(true)
            .vision_backend(VisionBackend::Endpoint)
            .build();
        assert!(err.is_err());

        let ok = MigrationConfig::builder()
            .describe(true)
            .vision_backend(VisionBackend::Endpoint)
            .vision_endpoint("http://localhost:8000/generate")
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = MigrationConfig::builder()
            .credentials(StoreCredentials::Basic {
                username: "alice".into(),
                password: "hunter2".into(),
            })
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));

        let t = format!("{:?}", StoreCredentials::Token("sk-123".into()));
        assert!(!t.contains("sk-123"));
    }
}
