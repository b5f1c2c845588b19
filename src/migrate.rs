//! Top-level migration entry points.
//!
//! [`migrate`] reads a document, [`migrate_text`] works on a string already
//! in memory, and [`migrate_to_file`] writes the result back atomically.
//! All of them build one [`Migrator`] per document from the config, so
//! concurrent calls share nothing but the injected collaborators.

use crate::assets::{AssetClient, AssetStore, HttpAssetStore};
use crate::config::{MigrationConfig, VisionBackend};
use crate::error::MigrateError;
use crate::output::{MigrationOutput, MigrationStats, ReferenceOutcome, ReferenceStatus};
use crate::pipeline::context::line_index;
use crate::pipeline::describe::{Describer, DescriberOptions};
use crate::pipeline::rewrite::Migrator;
use crate::pipeline::scan::{scan, ReferenceKind};
use crate::pipeline::vision::{HttpVisionOracle, LlmVisionOracle, VisionOracle};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Migrate the Markdown file at `path`.
///
/// Relative local image paths resolve against the file's directory.
///
/// # Errors
/// Returns `Err(MigrateError)` only for fatal conditions:
/// - input not found / not readable
/// - store not configured
/// - collection lookup or creation failed, or returned a malformed id
///
/// Per-reference failures are reported in [`MigrationOutput::references`].
pub async fn migrate(
    path: impl AsRef<Path>,
    config: &MigrationConfig,
) -> Result<MigrationOutput, MigrateError> {
    let path = path.as_ref();
    info!("Starting migration: {}", path.display());
    let text = read_document(path).await?;
    migrate_text(&text, &document_dir(path), config).await
}

/// Migrate Markdown held in memory. `base_dir` anchors relative local paths.
pub async fn migrate_text(
    text: &str,
    base_dir: &Path,
    config: &MigrationConfig,
) -> Result<MigrationOutput, MigrateError> {
    if config.dry_run {
        info!("Dry run: scanning only");
        let mut output = scan_document(text);
        output.stats.collection_name = config.collection_name.clone();
        return Ok(output);
    }

    let store = resolve_store(config)?;
    let assets = AssetClient::new(store, config.request_timeout_secs)?;

    let mut migrator = Migrator::new(assets, config.collection_name.clone())
        .with_context_max_chars(config.context_max_chars)
        .with_verify_uploads(config.verify_uploads)
        .with_progress(config.progress_callback.clone());
    if let Some(describer) = resolve_describer(config).await? {
        info!("Describing images with the '{}' backend", describer.backend_name());
        migrator = migrator.with_describer(describer);
    }

    migrator.run(text, base_dir).await
}

/// Migrate `input` and write the result to `output` (default: overwrite `input`).
///
/// The file is written to a temporary sibling and renamed into place, so a
/// failed run never leaves a half-written document. A dry run writes nothing.
pub async fn migrate_to_file(
    input: impl AsRef<Path>,
    output: Option<&Path>,
    config: &MigrationConfig,
) -> Result<MigrationStats, MigrateError> {
    let input = input.as_ref();
    let result = migrate(input, config).await?;
    if config.dry_run {
        return Ok(result.stats);
    }

    let target = output.unwrap_or(input).to_path_buf();
    let markdown = result.markdown;
    tokio::task::spawn_blocking({
        let target = target.clone();
        move || write_atomically(&target, &markdown)
    })
    .await
    .map_err(|e| MigrateError::Internal(format!("write task failed: {e}")))??;
    info!("Wrote {}", target.display());

    Ok(result.stats)
}

/// Synchronous wrapper around [`migrate`].
///
/// Creates a temporary tokio runtime internally.
pub fn migrate_sync(
    path: impl AsRef<Path>,
    config: &MigrationConfig,
) -> Result<MigrationOutput, MigrateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MigrateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(migrate(path, config))
}

/// List every reference in `text` without touching the store or a vision backend.
///
/// The document is returned unchanged and every reference is `Skipped`.
pub fn scan_document(text: &str) -> MigrationOutput {
    let mut stats = MigrationStats::default();
    let mut references = Vec::new();
    for kind in ReferenceKind::PHASES {
        for r in scan(text, kind) {
            stats.count_reference(kind);
            references.push(ReferenceOutcome {
                kind,
                locator: r.display_locator(),
                line: line_index(text, r.offset()) + 1,
                status: ReferenceStatus::Skipped,
            });
        }
    }
    MigrationOutput {
        markdown: text.to_string(),
        references,
        stats,
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn read_document(path: &Path) -> Result<String, MigrateError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MigrateError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => MigrateError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => MigrateError::InputReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })
}

fn document_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), MigrateError> {
    let write_failed = |source: std::io::Error| MigrateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = document_dir(path);
    std::fs::create_dir_all(&parent).map_err(write_failed)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_failed)?;
    tmp.write_all(contents.as_bytes()).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

/// The store to upload into: a pre-built one, else the REST store.
fn resolve_store(config: &MigrationConfig) -> Result<Arc<dyn AssetStore>, MigrateError> {
    if let Some(ref store) = config.store {
        return Ok(Arc::clone(store));
    }
    let (Some(url), Some(credentials)) = (config.store_url.as_deref(), config.credentials.clone())
    else {
        return Err(MigrateError::MissingCredentials {
            hint: "Set a store URL (--store-url / MD_ASSETS_STORE_URL) and either an API key \
                   (--api-key / MD_ASSETS_API_KEY) or a username and password."
                .into(),
        });
    };
    let store = HttpAssetStore::new(url, credentials, config.request_timeout_secs).map_err(|e| {
        MigrateError::InvalidConfig(format!("asset store: {e}"))
    })?;
    Ok(Arc::new(store))
}

/// Build the describer when describing is enabled.
///
/// Precedence: pre-built oracle, then the configured backend.
async fn resolve_describer(config: &MigrationConfig) -> Result<Option<Describer>, MigrateError> {
    if !config.describe {
        return Ok(None);
    }

    let oracle: Arc<dyn VisionOracle> = if let Some(ref oracle) = config.oracle {
        Arc::clone(oracle)
    } else {
        match config.vision_backend {
            VisionBackend::Endpoint => {
                let endpoint = config.vision_endpoint.clone().ok_or_else(|| {
                    MigrateError::ProviderNotConfigured {
                        provider: "endpoint".into(),
                        hint: "Set --vision-endpoint / MD_ASSETS_VISION_ENDPOINT.".into(),
                    }
                })?;
                let oracle = HttpVisionOracle::new(
                    endpoint,
                    config.vision_api_key.clone(),
                    config.request_timeout_secs,
                )
                .map_err(|e| MigrateError::ProviderNotConfigured {
                    provider: "endpoint".into(),
                    hint: e.to_string(),
                })?;
                Arc::new(oracle)
            }
            VisionBackend::Llm => {
                let (provider, label) = resolve_provider(config).await?;
                Arc::new(
                    LlmVisionOracle::new(provider, label)
                        .with_sampling(config.temperature, config.max_tokens),
                )
            }
        }
    };

    let options = DescriberOptions {
        instruction: config.instruction.clone(),
        max_alt_len: config.max_alt_len,
        max_dimension: config.oracle_max_dimension,
        jpeg_quality: config.oracle_jpeg_quality,
        max_retries: config.max_retries,
        retry_backoff_ms: config.retry_backoff_ms,
    };
    Ok(Some(Describer::new(oracle, options)))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<(Arc<dyn LLMProvider>, String), MigrateError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        MigrateError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok((provider, format!("{provider_name}/{model}")))
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built `config.provider`
/// 2. `config.provider_name` + `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
async fn resolve_provider(
    config: &MigrationConfig,
) -> Result<(Arc<dyn LLMProvider>, String), MigrateError> {
    if let Some(ref provider) = config.provider {
        return Ok((Arc::clone(provider), "llm".to_string()));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        warn!("LLM provider auto-detection failed: {}", e);
        MigrateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or choose --backend endpoint.\n\
                Error: {}",
                e
            ),
        }
    })?;

    Ok((llm_provider, "llm".to_string()))
}
