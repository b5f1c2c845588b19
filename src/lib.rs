//! # edgequake-md-assets
//!
//! Move the images of a Markdown document into a hosted asset store and
//! rewrite the document to point at them.
//!
//! ## Why this crate?
//!
//! Markdown written on a laptop references images three ways: relative file
//! paths, hot-linked URLs and inline `data:image/…;base64,…` blobs. None of
//! them survive publishing well. This crate finds every inline image tag,
//! uploads the bytes into one named collection, and swaps each locator for
//! the URL the store hands back. Images with missing or placeholder alt text
//! can be described by a vision model along the way.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Collection  find or create the destination collection (fatal on failure)
//!  ├─ 2. Local       ![..](./fig.png)             read → describe? → upload → rewrite
//!  ├─ 3. Remote      ![..](https://…/fig.png)     fetch → describe? → upload → rewrite
//!  ├─ 4. Base64      ![..](data:image/png;base64,…) decode → describe? → upload → rewrite
//!  └─ 5. Output      rewritten Markdown + per-reference outcomes + stats
//! ```
//!
//! A reference that fails (missing file, 404, malformed payload, rejected
//! upload) is logged and left exactly as it was; the rest of the document is
//! still migrated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md_assets::{migrate_to_file, MigrationConfig, StoreCredentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrationConfig::builder()
//!         .store_url("https://assets.example.com")
//!         .credentials(StoreCredentials::Token(std::env::var("MD_ASSETS_API_KEY")?))
//!         .describe(true) // provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!         .build()?;
//!     let stats = migrate_to_file("README.md", None, &config).await?;
//!     eprintln!("{} replaced, {} failed", stats.replaced, stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md-assets` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-md-assets = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assets;
pub mod config;
pub mod error;
pub mod migrate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assets::{
    AssetClient, AssetStore, Collection, CollectionRecord, HttpAssetStore, LoadedAsset,
    StoreError, UploadResult,
};
pub use config::{MigrationConfig, MigrationConfigBuilder, StoreCredentials, VisionBackend};
pub use error::{ItemError, MigrateError};
pub use migrate::{migrate, migrate_sync, migrate_text, migrate_to_file, scan_document};
pub use output::{MigrationOutput, MigrationStats, ReferenceOutcome, ReferenceStatus};
pub use pipeline::context::Context;
pub use pipeline::rewrite::{MigrationState, Migrator};
pub use pipeline::scan::{ImageReference, ReferenceKind};
pub use pipeline::vision::{HttpVisionOracle, LlmVisionOracle, OracleError, VisionOracle};
pub use progress::{MigrationProgressCallback, NoopProgressCallback, ProgressCallback};
