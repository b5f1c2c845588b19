//! Progress-callback trait for per-reference migration events.
//!
//! Inject an [`Arc<dyn MigrationProgressCallback>`] via
//! [`crate::config::MigrationConfigBuilder::progress_callback`] to receive
//! events as the migrator walks its phases. Callers can forward them to a
//! progress bar, a log, or a channel without the library knowing how.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md_assets::{MigrationConfig, MigrationProgressCallback, ReferenceKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl MigrationProgressCallback for Counter {
//!     fn on_reference_complete(&self, _kind: ReferenceKind, _index: usize, _total: usize, url: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("uploaded → {url}");
//!     }
//! }
//!
//! let config = MigrationConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::scan::ReferenceKind;
use std::sync::Arc;

/// Called by the migrator as it processes a document.
///
/// References are processed one at a time, so calls never overlap for one
/// document; the trait is still `Send + Sync` so one callback can serve
/// several documents migrated on different tasks. All methods default to
/// no-ops.
pub trait MigrationProgressCallback: Send + Sync {
    /// Called once the destination collection is resolved.
    fn on_migration_start(&self, collection_name: &str) {
        let _ = collection_name;
    }

    /// Called at the start of each phase with the number of references found.
    fn on_phase_start(&self, kind: ReferenceKind, total: usize) {
        let _ = (kind, total);
    }

    /// Called when a reference has been rewritten.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position within the phase
    /// * `hosted_url` — the URL now in the document
    fn on_reference_complete(&self, kind: ReferenceKind, index: usize, total: usize, hosted_url: &str) {
        let _ = (kind, index, total, hosted_url);
    }

    /// Called when a reference was left unchanged because of an error.
    fn on_reference_error(&self, kind: ReferenceKind, index: usize, total: usize, error: &str) {
        let _ = (kind, index, total, error);
    }

    /// Called once after the last phase.
    fn on_migration_complete(&self, replaced: usize, failed: usize) {
        let _ = (replaced, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl MigrationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MigrationConfig`].
pub type ProgressCallback = Arc<dyn MigrationProgressCallback>;
