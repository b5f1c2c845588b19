//! Error types for the edgequake-md-assets library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MigrateError`] — **Fatal**: the migration cannot proceed at all
//!   (unreadable input document, missing store credentials, the destination
//!   collection cannot be resolved). Returned as `Err(MigrateError)` from the
//!   top-level `migrate*` functions before any reference is rewritten.
//!
//! * [`ItemError`] — **Non-fatal**: a single image reference failed (missing
//!   file, unreachable URL, malformed data URI, rejected upload). Stored
//!   inside [`crate::output::ReferenceOutcome`]; the reference's text is left
//!   untouched and every other reference is still processed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md-assets library.
///
/// Reference-level failures use [`ItemError`] and are stored in
/// [`crate::output::ReferenceOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum MigrateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input document was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The document exists but could not be read as UTF-8 text.
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Asset store errors ────────────────────────────────────────────────
    /// No store URL or credentials were configured.
    #[error("Asset store is not configured.\n{hint}")]
    MissingCredentials { hint: String },

    /// The destination collection could not be looked up or created.
    #[error("Collection '{name}' could not be resolved: {detail}")]
    CollectionUnavailable { name: String, detail: String },

    /// The store returned a collection identifier that is not a UUIDv4.
    #[error("Asset store returned a malformed collection id '{id}' (expected a UUIDv4)")]
    InvalidCollectionId { id: String },

    // ── Vision errors ─────────────────────────────────────────────────────
    /// Alt-text generation was requested but no vision backend could be built.
    #[error("Vision backend '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image reference.
///
/// The span of the failed reference is left byte-identical in the output.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// A local image path does not exist.
    #[error("local image not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// A local image exists but could not be read.
    #[error("failed to read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// A remote image could not be downloaded.
    #[error("failed to fetch '{url}': {detail}")]
    FetchFailed { url: String, detail: String },

    /// An inline `data:` URI did not have the `data:<mime>;base64,<payload>` shape.
    #[error("malformed data URI: {detail}")]
    MalformedDataUri { detail: String },

    /// The asset store refused or failed the upload.
    #[error("upload of '{filename}' rejected: {detail}")]
    UploadRejected { filename: String, detail: String },

    /// The uploaded asset could not be read back intact.
    #[error("verification of asset '{asset_id}' failed: {detail}")]
    VerificationFailed { asset_id: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_collection_id_display() {
        let e = MigrateError::InvalidCollectionId {
            id: "not-a-uuid".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("not-a-uuid"), "got: {msg}");
        assert!(msg.contains("UUIDv4"));
    }

    #[test]
    fn collection_unavailable_display() {
        let e = MigrateError::CollectionUnavailable {
            name: "docs".into(),
            detail: "HTTP 500".into(),
        };
        assert!(e.to_string().contains("'docs'"));
        assert!(e.to_string().contains("HTTP 500"));
    }

    #[test]
    fn item_error_display() {
        let e = ItemError::FileNotFound {
            path: PathBuf::from("img/missing.png"),
        };
        assert!(e.to_string().contains("img/missing.png"));

        let e = ItemError::UploadRejected {
            filename: "a.png".into(),
            detail: "HTTP 413".into(),
        };
        assert!(e.to_string().contains("a.png"));
        assert!(e.to_string().contains("413"));
    }

    #[test]
    fn item_error_serialises() {
        let e = ItemError::MalformedDataUri {
            detail: "missing ','".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("MalformedDataUri"));
        let back: ItemError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
