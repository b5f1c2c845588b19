//! Result types returned by a migration.

use crate::error::ItemError;
use crate::pipeline::scan::ReferenceKind;
use serde::{Deserialize, Serialize};

/// The rewritten document plus a record of every reference it contained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOutput {
    /// The final Markdown. Failed references are byte-identical to the input.
    pub markdown: String,
    /// One entry per reference, in phase order (local, remote, base64).
    pub references: Vec<ReferenceOutcome>,
    pub stats: MigrationStats,
}

/// What happened to one image reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceOutcome {
    pub kind: ReferenceKind,
    /// Locator as written in the document (data URIs truncated).
    pub locator: String,
    /// 1-indexed line of the reference.
    pub line: usize,
    pub status: ReferenceStatus,
}

impl ReferenceOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self.status, ReferenceStatus::Replaced { .. })
    }
}

/// Outcome of one reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferenceStatus {
    /// The locator now points at the store.
    Replaced {
        hosted_url: String,
        alt_text: String,
        /// Alt text was written by the vision backend (or its fallback).
        described: bool,
        /// The upload was reused from an earlier identical reference.
        reused: bool,
    },
    /// The reference was left untouched.
    Failed { error: ItemError },
    /// Dry run: found but not processed.
    Skipped,
}

/// Aggregate counters for one migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationStats {
    pub collection_id: Option<String>,
    pub collection_name: String,
    pub local_references: usize,
    pub remote_references: usize,
    pub base64_references: usize,
    pub replaced: usize,
    pub failed: usize,
    /// Distinct uploads performed.
    pub uploads: usize,
    /// References served from an earlier upload in the same run.
    pub reused_uploads: usize,
    pub described: usize,
    /// Descriptions that fell back to the literal placeholder.
    pub fallback_descriptions: usize,
    pub total_duration_ms: u64,
}

impl MigrationStats {
    pub fn total_references(&self) -> usize {
        self.local_references + self.remote_references + self.base64_references
    }

    pub(crate) fn count_reference(&mut self, kind: ReferenceKind) {
        match kind {
            ReferenceKind::Local => self.local_references += 1,
            ReferenceKind::Remote => self.remote_references += 1,
            ReferenceKind::Base64 => self.base64_references += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_by_kind() {
        let mut s = MigrationStats::default();
        s.count_reference(ReferenceKind::Local);
        s.count_reference(ReferenceKind::Local);
        s.count_reference(ReferenceKind::Base64);
        assert_eq!(s.local_references, 2);
        assert_eq!(s.total_references(), 3);
    }

    #[test]
    fn status_serialises_with_tag() {
        let outcome = ReferenceOutcome {
            kind: ReferenceKind::Remote,
            locator: "https://x/y.jpg".into(),
            line: 2,
            status: ReferenceStatus::Failed {
                error: ItemError::FetchFailed {
                    url: "https://x/y.jpg".into(),
                    detail: "HTTP 404".into(),
                },
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "remote");
        assert_eq!(json["status"]["status"], "failed");
        assert!(!outcome.is_replaced());
    }
}
