//! The migrator: resolve the collection, then rewrite references phase by phase.
//!
//! ```text
//! Init ──▶ CollectionResolved ──▶ LocalPhase ──▶ RemotePhase ──▶ Base64Phase ──▶ Done
//!   │
//!   └──▶ Aborted   (collection lookup/creation failed or returned a bad id)
//! ```
//!
//! Each phase scans the *current* text once for its reference kind and then
//! handles the matches strictly in document order: load the bytes, describe
//! when the alt text is empty or generic, upload, and splice the new tag
//! into the working string at the match's recorded byte range. Earlier
//! replacements in the same phase shift later ranges by a known delta, so
//! every match, including byte-identical duplicates, is rewritten at its own
//! position.
//!
//! Locators that already point into the store, including those written by
//! an earlier phase of the same run, are left alone.
//!
//! A failed reference is logged, recorded in the output and left untouched;
//! the loop moves on. Only collection resolution can abort the run.

use crate::assets::{AssetClient, Collection, LoadedAsset, UploadResult};
use crate::error::{ItemError, MigrateError};
use crate::output::{MigrationOutput, MigrationStats, ReferenceOutcome, ReferenceStatus};
use crate::pipeline::context::{line_index, ContextExtractor};
use crate::pipeline::describe::{is_generic_alt, Describer};
use crate::pipeline::scan::{scan, ImageReference, ReferenceKind};
use crate::progress::ProgressCallback;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the migrator is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Init,
    CollectionResolved,
    LocalPhase,
    RemotePhase,
    Base64Phase,
    Done,
    Aborted,
}

impl MigrationState {
    /// The state after a successful step. Terminal states stay put.
    pub fn advance(self) -> Self {
        match self {
            MigrationState::Init => MigrationState::CollectionResolved,
            MigrationState::CollectionResolved => MigrationState::LocalPhase,
            MigrationState::LocalPhase => MigrationState::RemotePhase,
            MigrationState::RemotePhase => MigrationState::Base64Phase,
            MigrationState::Base64Phase => MigrationState::Done,
            MigrationState::Done => MigrationState::Done,
            MigrationState::Aborted => MigrationState::Aborted,
        }
    }

    /// The reference kind handled in this state, if it is a phase.
    pub fn phase_kind(self) -> Option<ReferenceKind> {
        match self {
            MigrationState::LocalPhase => Some(ReferenceKind::Local),
            MigrationState::RemotePhase => Some(ReferenceKind::Remote),
            MigrationState::Base64Phase => Some(ReferenceKind::Base64),
            _ => None,
        }
    }
}

/// A successful rewrite of one reference.
struct Rewrite {
    tag: String,
    upload: UploadResult,
    alt_text: String,
    described: bool,
    fallback: bool,
    reused: bool,
}

/// Rewrites one document. Build one per document; it is consumed by [`Migrator::run`].
pub struct Migrator {
    assets: AssetClient,
    describer: Option<Describer>,
    collection_name: String,
    context_max_chars: usize,
    verify_uploads: bool,
    progress: Option<ProgressCallback>,
    state: MigrationState,
    collection: Option<Collection>,
    uploads: HashMap<String, UploadResult>,
    hosted: HashSet<String>,
    stats: MigrationStats,
}

impl Migrator {
    pub fn new(assets: AssetClient, collection_name: impl Into<String>) -> Self {
        let collection_name = collection_name.into();
        Self {
            assets,
            describer: None,
            stats: MigrationStats {
                collection_name: collection_name.clone(),
                ..Default::default()
            },
            collection_name,
            context_max_chars: 300,
            verify_uploads: false,
            progress: None,
            state: MigrationState::Init,
            collection: None,
            uploads: HashMap::new(),
            hosted: HashSet::new(),
        }
    }

    pub fn with_describer(mut self, describer: Describer) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn with_context_max_chars(mut self, n: usize) -> Self {
        self.context_max_chars = n;
        self
    }

    pub fn with_verify_uploads(mut self, v: bool) -> Self {
        self.verify_uploads = v;
        self
    }

    pub fn with_progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Migrate `document`, resolving local paths against `base_dir`.
    pub async fn run(
        mut self,
        document: &str,
        base_dir: &Path,
    ) -> Result<MigrationOutput, MigrateError> {
        let start = Instant::now();

        let collection = match self.collection().await {
            Ok(c) => c,
            Err(e) => {
                self.state = MigrationState::Aborted;
                return Err(e);
            }
        };
        self.state = self.state.advance();
        info!(
            "Migrating into collection '{}' ({})",
            collection.name, collection.id
        );
        self.stats.collection_id = Some(collection.id.to_string());
        if let Some(ref cb) = self.progress {
            cb.on_migration_start(&collection.name);
        }

        let extractor = ContextExtractor::new(document, self.context_max_chars);
        let mut working = document.to_string();
        let mut references = Vec::new();

        self.state = self.state.advance();
        while let Some(kind) = self.state.phase_kind() {
            self.run_phase(kind, &mut working, &extractor, base_dir, &collection, &mut references)
                .await;
            self.state = self.state.advance();
        }

        self.stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Migration complete: {} replaced, {} failed, {} uploads ({} reused), {}ms",
            self.stats.replaced,
            self.stats.failed,
            self.stats.uploads,
            self.stats.reused_uploads,
            self.stats.total_duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_migration_complete(self.stats.replaced, self.stats.failed);
        }

        Ok(MigrationOutput {
            markdown: working,
            references,
            stats: self.stats,
        })
    }

    /// The run's collection, resolved on first use.
    async fn collection(&mut self) -> Result<Collection, MigrateError> {
        if let Some(ref c) = self.collection {
            return Ok(c.clone());
        }
        let c = self.assets.ensure_collection(&self.collection_name).await?;
        self.collection = Some(c.clone());
        Ok(c)
    }

    async fn run_phase(
        &mut self,
        kind: ReferenceKind,
        working: &mut String,
        extractor: &ContextExtractor<'_>,
        base_dir: &Path,
        collection: &Collection,
        references: &mut Vec<ReferenceOutcome>,
    ) {
        // Tags rewritten by an earlier phase now carry hosted URLs and would
        // otherwise be picked up again by the remote phase.
        let matches: Vec<ImageReference> = scan(working, kind)
            .into_iter()
            .filter(|r| {
                let hosted = self.hosted.contains(&r.locator) || self.assets.is_hosted(&r.locator);
                if hosted {
                    debug!("Skipping already-hosted {}", r.display_locator());
                }
                !hosted
            })
            .collect();
        info!("{} phase: {} reference(s)", kind, matches.len());
        if let Some(ref cb) = self.progress {
            cb.on_phase_start(kind, matches.len());
        }

        let total = matches.len();
        let mut delta: isize = 0;

        for (i, reference) in matches.into_iter().enumerate() {
            self.stats.count_reference(kind);
            let start = shift(reference.span.start, delta);
            let end = shift(reference.span.end, delta);
            let line = line_index(working, start);

            debug_assert_eq!(&working[start..end], reference.matched);

            let outcome = self
                .process(&reference, line, extractor, base_dir, collection)
                .await;

            let status = match outcome {
                Ok(rewrite) => {
                    working.replace_range(start..end, &rewrite.tag);
                    self.hosted.insert(rewrite.upload.hosted_url.clone());
                    delta += rewrite.tag.len() as isize - reference.matched.len() as isize;

                    self.stats.replaced += 1;
                    if rewrite.reused {
                        self.stats.reused_uploads += 1;
                    } else {
                        self.stats.uploads += 1;
                    }
                    if rewrite.described {
                        self.stats.described += 1;
                    }
                    if rewrite.fallback {
                        self.stats.fallback_descriptions += 1;
                    }
                    debug!(
                        "{} {}/{}: {} → {}",
                        kind,
                        i + 1,
                        total,
                        reference.display_locator(),
                        rewrite.upload.hosted_url
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_reference_complete(kind, i + 1, total, &rewrite.upload.hosted_url);
                    }
                    ReferenceStatus::Replaced {
                        hosted_url: rewrite.upload.hosted_url,
                        alt_text: rewrite.alt_text,
                        described: rewrite.described,
                        reused: rewrite.reused,
                    }
                }
                Err(error) => {
                    self.stats.failed += 1;
                    warn!(
                        "Leaving {} reference '{}' on line {} unchanged: {}",
                        kind,
                        reference.display_locator(),
                        line + 1,
                        error
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_reference_error(kind, i + 1, total, &error.to_string());
                    }
                    ReferenceStatus::Failed { error }
                }
            };

            references.push(ReferenceOutcome {
                kind,
                locator: reference.display_locator(),
                line: line + 1,
                status,
            });
        }
    }

    async fn process(
        &mut self,
        reference: &ImageReference,
        line: usize,
        extractor: &ContextExtractor<'_>,
        base_dir: &Path,
        collection: &Collection,
    ) -> Result<Rewrite, ItemError> {
        let key = upload_key(reference, base_dir).await;
        let wants_description = self.describer.is_some() && is_generic_alt(&reference.alt_text);
        let cached = self.uploads.get(&key).cloned();

        let asset = if cached.is_none() || wants_description {
            Some(self.load(reference, base_dir).await?)
        } else {
            None
        };

        let mut alt_text = reference.alt_text.clone();
        let mut described = false;
        let mut fallback = false;
        if let (Some(describer), Some(asset)) = (self.describer.as_ref(), asset.as_ref()) {
            if wants_description {
                // Line structure is preserved by every rewrite, so the
                // original document's line `line` is this reference's line.
                let context = extractor.extract_line(line);
                let description = describer.describe(&asset.bytes, &context).await;
                alt_text = description.text;
                fallback = description.fallback;
                described = true;
            }
        }

        let (upload, reused) = match cached {
            Some(hit) => (hit, true),
            None => {
                let asset = match asset {
                    Some(a) => a,
                    None => self.load(reference, base_dir).await?,
                };
                let upload = self.assets.upload_bytes(&asset, collection).await?;
                if self.verify_uploads {
                    self.verify(&asset, &upload, collection).await?;
                }
                self.uploads.insert(key, upload.clone());
                (upload, false)
            }
        };

        Ok(Rewrite {
            tag: reference.render(&alt_text, &upload.hosted_url),
            upload,
            alt_text,
            described,
            fallback,
            reused,
        })
    }

    async fn load(
        &self,
        reference: &ImageReference,
        base_dir: &Path,
    ) -> Result<LoadedAsset, ItemError> {
        match reference.kind {
            ReferenceKind::Local => self.assets.load_local(&reference.locator, base_dir).await,
            ReferenceKind::Remote => self.assets.load_remote(&reference.locator).await,
            ReferenceKind::Base64 => self.assets.load_base64(&reference.locator),
        }
    }

    async fn verify(
        &self,
        asset: &LoadedAsset,
        upload: &UploadResult,
        collection: &Collection,
    ) -> Result<(), ItemError> {
        let stored = self.assets.fetch_asset(collection, &upload.asset_id).await?;
        if stored.len() != asset.bytes.len() {
            return Err(ItemError::VerificationFailed {
                asset_id: upload.asset_id.clone(),
                detail: format!(
                    "stored {} bytes, uploaded {}",
                    stored.len(),
                    asset.bytes.len()
                ),
            });
        }
        Ok(())
    }
}

fn shift(pos: usize, delta: isize) -> usize {
    (pos as isize + delta) as usize
}

/// Cache key identifying the same image within one run.
async fn upload_key(reference: &ImageReference, base_dir: &Path) -> String {
    match reference.kind {
        ReferenceKind::Local => {
            let path = AssetClient::resolve_local_path(&reference.locator, base_dir);
            let path: PathBuf = tokio::fs::canonicalize(&path).await.unwrap_or(path);
            format!("local:{}", path.display())
        }
        ReferenceKind::Remote => format!("remote:{}", reference.locator),
        ReferenceKind::Base64 => format!("base64:{}", reference.locator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_walks_all_phases() {
        let mut s = MigrationState::Init;
        let mut seen = vec![s];
        while s != MigrationState::Done {
            s = s.advance();
            seen.push(s);
        }
        assert_eq!(
            seen,
            vec![
                MigrationState::Init,
                MigrationState::CollectionResolved,
                MigrationState::LocalPhase,
                MigrationState::RemotePhase,
                MigrationState::Base64Phase,
                MigrationState::Done,
            ]
        );
        assert_eq!(MigrationState::Aborted.advance(), MigrationState::Aborted);
    }

    #[test]
    fn phase_kinds_follow_scan_order() {
        let kinds: Vec<_> = [
            MigrationState::LocalPhase,
            MigrationState::RemotePhase,
            MigrationState::Base64Phase,
        ]
        .iter()
        .filter_map(|s| s.phase_kind())
        .collect();
        assert_eq!(kinds, ReferenceKind::PHASES.to_vec());
        assert_eq!(MigrationState::Done.phase_kind(), None);
    }

    #[test]
    fn shift_applies_signed_delta() {
        assert_eq!(shift(10, 5), 15);
        assert_eq!(shift(10, -4), 6);
    }

    #[tokio::test]
    async fn upload_keys_distinguish_kinds() {
        let refs = crate::pipeline::scan::scan_all(
            "![](https://x/a.png) ![](https://x/a.png) ![](./nowhere/a.png)",
        );
        let base = Path::new("/tmp");
        assert_eq!(
            upload_key(&refs[0], base).await,
            upload_key(&refs[1], base).await
        );
        assert!(upload_key(&refs[2], base).await.starts_with("local:"));
    }

    #[tokio::test]
    async fn local_keys_resolve_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/a.png"), b"x").unwrap();
        let refs = crate::pipeline::scan::scan_all("![](img/a.png) ![](./img/../img/a.png)");
        assert_eq!(
            upload_key(&refs[0], dir.path()).await,
            upload_key(&refs[1], dir.path()).await
        );
    }
}
