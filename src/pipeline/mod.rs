//! Pipeline stages for migrating image references.
//!
//! Each submodule implements one step and is testable on its own; the
//! [`rewrite`] module drives them.
//!
//! ## Data Flow
//!
//! ```text
//! markdown ──▶ scan ──▶ load ──▶ (context + encode + vision) ──▶ upload ──▶ rewrite
//!              (regex)  (assets)        only for empty/generic alt      (store)   (splice)
//! ```
//!
//! 1. [`scan`]     — find `![alt](locator "title")` tags and classify the locator
//! 2. [`context`]  — nearest meaningful text before and after a reference
//! 3. [`encode`]   — downscale and JPEG-encode bytes for the vision request
//! 4. [`vision`]   — the [`vision::VisionOracle`] trait and its two backends
//! 5. [`describe`] — retry/backoff around the oracle plus alt-text sanitising
//! 6. [`rewrite`]  — the phase-ordered state machine that ties it together

pub mod context;
pub mod describe;
pub mod encode;
pub mod rewrite;
pub mod scan;
pub mod vision;
