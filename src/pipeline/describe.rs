//! Alt-text generation for images that have none.
//!
//! A reference is described only when its alt text is empty or one of a few
//! placeholder words ([`is_generic_alt`]). The image is size-bounded by
//! [`crate::pipeline::encode::prepare_for_oracle`] before any backend sees it.
//!
//! [`Describer::describe`] never fails: if the image cannot be decoded, the
//! backend errors on every attempt, or the answer sanitises to nothing, the
//! literal [`FALLBACK_ALT_TEXT`] is returned instead, so one bad description
//! never costs the document its migration.
//!
//! ## Retry Strategy
//!
//! Same exponential backoff as any VLM call under load:
//! `retry_backoff_ms * 2^(attempt-1)`, i.e. 500 ms → 1 s with the defaults.

use crate::pipeline::context::Context;
use crate::pipeline::encode::prepare_for_oracle;
use crate::pipeline::vision::VisionOracle;
use crate::prompts::{DEFAULT_ALT_TEXT_INSTRUCTION, FALLBACK_ALT_TEXT};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Placeholder alt texts treated as "no alt text", compared case-insensitively.
pub const GENERIC_ALT_TEXTS: &[&str] = &[
    "image",
    "img",
    "picture",
    "pic",
    "photo",
    "imagen",
    "imagem",
    "immagine",
    "bild",
    "afbeelding",
    "obraz",
    "изображение",
    "картинка",
    "图片",
    "画像",
    "이미지",
];

/// `true` when `alt` is empty or a generic placeholder.
pub fn is_generic_alt(alt: &str) -> bool {
    let alt = alt.trim().to_lowercase();
    alt.is_empty() || GENERIC_ALT_TEXTS.contains(&alt.as_str())
}

/// A produced alt text and whether it came from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub text: String,
    pub fallback: bool,
}

impl Description {
    fn fallback() -> Self {
        Self {
            text: FALLBACK_ALT_TEXT.to_string(),
            fallback: true,
        }
    }
}

/// Tuning for a [`Describer`].
#[derive(Debug, Clone)]
pub struct DescriberOptions {
    pub instruction: Option<String>,
    pub max_alt_len: usize,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for DescriberOptions {
    fn default() -> Self {
        Self {
            instruction: None,
            max_alt_len: 100,
            max_dimension: 800,
            jpeg_quality: 75,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Turns image bytes plus context into a short description.
pub struct Describer {
    oracle: Arc<dyn VisionOracle>,
    options: DescriberOptions,
}

impl Describer {
    pub fn new(oracle: Arc<dyn VisionOracle>, options: DescriberOptions) -> Self {
        Self { oracle, options }
    }

    pub fn backend_name(&self) -> &str {
        self.oracle.name()
    }

    /// Describe `bytes`, falling back to [`FALLBACK_ALT_TEXT`] on any failure.
    pub async fn describe(&self, bytes: &[u8], context: &Context) -> Description {
        let image = match prepare_for_oracle(
            bytes,
            self.options.max_dimension,
            self.options.jpeg_quality,
        ) {
            Ok(img) => img,
            Err(e) => {
                warn!("Cannot prepare image for {}: {}", self.oracle.name(), e);
                return Description::fallback();
            }
        };

        let instruction = self
            .options
            .instruction
            .as_deref()
            .unwrap_or(DEFAULT_ALT_TEXT_INSTRUCTION);

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                let backoff = self
                    .options
                    .retry_backoff_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1));
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.oracle.name(),
                    attempt,
                    self.options.max_retries,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.oracle.generate(&image, instruction, context).await {
                Ok(raw) => {
                    return match sanitize_description(&raw, self.options.max_alt_len) {
                        Some(text) => {
                            debug!("{}: described as {:?}", self.oracle.name(), text);
                            Description {
                                text,
                                fallback: false,
                            }
                        }
                        None => {
                            warn!("{}: description was empty after cleanup", self.oracle.name());
                            Description::fallback()
                        }
                    };
                }
                Err(e) => {
                    warn!(
                        "{}: attempt {} failed — {}",
                        self.oracle.name(),
                        attempt + 1,
                        e
                    );
                }
            }
        }

        Description::fallback()
    }
}

/// Reduce a raw model answer to a single-line alt text of at most `max_len` chars.
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_description(raw: &str, max_len: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;

    let mut text = line;
    for prefix in ["alt text:", "alt-text:", "alt:", "description:"] {
        if let Some(head) = text.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                text = text[prefix.len()..].trim_start();
            }
        }
    }
    let text = text.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '*'));

    let text: String = text
        .replace(['[', ']'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    // A trailing `\` would escape the closing `]` of the rewritten tag.
    let text = truncate_at_word(&text, max_len);
    let text = text
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '…' | '\\')
        })
        .to_string();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn truncate_at_word(text: &str, max_len: usize) -> &str {
    if text.chars().count() <= max_len {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(max_len)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];
    match head.rfind(' ') {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::vision::OracleError;
    use async_trait::async_trait;
    use edgequake_llm::ImageData;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedOracle {
        answer: Result<String, OracleError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            image: &ImageData,
            _instruction: &str,
            _context: &Context,
        ) -> Result<String, OracleError> {
            assert_eq!(image.mime_type, "image/jpeg");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn describer(answer: Result<String, OracleError>) -> (Describer, Arc<ScriptedOracle>) {
        let oracle = Arc::new(ScriptedOracle {
            answer,
            calls: AtomicUsize::new(0),
        });
        let options = DescriberOptions {
            retry_backoff_ms: 1,
            ..Default::default()
        };
        (Describer::new(oracle.clone(), options), oracle)
    }

    #[test]
    fn generic_alt_detection() {
        assert!(is_generic_alt(""));
        assert!(is_generic_alt("   "));
        assert!(is_generic_alt("Image"));
        assert!(is_generic_alt("IMG"));
        assert!(is_generic_alt("picture"));
        assert!(is_generic_alt("Bild"));
        assert!(is_generic_alt("Imagen"));
        assert!(!is_generic_alt("remote"));
        assert!(!is_generic_alt("image of a cat"));
    }

    #[test]
    fn sanitize_strips_noise() {
        assert_eq!(
            sanitize_description("Alt text: \"A red fox in snow.\"\n\nExtra", 100).as_deref(),
            Some("A red fox in snow")
        );
        assert_eq!(
            sanitize_description("  [Bar chart]   of  sales!  ", 100).as_deref(),
            Some("Bar chart of sales")
        );
        assert_eq!(sanitize_description("\n  \n", 100), None);
        assert_eq!(sanitize_description("...", 100), None);
    }

    #[test]
    fn sanitize_truncates_at_word_boundary() {
        let raw = "word ".repeat(40);
        let out = sanitize_description(&raw, 100).unwrap();
        assert!(out.chars().count() <= 100);
        assert!(out.ends_with("word"));
    }

    #[tokio::test]
    async fn describe_returns_sanitised_answer() {
        let (d, oracle) = describer(Ok("A blue square.".into()));
        let out = d.describe(&png(), &Context::default()).await;
        assert_eq!(
            out,
            Description {
                text: "A blue square".into(),
                fallback: false
            }
        );
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn describe_falls_back_after_retries() {
        let (d, oracle) = describer(Err(OracleError::Status {
            status: 429,
            body: "quota".into(),
        }));
        let out = d.describe(&png(), &Context::default()).await;
        assert_eq!(out.text, FALLBACK_ALT_TEXT);
        assert!(out.fallback);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn sanitize_drops_trailing_backslash() {
        assert_eq!(
            sanitize_description("Path C:\\temp\\", 100).as_deref(),
            Some("Path C:\\temp")
        );
        assert_eq!(sanitize_description("\\\\", 100), None);
    }

    #[tokio::test]
    async fn huge_retry_count_still_falls_back() {
        let oracle = Arc::new(ScriptedOracle {
            answer: Err(OracleError::Request("down".into())),
            calls: AtomicUsize::new(0),
        });
        let options = DescriberOptions {
            max_retries: 70,
            retry_backoff_ms: 0,
            ..Default::default()
        };
        let d = Describer::new(oracle.clone(), options);
        let out = d.describe(&png(), &Context::default()).await;
        assert_eq!(out.text, FALLBACK_ALT_TEXT);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 71);
    }

    #[test]
    fn undecodable_image_falls_back_without_calling_backend() {
        let (d, oracle) = describer(Ok("never".into()));
        let out = tokio_test::block_on(d.describe(b"<svg/>", &Context::default()));
        assert_eq!(out.text, "Image");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }
}
