//! Image reference scanning: find `![alt](locator)` tags in raw Markdown.
//!
//! This is a targeted scan, not a Markdown parse. One regex finds every
//! inline image tag and each hit is classified by the prefix of its locator:
//!
//! | Kind     | Locator prefix                         |
//! |----------|----------------------------------------|
//! | Remote   | `http://` or `https://`                |
//! | Base64   | `data:image/`                          |
//! | Local    | anything else (including `file://`)    |
//!
//! Reference-style links, nested markup and footnotes are not recognised.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[(?P<alt>[^\]\n]*)\]\((?P<locator>[^)\s]+)(?:[ \t]+"(?P<title>[^"\n]*)")?\)"#)
        .unwrap()
});

/// The three reference categories, in the order their phases run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// A path on the local file system, relative to the document.
    Local,
    /// An `http(s)://` URL.
    Remote,
    /// An inline `data:image/…;base64,…` payload.
    Base64,
}

impl ReferenceKind {
    /// Phase order. Local first, then remote, then inline payloads.
    pub const PHASES: [ReferenceKind; 3] =
        [ReferenceKind::Local, ReferenceKind::Remote, ReferenceKind::Base64];

    /// Classify a locator by its prefix.
    pub fn classify(locator: &str) -> Self {
        if has_prefix_ignore_case(locator, "http://") || has_prefix_ignore_case(locator, "https://")
        {
            ReferenceKind::Remote
        } else if has_prefix_ignore_case(locator, "data:image/") {
            ReferenceKind::Base64
        } else {
            ReferenceKind::Local
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Local => "local",
            ReferenceKind::Remote => "remote",
            ReferenceKind::Base64 => "base64",
        };
        f.pad(s)
    }
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// One image tag found in the text.
///
/// Created per scan and consumed once; `span` is only valid against the text
/// the scan ran over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub kind: ReferenceKind,
    /// The exact matched substring, e.g. `![cat](./cat.png "Kitty")`.
    pub matched: String,
    pub alt_text: String,
    pub locator: String,
    pub title: Option<String>,
    /// Byte range of `matched` in the scanned text.
    pub span: Range<usize>,
}

impl ImageReference {
    /// Byte offset of the tag in the scanned text.
    pub fn offset(&self) -> usize {
        self.span.start
    }

    /// Render this tag again with a new alt text and locator, keeping its title.
    pub fn render(&self, alt_text: &str, locator: &str) -> String {
        match &self.title {
            Some(title) => format!("![{alt_text}]({locator} \"{title}\")"),
            None => format!("![{alt_text}]({locator})"),
        }
    }

    /// A short, log-friendly form of the locator (data URIs are truncated).
    pub fn display_locator(&self) -> String {
        const MAX: usize = 48;
        if self.locator.chars().count() <= MAX {
            self.locator.clone()
        } else {
            let head: String = self.locator.chars().take(MAX).collect();
            format!("{head}…")
        }
    }
}

/// Return every reference of `kind` in `text`, in document order.
pub fn scan(text: &str, kind: ReferenceKind) -> Vec<ImageReference> {
    scan_all(text)
        .into_iter()
        .filter(|r| r.kind == kind)
        .collect()
}

/// Return every image reference in `text`, in document order.
pub fn scan_all(text: &str) -> Vec<ImageReference> {
    RE_IMAGE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let locator = caps.name("locator")?.as_str();
            Some(ImageReference {
                kind: ReferenceKind::classify(locator),
                matched: whole.as_str().to_string(),
                alt_text: caps
                    .name("alt")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
                locator: locator.to_string(),
                title: caps.name("title").map(|m| m.as_str().to_string()),
                span: whole.range(),
            })
        })
        .collect()
}

/// Replace every image tag in `line` with its alt text.
///
/// Used when an image line serves as prompt context for a neighbour.
pub fn replace_tags_with_alt(line: &str) -> String {
    RE_IMAGE.replace_all(line, "$alt").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefixes() {
        assert_eq!(ReferenceKind::classify("./a.png"), ReferenceKind::Local);
        assert_eq!(ReferenceKind::classify("file:///tmp/a.png"), ReferenceKind::Local);
        assert_eq!(ReferenceKind::classify("https://x/y.jpg"), ReferenceKind::Remote);
        assert_eq!(ReferenceKind::classify("HTTP://x/y.jpg"), ReferenceKind::Remote);
        assert_eq!(
            ReferenceKind::classify("data:image/png;base64,QQ=="),
            ReferenceKind::Base64
        );
        assert_eq!(ReferenceKind::classify("data:text/plain,hi"), ReferenceKind::Local);
    }

    #[test]
    fn scan_splits_by_kind() {
        let text = "intro\n![](./img.png)\n![remote](https://x/y.jpg)\n![b](data:image/gif;base64,R0lG)\n";
        let local = scan(text, ReferenceKind::Local);
        let remote = scan(text, ReferenceKind::Remote);
        let inline = scan(text, ReferenceKind::Base64);

        assert_eq!(local.len(), 1);
        assert_eq!(local[0].locator, "./img.png");
        assert_eq!(local[0].alt_text, "");
        assert_eq!(&text[local[0].span.clone()], "![](./img.png)");

        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].alt_text, "remote");

        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].locator, "data:image/gif;base64,R0lG");
    }

    #[test]
    fn scan_keeps_title_and_exact_span() {
        let text = r#"see ![Cat](cat.png "A cat") here"#;
        let refs = scan_all(text);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].title.as_deref(), Some("A cat"));
        assert_eq!(refs[0].matched, r#"![Cat](cat.png "A cat")"#);
        assert_eq!(refs[0].offset(), 4);
        assert_eq!(
            refs[0].render("Cat", "https://cdn/x.png"),
            r#"![Cat](https://cdn/x.png "A cat")"#
        );
    }

    #[test]
    fn plain_links_are_ignored() {
        let text = "[not an image](https://x/y.png) and ![](<spaced path.png>)";
        assert!(scan_all(text).is_empty());
    }

    #[test]
    fn duplicate_tags_have_distinct_spans() {
        let text = "![a](a.png)\n![a](a.png)";
        let refs = scan(text, ReferenceKind::Local);
        assert_eq!(refs.len(), 2);
        assert_ne!(refs[0].span, refs[1].span);
    }

    #[test]
    fn replace_tags_with_alt_text() {
        assert_eq!(
            replace_tags_with_alt("Look: ![a red fox](fox.png) in snow"),
            "Look: a red fox in snow"
        );
    }

    #[test]
    fn display_locator_truncates_payloads() {
        let payload = format!("data:image/png;base64,{}", "A".repeat(200));
        let r = scan_all(&format!("![]({payload})")).remove(0);
        let shown = r.display_locator();
        assert!(shown.ends_with('…'));
        assert!(shown.chars().count() <= 49);
    }
}
