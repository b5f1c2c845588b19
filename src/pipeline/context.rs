//! Prompt context: the nearest meaningful text before and after an image.
//!
//! A vision model writes far better alt text when it knows what the
//! surrounding prose is about. For an image on line *n* the extractor walks
//! up from *n − 1* and down from *n + 1* to the first line that carries
//! content:
//!
//! - blank lines and pure Markdown punctuation (`---`, fences, table rules)
//!   are skipped;
//! - image tags are replaced by their alt text, so an image-only neighbour
//!   contributes its description instead of a file path;
//! - walking down, a line with an unterminated `![` / `](` fragment is joined
//!   with the following lines until a `)` closes it, so a tag wrapped across
//!   lines is judged as one unit.
//!
//! Both fragments are independently optional and empty at the start or end
//! of the document.

use crate::pipeline::scan::replace_tags_with_alt;
use serde::{Deserialize, Serialize};

/// Text surrounding one image reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub before_text: String,
    pub after_text: String,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.before_text.is_empty() && self.after_text.is_empty()
    }

    /// `Some` only when the fragment carries text.
    pub fn before(&self) -> Option<&str> {
        Some(self.before_text.as_str()).filter(|s| !s.is_empty())
    }

    pub fn after(&self) -> Option<&str> {
        Some(self.after_text.as_str()).filter(|s| !s.is_empty())
    }
}

/// Line-indexed view over one document.
pub struct ContextExtractor<'a> {
    document: &'a str,
    lines: Vec<&'a str>,
    max_chars: usize,
}

impl<'a> ContextExtractor<'a> {
    pub fn new(document: &'a str, max_chars: usize) -> Self {
        Self {
            document,
            lines: document.split('\n').collect(),
            max_chars,
        }
    }

    /// Context for the image starting at byte `offset`.
    pub fn extract(&self, offset: usize) -> Context {
        self.extract_line(line_index(self.document, offset))
    }

    /// Context for an image on 0-indexed line `line`.
    pub fn extract_line(&self, line: usize) -> Context {
        if line >= self.lines.len() {
            return Context::default();
        }
        Context {
            before_text: self
                .before(line)
                .map(|s| tail_chars(&s, self.max_chars))
                .unwrap_or_default(),
            after_text: self
                .after(line)
                .map(|s| head_chars(&s, self.max_chars))
                .unwrap_or_default(),
        }
    }

    fn before(&self, line: usize) -> Option<String> {
        self.lines[..line]
            .iter()
            .rev()
            .find_map(|l| meaningful(l))
    }

    fn after(&self, line: usize) -> Option<String> {
        let mut i = line + 1;
        while i < self.lines.len() {
            let mut candidate = self.lines[i].to_string();
            i += 1;
            if is_unterminated(&candidate) {
                while i < self.lines.len() {
                    let next = self.lines[i];
                    i += 1;
                    candidate.push(' ');
                    candidate.push_str(next.trim());
                    if next.contains(')') {
                        break;
                    }
                }
            }
            if let Some(text) = meaningful(&candidate) {
                return Some(text);
            }
        }
        None
    }
}

/// 0-indexed line number of byte `offset` in `text`.
pub fn line_index(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count()
}

/// The line's usable text, or `None` when it is blank or purely structural.
fn meaningful(line: &str) -> Option<String> {
    if is_structural(line) {
        return None;
    }
    let text = replace_tags_with_alt(line);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if is_structural(&text) {
        None
    } else {
        Some(text)
    }
}

fn is_structural(line: &str) -> bool {
    let t = line.trim();
    t.is_empty()
        || t.starts_with("```")
        || t.starts_with("~~~")
        || t
            .chars()
            .all(|c| matches!(c, '-' | '*' | '_' | '=' | '#' | '|' | ':' | '>' | '+' | ' ' | '\t'))
}

/// Does the line open an image/link that it never closes?
fn is_unterminated(line: &str) -> bool {
    let open = match (line.rfind("!["), line.rfind("](")) {
        (None, None) => return false,
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
    };
    !line[open..].contains(')')
}

fn head_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(doc: &str, line: usize) -> Context {
        ContextExtractor::new(doc, 300).extract_line(line)
    }

    #[test]
    fn first_line_has_no_before() {
        let doc = "![](a.png)\nThe fox jumps.";
        let c = ctx(doc, 0);
        assert_eq!(c.before_text, "");
        assert_eq!(c.after_text, "The fox jumps.");
    }

    #[test]
    fn last_line_has_no_after() {
        let doc = "Intro text.\n\n![](a.png)";
        let c = ctx(doc, 2);
        assert_eq!(c.before_text, "Intro text.");
        assert_eq!(c.after_text, "");
    }

    #[test]
    fn skips_blank_and_structural_lines() {
        let doc = "# Title\nPara one.\n\n---\n![](a.png)\n\n```\nAfter para.";
        let c = ctx(doc, 4);
        assert_eq!(c.before_text, "Para one.");
        assert_eq!(c.after_text, "After para.");
    }

    #[test]
    fn heading_with_text_counts() {
        let doc = "## Results\n![](chart.png)";
        assert_eq!(ctx(doc, 1).before_text, "## Results");
    }

    #[test]
    fn neighbouring_image_contributes_alt_text() {
        let doc = "![A map of Europe](map.png)\n![](detail.png)\n![](x.png)";
        let c = ctx(doc, 1);
        assert_eq!(c.before_text, "A map of Europe");
        // An image with empty alt text carries nothing; walk past it.
        assert_eq!(c.after_text, "");
    }

    #[test]
    fn unterminated_fragment_is_joined() {
        let doc = "![](a.png)\n![a wrapped\ncaption](b.png) done\nlast";
        let c = ctx(doc, 0);
        // Once joined, the wrapped tag is recognised and reduced to its alt text.
        assert_eq!(c.after_text, "a wrapped caption done");
    }

    #[test]
    fn unterminated_detection() {
        assert!(is_unterminated("see ![fig"));
        assert!(is_unterminated("[link](http://x"));
        assert!(!is_unterminated("![ok](a.png)"));
        assert!(!is_unterminated("plain text"));
    }

    #[test]
    fn offset_maps_to_line() {
        let doc = "a\nbb\n![](x.png)";
        let offset = doc.find("![").unwrap();
        assert_eq!(line_index(doc, offset), 2);
        let c = ContextExtractor::new(doc, 300).extract(offset);
        assert_eq!(c.before_text, "bb");
    }

    #[test]
    fn fragments_are_capped() {
        let long = "word ".repeat(100);
        let doc = format!("{long}\n![](a.png)\n{long}");
        let c = ContextExtractor::new(&doc, 20).extract_line(1);
        assert_eq!(c.before_text.chars().count(), 20);
        assert_eq!(c.after_text.chars().count(), 20);
        assert!(c.after_text.starts_with("word"));
        assert!(c.before_text.ends_with("word"));
    }

    #[test]
    fn optional_accessors() {
        let c = Context {
            before_text: "x".into(),
            after_text: String::new(),
        };
        assert_eq!(c.before(), Some("x"));
        assert_eq!(c.after(), None);
        assert!(!c.is_empty());
    }
}
