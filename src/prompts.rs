//! Prompts for VLM-based alt-text generation.
//!
//! Kept in one place so prompt changes never touch retry or sanitising
//! logic, and so tests can inspect them without a live model.
//!
//! Callers can override the instruction via
//! [`crate::config::MigrationConfig::instruction`]; the constant here is used
//! only when no override is provided.

use crate::pipeline::context::Context;

/// Default instruction for describing one image.
pub const DEFAULT_ALT_TEXT_INSTRUCTION: &str = r#"You write alt text for images embedded in Markdown documents.

Rules:
- Describe what the image shows in ONE short phrase, at most 100 characters.
- Be concrete: name the subject, the kind of image (photo, diagram, chart, screenshot) and the key detail.
- Use the surrounding document text, when provided, to pick the relevant detail.
- Do NOT start with "Image of", "Picture of" or "Alt text:".
- Do NOT end with a period.
- Output ONLY the alt text, no quotes and no commentary."#;

/// Literal used when no description can be produced.
pub const FALLBACK_ALT_TEXT: &str = "Image";

/// Build the user-turn text carrying the surrounding document context.
///
/// Returns an empty string when the image has no usable neighbours; the
/// image attachment alone is then the whole request.
pub fn context_message(context: &Context) -> String {
    let mut msg = String::new();
    if let Some(before) = context.before() {
        msg.push_str(&format!("Text before the image:\n\"\"\"{}\"\"\"\n", before));
    }
    if let Some(after) = context.after() {
        msg.push_str(&format!("Text after the image:\n\"\"\"{}\"\"\"\n", after));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_gives_empty_message() {
        assert_eq!(context_message(&Context::default()), "");
    }

    #[test]
    fn context_message_includes_both_sides() {
        let ctx = Context {
            before_text: "Quarterly revenue".into(),
            after_text: "grew by 12%".into(),
        };
        let msg = context_message(&ctx);
        assert!(msg.contains("before the image:\n\"\"\"Quarterly revenue\"\"\""));
        assert!(msg.contains("after the image:\n\"\"\"grew by 12%\"\"\""));
    }

    #[test]
    fn instruction_bounds_length() {
        assert!(DEFAULT_ALT_TEXT_INSTRUCTION.contains("100 characters"));
    }
}
