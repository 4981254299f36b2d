//! Context formatting for grounded generation.

use crate::types::Passage;
use serde::{Deserialize, Serialize};

/// Emitted instead of an empty context so the model can flag missing grounding.
pub const NO_CONTEXT_MARKER: &str = "[no context retrieved]";

const UNKNOWN_SOURCE: &str = "unknown";
const BLOCK_SEPARATOR: &str = "\n\n";

/// Formatted, citation-annotated context handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedContext {
    pub text: String,
    /// Number of passages that made it into `text`, counted from the front.
    pub passages_used: usize,
    /// True when the character budget cut or dropped at least one passage.
    pub truncated: bool,
}

/// Renders passages into numbered `[i] Source: ...` blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextFormatter {
    max_chars: Option<usize>,
}

impl ContextFormatter {
    pub fn new(max_chars: Option<usize>) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> Option<usize> {
        self.max_chars
    }

    /// Format passages in order. Pure: the same input always yields the same text.
    ///
    /// With a budget set, blocks are appended while they fit. A first block
    /// that does not fit keeps its whole `[1] Source: ...` header and has its
    /// content cut at a character boundary, so the header alone may exceed a
    /// very small budget. Any later block that does not fit is dropped
    /// together with everything after it. Citation numbers always match the
    /// passage's position in the input.
    pub fn format(&self, passages: &[Passage]) -> FormattedContext {
        if passages.is_empty() {
            return FormattedContext {
                text: NO_CONTEXT_MARKER.to_string(),
                passages_used: 0,
                truncated: false,
            };
        }

        let mut text = String::new();
        let mut used_chars = 0;
        let mut passages_used = 0;
        let mut truncated = false;

        for (i, passage) in passages.iter().enumerate() {
            let header = render_header(i + 1, passage);
            let block = format!("{}{}", header, passage.content);
            let separator = if text.is_empty() { "" } else { BLOCK_SEPARATOR };
            let cost = separator.chars().count() + block.chars().count();

            if let Some(limit) = self.max_chars
                && used_chars + cost > limit
            {
                truncated = true;
                if passages_used == 0 {
                    let room = limit.saturating_sub(header.chars().count());
                    text.push_str(&header);
                    text.extend(passage.content.chars().take(room));
                    passages_used = 1;
                }
                break;
            }

            text.push_str(separator);
            text.push_str(&block);
            used_chars += cost;
            passages_used += 1;
        }

        FormattedContext {
            text,
            passages_used,
            truncated,
        }
    }
}

fn render_header(index: usize, passage: &Passage) -> String {
    let source = passage
        .metadata
        .source
        .as_deref()
        .unwrap_or(UNKNOWN_SOURCE);
    format!("[{}] Source: {}\n", index, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_passages() -> Vec<Passage> {
        vec![
            Passage::new("a").with_source("f1"),
            Passage::new("b").with_source("f2"),
        ]
    }

    #[test]
    fn test_format_numbers_blocks_in_order() {
        let context = ContextFormatter::default().format(&two_passages());
        assert_eq!(context.text, "[1] Source: f1\na\n\n[2] Source: f2\nb");
        assert_eq!(context.passages_used, 2);
        assert!(!context.truncated);
    }

    #[test]
    fn test_format_empty_returns_marker() {
        let context = ContextFormatter::default().format(&[]);
        assert_eq!(context.text, NO_CONTEXT_MARKER);
        assert_eq!(context.passages_used, 0);
        assert!(!context.text.is_empty());
    }

    #[test]
    fn test_missing_source_uses_placeholder() {
        let context = ContextFormatter::default().format(&[Passage::new("orphan")]);
        assert_eq!(context.text, "[1] Source: unknown\norphan");
    }

    #[test]
    fn test_format_is_deterministic() {
        let formatter = ContextFormatter::new(Some(40));
        let passages = two_passages();
        assert_eq!(formatter.format(&passages), formatter.format(&passages));
    }

    #[test]
    fn test_budget_drops_trailing_blocks() {
        // First block is 16 chars; the second would need 2 + 16 more.
        let context = ContextFormatter::new(Some(20)).format(&two_passages());
        assert_eq!(context.text, "[1] Source: f1\na");
        assert_eq!(context.passages_used, 1);
        assert!(context.truncated);
    }

    #[test]
    fn test_budget_exact_fit_is_not_truncated() {
        let context = ContextFormatter::new(Some(34)).format(&two_passages());
        assert_eq!(context.passages_used, 2);
        assert!(!context.truncated);
    }

    #[test]
    fn test_budget_cuts_oversized_first_block_on_char_boundary() {
        let passages = vec![Passage::new("ééééé").with_source("fr")];
        let context = ContextFormatter::new(Some(17)).format(&passages);
        assert_eq!(context.text, "[1] Source: fr\néé");
        assert_eq!(context.passages_used, 1);
        assert!(context.truncated);
    }

    #[test]
    fn test_budget_smaller_than_header_keeps_citation_intact() {
        let context = ContextFormatter::new(Some(7)).format(&two_passages());
        assert_eq!(context.text, "[1] Source: f1\n");
        assert_eq!(context.passages_used, 1);
        assert!(context.truncated);
    }
}
