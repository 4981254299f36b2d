//! Property-based tests for context formatting and source extraction.

use proptest::prelude::*;

use ragline_core::rag::{ContextFormatter, NO_CONTEXT_MARKER, extract_sources};
use ragline_core::types::{Passage, PassageMetadata};

fn passage_strategy() -> impl Strategy<Value = Passage> {
    (
        "[a-z ]{0,40}",
        proptest::option::of("[a-z0-9_./-]{1,20}"),
        proptest::option::of(0u64..1000),
        proptest::option::of("[a-f0-9]{8}"),
    )
        .prop_map(|(content, source, chunk, id)| Passage {
            content,
            metadata: PassageMetadata { source, chunk, id },
            score: None,
        })
}

/// Citation indices found at the start of each block, in order of appearance.
fn block_indices(text: &str) -> Vec<usize> {
    text.lines()
        .filter_map(|line| {
            let rest = line.strip_prefix('[')?;
            let (index, tail) = rest.split_once(']')?;
            tail.starts_with(" Source: ").then(|| index.parse().ok())?
        })
        .collect()
}

// --- Context formatter properties ---

proptest! {
    #[test]
    fn formatter_emits_one_numbered_block_per_passage(
        passages in proptest::collection::vec(passage_strategy(), 1..12),
    ) {
        let context = ContextFormatter::default().format(&passages);
        let expected: Vec<usize> = (1..=passages.len()).collect();
        prop_assert_eq!(block_indices(&context.text), expected);
        prop_assert_eq!(context.passages_used, passages.len());
        prop_assert!(!context.truncated);
    }

    #[test]
    fn formatter_keeps_passage_order(
        passages in proptest::collection::vec(passage_strategy(), 1..12),
    ) {
        let text = ContextFormatter::default().format(&passages).text;
        let mut cursor = 0;
        for (i, passage) in passages.iter().enumerate() {
            let source = passage.metadata.source.as_deref().unwrap_or("unknown");
            let header = format!("[{}] Source: {}\n{}", i + 1, source, passage.content);
            let found = text[cursor..].find(&header);
            prop_assert!(found.is_some(), "block {} missing or out of order", i + 1);
            cursor += found.unwrap_or_default() + header.len();
        }
    }

    #[test]
    fn formatter_respects_budget(
        passages in proptest::collection::vec(passage_strategy(), 1..12),
        budget in 1usize..400,
    ) {
        let context = ContextFormatter::new(Some(budget)).format(&passages);
        let first_source = passages[0].metadata.source.as_deref().unwrap_or("unknown");
        let first_header = format!("[1] Source: {}\n", first_source);
        prop_assert!(context.text.starts_with(&first_header));
        prop_assert!(context.text.chars().count() <= budget.max(first_header.chars().count()));
        prop_assert!(context.passages_used >= 1);
        prop_assert!(context.passages_used <= passages.len());
        if !context.truncated {
            prop_assert_eq!(context.passages_used, passages.len());
        }
    }

    #[test]
    fn formatter_is_deterministic(
        passages in proptest::collection::vec(passage_strategy(), 0..8),
    ) {
        let formatter = ContextFormatter::default();
        prop_assert_eq!(formatter.format(&passages), formatter.format(&passages));
    }
}

#[test]
fn formatter_empty_input_is_marker() {
    assert_eq!(ContextFormatter::default().format(&[]).text, NO_CONTEXT_MARKER);
}

// --- Source extractor properties ---

proptest! {
    #[test]
    fn sources_match_passages_one_to_one(
        passages in proptest::collection::vec(passage_strategy(), 0..16),
    ) {
        let sources = extract_sources(&passages);
        prop_assert_eq!(sources.len(), passages.len());
        for (record, passage) in sources.iter().zip(&passages) {
            prop_assert_eq!(&record.source, &passage.metadata.source);
            prop_assert_eq!(record.chunk, passage.metadata.chunk);
            prop_assert_eq!(&record.id, &passage.metadata.id);
        }
    }
}
