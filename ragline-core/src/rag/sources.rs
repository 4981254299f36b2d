//! Citation records for the caller.

use crate::types::{Passage, SourceRecord};

/// Project each passage onto its `source`, `chunk` and `id` metadata.
///
/// One record per passage, in retrieval order. Missing fields stay `None`.
pub fn extract_sources(passages: &[Passage]) -> Vec<SourceRecord> {
    passages
        .iter()
        .map(|p| SourceRecord {
            source: p.metadata.source.clone(),
            chunk: p.metadata.chunk,
            id: p.metadata.id.clone(),
        })
        .collect()
}
