// ABOUTME: File- and chunk-level change classification against the snapshot
// ABOUTME: mtime+size decide at file level; content hashes decide per chunk

use crate::snapshot::{ChunkRecord, FileState, Snapshot};
use codemem_core::Chunk;
use codemem_parser::CollectedFile;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct FileClassification {
    pub created: Vec<CollectedFile>,
    pub modified: Vec<CollectedFile>,
    pub unchanged: Vec<CollectedFile>,
    pub deleted: Vec<String>,
}

/// Classify the current file set against the prior snapshot.
///
/// Tie-breaks: equal mtime with differing size is modified; both equal is
/// unchanged even when content was touched, unless `force`.
pub fn classify_files(
    current: &[CollectedFile],
    snapshot: &Snapshot,
    force: bool,
) -> FileClassification {
    let mut classification = FileClassification::default();
    let mut seen = BTreeSet::new();

    for file in current {
        let key = file.path.to_string_lossy().into_owned();
        seen.insert(key.clone());
        match snapshot.files.get(&key) {
            None => classification.created.push(file.clone()),
            Some(prior) => {
                if force {
                    classification.modified.push(file.clone());
                } else if prior.mtime_secs == file.mtime_secs && prior.size == file.size {
                    classification.unchanged.push(file.clone());
                } else {
                    classification.modified.push(file.clone());
                }
            }
        }
    }

    for key in snapshot.files.keys() {
        if !seen.contains(key) {
            classification.deleted.push(key.clone());
        }
    }

    classification
}

#[derive(Debug, Default)]
pub struct ChunkDiff {
    /// New and changed chunks, in parse order; these get embedded.
    pub to_embed: Vec<Chunk>,
    /// Chunks whose hash matches the snapshot; never re-embedded.
    pub unchanged: Vec<Chunk>,
    /// Chunk ids present before but no longer produced.
    pub removed_ids: Vec<String>,
}

/// Chunk-level diff for a modified file. For created files pass `None`:
/// everything lands in `to_embed`.
pub fn diff_chunks(new_chunks: Vec<Chunk>, prior: Option<&FileState>) -> ChunkDiff {
    let prior_hashes: HashMap<&str, &str> = prior
        .map(|state| {
            state
                .chunks
                .iter()
                .map(|record| (record.id.as_str(), record.hash.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut diff = ChunkDiff::default();
    let mut produced = BTreeSet::new();
    for chunk in new_chunks {
        produced.insert(chunk.id.clone());
        match prior_hashes.get(chunk.id.as_str()) {
            Some(&hash) if hash == chunk.content_hash => diff.unchanged.push(chunk),
            _ => diff.to_embed.push(chunk),
        }
    }
    if let Some(state) = prior {
        for record in &state.chunks {
            if !produced.contains(&record.id) {
                diff.removed_ids.push(record.id.clone());
            }
        }
    }
    diff
}

/// Snapshot record for a freshly processed file.
pub fn file_state_of(
    file: &CollectedFile,
    file_hash: String,
    chunks: impl Iterator<Item = ChunkRecord>,
) -> FileState {
    FileState {
        mtime_secs: file.mtime_secs,
        size: file.size,
        file_hash,
        chunks: chunks.collect(),
    }
}
