// ABOUTME: End-to-end pipeline: classify, parse, embed, reconcile the store
// ABOUTME: Per-file best-effort atomicity; snapshot persists only after success

use crate::change::{classify_files, diff_chunks, file_state_of, FileClassification};
use crate::report::{FileFailure, IndexReport};
use crate::snapshot::{ChunkRecord, FileState, Snapshot, SnapshotStore};
use codemem_core::{content_hash, point_id_for, IndexerConfig, IndexError, Result};
use codemem_parser::{
    collect_files, supported_or_warn_once, CollectedFile, FileCollectionConfig, ParserRegistry,
};
use codemem_vector::{
    scroll_all, Distance, EmbedItem, EmbeddingCoordinator, Point, PointFilter, VectorIndex,
};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearMode {
    #[default]
    None,
    /// Erase parser-produced points, keep manual records.
    PreserveManual,
    /// Erase everything, manual records included.
    All,
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub collection: String,
    pub clear: ClearMode,
    pub force: bool,
    /// Restrict the run to these files (watcher batches, single-file
    /// reindex). Deletion detection and the orphan sweep narrow to the
    /// same scope.
    pub target_files: Option<Vec<PathBuf>>,
}

impl IndexOptions {
    pub fn new<S: Into<String>>(collection: S) -> Self {
        Self {
            collection: collection.into(),
            clear: ClearMode::None,
            force: false,
            target_files: None,
        }
    }
}

enum FileOutcome {
    Indexed {
        path: String,
        new_state: FileState,
        upserted: usize,
        implementation: usize,
        unchanged: usize,
        removed: usize,
        relations: usize,
    },
    ContentUnchanged {
        path: String,
        refreshed: FileState,
    },
    Failed {
        path: String,
        kind: String,
        detail: String,
    },
    Cancelled,
}

pub struct Indexer {
    config: IndexerConfig,
    project_root: PathBuf,
    registry: Arc<ParserRegistry>,
    coordinator: Arc<EmbeddingCoordinator>,
    store: Arc<dyn VectorIndex>,
    cancel: Arc<AtomicBool>,
}

impl Indexer {
    pub fn new(
        config: IndexerConfig,
        project_root: PathBuf,
        registry: Arc<ParserRegistry>,
        coordinator: Arc<EmbeddingCoordinator>,
        store: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            config,
            project_root,
            registry,
            coordinator,
            store,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for aborting new work; in-flight files finish within their
    /// deadline.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the pipeline. `Err` is reserved for fatal conditions (bad
    /// config, unreachable store); per-file trouble lands in the report.
    pub async fn run(&self, options: &IndexOptions) -> Result<IndexReport> {
        let start = Instant::now();
        let cost_before = self.coordinator.ledger().snapshot();
        let snapshot_store = SnapshotStore::new(&self.project_root, &options.collection);
        let mut snapshot = snapshot_store.load();
        let mut report = IndexReport::default();

        match options.clear {
            ClearMode::None => {}
            ClearMode::PreserveManual => {
                info!("clearing auto-generated points in {}", options.collection);
                self.store
                    .ensure_collection(
                        &options.collection,
                        self.coordinator.dimension(),
                        Distance::Cosine,
                    )
                    .await?;
                self.store
                    .delete_by_filter(&options.collection, &PointFilter::new().automatic_only())
                    .await?;
                snapshot = Snapshot::default();
                snapshot_store.clear()?;
            }
            ClearMode::All => {
                info!("dropping collection {}", options.collection);
                self.store.drop_collection(&options.collection).await?;
                snapshot = Snapshot::default();
                snapshot_store.clear()?;
            }
        }

        self.store
            .ensure_collection(
                &options.collection,
                self.coordinator.dimension(),
                Distance::Cosine,
            )
            .await?;

        report.operation = if snapshot.is_empty() {
            "full".to_string()
        } else {
            "incremental".to_string()
        };

        let current = self.enumerate_files(options)?;
        let mut classes = classify_files(&current, &snapshot, options.force);
        if options.target_files.is_some() {
            // A targeted run cannot see the rest of the tree; absent files
            // are not deletions.
            classes.deleted.clear();
        }
        report.files_skipped = classes.unchanged.len();
        debug!(
            "classified: {} created, {} modified, {} unchanged, {} deleted",
            classes.created.len(),
            classes.modified.len(),
            classes.unchanged.len(),
            classes.deleted.len()
        );

        self.remove_deleted_files(options, &classes, &mut snapshot, &mut report)
            .await?;

        let work: Vec<(CollectedFile, Option<FileState>)> = classes
            .created
            .into_iter()
            .chain(classes.modified.into_iter())
            .map(|file| {
                let key = file.path.to_string_lossy().into_owned();
                let mut prior = snapshot.files.get(&key).cloned();
                if let Some(state) = &prior {
                    let intact = state.file_hash.len() == 64
                        && state.chunks.iter().all(|c| c.hash.len() == 64);
                    if !intact {
                        warn!(
                            "{}",
                            IndexError::HashMismatch { file: key.clone() }
                        );
                        prior = None;
                    }
                }
                (file, prior)
            })
            .collect();

        let deadline = Duration::from_secs(self.config.file_deadline_secs);
        let force = options.force;
        let collection = options.collection.clone();
        let outcomes: Vec<FileOutcome> = stream::iter(work)
            .map(|(file, prior)| {
                let collection = collection.clone();
                async move {
                    if self.cancel.load(Ordering::SeqCst) {
                        return FileOutcome::Cancelled;
                    }
                    let path = file.path.to_string_lossy().into_owned();
                    match tokio::time::timeout(
                        deadline,
                        self.process_file(&collection, file, prior, force),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => FileOutcome::Failed {
                            path,
                            kind: "deadline".to_string(),
                            detail: format!("exceeded {}s budget", deadline.as_secs()),
                        },
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_files.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                FileOutcome::Indexed {
                    path,
                    new_state,
                    upserted,
                    implementation,
                    unchanged,
                    removed,
                    relations,
                } => {
                    snapshot.files.insert(path, new_state);
                    report.files_indexed += 1;
                    report.chunks_upserted += upserted;
                    report.implementation_chunks += implementation;
                    report.chunks_unchanged += unchanged;
                    report.chunks_deleted += removed;
                    report.relations_upserted += relations;
                }
                FileOutcome::ContentUnchanged { path, refreshed } => {
                    snapshot.files.insert(path, refreshed);
                    report.files_skipped += 1;
                }
                FileOutcome::Failed { path, kind, detail } => {
                    warn!("file failed ({}): {}: {}", kind, path, detail);
                    report.files_failed += 1;
                    report.failures.push(FileFailure {
                        file: path,
                        kind,
                        detail,
                    });
                }
                FileOutcome::Cancelled => {
                    report.files_skipped += 1;
                }
            }
        }

        report.orphans_removed = self
            .sweep_orphans(&options.collection, options.target_files.as_deref())
            .await?;

        snapshot.indexed_at = Some(chrono::Utc::now());
        if let Err(e) = snapshot_store.save(&snapshot) {
            // The store is already consistent; the next run re-detects and
            // re-embeds, which hash equality turns into a no-op.
            error!(
                "SNAPSHOT WRITE FAILED for {}: {} (next run will reconcile)",
                snapshot_store.path().display(),
                e
            );
        }

        let cost_after = self.coordinator.ledger().snapshot();
        report.prompt_tokens = cost_after.prompt_tokens - cost_before.prompt_tokens;
        report.embedding_requests = cost_after.requests - cost_before.requests;
        report.estimated_usd = cost_after.estimated_usd - cost_before.estimated_usd;
        report.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "run complete: {} indexed, {} failed, {} tokens",
            report.files_indexed, report.files_failed, report.prompt_tokens
        );
        Ok(report)
    }

    fn enumerate_files(&self, options: &IndexOptions) -> Result<Vec<CollectedFile>> {
        match &options.target_files {
            Some(targets) => {
                let mut files = Vec::new();
                let mut warned_extensions = HashSet::new();
                for path in targets {
                    let metadata = match std::fs::metadata(path) {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("target {} unreadable: {}", path.display(), e);
                            continue;
                        }
                    };
                    if !supported_or_warn_once(&self.registry, path, &mut warned_extensions) {
                        continue;
                    }
                    files.push(CollectedFile {
                        path: path.clone(),
                        mtime_secs: metadata
                            .modified()
                            .ok()
                            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                            .map(|d| d.as_secs() as i64)
                            .unwrap_or(0),
                        size: metadata.len(),
                    });
                }
                Ok(files)
            }
            None => {
                // The state and log directories are never index input, no
                // matter what the project config says.
                let mut exclude_patterns = self.config.exclude_patterns.clone();
                exclude_patterns.push(format!("**/{}/**", codemem_core::STATE_DIR_NAME));
                exclude_patterns.push("**/logs/**".to_string());
                collect_files(
                    &self.project_root,
                    &FileCollectionConfig {
                        include_patterns: self.config.include_patterns.clone(),
                        exclude_patterns,
                        max_file_size: self.config.max_file_size,
                    },
                    &self.registry,
                )
            }
        }
    }

    async fn remove_deleted_files(
        &self,
        options: &IndexOptions,
        classes: &FileClassification,
        snapshot: &mut Snapshot,
        report: &mut IndexReport,
    ) -> Result<()> {
        for path in &classes.deleted {
            let chunk_filter = PointFilter::chunks()
                .with_file_path(path.clone())
                .automatic_only();
            let removed = self.store.count(&options.collection, &chunk_filter).await?;
            // One filter covers chunks and relations; manual records never
            // carry a file_path so they cannot match.
            self.store
                .delete_by_filter(
                    &options.collection,
                    &PointFilter::new()
                        .with_file_path(path.clone())
                        .automatic_only(),
                )
                .await?;
            snapshot.files.remove(path);
            report.chunks_deleted += removed;
            info!("removed {} points for deleted file {}", removed, path);
        }
        Ok(())
    }

    async fn process_file(
        &self,
        collection: &str,
        file: CollectedFile,
        prior: Option<FileState>,
        force: bool,
    ) -> FileOutcome {
        let path_string = file.path.to_string_lossy().into_owned();
        let bytes = match tokio::fs::read(&file.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return FileOutcome::Failed {
                    path: path_string,
                    kind: "io".to_string(),
                    detail: e.to_string(),
                }
            }
        };

        let file_hash = content_hash(&String::from_utf8_lossy(&bytes));
        if !force {
            if let Some(prior_state) = &prior {
                if prior_state.file_hash == file_hash {
                    // Touched but byte-identical after normalization.
                    let mut refreshed = prior_state.clone();
                    refreshed.mtime_secs = file.mtime_secs;
                    refreshed.size = file.size;
                    return FileOutcome::ContentUnchanged {
                        path: path_string,
                        refreshed,
                    };
                }
            }
        }

        let registry = Arc::clone(&self.registry);
        let parse_path = file.path.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            registry.parse(&bytes, &parse_path)
        })
        .await;

        let outcome = match parsed {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                // Existing points for the file stay in place to preserve
                // partial search utility.
                return FileOutcome::Failed {
                    path: path_string,
                    kind: e.kind().to_string(),
                    detail: e.to_string(),
                };
            }
            Err(join_err) => {
                return FileOutcome::Failed {
                    path: path_string,
                    kind: "parse".to_string(),
                    detail: join_err.to_string(),
                };
            }
        };
        for diagnostic in &outcome.diagnostics {
            debug!("{}", diagnostic);
        }

        let relations = outcome.relations;
        let mut diff = diff_chunks(outcome.chunks, prior.as_ref());
        if force {
            // Forced runs re-embed everything; ids and hashes stay stable,
            // so the store converges to the same payloads.
            diff.to_embed.append(&mut diff.unchanged);
        }

        let mut items: Vec<EmbedItem> = diff
            .to_embed
            .iter()
            .map(|chunk| EmbedItem {
                key: chunk.id.clone(),
                content_hash: chunk.content_hash.clone(),
                text: chunk.content.clone(),
            })
            .collect();
        for relation in &relations {
            let text = relation.render();
            items.push(EmbedItem {
                key: relation.key(),
                content_hash: content_hash(&text),
                text,
            });
        }

        let vectors = match self.coordinator.embed_items(items).await {
            Ok(vectors) => vectors,
            Err(e) => {
                // No store mutations have happened for this file yet:
                // rollback is simply "don't touch the snapshot entry".
                return FileOutcome::Failed {
                    path: path_string,
                    kind: e.kind().to_string(),
                    detail: e.to_string(),
                };
            }
        };

        let mut points = Vec::new();
        for chunk in &diff.to_embed {
            match vectors.get(&chunk.id) {
                Some(vector) => points.push(Point::for_chunk(chunk, vector.clone())),
                None => {
                    return FileOutcome::Failed {
                        path: path_string,
                        kind: "embedding".to_string(),
                        detail: format!("no vector returned for {}", chunk.id),
                    }
                }
            }
        }
        for relation in &relations {
            match vectors.get(&relation.key()) {
                Some(vector) => points.push(Point::for_relation(relation, vector.clone())),
                None => {
                    return FileOutcome::Failed {
                        path: path_string,
                        kind: "embedding".to_string(),
                        detail: format!("no vector returned for relation {}", relation.key()),
                    }
                }
            }
        }

        let removed_ids: Vec<Uuid> = diff.removed_ids.iter().map(|id| point_id_for(id)).collect();
        let mutation = async {
            // Relations owned by this file are always rewritten.
            self.store
                .delete_by_filter(
                    collection,
                    &PointFilter::relations().with_file_path(path_string.clone()),
                )
                .await?;
            if !removed_ids.is_empty() {
                self.store.delete(collection, &removed_ids).await?;
            }
            if !points.is_empty() {
                self.store.upsert(collection, points.clone()).await?;
            }
            Ok::<(), IndexError>(())
        };
        if let Err(e) = mutation.await {
            return FileOutcome::Failed {
                path: path_string,
                kind: e.kind().to_string(),
                detail: e.to_string(),
            };
        }

        let implementation = diff
            .to_embed
            .iter()
            .filter(|c| c.kind == codemem_core::ChunkKind::Implementation)
            .count();
        let records = diff
            .to_embed
            .iter()
            .chain(diff.unchanged.iter())
            .map(|chunk| ChunkRecord {
                id: chunk.id.clone(),
                hash: chunk.content_hash.clone(),
                kind: chunk.kind,
            });
        let new_state = file_state_of(&file, file_hash, records);

        FileOutcome::Indexed {
            path: path_string,
            upserted: diff.to_embed.len(),
            implementation,
            unchanged: diff.unchanged.len(),
            removed: diff.removed_ids.len(),
            relations: relations.len(),
            new_state,
        }
    }

    /// Drop relations whose internal endpoints no longer resolve to a
    /// stored metadata chunk. External names (no `::`, not a path) are
    /// always considered valid.
    async fn sweep_orphans(
        &self,
        collection: &str,
        scope: Option<&[PathBuf]>,
    ) -> Result<usize> {
        let entity_names: HashSet<String> = scroll_all(
            self.store.as_ref(),
            collection,
            &PointFilter::chunks()
                .with_chunk_type("metadata")
                .automatic_only(),
        )
        .await?
        .into_iter()
        .filter_map(|point| match point.payload {
            codemem_vector::PointPayload::Chunk(chunk) => Some(chunk.entity_name),
            _ => None,
        })
        .collect();

        let scoped: Option<HashSet<String>> = scope.map(|paths| {
            paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect()
        });

        let relations = scroll_all(
            self.store.as_ref(),
            collection,
            &PointFilter::relations(),
        )
        .await?;

        let mut orphans = Vec::new();
        for point in relations {
            let codemem_vector::PointPayload::Relation(relation) = &point.payload else {
                continue;
            };
            if let Some(scoped) = &scoped {
                if !scoped.contains(&relation.file_path) {
                    continue;
                }
            }
            let dangling = [&relation.from_entity, &relation.to_entity]
                .into_iter()
                .any(|endpoint| {
                    is_internal_name(endpoint) && !entity_names.contains(endpoint)
                });
            if dangling {
                orphans.push(point.id);
            }
        }

        if !orphans.is_empty() {
            info!("orphan sweep removing {} relations", orphans.len());
            self.store.delete(collection, &orphans).await?;
        }
        Ok(orphans.len())
    }
}

/// Names our parsers mint: `module::symbol` qualifications and absolute
/// file paths. Anything else is an external endpoint and never orphaned.
fn is_internal_name(name: &str) -> bool {
    name.contains("::") || Path::new(name).is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_name_shapes() {
        assert!(is_internal_name("users::load"));
        assert!(is_internal_name("/repo/users.py"));
        assert!(!is_internal_name("json.load"));
        assert!(!is_internal_name("KeyError"));
        assert!(!is_internal_name("./db"));
    }
}
