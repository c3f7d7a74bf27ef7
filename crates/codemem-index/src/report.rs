use serde::Serialize;

/// Per-run accounting surfaced to the user and to exit-code logic.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    pub operation: String,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub chunks_upserted: usize,
    pub chunks_deleted: usize,
    pub chunks_unchanged: usize,
    pub implementation_chunks: usize,
    pub relations_upserted: usize,
    pub orphans_removed: usize,
    pub prompt_tokens: u64,
    pub embedding_requests: u64,
    pub estimated_usd: f64,
    pub duration_secs: f64,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub kind: String,
    pub detail: String,
}

impl IndexReport {
    pub fn success(&self) -> bool {
        self.files_failed == 0
    }

    /// 0 success, 1 partial; fatal errors never reach a report.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "files: {} indexed, {} skipped, {} failed",
                self.files_indexed, self.files_skipped, self.files_failed
            ),
            format!(
                "chunks: {} upserted ({} implementation), {} deleted, {} unchanged",
                self.chunks_upserted,
                self.implementation_chunks,
                self.chunks_deleted,
                self.chunks_unchanged
            ),
            format!(
                "relations: {} upserted, {} orphans removed",
                self.relations_upserted, self.orphans_removed
            ),
            format!(
                "embedding: {} tokens in {} requests, ~${:.4}",
                self.prompt_tokens, self.embedding_requests, self.estimated_usd
            ),
            format!("completed in {:.2}s", self.duration_secs),
        ];
        for failure in &self.failures {
            lines.push(format!(
                "failed: {} ({}): {}",
                failure.file, failure.kind, failure.detail
            ));
        }
        lines
    }
}
