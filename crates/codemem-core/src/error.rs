use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no parser registered for extension `.{0}`")]
    UnsupportedLanguage(String),

    #[error("parse error in {file}: {detail}")]
    Parse { file: String, detail: String },

    #[error("snapshot hash mismatch for {file}")]
    HashMismatch { file: String },

    #[error("embedding failed for chunk {chunk_id}: {detail}")]
    Embedding { chunk_id: String, detail: String },

    #[error("vector store error: {0}")]
    Store(String),

    #[error("snapshot unreadable at {path}: {detail}")]
    SnapshotCorrupt { path: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IndexError {
    /// Short machine-readable kind name used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::Io(_) => "io",
            IndexError::Serialization(_) => "serialization",
            IndexError::UnsupportedLanguage(_) => "unsupported-language",
            IndexError::Parse { .. } => "parse",
            IndexError::HashMismatch { .. } => "hash-mismatch",
            IndexError::Embedding { .. } => "embedding",
            IndexError::Store(_) => "store",
            IndexError::SnapshotCorrupt { .. } => "snapshot-corrupt",
            IndexError::Config(_) => "config",
        }
    }

    /// Fatal errors abort the whole run (exit code 2); everything else is
    /// recovered per file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
