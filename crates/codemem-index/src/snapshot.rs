// ABOUTME: Per-(project, collection) snapshot of the last successful indexing run
// ABOUTME: Written atomically, loaded on start, quarantined when unreadable

use chrono::{DateTime, Utc};
use codemem_core::{snapshot_path, ChunkKind, IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(default)]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: BTreeMap<String, FileState>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            indexed_at: None,
            files: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Everything remembered about one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    pub mtime_secs: i64,
    pub size: u64,
    /// Hash of the whole file, used to skip touched-but-identical files.
    pub file_hash: String,
    pub chunks: Vec<ChunkRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub hash: String,
    pub kind: ChunkKind,
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(project_root: &Path, collection: &str) -> Self {
        Self {
            path: snapshot_path(project_root, collection),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing snapshot means full index. A corrupt one is quarantined so
    /// the next run can proceed from scratch without losing evidence.
    pub fn load(&self) -> Snapshot {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Snapshot::default(),
        };
        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let quarantine = self
                    .path
                    .with_extension(format!("corrupt-{}", Utc::now().timestamp()));
                warn!(
                    "snapshot {} unreadable ({}); quarantining to {} and reindexing fully",
                    self.path.display(),
                    e,
                    quarantine.display()
                );
                if let Err(rename_err) = std::fs::rename(&self.path, &quarantine) {
                    warn!("quarantine failed: {}", rename_err);
                }
                Snapshot::default()
            }
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = self.path.parent().ok_or_else(|| {
            IndexError::SnapshotCorrupt {
                path: self.path.display().to_string(),
                detail: "snapshot path has no parent directory".to_string(),
            }
        })?;
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, snapshot)?;
        temp.persist(&self.path).map_err(|e| {
            IndexError::SnapshotCorrupt {
                path: self.path.display().to_string(),
                detail: format!("atomic rename failed: {}", e),
            }
        })?;
        info!(
            "snapshot saved: {} files tracked",
            snapshot.files.len()
        );
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
