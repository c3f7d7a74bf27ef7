use crate::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const STATE_DIR_NAME: &str = ".codemem";
pub const PROJECT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    OpenAi,
    Voyage,
}

impl EmbeddingProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProviderKind::OpenAi => "openai",
            EmbeddingProviderKind::Voyage => "voyage",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            EmbeddingProviderKind::OpenAi => "text-embedding-3-small",
            EmbeddingProviderKind::Voyage => "voyage-3-lite",
        }
    }

    /// Vector dimension is a property of the collection, fixed at creation.
    pub fn dimension_for(&self, model: &str) -> usize {
        match (self, model) {
            (EmbeddingProviderKind::OpenAi, "text-embedding-3-large") => 3072,
            (EmbeddingProviderKind::OpenAi, _) => 1536,
            (EmbeddingProviderKind::Voyage, "voyage-3") => 1024,
            (EmbeddingProviderKind::Voyage, "voyage-code-3") => 1024,
            (EmbeddingProviderKind::Voyage, _) => 512,
        }
    }
}

/// Global configuration resolved from environment variables, with
/// per-project overrides merged from `<project>/.codemem/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub embedding_provider: EmbeddingProviderKind,
    pub embedding_model: String,
    #[serde(skip_serializing)]
    pub embedding_api_key: String,
    pub vector_store_url: String,
    #[serde(skip_serializing)]
    pub vector_store_api_key: Option<String>,

    #[serde(default = "IndexerConfig::default_include")]
    pub include_patterns: Vec<String>,
    #[serde(default = "IndexerConfig::default_exclude")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "IndexerConfig::default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "IndexerConfig::default_streaming_threshold")]
    pub streaming_threshold: u64,
    #[serde(default = "IndexerConfig::default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    #[serde(default = "IndexerConfig::default_file_deadline_secs")]
    pub file_deadline_secs: u64,
}

impl IndexerConfig {
    fn default_include() -> Vec<String> {
        Vec::new()
    }

    fn default_exclude() -> Vec<String> {
        vec![
            "**/.git/**".to_string(),
            "**/node_modules/**".to_string(),
            "**/__pycache__/**".to_string(),
            "**/target/**".to_string(),
            "**/dist/**".to_string(),
            "**/.venv/**".to_string(),
            "**/.codemem/**".to_string(),
            "**/logs/**".to_string(),
        ]
    }

    fn default_max_file_size() -> u64 {
        1_048_576
    }

    fn default_streaming_threshold() -> u64 {
        2 * 1_048_576
    }

    fn default_max_concurrent_files() -> usize {
        8
    }

    fn default_file_deadline_secs() -> u64 {
        60
    }

    /// Build configuration from recognized environment keys. Missing
    /// credentials are a fatal `Config` error at the call sites that need
    /// them, not here, so read-only commands still work.
    pub fn from_env() -> Result<Self> {
        let provider = match env::var("EMBEDDING_PROVIDER").as_deref() {
            Ok("voyage") => EmbeddingProviderKind::Voyage,
            Ok("openai") | Err(_) => EmbeddingProviderKind::OpenAi,
            Ok(other) => {
                return Err(IndexError::Config(format!(
                    "unknown EMBEDDING_PROVIDER `{}` (expected openai or voyage)",
                    other
                )))
            }
        };
        let embedding_model =
            env::var("EMBEDDING_MODEL").unwrap_or_else(|_| provider.default_model().to_string());

        Ok(Self {
            embedding_provider: provider,
            embedding_model,
            embedding_api_key: env::var("EMBEDDING_API_KEY").unwrap_or_default(),
            vector_store_url: env::var("VECTOR_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:6334".to_string()),
            vector_store_api_key: env::var("VECTOR_STORE_API_KEY").ok(),
            include_patterns: Self::default_include(),
            exclude_patterns: Self::default_exclude(),
            max_file_size: Self::default_max_file_size(),
            streaming_threshold: Self::default_streaming_threshold(),
            max_concurrent_files: Self::default_max_concurrent_files(),
            file_deadline_secs: Self::default_file_deadline_secs(),
        })
    }

    /// Merge `<project>/.codemem/config.json` on top of the global config.
    /// A missing file is fine; an unreadable one is a fatal config error.
    pub fn with_project_overrides(mut self, project_root: &Path) -> Result<Self> {
        let path = project_config_path(project_root);
        if !path.exists() {
            return Ok(self);
        }
        let raw = std::fs::read_to_string(&path)?;
        let overrides: ProjectConfig = serde_json::from_str(&raw).map_err(|e| {
            IndexError::Config(format!("invalid project config {}: {}", path.display(), e))
        })?;

        if !overrides.include_patterns.is_empty() {
            self.include_patterns = overrides.include_patterns;
        }
        self.exclude_patterns.extend(overrides.exclude_patterns);
        if let Some(v) = overrides.max_file_size {
            self.max_file_size = v;
        }
        if let Some(v) = overrides.streaming_threshold {
            self.streaming_threshold = v;
        }
        if let Some(v) = overrides.max_concurrent_files {
            self.max_concurrent_files = v;
        }
        Ok(self)
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_provider.dimension_for(&self.embedding_model)
    }

    pub fn require_embedding_key(&self) -> Result<&str> {
        if self.embedding_api_key.is_empty() {
            return Err(IndexError::Config(
                "EMBEDDING_API_KEY is not set".to_string(),
            ));
        }
        Ok(&self.embedding_api_key)
    }
}

/// Project-local overrides, `<project>/.codemem/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub streaming_threshold: Option<u64>,
    #[serde(default)]
    pub max_concurrent_files: Option<usize>,
}

pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME)
}

pub fn project_config_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join(PROJECT_CONFIG_FILE)
}

pub fn snapshot_path(project_root: &Path, collection: &str) -> PathBuf {
    state_dir(project_root).join(format!("{}.snapshot.json", collection))
}

pub fn log_path(project_root: &Path, collection: &str) -> PathBuf {
    project_root.join("logs").join(format!("{}.log", collection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_dimensions() {
        let openai = EmbeddingProviderKind::OpenAi;
        let voyage = EmbeddingProviderKind::Voyage;
        assert_eq!(openai.dimension_for("text-embedding-3-small"), 1536);
        assert_eq!(openai.dimension_for("text-embedding-3-large"), 3072);
        assert_eq!(voyage.dimension_for("voyage-3-lite"), 512);
    }

    #[test]
    fn project_overrides_merge() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_dir(dir.path());
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(
            state.join(PROJECT_CONFIG_FILE),
            r#"{"include_patterns": ["**/*.py"], "exclude_patterns": ["vendor/**"], "max_concurrent_files": 2}"#,
        )
        .unwrap();

        let config = IndexerConfig {
            embedding_provider: EmbeddingProviderKind::OpenAi,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_api_key: String::new(),
            vector_store_url: "http://localhost:6334".to_string(),
            vector_store_api_key: None,
            include_patterns: Vec::new(),
            exclude_patterns: IndexerConfig::default_exclude(),
            max_file_size: IndexerConfig::default_max_file_size(),
            streaming_threshold: IndexerConfig::default_streaming_threshold(),
            max_concurrent_files: IndexerConfig::default_max_concurrent_files(),
            file_deadline_secs: IndexerConfig::default_file_deadline_secs(),
        };
        let merged = config.with_project_overrides(dir.path()).unwrap();
        assert_eq!(merged.include_patterns, vec!["**/*.py".to_string()]);
        assert!(merged
            .exclude_patterns
            .contains(&"vendor/**".to_string()));
        assert_eq!(merged.max_concurrent_files, 2);
    }

    #[test]
    fn snapshot_path_layout() {
        let p = snapshot_path(Path::new("/repo"), "memory");
        assert_eq!(p, PathBuf::from("/repo/.codemem/memory.snapshot.json"));
    }
}
