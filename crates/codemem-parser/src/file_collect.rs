use crate::registry::ParserRegistry;
use codemem_core::{IndexError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// One candidate file with the stat facts change detection needs.
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub mtime_secs: i64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FileCollectionConfig {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_file_size: u64,
}

/// Check whether any parser claims `path`, warning at most once per
/// extension per run. Extensionless files are skipped silently.
pub fn supported_or_warn_once(
    registry: &ParserRegistry,
    path: &Path,
    warned_extensions: &mut HashSet<String>,
) -> bool {
    match registry.parser_for(path) {
        Ok(_) => true,
        Err(IndexError::UnsupportedLanguage(ext)) => {
            if !ext.is_empty() && warned_extensions.insert(ext.clone()) {
                warn!(
                    "no parser registered for extension `.{}`, skipping {} (further .{} files skipped silently)",
                    ext,
                    path.display(),
                    ext
                );
            }
            false
        }
        Err(_) => false,
    }
}

/// Walk the project respecting gitignore, then apply include/exclude globs
/// and keep only files some parser claims.
pub fn collect_files(
    root: &Path,
    config: &FileCollectionConfig,
    registry: &ParserRegistry,
) -> Result<Vec<CollectedFile>> {
    let include_set = if config.include_patterns.is_empty() {
        None
    } else {
        Some(build_globset(&config.include_patterns)?)
    };
    let exclude_set = build_globset(&config.exclude_patterns)?;

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .build();

    let mut collected = Vec::new();
    let mut warned_extensions = HashSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("walker error: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }
        if let Some(includes) = &include_set {
            if !includes.is_match(relative) {
                continue;
            }
        }
        if !supported_or_warn_once(registry, path, &mut warned_extensions) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("stat failed for {}: {}", path.display(), e);
                continue;
            }
        };
        if config.max_file_size > 0 && metadata.len() > config.max_file_size {
            debug!(
                "skipping {} ({} bytes over limit)",
                path.display(),
                metadata.len()
            );
            continue;
        }
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        collected.push(CollectedFile {
            path: path.to_path_buf(),
            mtime_secs,
            size: metadata.len(),
        });
    }

    collected.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(collected)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexError::Config(format!("invalid glob `{}`: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Config(format!("glob set: {}", e)))
}
