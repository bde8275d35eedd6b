//! Advisory on-disk cache for the issue index.
//!
//! The cache is keyed by the mtimes of every issue file at build time; a
//! reader that finds any drift discards it and rebuilds. `reverse_deps` is
//! stored for inspection but the in-memory index is always rebuilt from the
//! cached issue list, so the two cannot diverge.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::index::IssueIndex;
use crate::models::IssueData;

pub const CACHE_VERSION: u32 = 1;

/// Serialized cache shape (`<project>/.cache/index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCache {
    pub version: u32,
    pub built_at: String,
    pub file_mtimes: BTreeMap<String, f64>,
    pub issues: Vec<IssueData>,
    pub reverse_deps: BTreeMap<String, Vec<String>>,
}

/// Collect issue-file mtimes, rounded to microseconds so the comparison is
/// stable across serialization.
pub fn collect_issue_file_mtimes(
    issues_directory: &Path,
) -> Result<BTreeMap<String, f64>, KanbusError> {
    let mut mtimes = BTreeMap::new();
    for entry in fs::read_dir(issues_directory).map_err(KanbusError::io)? {
        let entry = entry.map_err(KanbusError::io)?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let metadata = entry.metadata().map_err(KanbusError::io)?;
        let modified = metadata.modified().map_err(KanbusError::io)?;
        let seconds = modified
            .duration_since(UNIX_EPOCH)
            .map_err(KanbusError::io)?
            .as_secs_f64();
        if let Some(name) = entry.file_name().to_str() {
            mtimes.insert(name.to_string(), round_mtime(seconds));
        }
    }
    Ok(mtimes)
}

fn round_mtime(seconds: f64) -> f64 {
    (seconds * 1_000_000.0).round() / 1_000_000.0
}

/// Load the cached index when its stored mtimes match the directory scan.
pub fn load_cache_if_valid(
    cache_path: &Path,
    issues_directory: &Path,
) -> Result<Option<IssueIndex>, KanbusError> {
    if !cache_path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(cache_path).map_err(KanbusError::io)?;
    let cache: IndexCache = match serde_json::from_str(&contents) {
        Ok(cache) => cache,
        // An unreadable cache is advisory only; rebuild instead of failing.
        Err(_) => return Ok(None),
    };
    if cache.version != CACHE_VERSION {
        return Ok(None);
    }
    let current = collect_issue_file_mtimes(issues_directory)?;
    if cache.file_mtimes != current {
        return Ok(None);
    }
    Ok(Some(IssueIndex::from_issues(cache.issues)))
}

/// Atomically replace the cache file with the given index.
pub fn write_cache(
    index: &IssueIndex,
    cache_path: &Path,
    file_mtimes: &BTreeMap<String, f64>,
    env: &Environment,
) -> Result<(), KanbusError> {
    let cache = IndexCache {
        version: CACHE_VERSION,
        built_at: format_built_at(env.now()),
        file_mtimes: file_mtimes.clone(),
        issues: index.issues(),
        reverse_deps: index.reverse_dependencies.clone(),
    };
    let payload = serde_json::to_string_pretty(&cache).map_err(KanbusError::io)?;
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent).map_err(KanbusError::io)?;
    }
    let temp_path = cache_path.with_extension("json.tmp");
    fs::write(&temp_path, payload).map_err(KanbusError::io)?;
    fs::rename(&temp_path, cache_path).map_err(KanbusError::io)
}

fn format_built_at(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}
