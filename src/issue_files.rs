//! Issue file input/output.
//!
//! Writes are atomic: the serialized issue lands in a `.tmp` sibling that is
//! renamed into place, so readers never observe a torn file. A crash can
//! leave a stale `.tmp` behind; the next write truncates it.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::KanbusError;
use crate::models::IssueData;

/// Resolve an issue file path by identifier.
pub fn issue_path_for_identifier(issues_directory: &Path, identifier: &str) -> PathBuf {
    issues_directory.join(format!("{identifier}.json"))
}

/// Read and decode one issue file.
pub fn read_issue_from_file(issue_path: &Path) -> Result<IssueData, KanbusError> {
    let contents = fs::read(issue_path).map_err(KanbusError::io)?;
    serde_json::from_slice(&contents).map_err(|error| {
        KanbusError::InvalidIssueData(format!("{}: {error}", issue_path.display()))
    })
}

/// Serialize an issue and rename it into place.
pub fn write_issue_to_file(issue: &IssueData, issue_path: &Path) -> Result<(), KanbusError> {
    let contents = serde_json::to_string_pretty(issue).map_err(KanbusError::io)?;
    write_bytes_atomically(issue_path, contents.as_bytes())
}

/// Restore an issue file to previously captured bytes (rollback path).
pub fn restore_issue_bytes(issue_path: &Path, bytes: &[u8]) -> Result<(), KanbusError> {
    write_bytes_atomically(issue_path, bytes)
}

fn write_bytes_atomically(path: &Path, bytes: &[u8]) -> Result<(), KanbusError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| KanbusError::Io(format!("invalid issue path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));
    let result = (|| {
        let mut file = fs::File::create(&temp_path).map_err(KanbusError::io)?;
        file.write_all(bytes).map_err(KanbusError::io)?;
        file.flush().map_err(KanbusError::io)?;
        fs::rename(&temp_path, path).map_err(KanbusError::io)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// List issue identifiers from the `*.json` file stems in a directory.
pub fn list_issue_identifiers(issues_directory: &Path) -> Result<HashSet<String>, KanbusError> {
    let mut identifiers = HashSet::new();
    for entry in fs::read_dir(issues_directory).map_err(KanbusError::io)? {
        let entry = entry.map_err(KanbusError::io)?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            identifiers.insert(stem.to_string());
        }
    }
    Ok(identifiers)
}

/// Load every issue in a directory, ordered by file name.
pub fn load_issues_from_directory(issues_dir: &Path) -> Result<Vec<IssueData>, KanbusError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(issues_dir)
        .map_err(KanbusError::io)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(KanbusError::io)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();
    paths.iter().map(|path| read_issue_from_file(path)).collect()
}
