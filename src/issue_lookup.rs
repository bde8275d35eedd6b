//! Issue lookup by full or abbreviated identifier.

use std::fs;
use std::path::{Path, PathBuf};

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::ids::format_issue_key;
use crate::issue_files::{issue_path_for_identifier, read_issue_from_file};
use crate::models::IssueData;
use crate::project::{find_project_local_directory, load_project_directory};

/// A located issue with the file it came from.
#[derive(Debug)]
pub struct IssueLookupResult {
    pub issue: IssueData,
    pub issue_path: PathBuf,
    pub project_dir: PathBuf,
}

/// Load an issue by identifier, searching the shared scope and then the
/// local scope. Abbreviated identifiers (display keys or plain prefixes)
/// resolve when they match exactly one issue.
pub fn load_issue_from_project(
    root: &Path,
    env: &Environment,
    identifier: &str,
) -> Result<IssueLookupResult, KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    let mut scopes = vec![project_dir.join("issues")];
    if let Some(local_dir) = find_project_local_directory(&project_dir) {
        scopes.push(local_dir.join("issues"));
    }

    // Exact hits win before any prefix matching happens.
    for issues_dir in &scopes {
        let issue_path = issue_path_for_identifier(issues_dir, identifier);
        if issue_path.exists() {
            let issue = read_issue_from_file(&issue_path)?;
            return Ok(IssueLookupResult {
                issue,
                issue_path,
                project_dir,
            });
        }
    }

    let mut matches = Vec::new();
    for issues_dir in &scopes {
        if issues_dir.is_dir() {
            matches.extend(find_matching_issues(issues_dir, identifier)?);
        }
    }

    match matches.len() {
        0 => Err(KanbusError::NotFound(format!(
            "issue '{identifier}' not found"
        ))),
        1 => {
            let (_, issue_path) = matches.remove(0);
            let issue = read_issue_from_file(&issue_path)?;
            Ok(IssueLookupResult {
                issue,
                issue_path,
                project_dir,
            })
        }
        _ => {
            let ids: Vec<String> = matches.into_iter().map(|(id, _)| id).collect();
            Err(KanbusError::AmbiguousShortId(ids.join(", ")))
        }
    }
}

fn find_matching_issues(
    issues_dir: &Path,
    identifier: &str,
) -> Result<Vec<(String, PathBuf)>, KanbusError> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(issues_dir).map_err(KanbusError::io)? {
        let entry = entry.map_err(KanbusError::io)?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if short_id_matches(identifier, stem) {
            matches.push((stem.to_string(), path));
        }
    }
    matches.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(matches)
}

/// An abbreviation matches when it equals the display key or is a strict
/// prefix of the full identifier.
fn short_id_matches(abbreviated: &str, full_id: &str) -> bool {
    if abbreviated == format_issue_key(full_id, false) {
        return true;
    }
    abbreviated.len() < full_id.len() && full_id.starts_with(abbreviated)
}
