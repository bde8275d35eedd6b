//! Listing composition: discovery, daemon or cache, scopes, query.

use std::path::Path;

use crate::cache::{collect_issue_file_mtimes, load_cache_if_valid, write_cache};
use crate::daemon_client::request_index_list;
use crate::daemon_paths::get_index_cache_path;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::index::build_index_from_directory;
use crate::issue_files::load_issues_from_directory;
use crate::models::IssueData;
use crate::project::{discover_project_directories, find_project_local_directory};
use crate::queries::{filter_issues, search_issues, sort_issues};

/// Query parameters for a listing.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
    pub label: Option<String>,
    pub sort: Option<String>,
    pub search: Option<String>,
    pub include_local: bool,
    pub local_only: bool,
    pub limit: Option<usize>,
}

/// List issues for a repository.
///
/// Shared-scope issues of a single project come from the daemon when it is
/// enabled, otherwise from the mtime-validated cache (rebuilt on drift).
/// Local-scope issues and multi-project listings are always read directly.
pub fn list_issues(
    root: &Path,
    env: &Environment,
    options: &ListOptions,
) -> Result<Vec<IssueData>, KanbusError> {
    if options.local_only && !options.include_local {
        return Err(KanbusError::Io(
            "--local-only conflicts with --no-local".to_string(),
        ));
    }

    let projects = discover_project_directories(root, env)?;
    if projects.is_empty() {
        return Err(KanbusError::ProjectNotInitialized);
    }

    let issues = if projects.len() == 1 {
        let project_dir = &projects[0];
        let mut issues = if options.local_only {
            Vec::new()
        } else {
            load_shared_issues(root, env, project_dir)?
        };
        if options.include_local || options.local_only {
            if let Some(local_dir) = find_project_local_directory(project_dir) {
                let local_issues_dir = local_dir.join("issues");
                if local_issues_dir.is_dir() {
                    issues.extend(load_issues_from_directory(&local_issues_dir)?);
                }
            }
        }
        issues
    } else {
        let mut issues = Vec::new();
        for project_dir in &projects {
            let issues_dir = project_dir.join("issues");
            if !issues_dir.is_dir() {
                continue;
            }
            let mut project_issues = if options.local_only {
                Vec::new()
            } else {
                load_issues_from_directory(&issues_dir)?
            };
            if options.include_local || options.local_only {
                if let Some(local_dir) = find_project_local_directory(project_dir) {
                    let local_issues_dir = local_dir.join("issues");
                    if local_issues_dir.is_dir() {
                        project_issues.extend(load_issues_from_directory(&local_issues_dir)?);
                    }
                }
            }
            for issue in &mut project_issues {
                tag_issue_project(issue, root, project_dir);
            }
            issues.extend(project_issues);
        }
        issues
    };

    let filtered = filter_issues(
        issues,
        options.status.as_deref(),
        options.issue_type.as_deref(),
        options.assignee.as_deref(),
        options.label.as_deref(),
    );
    let searched = search_issues(filtered, options.search.as_deref());
    let mut sorted = sort_issues(searched, options.sort.as_deref())?;
    if options.sort.is_none() {
        sorted.sort_by(|left, right| left.identifier.cmp(&right.identifier));
    }
    if let Some(limit) = options.limit {
        sorted.truncate(limit);
    }
    Ok(sorted)
}

/// Shared-scope issues via daemon when enabled, else via the cache.
fn load_shared_issues(
    root: &Path,
    env: &Environment,
    project_dir: &Path,
) -> Result<Vec<IssueData>, KanbusError> {
    if env.daemon_enabled() {
        let payloads = request_index_list(root, env)?;
        return payloads
            .into_iter()
            .map(|payload| {
                serde_json::from_value::<IssueData>(payload)
                    .map_err(|error| KanbusError::InvalidIssueData(error.to_string()))
            })
            .collect();
    }

    let issues_dir = project_dir.join("issues");
    if !issues_dir.is_dir() {
        return Err(KanbusError::ProjectNotInitialized);
    }
    let cache_path = get_index_cache_path(root, env)?;
    if let Some(index) = load_cache_if_valid(&cache_path, &issues_dir)? {
        return Ok(index.issues());
    }
    let index = build_index_from_directory(&issues_dir)?;
    let mtimes = collect_issue_file_mtimes(&issues_dir)?;
    write_cache(&index, &cache_path, &mtimes, env)?;
    Ok(index.issues())
}

fn tag_issue_project(issue: &mut IssueData, root: &Path, project_dir: &Path) {
    let project_path = project_dir
        .strip_prefix(root)
        .unwrap_or(project_dir)
        .to_string_lossy()
        .to_string();
    issue.custom.insert(
        "project_path".to_string(),
        serde_json::Value::String(project_path),
    );
}
