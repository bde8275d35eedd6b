//! Project validation sweep and statistics.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config_loader::load_project_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::hierarchy::validate_parent_child_relationship;
use crate::models::IssueData;
use crate::project::{get_configuration_path, load_project_directory};
use crate::workflows::reachable_statuses;

const ALLOWED_DEPENDENCY_TYPES: [&str; 2] = ["blocked-by", "relates-to"];

/// Aggregate issue statistics for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStats {
    pub total: usize,
    pub open_count: usize,
    pub closed_count: usize,
    pub type_counts: BTreeMap<String, usize>,
}

/// Validate every issue file against the configuration and the referential
/// invariants. All findings are collected before failing.
pub fn validate_project(root: &Path, env: &Environment) -> Result<(), KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    let issues_dir = project_dir.join("issues");
    if !issues_dir.exists() {
        return Err(KanbusError::ProjectNotInitialized);
    }
    let configuration = load_project_configuration(&get_configuration_path(&project_dir, env)?)?;

    let mut errors: Vec<String> = Vec::new();
    let mut issues: BTreeMap<String, IssueData> = BTreeMap::new();
    let mut titles: BTreeMap<String, String> = BTreeMap::new();

    let mut paths: Vec<_> = fs::read_dir(&issues_dir)
        .map_err(KanbusError::io)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();

    for path in paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string();
        let issue: IssueData = match fs::read_to_string(&path)
            .map_err(KanbusError::io)
            .and_then(|contents| {
                serde_json::from_str(&contents)
                    .map_err(|error| KanbusError::InvalidIssueData(error.to_string()))
            }) {
            Ok(issue) => issue,
            Err(error) => {
                errors.push(format!("{filename}: {error}"));
                continue;
            }
        };

        if issues.contains_key(&issue.identifier) {
            errors.push(format!("{filename}: duplicate issue id '{}'", issue.identifier));
            continue;
        }
        validate_issue_fields(&filename, &issue, &configuration, &mut errors);

        let folded_title = issue.title.trim().to_lowercase();
        if let Some(existing) = titles.get(&folded_title) {
            errors.push(format!(
                "{filename}: duplicate title also used by '{existing}'"
            ));
        } else {
            titles.insert(folded_title, issue.identifier.clone());
        }
        issues.insert(issue.identifier.clone(), issue);
    }

    validate_references(&issues, &configuration, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(KanbusError::InvalidIssueData(format!(
            "validation failed:\n{}",
            errors.join("\n")
        )))
    }
}

/// Count issues by open/closed and by type.
pub fn collect_project_stats(root: &Path, env: &Environment) -> Result<ProjectStats, KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    let issues_dir = project_dir.join("issues");
    if !issues_dir.exists() {
        return Err(KanbusError::ProjectNotInitialized);
    }
    let issues = crate::issue_files::load_issues_from_directory(&issues_dir)?;

    let total = issues.len();
    let closed_count = issues
        .iter()
        .filter(|issue| issue.status == "closed")
        .count();
    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
    for issue in &issues {
        *type_counts.entry(issue.issue_type.clone()).or_insert(0) += 1;
    }
    Ok(ProjectStats {
        total,
        open_count: total - closed_count,
        closed_count,
        type_counts,
    })
}

fn validate_issue_fields(
    filename: &str,
    issue: &IssueData,
    configuration: &crate::models::ProjectConfiguration,
    errors: &mut Vec<String>,
) {
    let expected_id = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);
    if issue.identifier != expected_id {
        errors.push(format!(
            "{filename}: issue id '{}' does not match filename",
            issue.identifier
        ));
    }

    if !configuration.has_issue_type(&issue.issue_type) {
        errors.push(format!("{filename}: unknown issue type '{}'", issue.issue_type));
    }
    if !configuration.has_priority(issue.priority) {
        errors.push(format!("{filename}: invalid priority '{}'", issue.priority));
    }
    if let Ok(statuses) = reachable_statuses(configuration, &issue.issue_type) {
        if !statuses.contains(&issue.status) {
            errors.push(format!("{filename}: invalid status '{}'", issue.status));
        }
    }

    if issue.status == "closed" && issue.closed_at.is_none() {
        errors.push(format!("{filename}: closed issues must have closed_at set"));
    }
    if issue.status != "closed" && issue.closed_at.is_some() {
        errors.push(format!("{filename}: non-closed issues must not set closed_at"));
    }

    for dependency in &issue.dependencies {
        if !ALLOWED_DEPENDENCY_TYPES.contains(&dependency.dependency_type.as_str()) {
            errors.push(format!(
                "{filename}: invalid dependency type '{}'",
                dependency.dependency_type
            ));
        }
    }
}

fn validate_references(
    issues: &BTreeMap<String, IssueData>,
    configuration: &crate::models::ProjectConfiguration,
    errors: &mut Vec<String>,
) {
    for issue in issues.values() {
        if let Some(parent_id) = &issue.parent {
            match issues.get(parent_id) {
                Some(parent_issue) => {
                    if let Err(error) = validate_parent_child_relationship(
                        configuration,
                        &parent_issue.issue_type,
                        &issue.issue_type,
                    ) {
                        errors.push(format!("{}: {}", issue.identifier, error));
                    }
                }
                None => errors.push(format!(
                    "{}: parent '{parent_id}' does not exist",
                    issue.identifier
                )),
            }
        }
        for dependency in &issue.dependencies {
            if !issues.contains_key(&dependency.target) {
                errors.push(format!(
                    "{}: dependency target '{}' does not exist",
                    issue.identifier, dependency.target
                ));
            }
        }
    }
}
