//! Issue creation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config_loader::load_project_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::event_history::{
    create_event, events_dir_for_issue_path, issue_created_payload, now_timestamp,
    write_events_batch, EventType,
};
use crate::hierarchy::validate_parent_child_relationship;
use crate::ids::generate_issue_identifier;
use crate::issue_files::{
    issue_path_for_identifier, list_issue_identifiers, read_issue_from_file, write_issue_to_file,
};
use crate::issue_lookup::load_issue_from_project;
use crate::models::{IssueData, ProjectConfiguration};
use crate::project::{
    ensure_project_local_directory, find_project_local_directory, get_configuration_path,
    load_project_directory,
};

const DEFAULT_ISSUE_TYPE: &str = "task";

/// Request payload for issue creation.
#[derive(Debug, Clone)]
pub struct IssueCreationRequest {
    pub root: PathBuf,
    pub title: String,
    pub issue_type: Option<String>,
    pub priority: Option<i64>,
    pub assignee: Option<String>,
    pub parent: Option<String>,
    pub labels: Vec<String>,
    pub description: Option<String>,
    pub local: bool,
    pub validate: bool,
}

/// A created issue plus the configuration it was validated against.
#[derive(Debug)]
pub struct IssueCreationResult {
    pub issue: IssueData,
    pub configuration: ProjectConfiguration,
}

/// Create a new issue and write it to the shared or local scope.
pub fn create_issue(
    request: &IssueCreationRequest,
    env: &Environment,
) -> Result<IssueCreationResult, KanbusError> {
    let project_dir = load_project_directory(&request.root, env)?;
    let configuration =
        load_project_configuration(&get_configuration_path(&project_dir, env)?)?;

    let issue_type = request
        .issue_type
        .clone()
        .unwrap_or_else(|| DEFAULT_ISSUE_TYPE.to_string());
    let priority = request
        .priority
        .unwrap_or(i64::from(configuration.default_priority));
    let assignee = request
        .assignee
        .clone()
        .or_else(|| configuration.assignee.clone());

    if request.validate {
        if !configuration.has_issue_type(&issue_type) {
            return Err(KanbusError::UnknownIssueType(issue_type));
        }
        if !configuration.has_priority(priority) {
            return Err(KanbusError::InvalidPriority(priority));
        }
    }

    let scope_dir = if request.local {
        ensure_project_local_directory(&project_dir)?
    } else {
        project_dir.clone()
    };
    let issues_dir = scope_dir.join("issues");
    std::fs::create_dir_all(&issues_dir).map_err(KanbusError::io)?;

    let parent = match request.parent.as_deref() {
        Some(parent_identifier) => {
            let parent_lookup = load_issue_from_project(&request.root, env, parent_identifier)?;
            if request.validate {
                validate_parent_child_relationship(
                    &configuration,
                    &parent_lookup.issue.issue_type,
                    &issue_type,
                )?;
            }
            Some(parent_lookup.issue.identifier)
        }
        None => None,
    };

    if request.validate {
        reject_duplicate_title(&issues_dir, &request.title, None)?;
    }

    let existing_ids = collect_existing_identifiers(&project_dir, &issues_dir)?;
    let identifier = generate_issue_identifier(env, &configuration.project_key, &existing_ids)?;

    let now = env.now();
    let issue = IssueData {
        identifier,
        title: request.title.trim().to_string(),
        description: request.description.clone().unwrap_or_default(),
        issue_type,
        status: configuration.initial_status.clone(),
        priority,
        assignee,
        creator: Some(env.current_user()),
        parent,
        labels: request.labels.clone(),
        dependencies: Vec::new(),
        comments: Vec::new(),
        created_at: now,
        updated_at: now,
        closed_at: None,
        custom: BTreeMap::new(),
    };

    let issue_path = issue_path_for_identifier(&issues_dir, &issue.identifier);
    write_issue_to_file(&issue, &issue_path)?;

    let event = create_event(
        env,
        &issue.identifier,
        EventType::IssueCreated,
        &env.current_user(),
        issue_created_payload(&issue),
        &now_timestamp(env),
    );
    let events_dir = events_dir_for_issue_path(&project_dir, &issue_path);
    if let Err(error) = write_events_batch(&events_dir, &[event]) {
        let _ = std::fs::remove_file(&issue_path);
        return Err(error);
    }

    Ok(IssueCreationResult {
        issue,
        configuration,
    })
}

/// Identifiers already taken across both scopes; promote/localize move files
/// between scopes, so both count.
fn collect_existing_identifiers(
    project_dir: &Path,
    target_issues_dir: &Path,
) -> Result<HashSet<String>, KanbusError> {
    let mut identifiers = list_issue_identifiers(target_issues_dir)?;
    let shared_issues = project_dir.join("issues");
    if shared_issues.is_dir() && shared_issues != target_issues_dir {
        identifiers.extend(list_issue_identifiers(&shared_issues)?);
    }
    if let Some(local_dir) = find_project_local_directory(project_dir) {
        let local_issues = local_dir.join("issues");
        if local_issues.is_dir() && local_issues != target_issues_dir {
            identifiers.extend(list_issue_identifiers(&local_issues)?);
        }
    }
    Ok(identifiers)
}

/// Reject a title that case-folds equal to an existing one in this scope.
pub fn reject_duplicate_title(
    issues_dir: &Path,
    title: &str,
    exclude_identifier: Option<&str>,
) -> Result<(), KanbusError> {
    let normalized = title.trim().to_lowercase();
    if !issues_dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(issues_dir).map_err(KanbusError::io)? {
        let entry = entry.map_err(KanbusError::io)?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Ok(existing) = read_issue_from_file(&path) else {
            continue;
        };
        if Some(existing.identifier.as_str()) == exclude_identifier {
            continue;
        }
        if existing.title.trim().to_lowercase() == normalized {
            return Err(KanbusError::DuplicateTitle {
                title: title.trim().to_string(),
                existing: existing.identifier,
            });
        }
    }
    Ok(())
}
