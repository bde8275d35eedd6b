//! Issue updates.

use std::path::Path;

use crate::config_loader::load_project_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::event_history::{build_update_events, now_timestamp, write_events_batch};
use crate::event_history::events_dir_for_issue_path;
use crate::hierarchy::validate_parent_child_relationship;
use crate::issue_creation::reject_duplicate_title;
use crate::issue_files::{restore_issue_bytes, write_issue_to_file};
use crate::issue_lookup::load_issue_from_project;
use crate::models::IssueData;
use crate::project::get_configuration_path;
use crate::workflows::{
    apply_transition_side_effects, validate_status_transition, validate_status_value,
};

/// Field changes requested for one issue.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<i64>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub set_labels: Option<Vec<String>>,
    pub parent: Option<String>,
    pub claim: bool,
    pub validate: bool,
}

/// Apply an update to an issue and persist it.
///
/// Requests that de-duplicate to nothing (every field already holds the
/// requested value) return the unchanged issue without touching the file.
pub fn update_issue(
    root: &Path,
    env: &Environment,
    identifier: &str,
    request: &IssueUpdateRequest,
) -> Result<IssueData, KanbusError> {
    let lookup = load_issue_from_project(root, env, identifier)?;
    let configuration =
        load_project_configuration(&get_configuration_path(&lookup.project_dir, env)?)?;
    let before = lookup.issue.clone();
    let mut issue = lookup.issue;
    let now = env.now();

    // A status request is always a transition, validated even when it names
    // the current status; closing a closed issue reports closed -> closed.
    let mut target_status = request.status.clone();
    let mut target_assignee = request.assignee.clone();
    if request.claim {
        target_status.get_or_insert_with(|| "in_progress".to_string());
        target_assignee.get_or_insert_with(|| env.current_user());
    }

    if let Some(new_title) = request.title.as_deref() {
        let trimmed = new_title.trim();
        if trimmed.to_lowercase() != issue.title.trim().to_lowercase() {
            if request.validate {
                let issues_dir = lookup
                    .issue_path
                    .parent()
                    .unwrap_or(Path::new("."))
                    .to_path_buf();
                reject_duplicate_title(&issues_dir, trimmed, Some(&issue.identifier))?;
            }
            issue.title = trimmed.to_string();
        } else if trimmed != issue.title {
            // Same title modulo case; keep the user's spelling.
            issue.title = trimmed.to_string();
        }
    }

    if let Some(new_description) = request.description.as_deref() {
        if new_description != issue.description {
            issue.description = new_description.to_string();
        }
    }

    if let Some(new_assignee) = target_assignee {
        if issue.assignee.as_deref() != Some(new_assignee.as_str()) {
            issue.assignee = Some(new_assignee);
        }
    }

    if let Some(new_priority) = request.priority {
        if request.validate && !configuration.has_priority(new_priority) {
            return Err(KanbusError::InvalidPriority(new_priority));
        }
        issue.priority = new_priority;
    }

    apply_label_changes(&mut issue, request);

    if let Some(parent_candidate) = request.parent.as_deref() {
        let parent_lookup = load_issue_from_project(root, env, parent_candidate)?;
        if issue.parent.as_deref() != Some(parent_lookup.issue.identifier.as_str()) {
            if request.validate {
                validate_parent_child_relationship(
                    &configuration,
                    &parent_lookup.issue.issue_type,
                    &issue.issue_type,
                )?;
            }
            issue.parent = Some(parent_lookup.issue.identifier);
        }
    }

    if let Some(new_status) = target_status.as_deref() {
        if request.validate {
            validate_status_value(&configuration, &issue.issue_type, new_status)?;
            validate_status_transition(&configuration, &issue.issue_type, &issue.status, new_status)?;
        }
        apply_transition_side_effects(&mut issue, new_status, now);
        issue.status = new_status.to_string();
    }

    if fields_equal(&before, &issue) {
        return Ok(before);
    }
    issue.updated_at = now;

    let prior_bytes = serde_json::to_vec_pretty(&before).map_err(KanbusError::io)?;
    write_issue_to_file(&issue, &lookup.issue_path)?;

    let events = build_update_events(
        env,
        &before,
        &issue,
        &env.current_user(),
        &now_timestamp(env),
    );
    let events_dir = events_dir_for_issue_path(&lookup.project_dir, &lookup.issue_path);
    if let Err(error) = write_events_batch(&events_dir, &events) {
        restore_issue_bytes(&lookup.issue_path, &prior_bytes)?;
        return Err(error);
    }

    Ok(issue)
}

fn apply_label_changes(issue: &mut IssueData, request: &IssueUpdateRequest) {
    let mut labels = match &request.set_labels {
        Some(values) => values
            .iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect(),
        None => issue.labels.clone(),
    };
    for label in &request.add_labels {
        let trimmed = label.trim();
        if !trimmed.is_empty() && !labels.iter().any(|entry| entry.eq_ignore_ascii_case(trimmed)) {
            labels.push(trimmed.to_string());
        }
    }
    if !request.remove_labels.is_empty() {
        labels.retain(|entry| {
            !request
                .remove_labels
                .iter()
                .any(|removal| entry.eq_ignore_ascii_case(removal.trim()))
        });
    }
    issue.labels = labels;
}

/// Compare everything except `updated_at`, which only moves when something
/// else did.
fn fields_equal(before: &IssueData, after: &IssueData) -> bool {
    let mut normalized = after.clone();
    normalized.updated_at = before.updated_at;
    &normalized == before
}
