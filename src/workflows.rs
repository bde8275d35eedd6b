//! Workflow validation and transition side effects.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::KanbusError;
use crate::models::{IssueData, ProjectConfiguration, WorkflowStates};

/// Workflow for an issue type, falling back to `default`.
pub fn workflow_for_issue_type<'a>(
    configuration: &'a ProjectConfiguration,
    issue_type: &str,
) -> Result<&'a WorkflowStates, KanbusError> {
    if let Some(workflow) = configuration.workflows.get(issue_type) {
        return Ok(workflow);
    }
    configuration.workflows.get("default").ok_or_else(|| {
        KanbusError::ConfigurationInvalid("default workflow not defined".to_string())
    })
}

/// Every status reachable through the type's workflow (froms and tos).
pub fn reachable_statuses(
    configuration: &ProjectConfiguration,
    issue_type: &str,
) -> Result<BTreeSet<String>, KanbusError> {
    let workflow = workflow_for_issue_type(configuration, issue_type)?;
    let mut statuses: BTreeSet<String> = workflow.keys().cloned().collect();
    for transitions in workflow.values() {
        statuses.extend(transitions.iter().cloned());
    }
    Ok(statuses)
}

/// Validate that `status` exists in the type's workflow at all.
pub fn validate_status_value(
    configuration: &ProjectConfiguration,
    issue_type: &str,
    status: &str,
) -> Result<(), KanbusError> {
    if !reachable_statuses(configuration, issue_type)?.contains(status) {
        return Err(KanbusError::InvalidStatus {
            status: status.to_string(),
            issue_type: issue_type.to_string(),
        });
    }
    Ok(())
}

/// Validate that the workflow allows moving `from` -> `to`.
pub fn validate_status_transition(
    configuration: &ProjectConfiguration,
    issue_type: &str,
    from: &str,
    to: &str,
) -> Result<(), KanbusError> {
    let workflow = workflow_for_issue_type(configuration, issue_type)?;
    let allowed = workflow.get(from).map(Vec::as_slice).unwrap_or(&[]);
    if !allowed.iter().any(|status| status == to) {
        return Err(KanbusError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            issue_type: issue_type.to_string(),
        });
    }
    Ok(())
}

/// Apply transition side effects: closing stamps `closed_at`, leaving
/// closed clears it.
pub fn apply_transition_side_effects(
    issue: &mut IssueData,
    new_status: &str,
    now: DateTime<Utc>,
) {
    if new_status == "closed" {
        issue.closed_at = Some(now);
    } else if issue.status == "closed" {
        issue.closed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_project_configuration;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn sample_issue(status: &str) -> IssueData {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        IssueData {
            identifier: "kbs-a".to_string(),
            title: "Title".to_string(),
            description: String::new(),
            issue_type: "task".to_string(),
            status: status.to_string(),
            priority: 2,
            assignee: None,
            creator: None,
            parent: None,
            labels: Vec::new(),
            dependencies: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            custom: BTreeMap::new(),
        }
    }

    #[test]
    fn type_workflow_wins_over_default() {
        let configuration = default_project_configuration();
        let epic = workflow_for_issue_type(&configuration, "epic").unwrap();
        assert!(!epic.contains_key("deferred"));
        let task = workflow_for_issue_type(&configuration, "task").unwrap();
        assert!(task.contains_key("deferred"));
    }

    #[test]
    fn disallowed_transition_is_rejected() {
        let configuration = default_project_configuration();
        let error =
            validate_status_transition(&configuration, "task", "open", "blocked").unwrap_err();
        assert_eq!(error.kind(), "invalid_transition");
        validate_status_transition(&configuration, "task", "open", "in_progress").unwrap();
    }

    #[test]
    fn closing_twice_is_an_invalid_transition() {
        let configuration = default_project_configuration();
        let error =
            validate_status_transition(&configuration, "task", "closed", "closed").unwrap_err();
        assert_eq!(error.kind(), "invalid_transition");
    }

    #[test]
    fn close_sets_and_reopen_clears_closed_at() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap();
        let mut issue = sample_issue("in_progress");
        apply_transition_side_effects(&mut issue, "closed", now);
        assert_eq!(issue.closed_at, Some(now));

        issue.status = "closed".to_string();
        apply_transition_side_effects(&mut issue, "open", now);
        assert_eq!(issue.closed_at, None);
    }

    #[test]
    fn unknown_status_value_is_rejected() {
        let configuration = default_project_configuration();
        let error = validate_status_value(&configuration, "task", "parked").unwrap_err();
        assert_eq!(error.kind(), "invalid_status");
    }

    #[test]
    fn missing_workflow_and_default_is_a_configuration_error() {
        let mut configuration = default_project_configuration();
        configuration.workflows.clear();
        let error = workflow_for_issue_type(&configuration, "task").unwrap_err();
        assert_eq!(error.kind(), "configuration_invalid");
    }
}
