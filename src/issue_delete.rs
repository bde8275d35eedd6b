//! Issue deletion.

use std::path::Path;

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::event_history::{
    create_event, events_dir_for_issue_path, issue_deleted_payload, now_timestamp,
    write_events_batch, EventType,
};
use crate::issue_files::restore_issue_bytes;
use crate::issue_lookup::load_issue_from_project;
use crate::models::IssueData;

/// Unlink an issue file and record the deletion.
pub fn delete_issue(
    root: &Path,
    env: &Environment,
    identifier: &str,
) -> Result<IssueData, KanbusError> {
    let lookup = load_issue_from_project(root, env, identifier)?;
    let prior_bytes = std::fs::read(&lookup.issue_path).map_err(KanbusError::io)?;

    std::fs::remove_file(&lookup.issue_path).map_err(KanbusError::io)?;

    let event = create_event(
        env,
        &lookup.issue.identifier,
        EventType::IssueDeleted,
        &env.current_user(),
        issue_deleted_payload(&lookup.issue),
        &now_timestamp(env),
    );
    let events_dir = events_dir_for_issue_path(&lookup.project_dir, &lookup.issue_path);
    if let Err(error) = write_events_batch(&events_dir, &[event]) {
        restore_issue_bytes(&lookup.issue_path, &prior_bytes)?;
        return Err(error);
    }
    Ok(lookup.issue)
}
