//! Append-only event log.
//!
//! Each mutation appends one event file per record under the scope's
//! `events/` directory. Batch writes are all-or-nothing: if any member
//! fails, already-renamed files are unlinked and the caller restores its
//! primary artifact.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::models::IssueData;
use crate::project::find_project_local_directory;

pub const EVENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IssueCreated,
    IssueDeleted,
    StateTransition,
    FieldUpdated,
    CommentAdded,
    CommentUpdated,
    CommentDeleted,
    DependencyAdded,
    DependencyRemoved,
    IssuePromoted,
    IssueLocalized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub schema_version: u32,
    pub event_id: String,
    pub issue_id: String,
    pub event_type: EventType,
    pub occurred_at: String,
    pub actor_id: String,
    pub payload: Value,
}

/// Build an event with a fresh id from the environment's UUID source.
pub fn create_event(
    env: &Environment,
    issue_id: &str,
    event_type: EventType,
    actor_id: &str,
    payload: Value,
    occurred_at: &str,
) -> EventRecord {
    EventRecord {
        schema_version: EVENT_SCHEMA_VERSION,
        event_id: env.next_uuid().to_string(),
        issue_id: issue_id.to_string(),
        event_type,
        occurred_at: occurred_at.to_string(),
        actor_id: actor_id.to_string(),
        payload,
    }
}

/// Millisecond-precision UTC timestamp with `Z` suffix; ordering event
/// files by name orders them by time.
pub fn now_timestamp(env: &Environment) -> String {
    env.now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn event_filename(occurred_at: &str, event_id: &str) -> String {
    format!("{occurred_at}__{event_id}.json")
}

pub fn events_dir_for_project(project_dir: &Path) -> PathBuf {
    project_dir.join("events")
}

/// Events directory matching the scope an issue file lives in.
pub fn events_dir_for_issue_path(project_dir: &Path, issue_path: &Path) -> PathBuf {
    if let Some(local_dir) = find_project_local_directory(project_dir) {
        if issue_path.starts_with(&local_dir) {
            return local_dir.join("events");
        }
    }
    events_dir_for_project(project_dir)
}

/// Write a batch of events atomically-per-file with rollback on failure.
pub fn write_events_batch(
    events_dir: &Path,
    events: &[EventRecord],
) -> Result<Vec<PathBuf>, KanbusError> {
    if events.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(events_dir).map_err(KanbusError::io)?;
    let mut written = Vec::new();
    for event in events {
        let filename = event_filename(&event.occurred_at, &event.event_id);
        let final_path = events_dir.join(&filename);
        let temp_path = events_dir.join(format!(".{filename}.tmp"));
        let result = (|| {
            let payload = serde_json::to_string_pretty(event).map_err(KanbusError::io)?;
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .map_err(KanbusError::io)?;
            file.write_all(payload.as_bytes()).map_err(KanbusError::io)?;
            file.flush().map_err(KanbusError::io)?;
            fs::rename(&temp_path, &final_path).map_err(KanbusError::io)?;
            Ok(final_path)
        })();
        match result {
            Ok(path) => written.push(path),
            Err(error) => {
                let _ = fs::remove_file(&temp_path);
                for path in &written {
                    let _ = fs::remove_file(path);
                }
                return Err(error);
            }
        }
    }
    Ok(written)
}

pub fn issue_created_payload(issue: &IssueData) -> Value {
    json!({
        "title": issue.title,
        "description": issue.description,
        "issue_type": issue.issue_type,
        "status": issue.status,
        "priority": issue.priority,
        "assignee": issue.assignee,
        "parent": issue.parent,
        "labels": issue.labels,
    })
}

pub fn issue_deleted_payload(issue: &IssueData) -> Value {
    json!({
        "title": issue.title,
        "issue_type": issue.issue_type,
        "status": issue.status,
    })
}

pub fn state_transition_payload(from_status: &str, to_status: &str) -> Value {
    json!({ "from_status": from_status, "to_status": to_status })
}

pub fn comment_payload(comment_id: &str, comment_author: &str) -> Value {
    json!({ "comment_id": comment_id, "comment_author": comment_author })
}

pub fn comment_updated_payload(comment_id: &str, comment_author: &str) -> Value {
    json!({
        "comment_id": comment_id,
        "comment_author": comment_author,
        "changed_fields": ["text"],
    })
}

pub fn dependency_payload(dependency_type: &str, target_id: &str) -> Value {
    json!({ "dependency_type": dependency_type, "target_id": target_id })
}

pub fn transfer_payload(from_location: &str, to_location: &str) -> Value {
    json!({ "from_location": from_location, "to_location": to_location })
}

/// Diff two issue revisions into a `field_updated` payload; `None` when no
/// tracked field changed.
pub fn field_update_payload(before: &IssueData, after: &IssueData) -> Option<Value> {
    let mut changes = Map::new();
    push_change(&mut changes, "title", json!(before.title), json!(after.title));
    push_change(
        &mut changes,
        "description",
        json!(before.description),
        json!(after.description),
    );
    push_change(
        &mut changes,
        "assignee",
        json!(before.assignee),
        json!(after.assignee),
    );
    push_change(
        &mut changes,
        "priority",
        json!(before.priority),
        json!(after.priority),
    );
    push_change(&mut changes, "labels", json!(before.labels), json!(after.labels));
    push_change(&mut changes, "parent", json!(before.parent), json!(after.parent));
    if changes.is_empty() {
        None
    } else {
        Some(json!({ "changes": changes }))
    }
}

fn push_change(changes: &mut Map<String, Value>, field: &str, from: Value, to: Value) {
    if from != to {
        changes.insert(field.to_string(), json!({ "from": from, "to": to }));
    }
}

/// Events produced by an update: a state transition when the status moved,
/// plus one field_updated record covering everything else.
pub fn build_update_events(
    env: &Environment,
    before: &IssueData,
    after: &IssueData,
    actor_id: &str,
    occurred_at: &str,
) -> Vec<EventRecord> {
    let mut events = Vec::new();
    if before.status != after.status {
        events.push(create_event(
            env,
            &after.identifier,
            EventType::StateTransition,
            actor_id,
            state_transition_payload(&before.status, &after.status),
            occurred_at,
        ));
    }
    if let Some(payload) = field_update_payload(before, after) {
        events.push(create_event(
            env,
            &after.identifier,
            EventType::FieldUpdated,
            actor_id,
            payload,
            occurred_at,
        ));
    }
    events
}
