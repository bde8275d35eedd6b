//! Beads JSONL write bridge.
//!
//! Creates append a record; updates rewrite the matching line in place and
//! bump `updated_at`; deletes filter the file and rewrite it. Identifiers
//! follow the peer scheme: `<prefix>-<3-char base36 slug>` for roots,
//! `<parent>.<n+1>` for children.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::ids::format_issue_key;
use crate::migration::{beads_issues_path, load_beads_issue, load_beads_records};
use crate::models::{DependencyLink, IssueData};

const SLUG_ATTEMPTS: usize = 10;

/// Create a Beads issue and append it to `.beads/issues.jsonl`.
#[allow(clippy::too_many_arguments)]
pub fn create_beads_issue(
    root: &Path,
    env: &Environment,
    title: &str,
    issue_type: Option<&str>,
    priority: Option<i64>,
    assignee: Option<&str>,
    parent: Option<&str>,
    description: Option<&str>,
) -> Result<IssueData, KanbusError> {
    let issues_path = beads_issues_path(root)?;
    let records = load_beads_records(&issues_path)?;
    if records.is_empty() {
        return Err(KanbusError::BeadsWriteFailed(
            "no beads issues available".to_string(),
        ));
    }
    let existing_ids = collect_ids(&records);
    if let Some(parent_id) = parent {
        if !existing_ids.contains(parent_id) {
            return Err(KanbusError::NotFound(format!(
                "issue '{parent_id}' not found"
            )));
        }
    }

    let prefix = derive_prefix(&existing_ids)?;
    let identifier = generate_beads_identifier(env, &existing_ids, &prefix, parent)?;

    let created_at = env.now();
    let created_at_text = created_at.to_rfc3339();
    let actor = env.current_user();
    let resolved_type = issue_type.unwrap_or("task");
    let resolved_priority = priority.unwrap_or(2);
    let resolved_description = description.unwrap_or("");

    let mut dependency_values = Vec::new();
    let mut dependency_links = Vec::new();
    if let Some(parent_id) = parent {
        dependency_values.push(json!({
            "issue_id": identifier,
            "depends_on_id": parent_id,
            "type": "parent-child",
            "created_at": created_at_text,
            "created_by": actor,
        }));
        dependency_links.push(DependencyLink {
            target: parent_id.to_string(),
            dependency_type: "parent-child".to_string(),
        });
    }

    let mut record = Map::new();
    record.insert("id".to_string(), json!(identifier));
    record.insert("title".to_string(), json!(title));
    record.insert("description".to_string(), json!(resolved_description));
    record.insert("status".to_string(), json!("open"));
    record.insert("priority".to_string(), json!(resolved_priority));
    record.insert("issue_type".to_string(), json!(resolved_type));
    record.insert("created_at".to_string(), json!(created_at_text));
    record.insert("created_by".to_string(), json!(actor));
    record.insert("updated_at".to_string(), json!(created_at_text));
    record.insert("owner".to_string(), json!(actor));
    if let Some(assignee) = assignee {
        record.insert("assignee".to_string(), json!(assignee));
    }
    if !dependency_values.is_empty() {
        record.insert("dependencies".to_string(), Value::Array(dependency_values));
    }
    record.insert("comments".to_string(), Value::Array(Vec::new()));

    append_record(&issues_path, &Value::Object(record))?;

    Ok(IssueData {
        identifier,
        title: title.to_string(),
        description: resolved_description.to_string(),
        issue_type: resolved_type.to_string(),
        status: "open".to_string(),
        priority: resolved_priority,
        assignee: assignee.map(str::to_string),
        creator: Some(actor),
        parent: parent.map(str::to_string),
        labels: Vec::new(),
        dependencies: dependency_links,
        comments: Vec::new(),
        created_at,
        updated_at: created_at,
        closed_at: None,
        custom: Default::default(),
    })
}

/// Update fields on a Beads issue, rewriting its line in place.
pub fn update_beads_issue(
    root: &Path,
    env: &Environment,
    identifier: &str,
    status: Option<&str>,
    title: Option<&str>,
    description: Option<&str>,
    assignee: Option<&str>,
) -> Result<IssueData, KanbusError> {
    let issues_path = beads_issues_path(root)?;
    let mut records = load_beads_records(&issues_path)?;
    let index = find_record_index(&records, identifier)?;
    let full_id = records[index]["id"]
        .as_str()
        .unwrap_or(identifier)
        .to_string();

    let record = records[index]
        .as_object_mut()
        .ok_or_else(|| KanbusError::BeadsWriteFailed("malformed record".to_string()))?;
    let mut changed = false;
    for (key, value) in [
        ("status", status),
        ("title", title),
        ("description", description),
        ("assignee", assignee),
    ] {
        if let Some(value) = value {
            record.insert(key.to_string(), json!(value));
            changed = true;
        }
    }
    if changed {
        record.insert("updated_at".to_string(), json!(env.now().to_rfc3339()));
        rewrite_records(&issues_path, &records)?;
    }
    load_beads_issue(root, &full_id)
}

/// Append a comment with the next integer id to a Beads issue.
pub fn add_beads_comment(
    root: &Path,
    env: &Environment,
    identifier: &str,
    author: &str,
    text: &str,
) -> Result<IssueData, KanbusError> {
    let issues_path = beads_issues_path(root)?;
    let mut records = load_beads_records(&issues_path)?;
    let index = find_record_index(&records, identifier)?;
    let full_id = records[index]["id"]
        .as_str()
        .unwrap_or(identifier)
        .to_string();
    let now_text = env.now().to_rfc3339();

    let record = records[index]
        .as_object_mut()
        .ok_or_else(|| KanbusError::BeadsWriteFailed("malformed record".to_string()))?;
    let Some(items) = record
        .entry("comments".to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
    else {
        return Err(KanbusError::BeadsWriteFailed("malformed comments".to_string()));
    };
    let next_id = items
        .iter()
        .filter_map(|item| item.get("id"))
        .filter_map(Value::as_i64)
        .max()
        .unwrap_or(0)
        + 1;
    items.push(json!({
        "id": next_id,
        "author": author,
        "text": text,
        "created_at": now_text,
    }));
    record.insert("updated_at".to_string(), json!(now_text));

    rewrite_records(&issues_path, &records)?;
    load_beads_issue(root, &full_id)
}

/// Delete a Beads issue, filtering its line from the file.
pub fn delete_beads_issue(root: &Path, identifier: &str) -> Result<(), KanbusError> {
    let issues_path = beads_issues_path(root)?;
    let records = load_beads_records(&issues_path)?;
    let index = find_record_index(&records, identifier)?;
    let remaining: Vec<Value> = records
        .into_iter()
        .enumerate()
        .filter(|(position, _)| *position != index)
        .map(|(_, record)| record)
        .collect();
    rewrite_records(&issues_path, &remaining)
        .map_err(|error| KanbusError::BeadsDeleteFailed(error.to_string()))
}

/// Locate one record by exact id, display key, or unambiguous prefix.
fn find_record_index(records: &[Value], identifier: &str) -> Result<usize, KanbusError> {
    let mut partial_matches = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let Some(record_id) = record.get("id").and_then(Value::as_str) else {
            continue;
        };
        if record_id == identifier {
            return Ok(index);
        }
        if beads_id_matches(identifier, record_id) {
            partial_matches.push((index, record_id.to_string()));
        }
    }
    match partial_matches.len() {
        0 => Err(KanbusError::NotFound(format!(
            "issue '{identifier}' not found"
        ))),
        1 => Ok(partial_matches[0].0),
        _ => {
            let ids: Vec<String> = partial_matches.into_iter().map(|(_, id)| id).collect();
            Err(KanbusError::AmbiguousShortId(ids.join(", ")))
        }
    }
}

fn beads_id_matches(abbreviated: &str, full_id: &str) -> bool {
    if abbreviated == format_issue_key(full_id, false) {
        return true;
    }
    abbreviated.len() < full_id.len() && full_id.starts_with(abbreviated)
}

fn collect_ids(records: &[Value]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|record| record.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// The record prefix is whatever the existing ids use.
fn derive_prefix(existing_ids: &HashSet<String>) -> Result<String, KanbusError> {
    existing_ids
        .iter()
        .find_map(|identifier| identifier.split_once('-').map(|(prefix, _)| prefix))
        .map(str::to_string)
        .ok_or_else(|| KanbusError::BeadsWriteFailed("invalid beads id".to_string()))
}

fn generate_beads_identifier(
    env: &Environment,
    existing_ids: &HashSet<String>,
    prefix: &str,
    parent: Option<&str>,
) -> Result<String, KanbusError> {
    if let Some(parent_id) = parent {
        return Ok(format!(
            "{parent_id}.{}",
            next_child_suffix(existing_ids, parent_id)
        ));
    }
    for _ in 0..SLUG_ATTEMPTS {
        let identifier = format!("{prefix}-{}", env.next_slug());
        if !existing_ids.contains(&identifier) {
            return Ok(identifier);
        }
    }
    Err(KanbusError::BeadsWriteFailed(format!(
        "unable to generate unique id after {SLUG_ATTEMPTS} attempts"
    )))
}

/// Children are numbered `<parent>.<n>`; the next one is max(n) + 1.
fn next_child_suffix(existing_ids: &HashSet<String>, parent: &str) -> i64 {
    let prefix = format!("{parent}.");
    existing_ids
        .iter()
        .filter_map(|identifier| identifier.strip_prefix(&prefix))
        .filter_map(|suffix| suffix.parse::<i64>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

fn append_record(path: &Path, record: &Value) -> Result<(), KanbusError> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|error| KanbusError::BeadsWriteFailed(error.to_string()))?;
    writeln!(file, "{record}").map_err(|error| KanbusError::BeadsWriteFailed(error.to_string()))
}

fn rewrite_records(path: &Path, records: &[Value]) -> Result<(), KanbusError> {
    let mut lines = String::new();
    for record in records {
        lines.push_str(
            &serde_json::to_string(record)
                .map_err(|error| KanbusError::BeadsWriteFailed(error.to_string()))?,
        );
        lines.push('\n');
    }
    std::fs::write(path, lines).map_err(|error| KanbusError::BeadsWriteFailed(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn env() -> Environment {
        Environment::from_os().with_var("KANBUS_USER", "tester")
    }

    fn seed_epic(root: &Path) {
        let beads_dir = root.join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        let record = json!({
            "id": "bdx-epic",
            "title": "Seed epic",
            "description": "",
            "status": "open",
            "priority": 1,
            "issue_type": "epic",
            "created_at": "2026-03-04T10:00:00Z",
            "updated_at": "2026-03-04T10:00:00Z",
        });
        std::fs::write(
            beads_dir.join("issues.jsonl"),
            format!("{record}\n"),
        )
        .unwrap();
    }

    #[test]
    fn child_of_parent_gets_dotted_suffix() {
        let temp = tempdir().unwrap();
        seed_epic(temp.path());

        let child = create_beads_issue(
            temp.path(),
            &env(),
            "child",
            None,
            None,
            None,
            Some("bdx-epic"),
            None,
        )
        .unwrap();
        assert_eq!(child.identifier, "bdx-epic.1");
        assert_eq!(child.parent.as_deref(), Some("bdx-epic"));

        let grandchild = create_beads_issue(
            temp.path(),
            &env(),
            "second child",
            None,
            None,
            None,
            Some("bdx-epic"),
            None,
        )
        .unwrap();
        assert_eq!(grandchild.identifier, "bdx-epic.2");

        let contents =
            std::fs::read_to_string(temp.path().join(".beads/issues.jsonl")).unwrap();
        assert!(contents.contains("\"parent-child\""));
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn root_issue_uses_slug_from_environment() {
        let temp = tempdir().unwrap();
        seed_epic(temp.path());
        let slugged = env().with_slug_sequence(vec!["a1b".to_string()]);
        let issue =
            create_beads_issue(temp.path(), &slugged, "rooted", None, None, None, None, None)
                .unwrap();
        assert_eq!(issue.identifier, "bdx-a1b");
    }

    #[test]
    fn update_rewrites_line_and_bumps_updated_at() {
        let temp = tempdir().unwrap();
        seed_epic(temp.path());
        let updated = update_beads_issue(
            temp.path(),
            &env(),
            "bdx-epic",
            Some("in_progress"),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(updated.status, "in_progress");
        assert!(updated.updated_at > updated.created_at);

        let contents =
            std::fs::read_to_string(temp.path().join(".beads/issues.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("in_progress"));
    }

    #[test]
    fn comments_get_monotonic_integer_ids() {
        let temp = tempdir().unwrap();
        seed_epic(temp.path());
        add_beads_comment(temp.path(), &env(), "bdx-epic", "a", "first").unwrap();
        let issue = add_beads_comment(temp.path(), &env(), "bdx-epic", "b", "second").unwrap();
        assert_eq!(issue.comments.len(), 2);
        assert_eq!(issue.comments[0].id.as_deref(), Some("1"));
        assert_eq!(issue.comments[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn delete_filters_the_record() {
        let temp = tempdir().unwrap();
        seed_epic(temp.path());
        create_beads_issue(
            temp.path(),
            &env(),
            "child",
            None,
            None,
            None,
            Some("bdx-epic"),
            None,
        )
        .unwrap();

        delete_beads_issue(temp.path(), "bdx-epic.1").unwrap();
        let contents =
            std::fs::read_to_string(temp.path().join(".beads/issues.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 1);

        let error = delete_beads_issue(temp.path(), "bdx-epic.1").unwrap_err();
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn missing_parent_is_not_found() {
        let temp = tempdir().unwrap();
        seed_epic(temp.path());
        let error = create_beads_issue(
            temp.path(),
            &env(),
            "orphan",
            None,
            None,
            None,
            Some("bdx-ghost"),
            None,
        )
        .unwrap_err();
        assert_eq!(error.kind(), "not_found");
    }
}
