//! Beads JSONL read bridge and one-shot migration.
//!
//! `.beads/issues.jsonl` holds one issue per line in the peer system's
//! shape. Reads convert records into native issues: issue-type aliases are
//! mapped, the first `parent-child` dependency becomes `parent` (extras are
//! reported and dropped), and hierarchy violations downgrade to a stderr
//! suggestion with the parent link stripped. The foreign repository has no
//! `.kanbus.yml`, so a permissive configuration is synthesized from the
//! records themselves.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config_loader::load_project_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::file_io::{ensure_git_repository, initialize_project};
use crate::hierarchy::validate_parent_child_relationship;
use crate::issue_files::{issue_path_for_identifier, write_issue_to_file};
use crate::models::{
    CategoryDefinition, DependencyLink, IssueComment, IssueData, PriorityDefinition,
    ProjectConfiguration, StatusDefinition,
};
use crate::project::{discover_project_directories, get_configuration_path};
use crate::workflows::reachable_statuses;

/// Issue-type aliases the peer system uses.
fn canonical_issue_type(issue_type: &str) -> &str {
    match issue_type {
        "feature" => "story",
        "message" => "task",
        other => other,
    }
}

/// Load every Beads issue as a native model, without migrating anything.
pub fn load_beads_issues(root: &Path) -> Result<Vec<IssueData>, KanbusError> {
    let records = load_beads_records(&beads_issues_path(root)?)?;
    let configuration = synthesize_beads_configuration(&records);
    let record_by_id = index_records(&records)?;
    records
        .iter()
        .map(|record| convert_record(record, &record_by_id, &configuration))
        .collect()
}

/// Load a single Beads issue by exact identifier.
pub fn load_beads_issue(root: &Path, identifier: &str) -> Result<IssueData, KanbusError> {
    load_beads_issues(root)?
        .into_iter()
        .find(|issue| issue.identifier == identifier)
        .ok_or_else(|| KanbusError::NotFound(format!("issue '{identifier}' not found")))
}

/// Result of a migration run.
#[derive(Debug, Clone, Copy)]
pub struct MigrationResult {
    pub issue_count: usize,
}

/// Import `.beads/issues.jsonl` into a freshly initialized native project.
pub fn migrate_from_beads(root: &Path, env: &Environment) -> Result<MigrationResult, KanbusError> {
    ensure_git_repository(root).map_err(|error| KanbusError::MigrationFailed(error.to_string()))?;
    let issues_path = beads_issues_path(root)?;

    if !discover_project_directories(root, env)
        .unwrap_or_default()
        .is_empty()
    {
        return Err(KanbusError::MigrationFailed(
            "already initialized".to_string(),
        ));
    }

    initialize_project(root, false)
        .map_err(|error| KanbusError::MigrationFailed(error.to_string()))?;
    let configuration = load_project_configuration(&get_configuration_path(root, env)?)?;

    let records = load_beads_records(&issues_path)?;
    let record_by_id = index_records(&records)?;
    let issues_dir = root.join("project").join("issues");
    for record in &records {
        let issue = convert_record(record, &record_by_id, &configuration)
            .map_err(|error| KanbusError::MigrationFailed(error.to_string()))?;
        write_issue_to_file(&issue, &issue_path_for_identifier(&issues_dir, &issue.identifier))?;
    }
    Ok(MigrationResult {
        issue_count: records.len(),
    })
}

pub(crate) fn beads_issues_path(root: &Path) -> Result<std::path::PathBuf, KanbusError> {
    let beads_dir = root.join(".beads");
    if !beads_dir.exists() {
        return Err(KanbusError::MigrationFailed("no .beads directory".to_string()));
    }
    let issues_path = beads_dir.join("issues.jsonl");
    if !issues_path.exists() {
        return Err(KanbusError::MigrationFailed("no issues.jsonl".to_string()));
    }
    Ok(issues_path)
}

pub(crate) fn load_beads_records(issues_path: &Path) -> Result<Vec<Value>, KanbusError> {
    let contents = std::fs::read_to_string(issues_path).map_err(KanbusError::io)?;
    let mut records = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(line)
            .map_err(|error| KanbusError::MigrationFailed(format!("invalid record: {error}")))?;
        if record.get("id").and_then(Value::as_str).is_none() {
            return Err(KanbusError::MigrationFailed("missing id".to_string()));
        }
        records.push(record);
    }
    Ok(records)
}

fn index_records(records: &[Value]) -> Result<HashMap<String, &Value>, KanbusError> {
    let mut by_id = HashMap::new();
    for record in records {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| KanbusError::MigrationFailed("missing id".to_string()))?;
        by_id.insert(id.to_string(), record);
    }
    Ok(by_id)
}

/// Build a configuration that accepts whatever the records contain:
/// every seen status is reachable from every other, every seen priority is
/// declared.
pub(crate) fn synthesize_beads_configuration(records: &[Value]) -> ProjectConfiguration {
    let mut statuses: Vec<String> = vec![
        "open".to_string(),
        "in_progress".to_string(),
        "blocked".to_string(),
        "deferred".to_string(),
        "closed".to_string(),
    ];
    for record in records {
        if let Some(status) = record.get("status").and_then(Value::as_str) {
            if !statuses.iter().any(|entry| entry == status) {
                statuses.push(status.to_string());
            }
        }
    }

    let hierarchy = vec!["epic".to_string(), "task".to_string(), "sub-task".to_string()];
    let mut types: Vec<String> = vec!["bug".to_string(), "story".to_string(), "chore".to_string()];
    for record in records {
        if let Some(issue_type) = record.get("issue_type").and_then(Value::as_str) {
            let canonical = canonical_issue_type(issue_type).to_string();
            if !hierarchy.contains(&canonical) && !types.contains(&canonical) {
                types.push(canonical);
            }
        }
    }

    let everywhere: BTreeMap<String, Vec<String>> = statuses
        .iter()
        .map(|status| (status.clone(), statuses.clone()))
        .collect();
    let workflows = BTreeMap::from([("default".to_string(), everywhere)]);

    let mut priorities: BTreeMap<u8, PriorityDefinition> = (0..=4)
        .map(|value| {
            (
                value,
                PriorityDefinition {
                    name: format!("P{value}"),
                    color: None,
                },
            )
        })
        .collect();
    for record in records {
        if let Some(priority) = record.get("priority").and_then(Value::as_i64) {
            if let Ok(key) = u8::try_from(priority) {
                priorities.entry(key).or_insert(PriorityDefinition {
                    name: format!("P{key}"),
                    color: None,
                });
            }
        }
    }

    let status_definitions = statuses
        .iter()
        .map(|status| StatusDefinition {
            key: status.clone(),
            name: status.clone(),
            category: "All".to_string(),
            color: None,
            collapsed: false,
        })
        .collect();

    ProjectConfiguration {
        project_directory: "project".to_string(),
        project_key: "bd".to_string(),
        hierarchy,
        types,
        workflows,
        transition_labels: BTreeMap::new(),
        initial_status: "open".to_string(),
        priorities,
        default_priority: 2,
        assignee: None,
        time_zone: None,
        statuses: status_definitions,
        categories: vec![CategoryDefinition {
            name: "All".to_string(),
            color: None,
        }],
        type_colors: BTreeMap::new(),
        virtual_projects: BTreeMap::new(),
        ignore_paths: Vec::new(),
        beads_compatibility: true,
    }
}

fn convert_record(
    record: &Value,
    record_by_id: &HashMap<String, &Value>,
    configuration: &ProjectConfiguration,
) -> Result<IssueData, KanbusError> {
    let identifier = required_str(record, "id")?;
    let title = required_str(record, "title")?;
    let raw_type = required_str(record, "issue_type")?;
    let issue_type = canonical_issue_type(&raw_type).to_string();
    if !configuration.has_issue_type(&issue_type) {
        return Err(KanbusError::UnknownIssueType(issue_type));
    }

    let status = required_str(record, "status")?;
    if !reachable_statuses(configuration, &issue_type)?.contains(&status) {
        return Err(KanbusError::InvalidStatus { status, issue_type });
    }

    let priority = record
        .get("priority")
        .and_then(Value::as_i64)
        .ok_or_else(|| KanbusError::MigrationFailed("priority is required".to_string()))?;
    if !configuration.has_priority(priority) {
        return Err(KanbusError::InvalidPriority(priority));
    }

    let created_at = parse_beads_timestamp(record.get("created_at"), "created_at")?;
    let updated_at = parse_beads_timestamp(record.get("updated_at"), "updated_at")?;
    let closed_at = match record.get("closed_at") {
        Some(value) if !value.is_null() => Some(parse_beads_timestamp(Some(value), "closed_at")?),
        _ => None,
    };

    let (parent, dependencies) = convert_dependencies(
        record.get("dependencies"),
        &identifier,
        &issue_type,
        record_by_id,
        configuration,
    )?;

    let comments = record
        .get("comments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(convert_comment)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    let labels = record
        .get("labels")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut custom = BTreeMap::new();
    for (source_key, custom_key) in [
        ("owner", "beads_owner"),
        ("notes", "beads_notes"),
        ("acceptance_criteria", "beads_acceptance_criteria"),
        ("close_reason", "beads_close_reason"),
    ] {
        if let Some(value) = record.get(source_key) {
            if !value.is_null() && value != &Value::String(String::new()) {
                custom.insert(custom_key.to_string(), value.clone());
            }
        }
    }
    if issue_type != raw_type {
        custom.insert("beads_issue_type".to_string(), Value::String(raw_type));
    }

    Ok(IssueData {
        identifier,
        title,
        description: record
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        issue_type,
        status,
        priority,
        assignee: optional_str(record, "assignee"),
        creator: optional_str(record, "created_by"),
        parent,
        labels,
        dependencies,
        comments,
        created_at,
        updated_at,
        closed_at,
        custom,
    })
}

/// Fold `parent-child` links into `parent`. The first one wins; extras are
/// reported to stderr and dropped, matching the peer system's tolerant
/// reader. A parent that violates the hierarchy is stripped with a
/// suggestion instead of failing the whole read.
fn convert_dependencies(
    dependencies: Option<&Value>,
    identifier: &str,
    issue_type: &str,
    record_by_id: &HashMap<String, &Value>,
    configuration: &ProjectConfiguration,
) -> Result<(Option<String>, Vec<DependencyLink>), KanbusError> {
    let mut parent: Option<String> = None;
    let mut extra_parents: Vec<String> = Vec::new();
    let mut links = Vec::new();

    for dependency in dependencies.and_then(Value::as_array).into_iter().flatten() {
        let dependency_type = dependency
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| KanbusError::MigrationFailed("invalid dependency".to_string()))?;
        let depends_on = dependency
            .get("depends_on_id")
            .and_then(Value::as_str)
            .ok_or_else(|| KanbusError::MigrationFailed("invalid dependency".to_string()))?;
        if !record_by_id.contains_key(depends_on) {
            return Err(KanbusError::MigrationFailed(format!(
                "missing dependency '{depends_on}'"
            )));
        }
        if dependency_type == "parent-child" {
            if parent.is_none() {
                parent = Some(depends_on.to_string());
            } else {
                extra_parents.push(depends_on.to_string());
            }
        } else {
            links.push(DependencyLink {
                target: depends_on.to_string(),
                dependency_type: dependency_type.to_string(),
            });
        }
    }

    if let (Some(kept), false) = (&parent, extra_parents.is_empty()) {
        eprintln!(
            "Suggestion: '{identifier}' has multiple parents ({kept}, {}). Using '{kept}' and ignoring the rest.",
            extra_parents.join(", ")
        );
    }

    if let Some(parent_id) = &parent {
        let parent_type = record_by_id
            .get(parent_id)
            .and_then(|record| record.get("issue_type"))
            .and_then(Value::as_str)
            .map(canonical_issue_type)
            .unwrap_or_default()
            .to_string();
        // Peers nest epics under epics and tasks under tasks; only other
        // shapes go through the hierarchy rule.
        let same_level_nesting =
            parent_type == issue_type && (parent_type == "epic" || parent_type == "task");
        if !same_level_nesting {
            if let Err(error) =
                validate_parent_child_relationship(configuration, &parent_type, issue_type)
            {
                eprintln!("Suggestion: {error}. Dropping the parent link from '{identifier}'.");
                parent = None;
            }
        }
    }

    Ok((parent, links))
}

fn convert_comment(comment: &Value) -> Result<IssueComment, KanbusError> {
    let author = comment
        .get("author")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let text = comment
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if author.is_empty() || text.is_empty() {
        return Err(KanbusError::MigrationFailed("invalid comment".to_string()));
    }
    Ok(IssueComment {
        id: comment
            .get("id")
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .filter(|text| !text.is_empty()),
        author,
        text,
        created_at: parse_beads_timestamp(comment.get("created_at"), "comment.created_at")?,
    })
}

fn required_str(record: &Value, key: &str) -> Result<String, KanbusError> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| KanbusError::MigrationFailed(format!("{key} is required")))
}

fn optional_str(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Parse the peer system's timestamps: RFC 3339 with either `Z` or an
/// offset, and fractional seconds of any width.
fn parse_beads_timestamp(
    value: Option<&Value>,
    field_name: &str,
) -> Result<DateTime<Utc>, KanbusError> {
    let text = value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| KanbusError::MigrationFailed(format!("{field_name} is required")))?;
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| KanbusError::MigrationFailed(format!("invalid {field_name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_jsonl(root: &Path, records: &[Value]) {
        let beads_dir = root.join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        let lines: Vec<String> = records
            .iter()
            .map(|record| serde_json::to_string(record).unwrap())
            .collect();
        std::fs::write(beads_dir.join("issues.jsonl"), lines.join("\n") + "\n").unwrap();
    }

    fn record(id: &str, issue_type: &str) -> Value {
        json!({
            "id": id,
            "title": format!("title {id}"),
            "description": "",
            "status": "open",
            "priority": 2,
            "issue_type": issue_type,
            "created_at": "2026-03-04T10:00:00Z",
            "updated_at": "2026-03-04T10:00:00Z",
        })
    }

    #[test]
    fn loads_records_with_type_aliases() {
        let temp = tempdir().unwrap();
        let mut aliased = record("bdx-aaa", "feature");
        aliased["owner"] = json!("ops");
        write_jsonl(temp.path(), &[aliased]);

        let issues = load_beads_issues(temp.path()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, "story");
        assert_eq!(
            issues[0].custom.get("beads_issue_type"),
            Some(&json!("feature"))
        );
        assert_eq!(issues[0].custom.get("beads_owner"), Some(&json!("ops")));
    }

    #[test]
    fn first_parent_wins_and_extras_drop() {
        let temp = tempdir().unwrap();
        let epic_a = record("bdx-epa", "epic");
        let epic_b = record("bdx-epb", "epic");
        let mut child = record("bdx-kid", "task");
        child["dependencies"] = json!([
            {"issue_id": "bdx-kid", "depends_on_id": "bdx-epa", "type": "parent-child"},
            {"issue_id": "bdx-kid", "depends_on_id": "bdx-epb", "type": "parent-child"},
        ]);
        write_jsonl(temp.path(), &[epic_a, epic_b, child]);

        let issues = load_beads_issues(temp.path()).unwrap();
        let kid = issues
            .iter()
            .find(|issue| issue.identifier == "bdx-kid")
            .unwrap();
        assert_eq!(kid.parent.as_deref(), Some("bdx-epa"));
        assert!(kid.dependencies.is_empty());
    }

    #[test]
    fn hierarchy_violation_strips_parent_instead_of_failing() {
        let temp = tempdir().unwrap();
        let bug = record("bdx-bug", "bug");
        let mut child = record("bdx-kid", "epic");
        child["dependencies"] = json!([
            {"issue_id": "bdx-kid", "depends_on_id": "bdx-bug", "type": "parent-child"},
        ]);
        write_jsonl(temp.path(), &[bug, child]);

        let issues = load_beads_issues(temp.path()).unwrap();
        let kid = issues
            .iter()
            .find(|issue| issue.identifier == "bdx-kid")
            .unwrap();
        assert_eq!(kid.parent, None);
    }

    #[test]
    fn blocked_by_links_survive_conversion() {
        let temp = tempdir().unwrap();
        let blocker = record("bdx-one", "task");
        let mut blocked = record("bdx-two", "task");
        blocked["dependencies"] = json!([
            {"issue_id": "bdx-two", "depends_on_id": "bdx-one", "type": "blocked-by"},
        ]);
        write_jsonl(temp.path(), &[blocker, blocked]);

        let issues = load_beads_issues(temp.path()).unwrap();
        let two = issues
            .iter()
            .find(|issue| issue.identifier == "bdx-two")
            .unwrap();
        assert_eq!(two.dependencies.len(), 1);
        assert_eq!(two.dependencies[0].target, "bdx-one");
    }

    #[test]
    fn missing_backend_is_reported() {
        let temp = tempdir().unwrap();
        let error = load_beads_issues(temp.path()).unwrap_err();
        assert_eq!(error.kind(), "migration_failed");
    }

    #[test]
    fn offset_timestamps_are_normalized_to_utc() {
        let parsed = parse_beads_timestamp(
            Some(&json!("2026-03-04T12:00:00.1234567+02:00")),
            "created_at",
        )
        .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-04T10:00:00.123456700+00:00");
    }
}
