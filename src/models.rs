//! Kanbus data models.
//!
//! Issue JSON uses the canonical key order fixed by the on-disk format:
//! `id, title, description, type, status, priority, assignee, creator,
//! parent, labels, dependencies, comments, created_at, updated_at,
//! closed_at, custom`. Serialization follows struct declaration order, so
//! the field order below is load-bearing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Dependency link between issues. Serialized with key `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyLink {
    pub target: String,
    #[serde(rename = "type")]
    pub dependency_type: String,
}

/// Comment on an issue. Legacy comments may lack an id; ids are assigned
/// lazily the next time the comment list is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Issue record as stored in `issues/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueData {
    #[serde(rename = "id")]
    pub identifier: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub status: String,
    pub priority: i64,
    pub assignee: Option<String>,
    pub creator: Option<String>,
    pub parent: Option<String>,
    pub labels: Vec<String>,
    pub dependencies: Vec<DependencyLink>,
    pub comments: Vec<IssueComment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub custom: BTreeMap<String, Value>,
}

impl<'de> Deserialize<'de> for IssueData {
    /// Decode from a JSON mapping, honoring the `id`/`identifier` and
    /// `type`/`issue_type` aliases and folding unknown top-level keys into
    /// `custom` so foreign fields survive a read/write cycle.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(mut fields) = value else {
            return Err(D::Error::custom("issue must be a JSON object"));
        };

        fn take<'de, D, T>(
            fields: &mut serde_json::Map<String, Value>,
            names: &[&str],
        ) -> Result<Option<T>, D::Error>
        where
            D: Deserializer<'de>,
            T: serde::de::DeserializeOwned,
        {
            // Remove every alias so none of them leaks into `custom`.
            let mut found = None;
            for name in names {
                if let Some(raw) = fields.remove(*name) {
                    found.get_or_insert(raw);
                }
            }
            match found {
                None | Some(Value::Null) => Ok(None),
                Some(raw) => serde_json::from_value(raw)
                    .map(Some)
                    .map_err(|error| D::Error::custom(format!("{}: {error}", names[0]))),
            }
        }

        fn require<'de, D, T>(
            fields: &mut serde_json::Map<String, Value>,
            names: &[&str],
        ) -> Result<T, D::Error>
        where
            D: Deserializer<'de>,
            T: serde::de::DeserializeOwned,
        {
            take::<D, T>(fields, names)?
                .ok_or_else(|| D::Error::custom(format!("missing field '{}'", names[0])))
        }

        let identifier: String = require::<D, _>(&mut fields, &["id", "identifier"])?;
        let title: String = require::<D, _>(&mut fields, &["title"])?;
        let description: String = take::<D, _>(&mut fields, &["description"])?.unwrap_or_default();
        let issue_type: String = require::<D, _>(&mut fields, &["type", "issue_type"])?;
        let status: String = require::<D, _>(&mut fields, &["status"])?;
        let priority: i64 = require::<D, _>(&mut fields, &["priority"])?;
        let assignee: Option<String> = take::<D, _>(&mut fields, &["assignee"])?;
        let creator: Option<String> = take::<D, _>(&mut fields, &["creator"])?;
        let parent: Option<String> = take::<D, _>(&mut fields, &["parent"])?;
        let labels: Vec<String> = take::<D, _>(&mut fields, &["labels"])?.unwrap_or_default();
        let dependencies: Vec<DependencyLink> =
            take::<D, _>(&mut fields, &["dependencies"])?.unwrap_or_default();
        let comments: Vec<IssueComment> =
            take::<D, _>(&mut fields, &["comments"])?.unwrap_or_default();
        let created_at: DateTime<Utc> = require::<D, _>(&mut fields, &["created_at"])?;
        let updated_at: DateTime<Utc> = require::<D, _>(&mut fields, &["updated_at"])?;
        let closed_at: Option<DateTime<Utc>> = take::<D, _>(&mut fields, &["closed_at"])?;
        let mut custom: BTreeMap<String, Value> =
            take::<D, _>(&mut fields, &["custom"])?.unwrap_or_default();

        // Whatever is left was written by someone else; keep it.
        for (key, value) in fields {
            custom.entry(key).or_insert(value);
        }

        Ok(IssueData {
            identifier,
            title,
            description,
            issue_type,
            status,
            priority,
            assignee,
            creator,
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
}

/// Category definition grouping statuses on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Status definition with display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub key: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub collapsed: bool,
}

/// Priority definition: display name plus optional color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityDefinition {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Additional project directory registered under a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualProjectConfig {
    pub path: String,
}

/// Workflow for one issue type: from-status to allowed to-statuses.
pub type WorkflowStates = BTreeMap<String, Vec<String>>;

/// Transition labels per workflow: from-status -> to-status -> label.
pub type TransitionLabels = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// Project configuration loaded from `.kanbus.yml`. Unknown top-level keys
/// are rejected at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfiguration {
    pub project_directory: String,
    pub project_key: String,
    pub hierarchy: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    pub workflows: BTreeMap<String, WorkflowStates>,
    #[serde(default)]
    pub transition_labels: TransitionLabels,
    pub initial_status: String,
    pub priorities: BTreeMap<u8, PriorityDefinition>,
    pub default_priority: u8,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    pub statuses: Vec<StatusDefinition>,
    #[serde(default)]
    pub categories: Vec<CategoryDefinition>,
    #[serde(default)]
    pub type_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub virtual_projects: BTreeMap<String, VirtualProjectConfig>,
    #[serde(default)]
    pub ignore_paths: Vec<String>,
    #[serde(default)]
    pub beads_compatibility: bool,
}

impl ProjectConfiguration {
    /// All declared issue types: hierarchy levels plus standalone types.
    pub fn known_issue_types(&self) -> impl Iterator<Item = &String> {
        self.hierarchy.iter().chain(self.types.iter())
    }

    /// Whether `issue_type` is declared in this configuration.
    pub fn has_issue_type(&self, issue_type: &str) -> bool {
        self.known_issue_types().any(|entry| entry == issue_type)
    }

    /// Whether `priority` indexes a declared priority.
    pub fn has_priority(&self, priority: i64) -> bool {
        u8::try_from(priority)
            .map(|value| self.priorities.contains_key(&value))
            .unwrap_or(false)
    }
}
