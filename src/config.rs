//! Default configuration for new Kanbus projects.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::KanbusError;
use crate::models::{
    CategoryDefinition, PriorityDefinition, ProjectConfiguration, StatusDefinition,
    TransitionLabels, WorkflowStates,
};

/// Color names accepted anywhere a configuration color appears.
pub const COLOR_PALETTE: [&str; 17] = [
    "black",
    "red",
    "green",
    "yellow",
    "blue",
    "magenta",
    "cyan",
    "white",
    "grey",
    "bright_black",
    "bright_red",
    "bright_green",
    "bright_yellow",
    "bright_blue",
    "bright_magenta",
    "bright_cyan",
    "bright_white",
];

fn default_workflows() -> BTreeMap<String, WorkflowStates> {
    let default: WorkflowStates = BTreeMap::from([
        (
            "open".to_string(),
            vec![
                "in_progress".to_string(),
                "closed".to_string(),
                "deferred".to_string(),
            ],
        ),
        (
            "in_progress".to_string(),
            vec![
                "open".to_string(),
                "blocked".to_string(),
                "closed".to_string(),
            ],
        ),
        (
            "blocked".to_string(),
            vec!["in_progress".to_string(), "closed".to_string()],
        ),
        ("closed".to_string(), vec!["open".to_string()]),
        (
            "deferred".to_string(),
            vec!["open".to_string(), "closed".to_string()],
        ),
    ]);
    let epic: WorkflowStates = BTreeMap::from([
        (
            "open".to_string(),
            vec!["in_progress".to_string(), "closed".to_string()],
        ),
        (
            "in_progress".to_string(),
            vec!["open".to_string(), "closed".to_string()],
        ),
        ("closed".to_string(), vec!["open".to_string()]),
    ]);
    BTreeMap::from([("default".to_string(), default), ("epic".to_string(), epic)])
}

fn labels(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(to, label)| (to.to_string(), label.to_string()))
        .collect()
}

fn default_transition_labels() -> TransitionLabels {
    let default = BTreeMap::from([
        (
            "open".to_string(),
            labels(&[
                ("in_progress", "Start progress"),
                ("closed", "Close"),
                ("deferred", "Defer"),
            ]),
        ),
        (
            "in_progress".to_string(),
            labels(&[
                ("open", "Stop progress"),
                ("blocked", "Block"),
                ("closed", "Complete"),
            ]),
        ),
        (
            "blocked".to_string(),
            labels(&[("in_progress", "Unblock"), ("closed", "Close")]),
        ),
        ("closed".to_string(), labels(&[("open", "Reopen")])),
        (
            "deferred".to_string(),
            labels(&[("open", "Resume"), ("closed", "Close")]),
        ),
    ]);
    let epic = BTreeMap::from([
        (
            "open".to_string(),
            labels(&[("in_progress", "Start"), ("closed", "Complete")]),
        ),
        (
            "in_progress".to_string(),
            labels(&[("open", "Pause"), ("closed", "Complete")]),
        ),
        ("closed".to_string(), labels(&[("open", "Reopen")])),
    ]);
    BTreeMap::from([("default".to_string(), default), ("epic".to_string(), epic)])
}

/// Return the default project configuration.
pub fn default_project_configuration() -> ProjectConfiguration {
    let priorities = BTreeMap::from([
        (
            0u8,
            PriorityDefinition {
                name: "critical".to_string(),
                color: Some("red".to_string()),
            },
        ),
        (
            1u8,
            PriorityDefinition {
                name: "high".to_string(),
                color: Some("bright_red".to_string()),
            },
        ),
        (
            2u8,
            PriorityDefinition {
                name: "medium".to_string(),
                color: Some("yellow".to_string()),
            },
        ),
        (
            3u8,
            PriorityDefinition {
                name: "low".to_string(),
                color: Some("blue".to_string()),
            },
        ),
        (
            4u8,
            PriorityDefinition {
                name: "trivial".to_string(),
                color: Some("white".to_string()),
            },
        ),
    ]);

    let statuses = vec![
        StatusDefinition {
            key: "open".to_string(),
            name: "Open".to_string(),
            category: "To do".to_string(),
            color: None,
            collapsed: false,
        },
        StatusDefinition {
            key: "in_progress".to_string(),
            name: "In Progress".to_string(),
            category: "In progress".to_string(),
            color: None,
            collapsed: false,
        },
        StatusDefinition {
            key: "blocked".to_string(),
            name: "Blocked".to_string(),
            category: "In progress".to_string(),
            color: None,
            collapsed: true,
        },
        StatusDefinition {
            key: "closed".to_string(),
            name: "Done".to_string(),
            category: "Done".to_string(),
            color: None,
            collapsed: true,
        },
        StatusDefinition {
            key: "deferred".to_string(),
            name: "Deferred".to_string(),
            category: "To do".to_string(),
            color: None,
            collapsed: true,
        },
    ];

    let categories = vec![
        CategoryDefinition {
            name: "To do".to_string(),
            color: Some("grey".to_string()),
        },
        CategoryDefinition {
            name: "In progress".to_string(),
            color: Some("blue".to_string()),
        },
        CategoryDefinition {
            name: "Done".to_string(),
            color: Some("green".to_string()),
        },
    ];

    ProjectConfiguration {
        project_directory: "project".to_string(),
        project_key: "kbs".to_string(),
        hierarchy: vec![
            "initiative".to_string(),
            "epic".to_string(),
            "task".to_string(),
            "sub-task".to_string(),
        ],
        types: vec!["bug".to_string(), "story".to_string(), "chore".to_string()],
        workflows: default_workflows(),
        transition_labels: default_transition_labels(),
        initial_status: "open".to_string(),
        priorities,
        default_priority: 2,
        assignee: None,
        time_zone: None,
        statuses,
        categories,
        type_colors: BTreeMap::from([
            ("initiative".to_string(), "bright_blue".to_string()),
            ("epic".to_string(), "magenta".to_string()),
            ("task".to_string(), "cyan".to_string()),
            ("sub-task".to_string(), "bright_cyan".to_string()),
            ("bug".to_string(), "red".to_string()),
            ("story".to_string(), "yellow".to_string()),
            ("chore".to_string(), "green".to_string()),
        ]),
        virtual_projects: BTreeMap::new(),
        ignore_paths: Vec::new(),
        beads_compatibility: false,
    }
}

/// Write the default configuration to `path`.
pub fn write_default_configuration(path: &Path) -> Result<(), KanbusError> {
    let contents =
        serde_yaml::to_string(&default_project_configuration()).map_err(KanbusError::io)?;
    std::fs::write(path, contents).map_err(KanbusError::io)
}
