//! Multi-line issue rendering for `show`.

use owo_colors::{AnsiColors, OwoColorize};

use crate::issue_line::{priority_color, status_color, type_color};
use crate::models::{IssueData, ProjectConfiguration};

/// Render an issue as a labeled block.
pub fn format_issue_for_display(
    issue: &IssueData,
    configuration: Option<&ProjectConfiguration>,
    use_color: bool,
) -> String {
    let paint = |text: &str, color: Option<AnsiColors>| -> String {
        match (use_color, color) {
            (true, Some(color)) => text.color(color).to_string(),
            _ => text.to_string(),
        }
    };

    let labels = if issue.labels.is_empty() {
        "None".to_string()
    } else {
        issue.labels.join(", ")
    };
    let mut lines = vec![
        format!("ID: {}", issue.identifier),
        format!("Title: {}", issue.title),
        format!(
            "Type: {}",
            paint(&issue.issue_type, type_color(&issue.issue_type, configuration))
        ),
        format!(
            "Status: {}",
            paint(&issue.status, status_color(&issue.status, configuration))
        ),
        format!(
            "Priority: {}",
            paint(
                &format!("P{}", issue.priority),
                priority_color(issue.priority, configuration)
            )
        ),
        format!(
            "Assignee: {}",
            issue.assignee.as_deref().unwrap_or("None")
        ),
        format!("Parent: {}", issue.parent.as_deref().unwrap_or("None")),
        format!("Labels: {labels}"),
    ];

    if !issue.dependencies.is_empty() {
        lines.push("Dependencies:".to_string());
        for dependency in &issue.dependencies {
            lines.push(format!(
                "  {} {}",
                dependency.dependency_type, dependency.target
            ));
        }
    }
    if !issue.comments.is_empty() {
        lines.push("Comments:".to_string());
        for comment in &issue.comments {
            let id = comment
                .id
                .as_deref()
                .map(|id| id.chars().take(6).collect::<String>())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  [{id}] {} ({}): {}",
                comment.author,
                comment.created_at.format("%Y-%m-%d %H:%M"),
                comment.text
            ));
        }
    }
    if !issue.description.is_empty() {
        lines.push("Description:".to_string());
        lines.push(issue.description.clone());
    }
    lines.join("\n")
}
