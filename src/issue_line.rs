//! Single-line issue formatting for `list`.

use owo_colors::{AnsiColors, OwoColorize};

use crate::ids::format_issue_key;
use crate::models::{IssueData, ProjectConfiguration};

/// Column widths for aligned output.
#[derive(Debug, Clone, Copy)]
pub struct Widths {
    pub identifier: usize,
    pub parent: usize,
    pub status: usize,
    pub priority: usize,
}

/// Compute column widths over the whole listing.
pub fn compute_widths(issues: &[IssueData], project_context: bool) -> Widths {
    let mut widths = Widths {
        identifier: 0,
        parent: 1,
        status: 0,
        priority: 0,
    };
    for issue in issues {
        widths.status = widths.status.max(issue.status.len());
        widths.priority = widths
            .priority
            .max(format!("P{}", issue.priority).len());
        widths.identifier = widths
            .identifier
            .max(format_issue_key(&issue.identifier, project_context).len());
        widths.parent = widths.parent.max(parent_display(issue, project_context).len());
    }
    widths
}

fn parent_display(issue: &IssueData, project_context: bool) -> String {
    match issue.parent.as_deref() {
        Some(parent) => format_issue_key(parent, project_context),
        None => "-".to_string(),
    }
}

/// Render one listing row.
///
/// Porcelain mode emits a stable pipe-separated form for scripts; normal
/// mode pads columns and colors type, status, and priority.
pub fn format_issue_line(
    issue: &IssueData,
    widths: Option<&Widths>,
    porcelain: bool,
    project_context: bool,
    configuration: Option<&ProjectConfiguration>,
    use_color: bool,
) -> String {
    let identifier = format_issue_key(&issue.identifier, project_context);
    let parent = parent_display(issue, project_context);
    let type_initial = issue
        .issue_type
        .chars()
        .next()
        .unwrap_or(' ')
        .to_ascii_uppercase();

    if porcelain {
        return format!(
            "{type_initial} | {identifier} | {parent} | {} | P{} | {}",
            issue.status, issue.priority, issue.title
        );
    }

    let widths = widths
        .copied()
        .unwrap_or_else(|| compute_widths(std::slice::from_ref(issue), project_context));
    let prefix = issue
        .custom
        .get("project_path")
        .and_then(|value| value.as_str())
        .map(|value| format!("{value} "))
        .unwrap_or_default();

    let paint = |text: String, color: Option<AnsiColors>| -> String {
        match (use_color, color) {
            (true, Some(color)) => text.color(color).to_string(),
            _ => text,
        }
    };

    let type_part = paint(
        type_initial.to_string(),
        type_color(&issue.issue_type, configuration),
    );
    let identifier_part = format!("{identifier:<width$}", width = widths.identifier);
    let parent_part = {
        let plain = format!("{parent:<width$}", width = widths.parent);
        if parent == "-" && use_color {
            plain.color(AnsiColors::BrightBlack).to_string()
        } else {
            plain
        }
    };
    let status_part = paint(
        format!("{:<width$}", issue.status, width = widths.status),
        status_color(&issue.status, configuration),
    );
    let priority_part = paint(
        format!("{:<width$}", format!("P{}", issue.priority), width = widths.priority),
        priority_color(issue.priority, configuration),
    );

    format!(
        "{prefix}{type_part} {identifier_part} {parent_part} {status_part} {priority_part} {}",
        issue.title
    )
}

pub(crate) fn parse_color(name: &str) -> Option<AnsiColors> {
    match name {
        "black" => Some(AnsiColors::Black),
        "red" => Some(AnsiColors::Red),
        "green" => Some(AnsiColors::Green),
        "yellow" => Some(AnsiColors::Yellow),
        "blue" => Some(AnsiColors::Blue),
        "magenta" => Some(AnsiColors::Magenta),
        "cyan" => Some(AnsiColors::Cyan),
        "white" => Some(AnsiColors::White),
        "grey" | "bright_black" => Some(AnsiColors::BrightBlack),
        "bright_red" => Some(AnsiColors::BrightRed),
        "bright_green" => Some(AnsiColors::BrightGreen),
        "bright_yellow" => Some(AnsiColors::BrightYellow),
        "bright_blue" => Some(AnsiColors::BrightBlue),
        "bright_magenta" => Some(AnsiColors::BrightMagenta),
        "bright_cyan" => Some(AnsiColors::BrightCyan),
        "bright_white" => Some(AnsiColors::BrightWhite),
        _ => None,
    }
}

pub(crate) fn status_color(
    status: &str,
    configuration: Option<&ProjectConfiguration>,
) -> Option<AnsiColors> {
    if let Some(config) = configuration {
        if let Some(color) = config
            .statuses
            .iter()
            .find(|definition| definition.key == status)
            .and_then(|definition| definition.color.as_deref())
        {
            return parse_color(color);
        }
    }
    parse_color(match status {
        "open" => "cyan",
        "in_progress" => "blue",
        "blocked" => "red",
        "closed" => "green",
        "deferred" => "yellow",
        _ => "white",
    })
}

pub(crate) fn priority_color(
    priority: i64,
    configuration: Option<&ProjectConfiguration>,
) -> Option<AnsiColors> {
    if let Some(config) = configuration {
        if let Some(color) = u8::try_from(priority)
            .ok()
            .and_then(|key| config.priorities.get(&key))
            .and_then(|definition| definition.color.as_deref())
        {
            return parse_color(color);
        }
    }
    parse_color(match priority {
        0 => "red",
        1 => "bright_red",
        2 => "yellow",
        3 => "blue",
        _ => "white",
    })
}

pub(crate) fn type_color(
    issue_type: &str,
    configuration: Option<&ProjectConfiguration>,
) -> Option<AnsiColors> {
    if let Some(color) = configuration.and_then(|config| config.type_colors.get(issue_type)) {
        return parse_color(color);
    }
    parse_color(match issue_type {
        "initiative" => "bright_magenta",
        "epic" => "magenta",
        "bug" => "red",
        "story" => "cyan",
        "chore" => "blue",
        _ => "white",
    })
}
