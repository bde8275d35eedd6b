//! Filtering, searching, and sorting for listings.

use crate::error::KanbusError;
use crate::models::IssueData;

/// Filter issues by exact field matches.
pub fn filter_issues(
    issues: Vec<IssueData>,
    status: Option<&str>,
    issue_type: Option<&str>,
    assignee: Option<&str>,
    label: Option<&str>,
) -> Vec<IssueData> {
    issues
        .into_iter()
        .filter(|issue| status.map_or(true, |value| issue.status == value))
        .filter(|issue| issue_type.map_or(true, |value| issue.issue_type == value))
        .filter(|issue| assignee.map_or(true, |value| issue.assignee.as_deref() == Some(value)))
        .filter(|issue| {
            label.map_or(true, |value| issue.labels.iter().any(|entry| entry == value))
        })
        .collect()
}

/// Case-insensitive text search over title, description, and comments.
pub fn search_issues(issues: Vec<IssueData>, term: Option<&str>) -> Vec<IssueData> {
    let Some(term) = term.filter(|value| !value.is_empty()) else {
        return issues;
    };
    let needle = term.to_lowercase();
    issues
        .into_iter()
        .filter(|issue| {
            issue.title.to_lowercase().contains(&needle)
                || issue.description.to_lowercase().contains(&needle)
                || issue
                    .comments
                    .iter()
                    .any(|comment| comment.text.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Sort issues by a supported key, preserving order for equal keys.
pub fn sort_issues(
    mut issues: Vec<IssueData>,
    sort_key: Option<&str>,
) -> Result<Vec<IssueData>, KanbusError> {
    match sort_key {
        None => Ok(issues),
        Some("priority") => {
            issues.sort_by_key(|issue| issue.priority);
            Ok(issues)
        }
        Some("created") => {
            issues.sort_by_key(|issue| issue.created_at);
            Ok(issues)
        }
        Some("updated") => {
            issues.sort_by_key(|issue| std::cmp::Reverse(issue.updated_at));
            Ok(issues)
        }
        Some(other) => Err(KanbusError::Io(format!("invalid sort key '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn issue(id: &str, title: &str, status: &str, priority: i64) -> IssueData {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
        IssueData {
            identifier: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            issue_type: "task".to_string(),
            status: status.to_string(),
            priority,
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
    fn filters_compose() {
        let issues = vec![
            issue("kbs-a", "One", "open", 1),
            issue("kbs-b", "Two", "closed", 1),
        ];
        let filtered = filter_issues(issues, Some("open"), None, None, None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].identifier, "kbs-a");
    }

    #[test]
    fn search_is_case_insensitive_and_covers_comments() {
        let mut commented = issue("kbs-a", "Quiet", "open", 2);
        commented.comments.push(crate::models::IssueComment {
            id: None,
            author: "a".to_string(),
            text: "remember the OAuth flow".to_string(),
            created_at: commented.created_at,
        });
        let issues = vec![commented, issue("kbs-b", "Other", "open", 2)];
        let found = search_issues(issues, Some("oauth"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier, "kbs-a");
    }

    #[test]
    fn priority_sort_is_stable() {
        let issues = vec![
            issue("kbs-b", "B", "open", 2),
            issue("kbs-a", "A", "open", 2),
            issue("kbs-c", "C", "open", 0),
        ];
        let sorted = sort_issues(issues, Some("priority")).unwrap();
        let ids: Vec<_> = sorted.iter().map(|entry| entry.identifier.as_str()).collect();
        assert_eq!(ids, vec!["kbs-c", "kbs-b", "kbs-a"]);
    }

    #[test]
    fn updated_sort_is_most_recent_first() {
        let mut older = issue("kbs-a", "A", "open", 2);
        older.updated_at = older.updated_at - Duration::hours(1);
        let newer = issue("kbs-b", "B", "open", 2);
        let sorted = sort_issues(vec![older, newer], Some("updated")).unwrap();
        assert_eq!(sorted[0].identifier, "kbs-b");
    }

    #[test]
    fn unknown_sort_key_errors() {
        assert!(sort_issues(Vec::new(), Some("mood")).is_err());
    }
}
