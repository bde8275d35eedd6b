//! Issue comments.
//!
//! Comments carry UUID ids. Files written before ids existed get them
//! assigned lazily the next time any comment operation touches the issue.
//! Update and delete address a comment by id prefix (three characters or
//! more) that must match exactly one comment.

use std::path::Path;

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::event_history::{
    comment_payload, comment_updated_payload, create_event, events_dir_for_issue_path,
    now_timestamp, write_events_batch, EventType,
};
use crate::issue_files::{restore_issue_bytes, write_issue_to_file};
use crate::issue_lookup::{load_issue_from_project, IssueLookupResult};
use crate::models::{IssueComment, IssueData};

const MIN_PREFIX_LENGTH: usize = 3;

/// Result of adding a comment.
#[derive(Debug, Clone)]
pub struct IssueCommentResult {
    pub issue: IssueData,
    pub comment: IssueComment,
}

/// Append a comment to an issue.
pub fn add_comment(
    root: &Path,
    env: &Environment,
    identifier: &str,
    author: &str,
    text: &str,
) -> Result<IssueCommentResult, KanbusError> {
    let lookup = load_issue_from_project(root, env, identifier)?;
    let mut issue = lookup.issue.clone();
    assign_missing_comment_ids(env, &mut issue);

    let comment = IssueComment {
        id: Some(env.next_uuid().to_string()),
        author: author.to_string(),
        text: text.to_string(),
        created_at: env.now(),
    };
    issue.comments.push(comment.clone());
    issue.updated_at = comment.created_at;

    let comment_id = comment.id.clone().expect("fresh comment always has an id");
    persist_with_event(
        env,
        &lookup,
        &issue,
        EventType::CommentAdded,
        comment_payload(&comment_id, &comment.author),
    )?;
    Ok(IssueCommentResult { issue, comment })
}

/// Rewrite the text of the comment matching `prefix`.
pub fn update_comment(
    root: &Path,
    env: &Environment,
    identifier: &str,
    prefix: &str,
    text: &str,
) -> Result<IssueData, KanbusError> {
    let lookup = load_issue_from_project(root, env, identifier)?;
    let mut issue = lookup.issue.clone();
    assign_missing_comment_ids(env, &mut issue);

    let index = find_comment_index(&issue, prefix)?;
    let target = issue.comments[index].clone();
    issue.comments[index].text = text.to_string();
    issue.updated_at = env.now();

    let comment_id = target.id.clone().unwrap_or_default();
    persist_with_event(
        env,
        &lookup,
        &issue,
        EventType::CommentUpdated,
        comment_updated_payload(&comment_id, &target.author),
    )?;
    Ok(issue)
}

/// Remove the comment matching `prefix`.
pub fn delete_comment(
    root: &Path,
    env: &Environment,
    identifier: &str,
    prefix: &str,
) -> Result<IssueData, KanbusError> {
    let lookup = load_issue_from_project(root, env, identifier)?;
    let mut issue = lookup.issue.clone();
    assign_missing_comment_ids(env, &mut issue);

    let index = find_comment_index(&issue, prefix)?;
    let removed = issue.comments.remove(index);
    issue.updated_at = env.now();

    let comment_id = removed.id.clone().unwrap_or_default();
    persist_with_event(
        env,
        &lookup,
        &issue,
        EventType::CommentDeleted,
        comment_payload(&comment_id, &removed.author),
    )?;
    Ok(issue)
}

fn persist_with_event(
    env: &Environment,
    lookup: &IssueLookupResult,
    issue: &IssueData,
    event_type: EventType,
    payload: serde_json::Value,
) -> Result<(), KanbusError> {
    let prior_bytes = serde_json::to_vec_pretty(&lookup.issue).map_err(KanbusError::io)?;
    write_issue_to_file(issue, &lookup.issue_path)?;

    let event = create_event(
        env,
        &issue.identifier,
        event_type,
        &env.current_user(),
        payload,
        &now_timestamp(env),
    );
    let events_dir = events_dir_for_issue_path(&lookup.project_dir, &lookup.issue_path);
    if let Err(error) = write_events_batch(&events_dir, &[event]) {
        restore_issue_bytes(&lookup.issue_path, &prior_bytes)?;
        return Err(error);
    }
    Ok(())
}

/// Assign ids to legacy comments, preserving insertion order.
fn assign_missing_comment_ids(env: &Environment, issue: &mut IssueData) {
    for comment in &mut issue.comments {
        if comment.id.is_none() {
            comment.id = Some(env.next_uuid().to_string());
        }
    }
}

fn find_comment_index(issue: &IssueData, prefix: &str) -> Result<usize, KanbusError> {
    let normalized = prefix.trim().to_lowercase();
    if normalized.len() < MIN_PREFIX_LENGTH {
        return Err(KanbusError::CommentNotFound(format!(
            "comment id prefix must be at least {MIN_PREFIX_LENGTH} characters"
        )));
    }
    let matches: Vec<usize> = issue
        .comments
        .iter()
        .enumerate()
        .filter(|(_, comment)| {
            comment
                .id
                .as_deref()
                .map(|id| id.to_lowercase().starts_with(&normalized))
                .unwrap_or(false)
        })
        .map(|(index, _)| index)
        .collect();
    match matches.len() {
        0 => Err(KanbusError::CommentNotFound("comment not found".to_string())),
        1 => Ok(matches[0]),
        _ => {
            let ids = matches
                .iter()
                .filter_map(|index| issue.comments[*index].id.as_deref())
                .map(|id| id.chars().take(6).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(KanbusError::AmbiguousCommentPrefix(ids))
        }
    }
}
