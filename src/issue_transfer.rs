//! Moving issues between the shared and local scopes.

use std::fs;
use std::path::Path;

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::event_history::{
    create_event, events_dir_for_project, now_timestamp, transfer_payload, write_events_batch,
    EventType,
};
use crate::issue_files::read_issue_from_file;
use crate::models::IssueData;
use crate::project::{
    ensure_project_local_directory, find_project_local_directory, load_project_directory,
};

/// Promote a local issue into the shared project directory.
pub fn promote_issue(
    root: &Path,
    env: &Environment,
    identifier: &str,
) -> Result<IssueData, KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    let local_dir = find_project_local_directory(&project_dir).ok_or_else(|| {
        KanbusError::NotFound("project-local is not initialized".to_string())
    })?;

    let source = local_dir.join("issues").join(format!("{identifier}.json"));
    if !source.exists() {
        return Err(KanbusError::NotFound(format!(
            "issue '{identifier}' not found in project-local"
        )));
    }
    let target = project_dir.join("issues").join(format!("{identifier}.json"));
    if target.exists() {
        return Err(KanbusError::AlreadyExists(format!(
            "issue '{identifier}' already exists in project"
        )));
    }

    let issue = read_issue_from_file(&source)?;
    fs::rename(&source, &target).map_err(KanbusError::io)?;

    let event = create_event(
        env,
        &issue.identifier,
        EventType::IssuePromoted,
        &env.current_user(),
        transfer_payload("local", "shared"),
        &now_timestamp(env),
    );
    if let Err(error) = write_events_batch(&events_dir_for_project(&project_dir), &[event]) {
        fs::rename(&target, &source).map_err(KanbusError::io)?;
        return Err(error);
    }
    Ok(issue)
}

/// Move a shared issue into project-local, provisioning the local scope and
/// its `.gitignore` entry when needed.
pub fn localize_issue(
    root: &Path,
    env: &Environment,
    identifier: &str,
) -> Result<IssueData, KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    let source = project_dir.join("issues").join(format!("{identifier}.json"));
    if !source.exists() {
        return Err(KanbusError::NotFound(format!(
            "issue '{identifier}' not found in project"
        )));
    }

    let local_dir = ensure_project_local_directory(&project_dir)?;
    let target = local_dir.join("issues").join(format!("{identifier}.json"));
    if target.exists() {
        return Err(KanbusError::AlreadyExists(format!(
            "issue '{identifier}' already exists in project-local"
        )));
    }

    let issue = read_issue_from_file(&source)?;
    fs::rename(&source, &target).map_err(KanbusError::io)?;

    let event = create_event(
        env,
        &issue.identifier,
        EventType::IssueLocalized,
        &env.current_user(),
        transfer_payload("shared", "local"),
        &now_timestamp(env),
    );
    if let Err(error) = write_events_batch(&local_dir.join("events"), &[event]) {
        fs::rename(&target, &source).map_err(KanbusError::io)?;
        return Err(error);
    }
    Ok(issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::initialize_project;
    use crate::issue_creation::{create_issue, IssueCreationRequest};
    use tempfile::tempdir;

    fn env() -> Environment {
        Environment::from_os().with_var("KANBUS_USER", "tester")
    }

    fn created(root: &Path, title: &str, local: bool) -> IssueData {
        create_issue(
            &IssueCreationRequest {
                root: root.to_path_buf(),
                title: title.to_string(),
                issue_type: None,
                priority: None,
                assignee: None,
                parent: None,
                labels: Vec::new(),
                description: None,
                local,
                validate: true,
            },
            &env(),
        )
        .unwrap()
        .issue
    }

    #[test]
    fn localize_then_promote_round_trips() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let issue = created(temp.path(), "Wandering", false);

        localize_issue(temp.path(), &env(), &issue.identifier).unwrap();
        let local_path = temp
            .path()
            .join("project-local/issues")
            .join(format!("{}.json", issue.identifier));
        assert!(local_path.is_file());
        let gitignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains("project-local/"));

        promote_issue(temp.path(), &env(), &issue.identifier).unwrap();
        let shared_path = temp
            .path()
            .join("project/issues")
            .join(format!("{}.json", issue.identifier));
        assert!(shared_path.is_file());
        assert!(!local_path.exists());
    }

    #[test]
    fn promote_rejects_shared_collision() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), true).unwrap();
        let local = created(temp.path(), "Duplicate id", true);

        // Fabricate a shared issue with the same file name.
        let shared_path = temp
            .path()
            .join("project/issues")
            .join(format!("{}.json", local.identifier));
        let mut clashing = local.clone();
        clashing.title = "Other".to_string();
        crate::issue_files::write_issue_to_file(&clashing, &shared_path).unwrap();

        let error = promote_issue(temp.path(), &env(), &local.identifier).unwrap_err();
        assert_eq!(error.kind(), "already_exists");
    }

    #[test]
    fn transfer_of_missing_issue_is_not_found() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), true).unwrap();
        assert_eq!(
            promote_issue(temp.path(), &env(), "kbs-nope").unwrap_err().kind(),
            "not_found"
        );
        assert_eq!(
            localize_issue(temp.path(), &env(), "kbs-nope").unwrap_err().kind(),
            "not_found"
        );
    }
}
