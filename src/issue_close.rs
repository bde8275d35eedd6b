//! Issue close.

use std::path::Path;

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::issue_update::{update_issue, IssueUpdateRequest};
use crate::models::IssueData;

/// Close an issue by transitioning it to `closed`.
pub fn close_issue(
    root: &Path,
    env: &Environment,
    identifier: &str,
) -> Result<IssueData, KanbusError> {
    let request = IssueUpdateRequest {
        status: Some("closed".to_string()),
        validate: true,
        ..Default::default()
    };
    update_issue(root, env, identifier, &request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::initialize_project;
    use crate::issue_creation::{create_issue, IssueCreationRequest};
    use tempfile::tempdir;

    #[test]
    fn close_stamps_closed_at_and_rejects_a_second_close() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let env = Environment::from_os().with_var("KANBUS_USER", "tester");
        let issue = create_issue(
            &IssueCreationRequest {
                root: temp.path().to_path_buf(),
                title: "Finish".to_string(),
                issue_type: None,
                priority: None,
                assignee: None,
                parent: None,
                labels: Vec::new(),
                description: None,
                local: false,
                validate: true,
            },
            &env,
        )
        .unwrap()
        .issue;

        let closed = close_issue(temp.path(), &env, &issue.identifier).unwrap();
        assert_eq!(closed.status, "closed");
        let closed_at = closed.closed_at.expect("closed issues carry closed_at");
        assert!(closed_at >= closed.updated_at);

        let error = close_issue(temp.path(), &env, &issue.identifier).unwrap_err();
        assert_eq!(error.kind(), "invalid_transition");
    }
}
