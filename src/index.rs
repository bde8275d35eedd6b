//! In-memory issue index.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::KanbusError;
use crate::issue_files::load_issues_from_directory;
use crate::models::IssueData;

/// Lookup tables over one issues directory. Buckets keep file-name order so
/// output derived from them is deterministic.
#[derive(Debug, Clone, Default)]
pub struct IssueIndex {
    pub by_id: BTreeMap<String, IssueData>,
    pub by_status: BTreeMap<String, Vec<String>>,
    pub by_type: BTreeMap<String, Vec<String>>,
    pub by_parent: BTreeMap<String, Vec<String>>,
    pub by_label: BTreeMap<String, Vec<String>>,
    pub reverse_dependencies: BTreeMap<String, Vec<String>>,
}

impl IssueIndex {
    /// Index a list of issues (already in file-name order).
    pub fn from_issues(issues: Vec<IssueData>) -> Self {
        let mut index = IssueIndex::default();
        for issue in issues {
            index.insert(issue);
        }
        index
    }

    fn insert(&mut self, issue: IssueData) {
        let id = issue.identifier.clone();
        self.by_status
            .entry(issue.status.clone())
            .or_default()
            .push(id.clone());
        self.by_type
            .entry(issue.issue_type.clone())
            .or_default()
            .push(id.clone());
        if let Some(parent) = &issue.parent {
            self.by_parent
                .entry(parent.clone())
                .or_default()
                .push(id.clone());
        }
        for label in &issue.labels {
            self.by_label
                .entry(label.clone())
                .or_default()
                .push(id.clone());
        }
        for dependency in &issue.dependencies {
            if dependency.dependency_type == "blocked-by" {
                self.reverse_dependencies
                    .entry(dependency.target.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        self.by_id.insert(id, issue);
    }

    /// All indexed issues in id order.
    pub fn issues(&self) -> Vec<IssueData> {
        self.by_id.values().cloned().collect()
    }
}

/// Build an index by scanning the issue files in a directory.
pub fn build_index_from_directory(issues_directory: &Path) -> Result<IssueIndex, KanbusError> {
    let issues = load_issues_from_directory(issues_directory)?;
    Ok(IssueIndex::from_issues(issues))
}
