//! Dependency management: links, cycle detection, and the ready set.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::event_history::{
    create_event, dependency_payload, events_dir_for_issue_path, now_timestamp,
    write_events_batch, EventType,
};
use crate::ids::format_issue_key;
use crate::issue_files::{load_issues_from_directory, restore_issue_bytes, write_issue_to_file};
use crate::issue_lookup::load_issue_from_project;
use crate::models::{DependencyLink, IssueData};
use crate::project::{
    discover_project_directories, find_project_local_directory, load_project_directory,
};

pub const BLOCKED_BY: &str = "blocked-by";
pub const RELATES_TO: &str = "relates-to";
const ALLOWED_DEPENDENCY_TYPES: [&str; 2] = [BLOCKED_BY, RELATES_TO];

/// Add a dependency link to an issue. Adding an existing link is a no-op.
pub fn add_dependency(
    root: &Path,
    env: &Environment,
    source_id: &str,
    target_id: &str,
    dependency_type: &str,
) -> Result<IssueData, KanbusError> {
    validate_dependency_type(dependency_type)?;
    let source = load_issue_from_project(root, env, source_id)?;
    let target = load_issue_from_project(root, env, target_id)?;
    let target_id = target.issue.identifier.clone();

    if dependency_type == BLOCKED_BY {
        ensure_no_cycle(root, env, &source.issue.identifier, &target_id)?;
    }

    if has_link(&source.issue, &target_id, dependency_type) {
        return Ok(source.issue);
    }

    let mut updated = source.issue.clone();
    updated.dependencies.push(DependencyLink {
        target: target_id.clone(),
        dependency_type: dependency_type.to_string(),
    });
    updated.updated_at = env.now();

    let prior_bytes = serde_json::to_vec_pretty(&source.issue).map_err(KanbusError::io)?;
    write_issue_to_file(&updated, &source.issue_path)?;

    let event = create_event(
        env,
        &updated.identifier,
        EventType::DependencyAdded,
        &env.current_user(),
        dependency_payload(dependency_type, &target_id),
        &now_timestamp(env),
    );
    let events_dir = events_dir_for_issue_path(&source.project_dir, &source.issue_path);
    if let Err(error) = write_events_batch(&events_dir, &[event]) {
        restore_issue_bytes(&source.issue_path, &prior_bytes)?;
        return Err(error);
    }
    Ok(updated)
}

/// Remove a dependency link. Removing an absent link is a no-op.
pub fn remove_dependency(
    root: &Path,
    env: &Environment,
    source_id: &str,
    target_id: &str,
    dependency_type: &str,
) -> Result<IssueData, KanbusError> {
    validate_dependency_type(dependency_type)?;
    let source = load_issue_from_project(root, env, source_id)?;

    if !has_link(&source.issue, target_id, dependency_type) {
        return Ok(source.issue);
    }

    let mut updated = source.issue.clone();
    updated.dependencies.retain(|dependency| {
        !(dependency.target == target_id && dependency.dependency_type == dependency_type)
    });
    updated.updated_at = env.now();

    let prior_bytes = serde_json::to_vec_pretty(&source.issue).map_err(KanbusError::io)?;
    write_issue_to_file(&updated, &source.issue_path)?;

    let event = create_event(
        env,
        &updated.identifier,
        EventType::DependencyRemoved,
        &env.current_user(),
        dependency_payload(dependency_type, target_id),
        &now_timestamp(env),
    );
    let events_dir = events_dir_for_issue_path(&source.project_dir, &source.issue_path);
    if let Err(error) = write_events_batch(&events_dir, &[event]) {
        restore_issue_bytes(&source.issue_path, &prior_bytes)?;
        return Err(error);
    }
    Ok(updated)
}

/// List every non-closed issue with no outgoing blocked-by edge. In a
/// multi-project repository each issue is tagged with its project path.
pub fn list_ready_issues(
    root: &Path,
    env: &Environment,
    include_local: bool,
    local_only: bool,
) -> Result<Vec<IssueData>, KanbusError> {
    let projects = discover_project_directories(root, env)?;
    if projects.is_empty() {
        return Err(KanbusError::ProjectNotInitialized);
    }
    let tag_project = projects.len() > 1;

    let mut issues = Vec::new();
    for project_dir in &projects {
        let mut project_issues =
            load_scope_issues(project_dir, include_local, local_only)?;
        if tag_project {
            for issue in &mut project_issues {
                tag_issue_project(issue, root, project_dir);
            }
        }
        issues.extend(project_issues);
    }

    Ok(issues
        .into_iter()
        .filter(|issue| issue.status != "closed" && !is_blocked(issue))
        .collect())
}

/// Whether an issue has at least one outgoing blocked-by edge.
pub fn is_blocked(issue: &IssueData) -> bool {
    issue
        .dependencies
        .iter()
        .any(|dependency| dependency.dependency_type == BLOCKED_BY)
}

fn load_scope_issues(
    project_dir: &Path,
    include_local: bool,
    local_only: bool,
) -> Result<Vec<IssueData>, KanbusError> {
    let shared_dir = project_dir.join("issues");
    let mut issues = if local_only || !shared_dir.is_dir() {
        Vec::new()
    } else {
        load_issues_from_directory(&shared_dir)?
    };
    if include_local || local_only {
        if let Some(local_dir) = find_project_local_directory(project_dir) {
            let local_issues_dir = local_dir.join("issues");
            if local_issues_dir.is_dir() {
                issues.extend(load_issues_from_directory(&local_issues_dir)?);
            }
        }
    }
    Ok(issues)
}

fn tag_issue_project(issue: &mut IssueData, root: &Path, project_dir: &Path) {
    let project_path = project_dir
        .strip_prefix(root)
        .unwrap_or(project_dir)
        .to_string_lossy()
        .to_string();
    issue.custom.insert(
        "project_path".to_string(),
        serde_json::Value::String(project_path),
    );
}

fn validate_dependency_type(dependency_type: &str) -> Result<(), KanbusError> {
    if !ALLOWED_DEPENDENCY_TYPES.contains(&dependency_type) {
        return Err(KanbusError::InvalidDependencyType(
            dependency_type.to_string(),
        ));
    }
    Ok(())
}

fn has_link(issue: &IssueData, target_id: &str, dependency_type: &str) -> bool {
    issue.dependencies.iter().any(|dependency| {
        dependency.target == target_id && dependency.dependency_type == dependency_type
    })
}

/// Reject the prospective edge if inserting it closes a blocked-by cycle.
fn ensure_no_cycle(
    root: &Path,
    env: &Environment,
    source_id: &str,
    target_id: &str,
) -> Result<(), KanbusError> {
    let mut edges = build_blocked_by_graph(root, env)?;
    edges
        .entry(source_id.to_string())
        .or_default()
        .push(target_id.to_string());
    if has_cycle_from(&edges, source_id) {
        return Err(KanbusError::CycleDetected);
    }
    Ok(())
}

fn build_blocked_by_graph(
    root: &Path,
    env: &Environment,
) -> Result<HashMap<String, Vec<String>>, KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for issue in load_issues_from_directory(&project_dir.join("issues"))? {
        let targets: Vec<String> = issue
            .dependencies
            .iter()
            .filter(|dependency| dependency.dependency_type == BLOCKED_BY)
            .map(|dependency| dependency.target.clone())
            .collect();
        if !targets.is_empty() {
            edges.insert(issue.identifier, targets);
        }
    }
    Ok(edges)
}

/// Iterative DFS with an explicit in-progress stack; a back edge means a
/// cycle reachable from `start`.
fn has_cycle_from(edges: &HashMap<String, Vec<String>>, start: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

    while let Some((node, next_child)) = stack.pop() {
        if next_child == 0 {
            if in_progress.contains(node) {
                return true;
            }
            if visited.contains(node) {
                continue;
            }
            visited.insert(node);
            in_progress.insert(node);
        }
        let children = edges.get(node).map(Vec::as_slice).unwrap_or(&[]);
        if next_child < children.len() {
            stack.push((node, next_child + 1));
            let child = children[next_child].as_str();
            if in_progress.contains(child) {
                return true;
            }
            if !visited.contains(child) {
                stack.push((child, 0));
            }
        } else {
            in_progress.remove(node);
        }
    }
    false
}

/// A node in the blocked-by tree rooted at one issue.
#[derive(Debug)]
pub struct DependencyTreeNode {
    pub identifier: String,
    pub title: String,
    pub status: String,
    pub children: Vec<DependencyTreeNode>,
}

/// Build the blocked-by tree for an issue, bounded by `depth` when given.
/// Issues already shown higher in the tree are not expanded again.
pub fn build_dependency_tree(
    root: &Path,
    env: &Environment,
    identifier: &str,
    depth: Option<usize>,
) -> Result<DependencyTreeNode, KanbusError> {
    let lookup = load_issue_from_project(root, env, identifier)?;
    let mut seen = HashSet::new();
    seen.insert(lookup.issue.identifier.clone());
    build_tree_node(root, env, &lookup.issue, depth, &mut seen)
}

fn build_tree_node(
    root: &Path,
    env: &Environment,
    issue: &IssueData,
    depth: Option<usize>,
    seen: &mut HashSet<String>,
) -> Result<DependencyTreeNode, KanbusError> {
    let mut children = Vec::new();
    if depth != Some(0) {
        let next_depth = depth.map(|value| value - 1);
        for dependency in &issue.dependencies {
            if dependency.dependency_type != BLOCKED_BY {
                continue;
            }
            if !seen.insert(dependency.target.clone()) {
                continue;
            }
            let child = load_issue_from_project(root, env, &dependency.target)?;
            children.push(build_tree_node(root, env, &child.issue, next_depth, seen)?);
        }
    }
    Ok(DependencyTreeNode {
        identifier: issue.identifier.clone(),
        title: issue.title.clone(),
        status: issue.status.clone(),
        children,
    })
}

/// Render a tree as indented text lines.
pub fn render_dependency_tree(node: &DependencyTreeNode) -> String {
    let mut lines = Vec::new();
    render_node(node, 0, &mut lines);
    lines.join("\n")
}

fn render_node(node: &DependencyTreeNode, level: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(level);
    lines.push(format!(
        "{indent}{} [{}] {}",
        format_issue_key(&node.identifier, false),
        node.status,
        node.title
    ));
    for child in &node.children {
        render_node(child, level + 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::initialize_project;
    use crate::issue_creation::{create_issue, IssueCreationRequest};
    use crate::issue_files::read_issue_from_file;
    use tempfile::tempdir;

    fn env() -> Environment {
        Environment::from_os().with_var("KANBUS_USER", "tester")
    }

    fn created(root: &Path, title: &str) -> IssueData {
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
                local: false,
                validate: true,
            },
            &env(),
        )
        .unwrap()
        .issue
    }

    #[test]
    fn add_is_idempotent_at_the_file_level() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "A");
        let b = created(temp.path(), "B");

        add_dependency(temp.path(), &env(), &a.identifier, &b.identifier, BLOCKED_BY).unwrap();
        let path = temp
            .path()
            .join("project/issues")
            .join(format!("{}.json", a.identifier));
        let once = std::fs::read(&path).unwrap();

        add_dependency(temp.path(), &env(), &a.identifier, &b.identifier, BLOCKED_BY).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), once);
    }

    #[test]
    fn chain_cycle_is_detected_and_recoverable() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "A");
        let b = created(temp.path(), "B");
        let c = created(temp.path(), "C");

        add_dependency(temp.path(), &env(), &a.identifier, &b.identifier, BLOCKED_BY).unwrap();
        add_dependency(temp.path(), &env(), &b.identifier, &c.identifier, BLOCKED_BY).unwrap();
        let error =
            add_dependency(temp.path(), &env(), &c.identifier, &a.identifier, BLOCKED_BY)
                .unwrap_err();
        assert_eq!(error.kind(), "cycle_detected");

        // Removing an edge clears the way.
        remove_dependency(temp.path(), &env(), &a.identifier, &b.identifier, BLOCKED_BY).unwrap();
        add_dependency(temp.path(), &env(), &c.identifier, &a.identifier, BLOCKED_BY).unwrap();
    }

    #[test]
    fn blocking_on_own_parent_is_not_a_cycle() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let epic = create_issue(
            &IssueCreationRequest {
                root: temp.path().to_path_buf(),
                title: "Parent epic".to_string(),
                issue_type: Some("epic".to_string()),
                priority: None,
                assignee: None,
                parent: None,
                labels: Vec::new(),
                description: None,
                local: false,
                validate: true,
            },
            &env(),
        )
        .unwrap()
        .issue;
        let child = create_issue(
            &IssueCreationRequest {
                root: temp.path().to_path_buf(),
                title: "Child task".to_string(),
                issue_type: Some("task".to_string()),
                priority: None,
                assignee: None,
                parent: Some(epic.identifier.clone()),
                labels: Vec::new(),
                description: None,
                local: false,
                validate: true,
            },
            &env(),
        )
        .unwrap()
        .issue;

        // A single blocked-by edge along the parent link has no back edge.
        let updated = add_dependency(
            temp.path(),
            &env(),
            &child.identifier,
            &epic.identifier,
            BLOCKED_BY,
        )
        .unwrap();
        assert_eq!(updated.dependencies.len(), 1);

        // The reverse direction only fails once it would close a loop.
        let error =
            add_dependency(temp.path(), &env(), &epic.identifier, &child.identifier, BLOCKED_BY)
                .unwrap_err();
        assert_eq!(error.kind(), "cycle_detected");
    }

    #[test]
    fn relates_to_does_not_participate_in_cycles() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "A");
        let b = created(temp.path(), "B");

        add_dependency(temp.path(), &env(), &a.identifier, &b.identifier, RELATES_TO).unwrap();
        add_dependency(temp.path(), &env(), &b.identifier, &a.identifier, RELATES_TO).unwrap();
    }

    #[test]
    fn unknown_dependency_type_is_rejected() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "A");
        let error =
            add_dependency(temp.path(), &env(), &a.identifier, &a.identifier, "follows")
                .unwrap_err();
        assert_eq!(error.kind(), "invalid_dependency_type");
    }

    #[test]
    fn ready_excludes_closed_and_blocked() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "A");
        let b = created(temp.path(), "B");
        let c = created(temp.path(), "C");

        add_dependency(temp.path(), &env(), &a.identifier, &b.identifier, BLOCKED_BY).unwrap();
        crate::issue_close::close_issue(temp.path(), &env(), &c.identifier).unwrap();

        let ready = list_ready_issues(temp.path(), &env(), true, false).unwrap();
        let ids: Vec<_> = ready.iter().map(|issue| issue.identifier.as_str()).collect();
        assert_eq!(ids, vec![b.identifier.as_str()]);
    }

    #[test]
    fn remove_of_absent_link_is_a_noop() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "A");
        let result =
            remove_dependency(temp.path(), &env(), &a.identifier, "kbs-ghost", BLOCKED_BY).unwrap();
        assert!(result.dependencies.is_empty());

        let path = temp
            .path()
            .join("project/issues")
            .join(format!("{}.json", a.identifier));
        assert!(read_issue_from_file(&path).unwrap().dependencies.is_empty());
    }

    #[test]
    fn tree_renders_blocked_by_chain() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let a = created(temp.path(), "Top");
        let b = created(temp.path(), "Middle");
        let c = created(temp.path(), "Bottom");

        add_dependency(temp.path(), &env(), &a.identifier, &b.identifier, BLOCKED_BY).unwrap();
        add_dependency(temp.path(), &env(), &b.identifier, &c.identifier, BLOCKED_BY).unwrap();

        let tree = build_dependency_tree(temp.path(), &env(), &a.identifier, None).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 1);

        let rendered = render_dependency_tree(&tree);
        assert!(rendered.contains("Top"));
        assert!(rendered.contains("  "));

        let shallow = build_dependency_tree(temp.path(), &env(), &a.identifier, Some(1)).unwrap();
        assert_eq!(shallow.children.len(), 1);
        assert!(shallow.children[0].children.is_empty());
    }
}
