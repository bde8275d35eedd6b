//! Project discovery.
//!
//! A repository is rooted at the closest ancestor holding `.kanbus.yml`,
//! never above the git toplevel. Discovery combines the configured project
//! directories (primary plus virtual projects) with an unconfigured scan of
//! `project/` under the root and under each immediate child; it does not
//! recurse deeper.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config_loader::load_project_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::models::ProjectConfiguration;

/// Discover every project directory visible from `root`.
pub fn discover_project_directories(
    root: &Path,
    env: &Environment,
) -> Result<Vec<PathBuf>, KanbusError> {
    let mut projects = scan_for_project_directories(root)?;
    projects.extend(discover_configured_projects(root, env)?);
    let projects = apply_ignore_paths(root, env, projects);
    Ok(normalize_project_directories(projects, env))
}

/// Project directories named by configuration alone (primary + virtual).
pub fn discover_configured_projects(
    root: &Path,
    env: &Environment,
) -> Result<Vec<PathBuf>, KanbusError> {
    let Some(marker) = find_configuration_file(root)? else {
        return Ok(Vec::new());
    };
    let configuration = load_project_configuration(&marker)?;
    let base = marker.parent().unwrap_or(Path::new(""));
    let paths = resolve_configured_directories(base, &configuration, env)?;
    Ok(normalize_project_directories(paths, env))
}

/// Load the unique project directory for `root`.
pub fn load_project_directory(root: &Path, env: &Environment) -> Result<PathBuf, KanbusError> {
    let projects = discover_project_directories(root, env)?;
    match projects.len() {
        0 => Err(KanbusError::ProjectNotInitialized),
        1 => Ok(projects.into_iter().next().expect("checked length")),
        _ => {
            let joined = projects
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(KanbusError::MultipleProjectsFound(joined))
        }
    }
}

/// Locate `.kanbus.yml` for `root`.
pub fn get_configuration_path(root: &Path, env: &Environment) -> Result<PathBuf, KanbusError> {
    if env.var("KANBUS_TEST_CONFIGURATION_PATH_FAILURE").is_some() {
        return Err(KanbusError::ConfigurationInvalid(
            "configuration path lookup failed".to_string(),
        ));
    }
    find_configuration_file(root)?.ok_or(KanbusError::ProjectNotInitialized)
}

/// Walk upward from `root` looking for `.kanbus.yml`, stopping at the git
/// toplevel when one exists.
fn find_configuration_file(root: &Path) -> Result<Option<PathBuf>, KanbusError> {
    let git_root = find_git_root(root);
    let mut current = root.canonicalize().map_err(KanbusError::io)?;
    loop {
        let candidate = current.join(".kanbus.yml");
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
        if git_root.as_deref() == Some(current.as_path()) {
            return Ok(None);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(None),
        }
    }
}

/// Scan `root` and its immediate children for `project/` directories. No
/// deeper recursion: explicit configuration governs anything further down.
fn scan_for_project_directories(root: &Path) -> Result<Vec<PathBuf>, KanbusError> {
    let mut projects = Vec::new();
    let direct = root.join("project");
    if direct.is_dir() {
        projects.push(direct);
    }
    for entry in std::fs::read_dir(root).map_err(KanbusError::io)? {
        let entry = entry.map_err(KanbusError::io)?;
        let path = entry.path();
        if !path.is_dir() || entry.file_name() == "project" || entry.file_name() == "project-local"
        {
            continue;
        }
        let nested = path.join("project");
        if nested.is_dir() {
            projects.push(nested);
        }
    }
    Ok(projects)
}

fn resolve_configured_directories(
    base: &Path,
    configuration: &ProjectConfiguration,
    env: &Environment,
) -> Result<Vec<PathBuf>, KanbusError> {
    let mut paths = vec![base.join(&configuration.project_directory)];
    for virtual_project in configuration.virtual_projects.values() {
        paths.push(resolve_virtual_project(base, &virtual_project.path, env)?);
    }
    Ok(paths)
}

fn resolve_virtual_project(
    base: &Path,
    configured: &str,
    env: &Environment,
) -> Result<PathBuf, KanbusError> {
    let candidate = Path::new(configured);
    let resolved = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let resolved = resolve_project_path(&resolved, env);
    if !resolved.is_dir() {
        return Err(KanbusError::VirtualProjectPathNotFound(
            resolved.display().to_string(),
        ));
    }
    Ok(resolved)
}

fn apply_ignore_paths(root: &Path, env: &Environment, projects: Vec<PathBuf>) -> Vec<PathBuf> {
    let Ok(Some(marker)) = find_configuration_file(root) else {
        return projects;
    };
    let Ok(configuration) = load_project_configuration(&marker) else {
        return projects;
    };
    if configuration.ignore_paths.is_empty() {
        return projects;
    }
    let base = marker.parent().unwrap_or(Path::new(""));
    let ignored: Vec<PathBuf> = configuration
        .ignore_paths
        .iter()
        .map(|pattern| resolve_project_path(&base.join(pattern), env))
        .collect();
    projects
        .into_iter()
        .filter(|path| !ignored.contains(&resolve_project_path(path, env)))
        .collect()
}

fn normalize_project_directories(paths: Vec<PathBuf>, env: &Environment) -> Vec<PathBuf> {
    let mut normalized: Vec<PathBuf> = paths
        .into_iter()
        .map(|path| resolve_project_path(&path, env))
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Canonicalize while tolerating filesystem errors; the test hook forces
/// the fallback branch.
pub fn resolve_project_path(path: &Path, env: &Environment) -> PathBuf {
    if env.var("KANBUS_TEST_CANONICALIZE_FAILURE").is_some() {
        return path.to_path_buf();
    }
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn find_git_root(root: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let path = PathBuf::from(stdout);
    path.is_dir().then_some(path)
}

/// Find a sibling `project-local/` directory for a project.
pub fn find_project_local_directory(project_dir: &Path) -> Option<PathBuf> {
    let local_dir = project_dir.parent()?.join("project-local");
    local_dir.is_dir().then_some(local_dir)
}

/// Ensure `project-local/` exists (with `issues/` and `events/`) and is
/// excluded from version control.
pub fn ensure_project_local_directory(project_dir: &Path) -> Result<PathBuf, KanbusError> {
    let parent = project_dir
        .parent()
        .ok_or_else(|| KanbusError::Io("project-local path unavailable".to_string()))?;
    let local_dir = parent.join("project-local");
    std::fs::create_dir_all(local_dir.join("issues")).map_err(KanbusError::io)?;
    std::fs::create_dir_all(local_dir.join("events")).map_err(KanbusError::io)?;
    ensure_gitignore_entry(parent, "project-local/")?;
    Ok(local_dir)
}

fn ensure_gitignore_entry(root: &Path, entry: &str) -> Result<(), KanbusError> {
    let gitignore_path = root.join(".gitignore");
    let existing = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path).map_err(KanbusError::io)?
    } else {
        String::new()
    };
    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    std::fs::write(&gitignore_path, updated).map_err(KanbusError::io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn env() -> Environment {
        Environment::from_os()
    }

    #[test]
    fn scan_finds_root_and_child_projects_only() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        fs::create_dir_all(temp.path().join("service/project")).unwrap();
        fs::create_dir_all(temp.path().join("service/deep/project")).unwrap();

        let projects = scan_for_project_directories(temp.path()).unwrap();
        assert_eq!(projects.len(), 2);
        assert!(!projects
            .iter()
            .any(|path| path.ends_with("deep/project")));
    }

    #[test]
    fn load_project_directory_requires_exactly_one() {
        let temp = tempdir().unwrap();
        let error = load_project_directory(temp.path(), &env()).unwrap_err();
        assert_eq!(error.kind(), "project_not_initialized");

        fs::create_dir_all(temp.path().join("project")).unwrap();
        fs::create_dir_all(temp.path().join("other/project")).unwrap();
        let error = load_project_directory(temp.path(), &env()).unwrap_err();
        assert_eq!(error.kind(), "multiple_projects_found");
    }

    #[test]
    fn missing_virtual_project_path_fails() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        fs::write(
            temp.path().join(".kanbus.yml"),
            "virtual_projects:\n  gone:\n    path: nowhere/project\n",
        )
        .unwrap();
        let error = discover_configured_projects(temp.path(), &env()).unwrap_err();
        assert_eq!(error.kind(), "virtual_project_path_not_found");
    }

    #[test]
    fn ignore_paths_hide_discovered_projects() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        fs::create_dir_all(temp.path().join("vendor/project")).unwrap();
        fs::write(
            temp.path().join(".kanbus.yml"),
            "ignore_paths:\n  - vendor/project\n",
        )
        .unwrap();
        let projects = discover_project_directories(temp.path(), &env()).unwrap();
        assert_eq!(projects.len(), 1);
        assert!(projects[0].ends_with("project"));
        assert!(!projects[0].ends_with("vendor/project"));
    }

    #[test]
    fn gitignore_entry_is_written_once() {
        let temp = tempdir().unwrap();
        let project_dir = temp.path().join("project");
        fs::create_dir_all(&project_dir).unwrap();
        ensure_project_local_directory(&project_dir).unwrap();
        ensure_project_local_directory(&project_dir).unwrap();
        let contents = fs::read_to_string(temp.path().join(".gitignore")).unwrap();
        assert_eq!(contents.matches("project-local/").count(), 1);
    }

    #[test]
    fn canonicalize_hook_forces_fallback() {
        let temp = tempdir().unwrap();
        let hooked = Environment::from_os().with_var("KANBUS_TEST_CANONICALIZE_FAILURE", "1");
        let raw = temp.path().join("project");
        assert_eq!(resolve_project_path(&raw, &hooked), raw);
    }
}
