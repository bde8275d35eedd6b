//! Repository initialization and git checks.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::write_default_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::project::ensure_project_local_directory;

/// File written at the repository root so agents know the working process.
pub const AGENT_TEMPLATE_FILENAME: &str = "CONTRIBUTING_AGENT.template.md";

const AGENT_TEMPLATE: &str = "# Working with this project\n\n\
Issues are tracked with Kanbus. Use the `kbs` CLI for every change:\n\n\
- `kbs list` shows open work; `kbs ready` shows unblocked work.\n\
- `kbs create \"<title>\" --type <type>` opens an issue.\n\
- `kbs update <id> --status <status>` moves it through the workflow.\n\
- `kbs close <id>` finishes it.\n\n\
Never edit files under `project/` by hand.\n";

const PROJECT_AGENTS_GUARD: &str = "# DO NOT EDIT HERE\n\n\
Files under project/ are Kanbus data. Editing them directly corrupts the\n\
issue store. Use the kbs CLI instead.\n\n\
See ../CONTRIBUTING_AGENT.template.md for the required process.\n";

const PROJECT_DO_NOT_EDIT: &str = "DO NOT EDIT ANYTHING IN project/\n\
All changes must go through the kbs CLI.\n";

/// Ensure `root` is inside a git work tree.
pub fn ensure_git_repository(root: &Path) -> Result<(), KanbusError> {
    let output = Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(root)
        .output()
        .map_err(KanbusError::io)?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || stdout != "true" {
        return Err(KanbusError::NotAGitRepository);
    }
    Ok(())
}

/// Initialize the Kanbus project structure under `root`.
///
/// Creates `.kanbus.yml` (when absent), `project/issues/`, `project/events/`,
/// the guard files, and the agent template. With `create_local`, also
/// provisions `project-local/` and its `.gitignore` entry.
pub fn initialize_project(root: &Path, create_local: bool) -> Result<(), KanbusError> {
    let project_dir = root.join("project");
    if project_dir.exists() {
        return Err(KanbusError::AlreadyInitialized);
    }

    std::fs::create_dir_all(project_dir.join("issues")).map_err(KanbusError::io)?;
    std::fs::create_dir_all(project_dir.join("events")).map_err(KanbusError::io)?;

    let config_path = root.join(".kanbus.yml");
    if !config_path.exists() {
        write_default_configuration(&config_path)?;
    }

    let template_path = root.join(AGENT_TEMPLATE_FILENAME);
    if !template_path.exists() {
        std::fs::write(&template_path, AGENT_TEMPLATE).map_err(KanbusError::io)?;
    }

    std::fs::write(project_dir.join("AGENTS.md"), PROJECT_AGENTS_GUARD)
        .map_err(KanbusError::io)?;
    std::fs::write(project_dir.join("DO_NOT_EDIT"), PROJECT_DO_NOT_EDIT)
        .map_err(KanbusError::io)?;

    if create_local {
        ensure_project_local_directory(&project_dir)?;
    }
    Ok(())
}

/// Resolve the working root for a CLI invocation.
pub fn resolve_root(cwd: &Path, env: &Environment) -> PathBuf {
    crate::project::resolve_project_path(cwd, env)
}
