//! Environment diagnostics.

use std::path::{Path, PathBuf};

use crate::config_loader::load_project_configuration;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::file_io::ensure_git_repository;
use crate::project::{get_configuration_path, load_project_directory};

/// Result of running doctor checks.
#[derive(Debug, Clone)]
pub struct DoctorResult {
    pub project_dir: PathBuf,
}

/// Check git, discovery, and configuration health in one pass.
pub fn run_doctor(root: &Path, env: &Environment) -> Result<DoctorResult, KanbusError> {
    ensure_git_repository(root)?;
    let project_dir = load_project_directory(root, env)?;
    load_project_configuration(&get_configuration_path(&project_dir, env)?)?;
    Ok(DoctorResult { project_dir })
}
