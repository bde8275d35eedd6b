//! Socket and cache path derivation.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::environment::Environment;
use crate::error::KanbusError;
use crate::project::load_project_directory;

/// Daemon socket path for a repository root.
///
/// Derived from the canonical root path so every repository gets its own
/// daemon: `<tmp>/kanbus-<first 12 hex of sha256(root)>.sock`. Living in
/// the temp directory keeps bound sockets out of the working tree.
pub fn get_daemon_socket_path(root: &Path) -> Result<PathBuf, KanbusError> {
    let canonical = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .display()
        .to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(std::env::temp_dir().join(format!("kanbus-{}.sock", &hex[..12])))
}

/// Index cache path for a repository root.
pub fn get_index_cache_path(root: &Path, env: &Environment) -> Result<PathBuf, KanbusError> {
    let project_dir = load_project_directory(root, env)?;
    Ok(project_dir.join(".cache").join("index.json"))
}
