//! Per-repository index daemon.
//!
//! A threaded Unix-socket accept loop: one worker thread per connection,
//! one newline-delimited JSON request per connection. Workers share the
//! index behind an `RwLock`; a worker that finds the cache stale builds a
//! fresh index locally and swaps the shared reference, so concurrent
//! readers always see a complete index.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{collect_issue_file_mtimes, load_cache_if_valid, write_cache};
use crate::daemon_paths::{get_daemon_socket_path, get_index_cache_path};
use crate::daemon_protocol::{
    validate_protocol_compatibility, RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION,
};
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::index::build_index_from_directory;
use crate::models::IssueData;
use crate::project::load_project_directory;

const SOCKET_READ_TIMEOUT: Duration = Duration::from_secs(2);

struct DaemonState {
    root: PathBuf,
    env: Environment,
    snapshot: RwLock<Option<IndexSnapshot>>,
}

#[derive(Clone)]
struct IndexSnapshot {
    mtimes: BTreeMap<String, f64>,
    issues: Arc<Vec<IssueData>>,
}

/// Run the daemon for a repository root. Blocks until a shutdown request.
pub fn run_daemon(root: &Path, env: Environment) -> Result<(), KanbusError> {
    let socket_path = get_daemon_socket_path(root)?;
    if socket_path.exists() {
        std::fs::remove_file(&socket_path).map_err(KanbusError::io)?;
    }
    let listener = UnixListener::bind(&socket_path).map_err(KanbusError::io)?;

    let state = Arc::new(DaemonState {
        root: root.to_path_buf(),
        env,
        snapshot: RwLock::new(None),
    });

    // Warm start: the first request should find the index already built.
    if let Err(error) = load_issue_snapshot(&state) {
        warn!(%error, "warm start failed; serving cold");
    } else {
        debug!(root = %state.root.display(), "daemon warm start complete");
    }

    for stream in listener.incoming() {
        let stream = stream.map_err(KanbusError::io)?;
        let state = Arc::clone(&state);
        std::thread::spawn(move || {
            if let Err(error) = handle_connection(&state, stream) {
                debug!(%error, "connection handler failed");
            }
        });
    }
    Ok(())
}

fn handle_connection(state: &DaemonState, stream: UnixStream) -> Result<(), KanbusError> {
    stream
        .set_read_timeout(Some(SOCKET_READ_TIMEOUT))
        .map_err(KanbusError::io)?;
    let mut reader = BufReader::new(stream.try_clone().map_err(KanbusError::io)?);
    let mut line = String::new();
    if reader.read_line(&mut line).map_err(KanbusError::io)? == 0 {
        return Ok(());
    }

    let (response, shutdown) = handle_raw_request(state, &line);
    let payload = serde_json::to_string(&response).map_err(KanbusError::io)?;
    let mut stream = stream;
    stream.write_all(payload.as_bytes()).map_err(KanbusError::io)?;
    stream.write_all(b"\n").map_err(KanbusError::io)?;
    stream.flush().map_err(KanbusError::io)?;

    if shutdown {
        debug!("shutdown requested; stopping accept loop");
        std::process::exit(0);
    }
    Ok(())
}

/// Parse and dispatch one request line. Malformed payloads produce an
/// `internal_error` response and the daemon keeps serving.
fn handle_raw_request(state: &DaemonState, line: &str) -> (ResponseEnvelope, bool) {
    let request_id = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|value| value.get("request_id").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| "unknown".to_string());

    let request: RequestEnvelope = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(error) => {
            return (
                ResponseEnvelope::error(request_id, "internal_error", error.to_string()),
                false,
            );
        }
    };

    if let Err(error) = validate_protocol_compatibility(&request.protocol_version, PROTOCOL_VERSION)
    {
        return (
            ResponseEnvelope::error(request.request_id, error.kind(), error.to_string()),
            false,
        );
    }

    match request.action.as_str() {
        "ping" => {
            let result = BTreeMap::from([(
                "status".to_string(),
                Value::String("ok".to_string()),
            )]);
            (ResponseEnvelope::ok(request.request_id, result), false)
        }
        "shutdown" => {
            let result = BTreeMap::from([(
                "status".to_string(),
                Value::String("stopping".to_string()),
            )]);
            (ResponseEnvelope::ok(request.request_id, result), true)
        }
        "index.list" => match load_issue_snapshot(state) {
            Ok(issues) => {
                let values: Vec<Value> = issues
                    .iter()
                    .map(|issue| serde_json::to_value(issue).unwrap_or(Value::Null))
                    .collect();
                let result =
                    BTreeMap::from([("issues".to_string(), Value::Array(values))]);
                (ResponseEnvelope::ok(request.request_id, result), false)
            }
            Err(error) => (
                ResponseEnvelope::error(request.request_id, "internal_error", error.to_string()),
                false,
            ),
        },
        other => (
            ResponseEnvelope::error(
                request.request_id,
                "unknown_action",
                format!("unknown action '{other}'"),
            ),
            false,
        ),
    }
}

/// Serve the shared snapshot when its mtimes still match the directory;
/// otherwise rebuild, persist the cache, and swap.
fn load_issue_snapshot(state: &DaemonState) -> Result<Arc<Vec<IssueData>>, KanbusError> {
    let project_dir = load_project_directory(&state.root, &state.env)?;
    let issues_dir = project_dir.join("issues");
    let current_mtimes = collect_issue_file_mtimes(&issues_dir)?;

    if let Some(snapshot) = state
        .snapshot
        .read()
        .expect("snapshot lock poisoned")
        .as_ref()
    {
        if snapshot.mtimes == current_mtimes {
            return Ok(Arc::clone(&snapshot.issues));
        }
    }

    debug!(issues_dir = %issues_dir.display(), "index stale; rebuilding");
    let cache_path = get_index_cache_path(&state.root, &state.env)?;
    let index = match load_cache_if_valid(&cache_path, &issues_dir)? {
        Some(index) => index,
        None => {
            let index = build_index_from_directory(&issues_dir)?;
            write_cache(&index, &cache_path, &current_mtimes, &state.env)?;
            index
        }
    };
    let issues = Arc::new(index.issues());
    let snapshot = IndexSnapshot {
        mtimes: current_mtimes,
        issues: Arc::clone(&issues),
    };
    *state.snapshot.write().expect("snapshot lock poisoned") = Some(snapshot);
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::initialize_project;
    use crate::issue_creation::{create_issue, IssueCreationRequest};
    use tempfile::tempdir;

    fn state_for(root: &Path) -> DaemonState {
        DaemonState {
            root: root.to_path_buf(),
            env: Environment::from_os(),
            snapshot: RwLock::new(None),
        }
    }

    fn request_line(action: &str, version: &str) -> String {
        format!(
            "{}\n",
            serde_json::json!({
                "protocol_version": version,
                "request_id": "req-test",
                "action": action,
                "payload": {},
            })
        )
    }

    #[test]
    fn ping_answers_ok() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let state = state_for(temp.path());
        let (response, shutdown) = handle_raw_request(&state, &request_line("ping", "1.0"));
        assert_eq!(response.status, "ok");
        assert!(!shutdown);
        assert_eq!(response.request_id, "req-test");
    }

    #[test]
    fn shutdown_reports_stopping() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let state = state_for(temp.path());
        let (response, shutdown) = handle_raw_request(&state, &request_line("shutdown", "1.0"));
        assert!(shutdown);
        let status = response.result.unwrap()["status"].clone();
        assert_eq!(status, Value::String("stopping".to_string()));
    }

    #[test]
    fn index_list_returns_issue_payloads() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let env = Environment::from_os().with_var("KANBUS_USER", "tester");
        create_issue(
            &IssueCreationRequest {
                root: temp.path().to_path_buf(),
                title: "Indexed".to_string(),
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
        .unwrap();

        let state = state_for(temp.path());
        let (response, _) = handle_raw_request(&state, &request_line("index.list", "1.0"));
        assert_eq!(response.status, "ok");
        let issues = response.result.unwrap()["issues"].clone();
        assert_eq!(issues.as_array().unwrap().len(), 1);
    }

    #[test]
    fn stale_snapshot_is_rebuilt_after_edits() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let env = Environment::from_os().with_var("KANBUS_USER", "tester");
        let state = state_for(temp.path());
        let first = load_issue_snapshot(&state).unwrap();
        assert!(first.is_empty());

        create_issue(
            &IssueCreationRequest {
                root: temp.path().to_path_buf(),
                title: "Late arrival".to_string(),
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
        .unwrap();

        let second = load_issue_snapshot(&state).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn version_gate_rejects_foreign_majors() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let state = state_for(temp.path());
        let (response, _) = handle_raw_request(&state, &request_line("ping", "2.0"));
        assert_eq!(response.status, "error");
        assert_eq!(
            response.error.unwrap().code,
            "protocol_version_mismatch"
        );
    }

    #[test]
    fn malformed_payload_is_internal_error_and_daemon_survives() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let state = state_for(temp.path());
        let (response, shutdown) = handle_raw_request(&state, "{this is not json\n");
        assert_eq!(response.status, "error");
        assert_eq!(response.error.unwrap().code, "internal_error");
        assert!(!shutdown);

        let (after, _) = handle_raw_request(&state, &request_line("ping", "1.0"));
        assert_eq!(after.status, "ok");
    }

    #[test]
    fn unknown_action_is_tagged() {
        let temp = tempdir().unwrap();
        initialize_project(temp.path(), false).unwrap();
        let state = state_for(temp.path());
        let (response, _) = handle_raw_request(&state, &request_line("index.drop", "1.0"));
        assert_eq!(response.error.unwrap().code, "unknown_action");
    }
}
