//! Daemon client with stale-socket recovery.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::daemon_paths::get_daemon_socket_path;
use crate::daemon_protocol::{RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION};
use crate::environment::Environment;
use crate::error::KanbusError;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(2);
const SPAWN_RETRIES: usize = 10;
const SPAWN_BACKOFF: Duration = Duration::from_millis(50);

/// Ask the daemon for the issue list, spawning it when necessary.
pub fn request_index_list(root: &Path, env: &Environment) -> Result<Vec<Value>, KanbusError> {
    let result = request(root, env, "index.list")?;
    match result.get("issues") {
        Some(Value::Array(values)) => Ok(values.clone()),
        _ => Ok(Vec::new()),
    }
}

/// Ping the daemon and return its status payload.
pub fn request_status(
    root: &Path,
    env: &Environment,
) -> Result<BTreeMap<String, Value>, KanbusError> {
    request(root, env, "ping")
}

/// Ask the daemon to stop.
pub fn request_shutdown(
    root: &Path,
    env: &Environment,
) -> Result<BTreeMap<String, Value>, KanbusError> {
    request(root, env, "shutdown")
}

fn request(
    root: &Path,
    env: &Environment,
    action: &str,
) -> Result<BTreeMap<String, Value>, KanbusError> {
    if !env.daemon_enabled() {
        return Err(KanbusError::DaemonDisabled);
    }
    let socket_path = get_daemon_socket_path(root)?;
    let request = RequestEnvelope {
        protocol_version: PROTOCOL_VERSION.to_string(),
        request_id: format!("req-{}", env.next_uuid().simple()),
        action: action.to_string(),
        payload: BTreeMap::new(),
    };
    // Only a listing warrants starting a daemon that is not yet running;
    // status and shutdown still respawn through the recovery path when a
    // stale socket file is present.
    if action == "index.list" && !socket_path.exists() {
        spawn_daemon(root, env)?;
    }
    let response = request_with_recovery(&socket_path, &request, root, env)?;
    if response.status != "ok" {
        return Err(map_response_error(response));
    }
    Ok(response.result.unwrap_or_default())
}

fn map_response_error(response: ResponseEnvelope) -> KanbusError {
    let Some(error) = response.error else {
        return KanbusError::DaemonConnectionFailed;
    };
    match error.code.as_str() {
        "protocol_version_mismatch" => KanbusError::ProtocolVersionMismatch,
        "protocol_version_unsupported" => KanbusError::ProtocolVersionUnsupported,
        _ => KanbusError::Io(error.message),
    }
}

/// One attempt, then stale-socket recovery: delete the socket, respawn the
/// daemon, and retry with a short backoff while it binds.
fn request_with_recovery(
    socket_path: &Path,
    request: &RequestEnvelope,
    root: &Path,
    env: &Environment,
) -> Result<ResponseEnvelope, KanbusError> {
    match send_request(socket_path, request) {
        Ok(response) => Ok(response),
        Err(KanbusError::DaemonConnectionFailed) => {
            debug!(socket = %socket_path.display(), "connect failed; respawning daemon");
            if socket_path.exists() {
                std::fs::remove_file(socket_path).map_err(KanbusError::io)?;
            }
            spawn_daemon(root, env)?;
            let mut last_error = KanbusError::DaemonConnectionFailed;
            for _ in 0..SPAWN_RETRIES {
                match send_request(socket_path, request) {
                    Ok(response) => return Ok(response),
                    Err(KanbusError::DaemonConnectionFailed) => {
                        last_error = KanbusError::DaemonConnectionFailed;
                        std::thread::sleep(SPAWN_BACKOFF);
                    }
                    Err(other) => return Err(other),
                }
            }
            Err(last_error)
        }
        Err(other) => Err(other),
    }
}

#[cfg(unix)]
fn send_request(
    socket_path: &Path,
    request: &RequestEnvelope,
) -> Result<ResponseEnvelope, KanbusError> {
    let stream =
        UnixStream::connect(socket_path).map_err(|_| KanbusError::DaemonConnectionFailed)?;
    stream
        .set_read_timeout(Some(SOCKET_TIMEOUT))
        .map_err(|_| KanbusError::DaemonConnectionFailed)?;
    stream
        .set_write_timeout(Some(SOCKET_TIMEOUT))
        .map_err(|_| KanbusError::DaemonConnectionFailed)?;

    let payload = serde_json::to_string(request).map_err(KanbusError::io)?;
    let mut writer = stream.try_clone().map_err(|_| KanbusError::DaemonConnectionFailed)?;
    writer
        .write_all(payload.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .map_err(|_| KanbusError::DaemonConnectionFailed)?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|_| KanbusError::DaemonConnectionFailed)?;
    if line.trim().is_empty() {
        return Err(KanbusError::EmptyDaemonResponse);
    }
    serde_json::from_str(&line).map_err(KanbusError::io)
}

#[cfg(not(unix))]
fn send_request(
    _socket_path: &Path,
    _request: &RequestEnvelope,
) -> Result<ResponseEnvelope, KanbusError> {
    Err(KanbusError::DaemonConnectionFailed)
}

/// Spawn the daemon as a detached `kbs daemon --root <root>` subprocess.
fn spawn_daemon(root: &Path, env: &Environment) -> Result<(), KanbusError> {
    if !env.spawn_enabled() {
        return Ok(());
    }
    let current_exe = std::env::current_exe().map_err(KanbusError::io)?;
    Command::new(current_exe)
        .arg("daemon")
        .arg("--root")
        .arg(root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(KanbusError::io)?;
    Ok(())
}
