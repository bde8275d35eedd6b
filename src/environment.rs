//! Explicit process environment for Kanbus operations.
//!
//! Operations never read process globals directly; they receive an
//! [`Environment`] carrying the variable table, the clock, and the id
//! sources. Tests construct fakes with frozen clocks and replayable id
//! sequences instead of mutating process state.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Ambient process context threaded through every operation.
#[derive(Debug, Default)]
pub struct Environment {
    overrides: HashMap<String, Option<String>>,
    frozen_now: Option<DateTime<Utc>>,
    uuid_queue: Mutex<VecDeque<Uuid>>,
    slug_queue: Mutex<VecDeque<String>>,
    spawn_disabled: bool,
}

impl Environment {
    /// Environment backed by the real process: OS variables, wall clock,
    /// random ids, subprocess spawning allowed.
    pub fn from_os() -> Self {
        Self::default()
    }

    /// Read a variable, preferring test overrides over the OS table.
    ///
    /// An override of `None` masks an OS variable entirely.
    pub fn var(&self, name: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(name) {
            return value.clone();
        }
        std::env::var(name).ok()
    }

    /// Current UTC instant, or the frozen test instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.frozen_now.unwrap_or_else(Utc::now)
    }

    /// Next issue/comment/event UUID. Consumes the test sequence first,
    /// then falls back to random v4.
    pub fn next_uuid(&self) -> Uuid {
        let mut queue = self.uuid_queue.lock().expect("uuid queue poisoned");
        queue.pop_front().unwrap_or_else(Uuid::new_v4)
    }

    /// Next Beads slug (three base36 characters), test sequence first.
    pub fn next_slug(&self) -> String {
        let mut queue = self.slug_queue.lock().expect("slug queue poisoned");
        if let Some(slug) = queue.pop_front() {
            return slug;
        }
        let mut rng = rand::thread_rng();
        (0..3)
            .map(|_| SLUG_ALPHABET[rng.gen_range(0..SLUG_ALPHABET.len())] as char)
            .collect()
    }

    /// Actor identity: `KANBUS_USER`, then `USER`, then `unknown`.
    pub fn current_user(&self) -> String {
        if let Some(value) = self.var("KANBUS_USER") {
            if !value.trim().is_empty() {
                return value;
            }
        }
        self.var("USER").unwrap_or_else(|| "unknown".to_string())
    }

    /// Whether listing may consult the daemon. Disabled only by
    /// `KANBUS_NO_DAEMON` set to `1`, `true`, or `yes` (case-insensitive);
    /// any other value, including empty, leaves the daemon on.
    pub fn daemon_enabled(&self) -> bool {
        let value = self.var("KANBUS_NO_DAEMON").unwrap_or_default();
        !matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
    }

    /// Whether the client may spawn a daemon subprocess.
    pub fn spawn_enabled(&self) -> bool {
        !self.spawn_disabled
    }

    /// Override a variable for this environment.
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.overrides
            .insert(name.to_string(), Some(value.to_string()));
        self
    }

    /// Mask a variable so OS state cannot leak into a test.
    pub fn without_var(mut self, name: &str) -> Self {
        self.overrides.insert(name.to_string(), None);
        self
    }

    /// Freeze the clock at a fixed instant.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.frozen_now = Some(now);
        self
    }

    /// Replay a fixed UUID sequence before falling back to random.
    pub fn with_uuid_sequence(self, sequence: Vec<Uuid>) -> Self {
        *self.uuid_queue.lock().expect("uuid queue poisoned") = sequence.into();
        self
    }

    /// Replay a fixed Beads slug sequence before falling back to random.
    pub fn with_slug_sequence(self, sequence: Vec<String>) -> Self {
        *self.slug_queue.lock().expect("slug queue poisoned") = sequence.into();
        self
    }

    /// Forbid daemon subprocess spawning (tests).
    pub fn without_daemon_spawn(mut self) -> Self {
        self.spawn_disabled = true;
        self
    }
}
