//! Kanbus: a file-backed issue tracker.
//!
//! Issues live as pretty-printed JSON files under a repository's
//! `project/` directory, configuration in `.kanbus.yml`, and every
//! mutation appends to a per-scope event log. Listings are served by an
//! mtime-validated index cache or a per-repository Unix-socket daemon, and
//! a Beads bridge reads and writes the peer `.beads/issues.jsonl` format.

pub mod beads_write;
pub mod cache;
pub mod cli;
pub mod config;
pub mod config_loader;
pub mod daemon_client;
pub mod daemon_paths;
pub mod daemon_protocol;
pub mod daemon_server;
pub mod dependencies;
pub mod doctor;
pub mod environment;
pub mod error;
pub mod event_history;
pub mod file_io;
pub mod hierarchy;
pub mod ids;
pub mod index;
pub mod issue_close;
pub mod issue_comment;
pub mod issue_creation;
pub mod issue_delete;
pub mod issue_display;
pub mod issue_files;
pub mod issue_line;
pub mod issue_listing;
pub mod issue_lookup;
pub mod issue_transfer;
pub mod issue_update;
pub mod maintenance;
pub mod migration;
pub mod models;
pub mod project;
pub mod queries;
pub mod workflows;
