//! Kind-tagged errors for Kanbus operations.
//!
//! Every failure carries a stable machine-readable kind that the CLI prints
//! to stderr ahead of the human-readable message.

use thiserror::Error;

/// Errors returned by Kanbus operations.
#[derive(Debug, Error)]
pub enum KanbusError {
    #[error("not a git repository")]
    NotAGitRepository,

    #[error("project not initialized")]
    ProjectNotInitialized,

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("multiple projects found: {0}. Run this command from a directory with a single project/, or remove extra entries from virtual_projects in .kanbus.yml.")]
    MultipleProjectsFound(String),

    #[error("virtual project path not found: {0}")]
    VirtualProjectPathNotFound(String),

    #[error("unknown configuration fields")]
    UnknownConfigurationFields,

    #[error("{0}")]
    ConfigurationInvalid(String),

    #[error("{0}")]
    InvalidIssueData(String),

    #[error("\"{title}\" already exists as {existing}")]
    DuplicateTitle { title: String, existing: String },

    #[error("unknown issue type '{0}'")]
    UnknownIssueType(String),

    #[error("priority {0} is not defined")]
    InvalidPriority(i64),

    #[error("status '{status}' is not reachable for type '{issue_type}'")]
    InvalidStatus { status: String, issue_type: String },

    #[error("cannot move from '{from}' to '{to}' for type '{issue_type}'")]
    InvalidTransition {
        from: String,
        to: String,
        issue_type: String,
    },

    #[error("'{parent_type}' cannot have child '{child_type}'")]
    InvalidHierarchy {
        parent_type: String,
        child_type: String,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("ambiguous identifier, matches: {0}")]
    AmbiguousShortId(String),

    #[error("cycle detected")]
    CycleDetected,

    #[error("dependency type '{0}' is not supported")]
    InvalidDependencyType(String),

    #[error("{0}")]
    CommentNotFound(String),

    #[error("comment id prefix is ambiguous; matches: {0}")]
    AmbiguousCommentPrefix(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("daemon disabled")]
    DaemonDisabled,

    #[error("daemon connection failed")]
    DaemonConnectionFailed,

    #[error("empty daemon response")]
    EmptyDaemonResponse,

    #[error("protocol version mismatch")]
    ProtocolVersionMismatch,

    #[error("protocol version unsupported")]
    ProtocolVersionUnsupported,

    #[error("{0}")]
    BeadsWriteFailed(String),

    #[error("{0}")]
    BeadsDeleteFailed(String),

    #[error("{0}")]
    MigrationFailed(String),

    /// Unexpected filesystem or serialization failure.
    #[error("{0}")]
    Io(String),
}

impl KanbusError {
    /// Stable kind tag printed on stderr and matched by tooling.
    pub fn kind(&self) -> &'static str {
        match self {
            KanbusError::NotAGitRepository => "not_a_git_repository",
            KanbusError::ProjectNotInitialized => "project_not_initialized",
            KanbusError::AlreadyInitialized => "already_initialized",
            KanbusError::MultipleProjectsFound(_) => "multiple_projects_found",
            KanbusError::VirtualProjectPathNotFound(_) => "virtual_project_path_not_found",
            KanbusError::UnknownConfigurationFields => "unknown_configuration_fields",
            KanbusError::ConfigurationInvalid(_) => "configuration_invalid",
            KanbusError::InvalidIssueData(_) => "invalid_issue_data",
            KanbusError::DuplicateTitle { .. } => "duplicate_title",
            KanbusError::UnknownIssueType(_) => "unknown_issue_type",
            KanbusError::InvalidPriority(_) => "invalid_priority",
            KanbusError::InvalidStatus { .. } => "invalid_status",
            KanbusError::InvalidTransition { .. } => "invalid_transition",
            KanbusError::InvalidHierarchy { .. } => "invalid_hierarchy",
            KanbusError::NotFound(_) => "not_found",
            KanbusError::AmbiguousShortId(_) => "ambiguous_short_id",
            KanbusError::CycleDetected => "cycle_detected",
            KanbusError::InvalidDependencyType(_) => "invalid_dependency_type",
            KanbusError::CommentNotFound(_) => "comment_not_found",
            KanbusError::AmbiguousCommentPrefix(_) => "ambiguous_comment_prefix",
            KanbusError::AlreadyExists(_) => "already_exists",
            KanbusError::DaemonDisabled => "daemon_disabled",
            KanbusError::DaemonConnectionFailed => "daemon_connection_failed",
            KanbusError::EmptyDaemonResponse => "empty_daemon_response",
            KanbusError::ProtocolVersionMismatch => "protocol_version_mismatch",
            KanbusError::ProtocolVersionUnsupported => "protocol_version_unsupported",
            KanbusError::BeadsWriteFailed(_) => "beads_write_failed",
            KanbusError::BeadsDeleteFailed(_) => "beads_delete_failed",
            KanbusError::MigrationFailed(_) => "migration_failed",
            KanbusError::Io(_) => "io_error",
        }
    }

    pub(crate) fn io(error: impl std::fmt::Display) -> Self {
        KanbusError::Io(error.to_string())
    }
}
