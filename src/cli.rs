//! CLI command definitions and dispatch.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

use crate::beads_write::{
    add_beads_comment, create_beads_issue, delete_beads_issue, update_beads_issue,
};
use crate::config_loader::load_project_configuration;
use crate::daemon_client::{request_shutdown, request_status};
use crate::daemon_server::run_daemon;
use crate::dependencies::{
    add_dependency, build_dependency_tree, is_blocked, list_ready_issues, remove_dependency,
    render_dependency_tree, BLOCKED_BY, RELATES_TO,
};
use crate::doctor::run_doctor;
use crate::environment::Environment;
use crate::error::KanbusError;
use crate::file_io::{ensure_git_repository, initialize_project, resolve_root};
use crate::ids::format_issue_key;
use crate::issue_close::close_issue;
use crate::issue_comment::{add_comment, delete_comment, update_comment};
use crate::issue_creation::{create_issue, IssueCreationRequest};
use crate::issue_delete::delete_issue;
use crate::issue_display::format_issue_for_display;
use crate::issue_line::{compute_widths, format_issue_line};
use crate::issue_listing::{list_issues, ListOptions};
use crate::issue_lookup::load_issue_from_project;
use crate::issue_transfer::{localize_issue, promote_issue};
use crate::issue_update::{update_issue, IssueUpdateRequest};
use crate::maintenance::{collect_project_stats, validate_project};
use crate::migration::{load_beads_issue, load_beads_issues, migrate_from_beads};
use crate::models::IssueData;
use crate::project::get_configuration_path;
use crate::queries::{filter_issues, search_issues};

/// Kanbus CLI arguments.
#[derive(Debug, Parser)]
#[command(name = "kbs", version, about = "File-backed issue tracker")]
pub struct Cli {
    /// Use the Beads backend (.beads/issues.jsonl).
    #[arg(long, global = true)]
    beads: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize a Kanbus project in the current repository.
    Init {
        /// Also create project-local/.
        #[arg(long)]
        local: bool,
    },
    /// Create a new issue.
    Create {
        /// Issue title.
        title: String,
        /// Issue type.
        #[arg(long = "type", value_name = "TYPE")]
        issue_type: Option<String>,
        /// Priority index.
        #[arg(long)]
        priority: Option<i64>,
        /// Assignee.
        #[arg(long)]
        assignee: Option<String>,
        /// Parent issue identifier.
        #[arg(long)]
        parent: Option<String>,
        /// Label (repeatable).
        #[arg(long = "label")]
        labels: Vec<String>,
        /// Description body.
        #[arg(long)]
        description: Option<String>,
        /// Create in project-local.
        #[arg(long)]
        local: bool,
        /// Skip content validation.
        #[arg(long = "no-validate")]
        no_validate: bool,
    },
    /// Show one issue.
    Show {
        identifier: String,
        /// Emit the raw JSON record.
        #[arg(long)]
        json: bool,
    },
    /// Update fields on an issue.
    Update {
        identifier: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        /// Add a label (repeatable).
        #[arg(long = "add-label")]
        add_labels: Vec<String>,
        /// Remove a label (repeatable).
        #[arg(long = "remove-label")]
        remove_labels: Vec<String>,
        /// Replace the label list (comma-separated).
        #[arg(long = "labels")]
        set_labels: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        /// Take the issue: status in_progress, assignee to the current user.
        #[arg(long)]
        claim: bool,
        /// Skip content validation.
        #[arg(long = "no-validate")]
        no_validate: bool,
    },
    /// Close an issue.
    Close { identifier: String },
    /// Delete an issue.
    Delete { identifier: String },
    /// Promote a local issue into the shared scope.
    Promote { identifier: String },
    /// Move a shared issue into project-local.
    Localize { identifier: String },
    /// Add, edit, or remove a comment.
    Comment {
        identifier: String,
        /// Comment text (for add and --update).
        text: Vec<String>,
        /// Rewrite the comment matching this id prefix.
        #[arg(long = "update", value_name = "PREFIX")]
        update: Option<String>,
        /// Delete the comment matching this id prefix.
        #[arg(long = "delete", value_name = "PREFIX")]
        delete: Option<String>,
    },
    /// List issues.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        issue_type: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// Exclude project-local issues.
        #[arg(long = "no-local")]
        no_local: bool,
        /// Show only project-local issues.
        #[arg(long = "local-only")]
        local_only: bool,
        /// Maximum number of rows.
        #[arg(long)]
        limit: Option<usize>,
        /// Plain machine-readable output.
        #[arg(long)]
        porcelain: bool,
    },
    /// List unblocked, non-closed issues.
    Ready {
        #[arg(long = "no-local")]
        no_local: bool,
        #[arg(long = "local-only")]
        local_only: bool,
    },
    /// Manage dependencies.
    Dep {
        #[command(subcommand)]
        command: DependencyCommands,
    },
    /// Validate project integrity.
    Validate,
    /// Report project statistics.
    Stats,
    /// Run environment diagnostics.
    Doctor,
    /// Import Beads issues into a native project.
    Migrate,
    /// Run the index daemon (spawned internally).
    #[command(hide = true)]
    Daemon {
        #[arg(long)]
        root: PathBuf,
    },
    /// Report daemon status.
    #[command(name = "daemon-status")]
    DaemonStatus,
    /// Stop the daemon.
    #[command(name = "daemon-stop")]
    DaemonStop,
}

#[derive(Debug, Subcommand)]
enum DependencyCommands {
    /// Add a dependency link.
    Add {
        identifier: String,
        #[arg(long = "blocked-by", value_name = "TARGET")]
        blocked_by: Option<String>,
        #[arg(long = "relates-to", value_name = "TARGET")]
        relates_to: Option<String>,
    },
    /// Remove a dependency link.
    Remove {
        identifier: String,
        #[arg(long = "blocked-by", value_name = "TARGET")]
        blocked_by: Option<String>,
        #[arg(long = "relates-to", value_name = "TARGET")]
        relates_to: Option<String>,
    },
    /// Render the blocked-by tree.
    Tree {
        identifier: String,
        #[arg(long)]
        depth: Option<usize>,
    },
}

/// Captured stdout of one command.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Run the CLI and print its output.
pub fn run_from_args<I, T>(args: I, cwd: &Path, env: &Environment) -> Result<(), KanbusError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let output = run_from_args_with_output(args, cwd, env)?;
    if !output.stdout.is_empty() {
        println!("{}", output.stdout);
    }
    Ok(())
}

/// Run the CLI and capture stdout (tests and embedding).
pub fn run_from_args_with_output<I, T>(
    args: I,
    cwd: &Path,
    env: &Environment,
) -> Result<CommandOutput, KanbusError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => {
            let rendered = error.render().to_string();
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                    | ErrorKind::DisplayVersion
            ) {
                return Ok(CommandOutput { stdout: rendered });
            }
            return Err(KanbusError::Io(rendered));
        }
    };
    let root = resolve_root(cwd, env);
    let (beads_mode, beads_forced) = resolve_beads_mode(&root, env, cli.beads)?;
    let stdout = execute_command(cli.command, &root, env, beads_mode, beads_forced)?;
    Ok(CommandOutput {
        stdout: stdout.unwrap_or_default(),
    })
}

/// Beads mode comes from the flag or from configuration.
fn resolve_beads_mode(
    root: &Path,
    env: &Environment,
    beads_flag: bool,
) -> Result<(bool, bool), KanbusError> {
    if beads_flag {
        return Ok((true, true));
    }
    let configuration_path = match get_configuration_path(root, env) {
        Ok(path) => path,
        Err(KanbusError::ProjectNotInitialized) => return Ok((false, false)),
        Err(KanbusError::ConfigurationInvalid(message))
            if message == "configuration path lookup failed" =>
        {
            return Ok((false, false))
        }
        Err(error) => return Err(error),
    };
    let configuration = load_project_configuration(&configuration_path)?;
    Ok((configuration.beads_compatibility, false))
}

/// Beads files live next to the configuration marker when one exists.
fn beads_root(root: &Path, env: &Environment) -> PathBuf {
    get_configuration_path(root, env)
        .ok()
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| root.to_path_buf())
}

fn execute_command(
    command: Commands,
    root: &Path,
    env: &Environment,
    beads_mode: bool,
    beads_forced: bool,
) -> Result<Option<String>, KanbusError> {
    match command {
        Commands::Init { local } => {
            ensure_git_repository(root)?;
            initialize_project(root, local)?;
            Ok(None)
        }
        Commands::Create {
            title,
            issue_type,
            priority,
            assignee,
            parent,
            labels,
            description,
            local,
            no_validate,
        } => {
            if title.trim().is_empty() {
                return Err(KanbusError::Io("title is required".to_string()));
            }
            if beads_mode {
                if local {
                    return Err(KanbusError::BeadsWriteFailed(
                        "beads mode does not support local issues".to_string(),
                    ));
                }
                let issue = create_beads_issue(
                    &beads_root(root, env),
                    env,
                    &title,
                    issue_type.as_deref(),
                    priority,
                    assignee.as_deref(),
                    parent.as_deref(),
                    description.as_deref(),
                )?;
                return Ok(Some(format_issue_for_display(&issue, None, use_color(env))));
            }
            let result = create_issue(
                &IssueCreationRequest {
                    root: root.to_path_buf(),
                    title,
                    issue_type,
                    priority,
                    assignee,
                    parent,
                    labels,
                    description,
                    local,
                    validate: !no_validate,
                },
                env,
            )?;
            Ok(Some(format_issue_for_display(
                &result.issue,
                Some(&result.configuration),
                use_color(env),
            )))
        }
        Commands::Show { identifier, json } => {
            let (issue, configuration) = if beads_mode {
                (load_beads_issue(&beads_root(root, env), &identifier)?, None)
            } else {
                let lookup = load_issue_from_project(root, env, &identifier)?;
                let configuration = load_project_configuration(&get_configuration_path(
                    &lookup.project_dir,
                    env,
                )?)?;
                (lookup.issue, Some(configuration))
            };
            if json {
                return Ok(Some(
                    serde_json::to_string_pretty(&issue).map_err(KanbusError::io)?,
                ));
            }
            Ok(Some(format_issue_for_display(
                &issue,
                configuration.as_ref(),
                use_color(env),
            )))
        }
        Commands::Update {
            identifier,
            title,
            description,
            status,
            assignee,
            priority,
            add_labels,
            remove_labels,
            set_labels,
            parent,
            claim,
            no_validate,
        } => {
            if beads_mode {
                update_beads_issue(
                    &beads_root(root, env),
                    env,
                    &identifier,
                    status.as_deref(),
                    title.as_deref(),
                    description.as_deref(),
                    assignee.as_deref(),
                )?;
            } else {
                let request = IssueUpdateRequest {
                    title,
                    description,
                    status,
                    assignee,
                    priority,
                    add_labels,
                    remove_labels,
                    set_labels: set_labels.map(|value| {
                        value
                            .split(',')
                            .map(|label| label.trim().to_string())
                            .filter(|label| !label.is_empty())
                            .collect()
                    }),
                    parent,
                    claim,
                    validate: !no_validate,
                };
                update_issue(root, env, &identifier, &request)?;
            }
            Ok(Some(format!("Updated {}", format_issue_key(&identifier, false))))
        }
        Commands::Close { identifier } => {
            if beads_mode {
                update_beads_issue(
                    &beads_root(root, env),
                    env,
                    &identifier,
                    Some("closed"),
                    None,
                    None,
                    None,
                )?;
            } else {
                close_issue(root, env, &identifier)?;
            }
            Ok(Some(format!("Closed {}", format_issue_key(&identifier, false))))
        }
        Commands::Delete { identifier } => {
            if beads_mode {
                delete_beads_issue(&beads_root(root, env), &identifier)?;
            } else {
                delete_issue(root, env, &identifier)?;
            }
            Ok(Some(format!("Deleted {}", format_issue_key(&identifier, false))))
        }
        Commands::Promote { identifier } => {
            promote_issue(root, env, &identifier)?;
            Ok(Some(format!("Promoted {}", format_issue_key(&identifier, false))))
        }
        Commands::Localize { identifier } => {
            localize_issue(root, env, &identifier)?;
            Ok(Some(format!("Localized {}", format_issue_key(&identifier, false))))
        }
        Commands::Comment {
            identifier,
            text,
            update,
            delete,
        } => {
            let text = text.join(" ");
            if let Some(prefix) = delete {
                if beads_mode {
                    return Err(KanbusError::BeadsWriteFailed(
                        "beads mode does not support comment deletion".to_string(),
                    ));
                }
                delete_comment(root, env, &identifier, &prefix)?;
                return Ok(None);
            }
            if text.trim().is_empty() {
                return Err(KanbusError::Io("comment text is required".to_string()));
            }
            if let Some(prefix) = update {
                if beads_mode {
                    return Err(KanbusError::BeadsWriteFailed(
                        "beads mode does not support comment edits".to_string(),
                    ));
                }
                update_comment(root, env, &identifier, &prefix, &text)?;
                return Ok(None);
            }
            if beads_mode {
                add_beads_comment(
                    &beads_root(root, env),
                    env,
                    &identifier,
                    &env.current_user(),
                    &text,
                )?;
            } else {
                add_comment(root, env, &identifier, &env.current_user(), &text)?;
            }
            Ok(None)
        }
        Commands::List {
            status,
            issue_type,
            assignee,
            label,
            sort,
            search,
            no_local,
            local_only,
            limit,
            porcelain,
        } => {
            let issues = if beads_mode {
                if no_local || local_only {
                    return Err(KanbusError::Io(
                        "beads mode does not support local filtering".to_string(),
                    ));
                }
                let issues = load_beads_issues(&beads_root(root, env))?;
                let filtered = filter_issues(
                    issues,
                    status.as_deref(),
                    issue_type.as_deref(),
                    assignee.as_deref(),
                    label.as_deref(),
                );
                let mut searched = search_issues(filtered, search.as_deref());
                searched.sort_by(|left, right| {
                    left.priority
                        .cmp(&right.priority)
                        .then_with(|| beads_sort_timestamp(right).cmp(&beads_sort_timestamp(left)))
                        .then_with(|| left.identifier.cmp(&right.identifier))
                });
                if let Some(limit) = limit {
                    searched.truncate(limit);
                }
                searched
            } else {
                list_issues(
                    root,
                    env,
                    &ListOptions {
                        status,
                        issue_type,
                        assignee,
                        label,
                        sort,
                        search,
                        include_local: !no_local,
                        local_only,
                        limit,
                    },
                )?
            };
            Ok(Some(render_listing(
                &issues,
                root,
                env,
                beads_mode,
                beads_forced,
                porcelain,
            )?))
        }
        Commands::Ready {
            no_local,
            local_only,
        } => {
            let issues = if beads_mode {
                if no_local || local_only {
                    return Err(KanbusError::Io(
                        "beads mode does not support local filtering".to_string(),
                    ));
                }
                load_beads_issues(&beads_root(root, env))?
                    .into_iter()
                    .filter(|issue| issue.status != "closed" && !is_blocked(issue))
                    .collect()
            } else {
                list_ready_issues(root, env, !no_local, local_only)?
            };
            let lines: Vec<String> = issues.iter().map(format_ready_line).collect();
            Ok(Some(lines.join("\n")))
        }
        Commands::Dep { command } => match command {
            DependencyCommands::Add {
                identifier,
                blocked_by,
                relates_to,
            } => {
                let (target, dependency_type) = pick_dependency(blocked_by, relates_to)?;
                add_dependency(root, env, &identifier, &target, dependency_type)?;
                Ok(None)
            }
            DependencyCommands::Remove {
                identifier,
                blocked_by,
                relates_to,
            } => {
                let (target, dependency_type) = pick_dependency(blocked_by, relates_to)?;
                remove_dependency(root, env, &identifier, &target, dependency_type)?;
                Ok(None)
            }
            DependencyCommands::Tree { identifier, depth } => {
                let tree = build_dependency_tree(root, env, &identifier, depth)?;
                Ok(Some(render_dependency_tree(&tree)))
            }
        },
        Commands::Validate => {
            validate_project(root, env)?;
            Ok(Some("ok".to_string()))
        }
        Commands::Stats => {
            let stats = collect_project_stats(root, env)?;
            let mut lines = vec![
                format!("total issues: {}", stats.total),
                format!("open issues: {}", stats.open_count),
                format!("closed issues: {}", stats.closed_count),
            ];
            for (issue_type, count) in stats.type_counts {
                lines.push(format!("type: {issue_type}: {count}"));
            }
            Ok(Some(lines.join("\n")))
        }
        Commands::Doctor => {
            let result = run_doctor(root, env)?;
            Ok(Some(format!("ok {}", result.project_dir.display())))
        }
        Commands::Migrate => {
            let result = migrate_from_beads(&beads_root(root, env), env)?;
            Ok(Some(format!("migrated {} issues", result.issue_count)))
        }
        Commands::Daemon { root } => {
            init_daemon_logging();
            run_daemon(&root, Environment::from_os())?;
            Ok(None)
        }
        Commands::DaemonStatus => {
            let status = request_status(root, env)?;
            Ok(Some(
                serde_json::to_string_pretty(&status).map_err(KanbusError::io)?,
            ))
        }
        Commands::DaemonStop => {
            let status = request_shutdown(root, env)?;
            Ok(Some(
                serde_json::to_string_pretty(&status).map_err(KanbusError::io)?,
            ))
        }
    }
}

fn render_listing(
    issues: &[IssueData],
    root: &Path,
    env: &Environment,
    beads_mode: bool,
    beads_forced: bool,
    porcelain: bool,
) -> Result<String, KanbusError> {
    let configuration = if beads_mode {
        None
    } else {
        match get_configuration_path(root, env) {
            Ok(path) => Some(load_project_configuration(&path)?),
            Err(KanbusError::ProjectNotInitialized) => None,
            Err(error) => return Err(error),
        }
    };
    // Project keys are dropped inside a single-project context; a
    // multi-project listing keeps them so rows stay unambiguous.
    let project_context = if beads_mode {
        beads_forced
    } else {
        !issues
            .iter()
            .any(|issue| issue.custom.contains_key("project_path"))
    };
    let widths = if porcelain {
        None
    } else {
        Some(compute_widths(issues, project_context))
    };
    let color = !porcelain && use_color(env);
    let lines: Vec<String> = issues
        .iter()
        .map(|issue| {
            format_issue_line(
                issue,
                widths.as_ref(),
                porcelain,
                project_context,
                configuration.as_ref(),
                color,
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

fn pick_dependency(
    blocked_by: Option<String>,
    relates_to: Option<String>,
) -> Result<(String, &'static str), KanbusError> {
    match (blocked_by, relates_to) {
        (Some(target), None) => Ok((target, BLOCKED_BY)),
        (None, Some(target)) => Ok((target, RELATES_TO)),
        (Some(_), Some(_)) => Err(KanbusError::Io(
            "choose one of --blocked-by or --relates-to".to_string(),
        )),
        (None, None) => Err(KanbusError::Io(
            "dependency target is required".to_string(),
        )),
    }
}

/// Recency key for Beads listings: a closed issue stays pinned to its close
/// time even when later edits move `updated_at`.
fn beads_sort_timestamp(issue: &IssueData) -> chrono::DateTime<chrono::Utc> {
    issue.closed_at.unwrap_or(issue.updated_at)
}

fn format_ready_line(issue: &IssueData) -> String {
    let prefix = issue
        .custom
        .get("project_path")
        .and_then(|value| value.as_str())
        .map(|value| format!("{value} "))
        .unwrap_or_default();
    format!("{prefix}{}", issue.identifier)
}

fn use_color(env: &Environment) -> bool {
    use std::io::IsTerminal;
    env.var("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

fn init_daemon_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the CLI using process arguments and the current directory.
pub fn run_from_env() -> Result<(), KanbusError> {
    let cwd = std::env::current_dir().map_err(KanbusError::io)?;
    run_from_args(std::env::args_os(), &cwd, &Environment::from_os())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn env() -> Environment {
        Environment::from_os()
            .with_var("KANBUS_USER", "tester")
            .with_var("KANBUS_NO_DAEMON", "1")
            .without_daemon_spawn()
    }

    fn git_init(root: &Path) {
        std::process::Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(root)
            .output()
            .expect("git init");
    }

    fn run(root: &Path, args: &[&str]) -> Result<CommandOutput, KanbusError> {
        let mut full = vec!["kbs"];
        full.extend_from_slice(args);
        run_from_args_with_output(full, root, &env())
    }

    #[test]
    fn init_requires_git() {
        let temp = tempdir().unwrap();
        let error = run(temp.path(), &["init"]).unwrap_err();
        assert_eq!(error.kind(), "not_a_git_repository");
    }

    #[test]
    fn full_crud_flow_through_the_cli() {
        let temp = tempdir().unwrap();
        git_init(temp.path());
        run(temp.path(), &["init"]).unwrap();

        let created = run(temp.path(), &["create", "Implement OAuth2 flow"]).unwrap();
        let id_line = created
            .stdout
            .lines()
            .find(|line| line.starts_with("ID: "))
            .unwrap();
        let id = id_line.trim_start_matches("ID: ").to_string();
        assert!(id.starts_with("kbs-"));

        let shown = run(temp.path(), &["show", &id, "--json"]).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&shown.stdout).unwrap();
        assert_eq!(payload["status"], "open");
        assert_eq!(payload["priority"], 2);

        run(temp.path(), &["close", &id]).unwrap();
        let closed = run(temp.path(), &["show", &id, "--json"]).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&closed.stdout).unwrap();
        assert_eq!(payload["status"], "closed");
        assert!(payload["closed_at"].is_string());

        run(temp.path(), &["delete", &id]).unwrap();
        let error = run(temp.path(), &["delete", &id]).unwrap_err();
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn list_porcelain_is_stable() {
        let temp = tempdir().unwrap();
        git_init(temp.path());
        run(temp.path(), &["init"]).unwrap();
        run(temp.path(), &["create", "Row one"]).unwrap();
        run(temp.path(), &["create", "Row two"]).unwrap();

        let listing = run(temp.path(), &["list", "--porcelain"]).unwrap();
        let lines: Vec<&str> = listing.stdout.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.split('|').count() == 6));
    }

    #[test]
    fn dep_add_requires_a_target() {
        let temp = tempdir().unwrap();
        git_init(temp.path());
        run(temp.path(), &["init"]).unwrap();
        let error = run(temp.path(), &["dep", "add", "kbs-a"]).unwrap_err();
        assert!(error.to_string().contains("dependency target"));
    }

    #[test]
    fn help_is_not_an_error() {
        let temp = tempdir().unwrap();
        let output = run(temp.path(), &["--help"]).unwrap();
        assert!(output.stdout.contains("kbs"));
    }

    #[test]
    fn beads_round_trip_through_the_cli() {
        let temp = tempdir().unwrap();
        git_init(temp.path());
        let beads_dir = temp.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        let seed = serde_json::json!({
            "id": "bdx-epic",
            "title": "Seed epic",
            "description": "",
            "status": "open",
            "priority": 1,
            "issue_type": "epic",
            "created_at": "2026-03-04T10:00:00Z",
            "updated_at": "2026-03-04T10:00:00Z",
        });
        std::fs::write(beads_dir.join("issues.jsonl"), format!("{seed}\n")).unwrap();

        run(
            temp.path(),
            &["--beads", "create", "child", "--parent", "bdx-epic"],
        )
        .unwrap();
        let contents = std::fs::read_to_string(beads_dir.join("issues.jsonl")).unwrap();
        assert!(contents.contains("bdx-epic.1"));
        assert!(contents.contains("parent-child"));

        // A forced beads listing keeps display keys in project context.
        let listing = run(temp.path(), &["--beads", "list", "--porcelain"]).unwrap();
        assert!(listing.stdout.contains("epic.1"));
        assert_eq!(listing.stdout.lines().count(), 2);
    }

    #[test]
    fn beads_listing_pins_closed_issues_to_their_close_time() {
        let temp = tempdir().unwrap();
        git_init(temp.path());
        let beads_dir = temp.path().join(".beads");
        std::fs::create_dir_all(&beads_dir).unwrap();
        // "stale" closed earlier but was edited afterwards; "fresh" closed
        // later. Close time, not edit time, decides the order.
        let stale = serde_json::json!({
            "id": "bdx-old",
            "title": "Stale close",
            "description": "",
            "status": "closed",
            "priority": 2,
            "issue_type": "task",
            "created_at": "2026-02-01T10:00:00Z",
            "updated_at": "2026-03-10T10:00:00Z",
            "closed_at": "2026-03-01T10:00:00Z",
        });
        let fresh = serde_json::json!({
            "id": "bdx-new",
            "title": "Fresh close",
            "description": "",
            "status": "closed",
            "priority": 2,
            "issue_type": "task",
            "created_at": "2026-02-01T10:00:00Z",
            "updated_at": "2026-03-05T10:00:00Z",
            "closed_at": "2026-03-05T10:00:00Z",
        });
        std::fs::write(
            beads_dir.join("issues.jsonl"),
            format!("{stale}\n{fresh}\n"),
        )
        .unwrap();

        let listing = run(temp.path(), &["--beads", "list", "--porcelain"]).unwrap();
        let lines: Vec<&str> = listing.stdout.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(
            lines[0].contains("Fresh close"),
            "most recent close sorts first: {lines:?}"
        );
        assert!(lines[1].contains("Stale close"));
    }
}
