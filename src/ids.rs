//! Issue identifier generation and display formatting.

use std::collections::HashSet;

use crate::environment::Environment;
use crate::error::KanbusError;

const MAX_GENERATION_ATTEMPTS: usize = 10;

/// Generate a unique `{prefix}-{uuid4}` identifier, retrying on collision.
pub fn generate_issue_identifier(
    env: &Environment,
    prefix: &str,
    existing_ids: &HashSet<String>,
) -> Result<String, KanbusError> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let identifier = format!("{prefix}-{}", env.next_uuid());
        if !existing_ids.contains(&identifier) {
            return Ok(identifier);
        }
    }
    Err(KanbusError::Io(format!(
        "unable to generate unique id after {MAX_GENERATION_ATTEMPTS} attempts"
    )))
}

/// Produce a display-friendly issue key.
///
/// The UUID portion is truncated to six characters. Inside a single-project
/// context the project key is dropped; in a multi-project listing it is
/// kept so rows stay unambiguous. Numeric and suffixed (`parent.n`) Beads
/// identifiers pass through with the same truncation rules.
pub fn format_issue_key(identifier: &str, project_context: bool) -> String {
    if identifier.chars().all(|ch| ch.is_ascii_digit()) {
        return identifier.to_string();
    }

    let (key_part, remainder) = match identifier.split_once('-') {
        Some((key, rest)) if !key.is_empty() && !rest.is_empty() => (Some(key), rest),
        _ => (None, identifier),
    };

    let (base, suffix) = match remainder.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (remainder, None),
    };

    let truncated: String = base.chars().filter(|ch| *ch != '-').take(6).collect();
    let with_suffix = match suffix {
        Some(tail) => format!("{truncated}.{tail}"),
        None => truncated,
    };

    match key_part {
        Some(key) if !project_context => format!("{key}-{with_suffix}"),
        _ => with_suffix,
    }
}
