//! Configuration loading and validation.
//!
//! `.kanbus.yml` is merged over the built-in defaults, then an optional
//! `.kanbus.override.yml` is shallow-merged on top (additively for
//! `virtual_projects`). The merged mapping must decode without unknown
//! fields and pass the semantic checks in [`validate_project_configuration`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::config::{default_project_configuration, COLOR_PALETTE};
use crate::error::KanbusError;
use crate::models::ProjectConfiguration;

/// Load a project configuration from disk.
pub fn load_project_configuration(path: &Path) -> Result<ProjectConfiguration, KanbusError> {
    let contents = fs::read_to_string(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            KanbusError::ConfigurationInvalid("configuration file not found".to_string())
        } else {
            KanbusError::io(error)
        }
    })?;

    let primary = parse_mapping(&contents, "configuration")?;
    let overrides = load_override_mapping(path.parent().unwrap_or(Path::new(".")))?;

    let mut merged = to_mapping(serde_yaml::to_value(default_project_configuration()))?;
    shallow_merge(&mut merged, primary);
    shallow_merge(&mut merged, overrides);

    let configuration: ProjectConfiguration =
        serde_yaml::from_value(Value::Mapping(merged)).map_err(classify_decode_error)?;

    let errors = validate_project_configuration(&configuration);
    if !errors.is_empty() {
        return Err(KanbusError::ConfigurationInvalid(errors.join("; ")));
    }
    Ok(configuration)
}

fn parse_mapping(contents: &str, what: &str) -> Result<Mapping, KanbusError> {
    if contents.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value = serde_yaml::from_str(contents)
        .map_err(|error| KanbusError::ConfigurationInvalid(format!("{what}: {error}")))?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(KanbusError::ConfigurationInvalid(format!(
            "{what} must be a mapping"
        ))),
    }
}

fn load_override_mapping(directory: &Path) -> Result<Mapping, KanbusError> {
    let path = directory.join(".kanbus.override.yml");
    if !path.exists() {
        return Ok(Mapping::new());
    }
    let contents = fs::read_to_string(&path).map_err(KanbusError::io)?;
    parse_mapping(&contents, "override configuration")
}

fn to_mapping(value: Result<Value, serde_yaml::Error>) -> Result<Mapping, KanbusError> {
    match value.map_err(KanbusError::io)? {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(KanbusError::ConfigurationInvalid(
            "configuration must be a mapping".to_string(),
        )),
    }
}

/// Shallow key replacement, except `virtual_projects` which merges entry by
/// entry so an override file can add projects without restating them all.
fn shallow_merge(base: &mut Mapping, layer: Mapping) {
    let vp_key = Value::String("virtual_projects".to_string());
    for (key, value) in layer {
        if key == vp_key {
            if let (Some(Value::Mapping(existing)), Value::Mapping(additions)) =
                (base.get(&vp_key).cloned(), value.clone())
            {
                let mut merged = existing;
                for (label, entry) in additions {
                    merged.insert(label, entry);
                }
                base.insert(vp_key.clone(), Value::Mapping(merged));
                continue;
            }
        }
        base.insert(key, value);
    }
}

fn classify_decode_error(error: serde_yaml::Error) -> KanbusError {
    let message = error.to_string();
    if message.contains("unknown field") {
        return KanbusError::UnknownConfigurationFields;
    }
    KanbusError::ConfigurationInvalid(message)
}

/// Semantic validation beyond schema decoding. Returns all findings so the
/// user can fix a broken file in one pass.
pub fn validate_project_configuration(configuration: &ProjectConfiguration) -> Vec<String> {
    let mut errors = Vec::new();

    if configuration.project_directory.trim().is_empty() {
        errors.push("project_directory must not be empty".to_string());
    }
    if configuration.hierarchy.is_empty() {
        errors.push("hierarchy must not be empty".to_string());
    }
    if configuration.statuses.is_empty() {
        errors.push("statuses must not be empty".to_string());
    }
    if configuration.categories.is_empty() {
        errors.push("categories must not be empty".to_string());
    }

    let mut type_names = HashSet::new();
    for name in configuration.known_issue_types() {
        if !type_names.insert(name.as_str()) {
            errors.push(format!("duplicate type name '{name}'"));
        }
    }

    if !configuration.workflows.contains_key("default") {
        errors.push("default workflow is required".to_string());
    }

    if !configuration
        .priorities
        .contains_key(&configuration.default_priority)
    {
        errors.push("default_priority must be a key of priorities".to_string());
    }

    let mut category_names = HashSet::new();
    for category in &configuration.categories {
        if !category_names.insert(category.name.as_str()) {
            errors.push(format!("duplicate category '{}'", category.name));
        }
        check_color(&mut errors, category.color.as_deref(), "category");
    }

    let mut status_keys = HashSet::new();
    for status in &configuration.statuses {
        if !status_keys.insert(status.key.as_str()) {
            errors.push(format!("duplicate status key '{}'", status.key));
        }
        if !category_names.contains(status.category.as_str()) {
            errors.push(format!(
                "status '{}' references undefined category '{}'",
                status.key, status.category
            ));
        }
        check_color(&mut errors, status.color.as_deref(), "status");
    }

    for priority in configuration.priorities.values() {
        check_color(&mut errors, priority.color.as_deref(), "priority");
    }
    for color in configuration.type_colors.values() {
        check_color(&mut errors, Some(color), "type");
    }

    if !status_keys.contains(configuration.initial_status.as_str()) {
        errors.push(format!(
            "initial_status '{}' must exist in statuses",
            configuration.initial_status
        ));
    }

    for (workflow_name, workflow) in &configuration.workflows {
        for (from_status, transitions) in workflow {
            if !status_keys.contains(from_status.as_str()) {
                errors.push(format!(
                    "workflow '{workflow_name}' references undefined status '{from_status}'"
                ));
            }
            for to_status in transitions {
                if !status_keys.contains(to_status.as_str()) {
                    errors.push(format!(
                        "workflow '{workflow_name}' references undefined status '{to_status}'"
                    ));
                }
            }
        }
    }

    validate_transition_labels(configuration, &mut errors);
    errors
}

/// Every workflow edge needs a label and no label may point at a missing
/// edge.
fn validate_transition_labels(configuration: &ProjectConfiguration, errors: &mut Vec<String>) {
    for (workflow_name, workflow) in &configuration.workflows {
        let Some(workflow_labels) = configuration.transition_labels.get(workflow_name) else {
            errors.push(format!("transition_labels missing workflow '{workflow_name}'"));
            continue;
        };
        for (from_status, transitions) in workflow {
            let Some(from_labels) = workflow_labels.get(from_status) else {
                errors.push(format!(
                    "transition_labels missing from-status '{from_status}' in workflow '{workflow_name}'"
                ));
                continue;
            };
            for to_status in transitions {
                if !from_labels.contains_key(to_status) {
                    errors.push(format!(
                        "transition_labels missing transition '{from_status}' -> '{to_status}' in workflow '{workflow_name}'"
                    ));
                }
            }
            for labeled in from_labels.keys() {
                if !transitions.iter().any(|entry| entry == labeled) {
                    errors.push(format!(
                        "transition_labels references invalid transition '{from_status}' -> '{labeled}' in workflow '{workflow_name}'"
                    ));
                }
            }
        }
        for labeled_from in workflow_labels.keys() {
            if !workflow.contains_key(labeled_from) {
                errors.push(format!(
                    "transition_labels references invalid from-status '{labeled_from}' in workflow '{workflow_name}'"
                ));
            }
        }
    }
}

fn check_color(errors: &mut Vec<String>, color: Option<&str>, what: &str) {
    if let Some(color) = color {
        if !COLOR_PALETTE.contains(&color) {
            errors.push(format!("{what} color '{color}' is not in the palette"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join(".kanbus.yml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn empty_file_loads_defaults() {
        let temp = tempdir().unwrap();
        let path = write_config(temp.path(), "");
        let configuration = load_project_configuration(&path).unwrap();
        assert_eq!(configuration.project_directory, "project");
        assert_eq!(configuration.project_key, "kbs");
    }

    #[test]
    fn primary_values_override_defaults() {
        let temp = tempdir().unwrap();
        let path = write_config(temp.path(), "project_key: acme\n");
        let configuration = load_project_configuration(&path).unwrap();
        assert_eq!(configuration.project_key, "acme");
    }

    #[test]
    fn unknown_field_is_rejected_with_kind() {
        let temp = tempdir().unwrap();
        let path = write_config(temp.path(), "mystery_field: 1\n");
        let error = load_project_configuration(&path).unwrap_err();
        assert_eq!(error.kind(), "unknown_configuration_fields");
    }

    #[test]
    fn non_mapping_override_is_rejected() {
        let temp = tempdir().unwrap();
        let path = write_config(temp.path(), "");
        fs::write(temp.path().join(".kanbus.override.yml"), "- just\n- a list\n").unwrap();
        let error = load_project_configuration(&path).unwrap_err();
        assert_eq!(error.kind(), "configuration_invalid");
    }

    #[test]
    fn override_merges_virtual_projects_additively() {
        let temp = tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "virtual_projects:\n  docs:\n    path: docs/project\n",
        );
        fs::write(
            temp.path().join(".kanbus.override.yml"),
            "virtual_projects:\n  infra:\n    path: infra/project\n",
        )
        .unwrap();
        let configuration = load_project_configuration(&path).unwrap();
        assert!(configuration.virtual_projects.contains_key("docs"));
        assert!(configuration.virtual_projects.contains_key("infra"));
    }

    #[test]
    fn validation_flags_missing_transition_labels() {
        let mut configuration = crate::config::default_project_configuration();
        configuration.transition_labels.remove("epic");
        let errors = validate_project_configuration(&configuration);
        assert!(errors
            .iter()
            .any(|entry| entry.contains("transition_labels missing workflow 'epic'")));
    }

    #[test]
    fn validation_flags_colors_outside_palette() {
        let mut configuration = crate::config::default_project_configuration();
        configuration
            .type_colors
            .insert("task".to_string(), "chartreuse".to_string());
        let errors = validate_project_configuration(&configuration);
        assert!(errors.iter().any(|entry| entry.contains("chartreuse")));
    }

    #[test]
    fn validation_flags_undeclared_workflow_status() {
        let mut configuration = crate::config::default_project_configuration();
        configuration.statuses.retain(|status| status.key != "deferred");
        let errors = validate_project_configuration(&configuration);
        assert!(errors
            .iter()
            .any(|entry| entry.contains("undefined status 'deferred'")));
    }
}
