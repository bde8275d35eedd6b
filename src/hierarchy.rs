//! Parent-child hierarchy rules.

use crate::error::KanbusError;
use crate::models::ProjectConfiguration;

/// Allowed child types for a parent type.
///
/// Hierarchy level `i` may parent the next level plus every
/// non-hierarchical type; the last level and non-hierarchical types cannot
/// parent anything.
pub fn allowed_child_types(
    configuration: &ProjectConfiguration,
    parent_type: &str,
) -> Vec<String> {
    let Some(parent_index) = configuration
        .hierarchy
        .iter()
        .position(|entry| entry == parent_type)
    else {
        return Vec::new();
    };
    if parent_index + 1 >= configuration.hierarchy.len() {
        return Vec::new();
    }
    let mut allowed = vec![configuration.hierarchy[parent_index + 1].clone()];
    allowed.extend(configuration.types.iter().cloned());
    allowed
}

/// Validate that `child_type` may sit under `parent_type`.
pub fn validate_parent_child_relationship(
    configuration: &ProjectConfiguration,
    parent_type: &str,
    child_type: &str,
) -> Result<(), KanbusError> {
    if !allowed_child_types(configuration, parent_type)
        .iter()
        .any(|entry| entry == child_type)
    {
        return Err(KanbusError::InvalidHierarchy {
            parent_type: parent_type.to_string(),
            child_type: child_type.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_project_configuration;

    #[test]
    fn next_level_and_standalone_types_are_allowed() {
        let configuration = default_project_configuration();
        let allowed = allowed_child_types(&configuration, "epic");
        assert!(allowed.contains(&"task".to_string()));
        assert!(allowed.contains(&"bug".to_string()));
        assert!(!allowed.contains(&"initiative".to_string()));
    }

    #[test]
    fn leaf_level_cannot_parent() {
        let configuration = default_project_configuration();
        assert!(allowed_child_types(&configuration, "sub-task").is_empty());
    }

    #[test]
    fn standalone_types_cannot_parent() {
        let configuration = default_project_configuration();
        assert!(allowed_child_types(&configuration, "bug").is_empty());
        let error = validate_parent_child_relationship(&configuration, "bug", "task").unwrap_err();
        assert_eq!(error.kind(), "invalid_hierarchy");
    }

    #[test]
    fn epic_under_task_is_rejected() {
        let configuration = default_project_configuration();
        let error = validate_parent_child_relationship(&configuration, "task", "epic").unwrap_err();
        assert_eq!(error.kind(), "invalid_hierarchy");
        validate_parent_child_relationship(&configuration, "epic", "task").unwrap();
    }
}
