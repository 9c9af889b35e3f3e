//! Engine error types
//!
//! Validation problems are collected into a [`ValidationResult`] and returned
//! as values; the variants here are for operations that must fail fast
//! (filling, mutating the registry, import).

use thiserror::Error;

use crate::validator::ValidationResult;

/// Errors from template store, resolver, and exchange operations
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template {template_id} failed schema validation: {result}")]
    Schema {
        template_id: String,
        result: ValidationResult,
    },

    #[error("Template {template_id} references undefined variable: {expression}")]
    UndefinedVariable { template_id: String, expression: String },

    #[error("Template {template_id} missing required parameter: {parameter}")]
    MissingParameter { template_id: String, parameter: String },

    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Import conflict: id {id} already exists in the registry")]
    ImportConflict { id: String },

    #[error("Cannot remove {id}: depended on by {}", dependents.join(", "))]
    HasDependents { id: String, dependents: Vec<String> },

    #[error("Template {template_id} left unresolved placeholder in output: {expression}")]
    UnresolvedPlaceholder { template_id: String, expression: String },

    #[error("Unsupported definition format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TemplateError {
    /// The template id this error concerns, if any
    pub fn template_id(&self) -> Option<&str> {
        match self {
            TemplateError::Schema { template_id, .. }
            | TemplateError::UndefinedVariable { template_id, .. }
            | TemplateError::MissingParameter { template_id, .. }
            | TemplateError::UnresolvedPlaceholder { template_id, .. } => Some(template_id),
            TemplateError::DuplicateId(id)
            | TemplateError::NotFound(id)
            | TemplateError::ImportConflict { id }
            | TemplateError::HasDependents { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Check if this error aborts a mutating operation without a commit
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TemplateError::DuplicateId(_)
                | TemplateError::CyclicDependency { .. }
                | TemplateError::HasDependents { .. }
                | TemplateError::ImportConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_template_id() {
        let err = TemplateError::MissingParameter {
            template_id: "concept_explanation".to_string(),
            parameter: "display_name".to_string(),
        };
        assert_eq!(err.template_id(), Some("concept_explanation"));

        let err = TemplateError::NotFound("missing".to_string());
        assert_eq!(err.template_id(), Some("missing"));
    }

    #[test]
    fn test_cycle_display() {
        let err = TemplateError::CyclicDependency {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_is_structural() {
        assert!(TemplateError::DuplicateId("x".to_string()).is_structural());
        assert!(
            !TemplateError::MissingParameter {
                template_id: "t".to_string(),
                parameter: "p".to_string(),
            }
            .is_structural()
        );
    }
}
