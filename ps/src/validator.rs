//! Schema validation
//!
//! Two exhaustive passes over a template definition: structural (required
//! fields, parameter declarations) and content (every placeholder must
//! resolve to a declared parameter, dependency id, or context variable).
//! Problems are collected, never thrown: authoring tools must see every
//! issue in a single pass.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Template;
use crate::grammar;

/// Context variables always available at fill time, not tied to any
/// template's declared parameters
pub const CONTEXT_VARIABLES: &[&str] = &["language", "audience"];

/// Issue codes emitted by the validator
pub mod codes {
    pub const MISSING_FIELD: &str = "missing-field";
    pub const EMPTY_PARAMETER_NAME: &str = "empty-parameter-name";
    pub const DUPLICATE_PARAMETER: &str = "duplicate-parameter";
    pub const DEFAULT_KIND_MISMATCH: &str = "default-kind-mismatch";
    pub const SELF_DEPENDENCY: &str = "self-dependency";
    pub const DUPLICATE_DEPENDENCY: &str = "duplicate-dependency";
    pub const UNDEFINED_PLACEHOLDER: &str = "undefined-placeholder";
    pub const MALFORMED_PLACEHOLDER: &str = "malformed-placeholder";
    pub const UNUSED_PARAMETER: &str = "unused-parameter";
    pub const LEGACY_PLACEHOLDER: &str = "legacy-placeholder";
    pub const UNKNOWN_CATEGORY: &str = "unknown-category";
    pub const UNKNOWN_DEPENDENCY: &str = "unknown-dependency";
    pub const PARSE: &str = "parse";
}

/// Issue severity; only errors block insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    /// The offending field or placeholder expression
    pub field_path: String,
    pub message: String,
}

impl ValidationIssue {
    /// Create an error-severity issue
    pub fn error(code: &str, field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            field_path: field_path.into(),
            message: message.into(),
        }
    }

    /// Create a warning-severity issue
    pub fn warning(code: &str, field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            field_path: field_path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({}): {}", self.severity, self.code, self.field_path, self.message)
    }
}

/// Ordered collection of validation findings
///
/// Returned as a value; recoverable structural problems never panic or
/// abort the validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Result with no findings
    pub fn ok() -> Self {
        Self::default()
    }

    /// True iff no entry has error severity
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Error-severity findings
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-severity findings
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Append a finding
    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Append every finding from another result
    pub fn merge(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "valid");
        }
        let rendered: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Validate a template definition: structural pass then content pass
///
/// Both passes are exhaustive; the result is the same on every call for
/// the same definition.
pub fn validate(template: &Template) -> ValidationResult {
    let mut result = ValidationResult::ok();
    structural_pass(template, &mut result);
    content_pass(template, &mut result);
    debug!(
        template_id = %template.id,
        errors = result.errors().count(),
        warnings = result.warnings().count(),
        "validated template"
    );
    result
}

/// Required fields, recognized type, well-formed parameter declarations
fn structural_pass(template: &Template, result: &mut ValidationResult) {
    if template.id.trim().is_empty() {
        result.push(ValidationIssue::error(codes::MISSING_FIELD, "id", "template id is required"));
    }
    if template.name.trim().is_empty() {
        result.push(ValidationIssue::error(codes::MISSING_FIELD, "name", "template name is required"));
    }
    if template.content.is_empty() {
        result.push(ValidationIssue::error(
            codes::MISSING_FIELD,
            "content",
            "template content cannot be empty",
        ));
    }

    let mut seen = Vec::new();
    for (index, param) in template.parameters.iter().enumerate() {
        let field = format!("parameters[{}]", index);
        if param.name.trim().is_empty() {
            result.push(ValidationIssue::error(
                codes::EMPTY_PARAMETER_NAME,
                field.clone(),
                "parameter name cannot be empty",
            ));
            continue;
        }
        if seen.contains(&param.name.as_str()) {
            result.push(ValidationIssue::error(
                codes::DUPLICATE_PARAMETER,
                field.clone(),
                format!("parameter '{}' declared more than once", param.name),
            ));
        }
        seen.push(param.name.as_str());

        if let Some(default) = &param.default {
            if !param.kind.matches(default) {
                result.push(ValidationIssue::error(
                    codes::DEFAULT_KIND_MISMATCH,
                    format!("parameters[{}].default", index),
                    format!("default for '{}' does not match declared kind {}", param.name, param.kind),
                ));
            }
        }
    }

    let mut seen_deps = Vec::new();
    for dep in &template.dependencies {
        if dep == &template.id {
            result.push(ValidationIssue::error(
                codes::SELF_DEPENDENCY,
                "dependencies",
                format!("template '{}' cannot depend on itself", template.id),
            ));
        }
        if seen_deps.contains(&dep.as_str()) {
            result.push(ValidationIssue::error(
                codes::DUPLICATE_DEPENDENCY,
                "dependencies",
                format!("dependency '{}' declared more than once", dep),
            ));
        }
        seen_deps.push(dep.as_str());
    }
}

/// Every placeholder must resolve; unmatched expressions are errors with
/// the offending expression as the field path
fn content_pass(template: &Template, result: &mut ValidationResult) {
    let exprs = grammar::extract(&template.content);

    for expr in &exprs {
        let declared_param = template.parameter(&expr.root).is_some();
        let declared_dep = expr.is_flat() && template.depends_on(&expr.root);
        let context_var = expr.is_flat() && CONTEXT_VARIABLES.contains(&expr.root.as_str());

        if !declared_param && !declared_dep && !context_var {
            result.push(ValidationIssue::error(
                codes::UNDEFINED_PLACEHOLDER,
                expr.raw.clone(),
                format!("placeholder '{{{{{}}}}}' matches no declared parameter, dependency, or context variable", expr.raw),
            ));
        }
    }

    // A `{{` span that does not parse is an authoring bug, not literal
    // text the engine should pass downstream; bare closing braces are fine
    for span in grammar::malformed_spans(&template.content) {
        result.push(ValidationIssue::error(
            codes::MALFORMED_PLACEHOLDER,
            "content",
            format!("brace span '{{{{{}' does not parse as a placeholder", span),
        ));
    }

    for param in &template.parameters {
        let used = exprs.iter().any(|e| e.root == param.name);
        if !used {
            result.push(ValidationIssue::warning(
                codes::UNUSED_PARAMETER,
                format!("parameters.{}", param.name),
                format!("parameter '{}' is never referenced in content", param.name),
            ));
        }
    }

    for legacy in grammar::legacy_spans(&template.content) {
        result.push(ValidationIssue::warning(
            codes::LEGACY_PLACEHOLDER,
            legacy.clone(),
            format!("single-brace '{{{}}}' is a legacy placeholder; use '{{{{{}}}}}'", legacy, legacy),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParameterKind, ParameterSpec, Template};
    use serde_json::json;

    fn concept_template() -> Template {
        Template::new("concept_explanation", "Concept Explanation", "Concept: {{display_name}}\nType: {{type}}")
            .with_parameter(ParameterSpec::required("display_name"))
            .with_parameter(ParameterSpec::optional("type"))
    }

    #[test]
    fn test_valid_template() {
        let result = validate(&concept_template());
        assert!(result.is_valid(), "unexpected issues: {}", result);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let template = Template::new("", "", "");
        let result = validate(&template);

        assert!(!result.is_valid());
        let fields: Vec<&str> = result.errors().map(|i| i.field_path.as_str()).collect();
        assert!(fields.contains(&"id"));
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"content"));
    }

    #[test]
    fn test_undefined_placeholder_is_error() {
        let template = Template::new("t", "T", "Hello {{nobody}}");
        let result = validate(&template);

        assert!(!result.is_valid());
        let issue = result.errors().next().unwrap();
        assert_eq!(issue.code, codes::UNDEFINED_PLACEHOLDER);
        assert_eq!(issue.field_path, "nobody");
    }

    #[test]
    fn test_dotted_path_resolves_by_root() {
        let template = Template::new("t", "T", "Code: {{concept.properties.icd_code}}")
            .with_parameter(ParameterSpec::required("concept").with_kind(ParameterKind::Object));
        assert!(validate(&template).is_valid());
    }

    #[test]
    fn test_dependency_reference_resolves() {
        let template = Template::new("summary", "Summary", "Based on:\n{{concept_explanation}}")
            .with_dependency("concept_explanation");
        assert!(validate(&template).is_valid());
    }

    #[test]
    fn test_context_variable_resolves() {
        let template = Template::new("t", "T", "Answer in {{language}} for {{audience}}.");
        assert!(validate(&template).is_valid());
    }

    #[test]
    fn test_duplicate_parameter() {
        let template = Template::new("t", "T", "{{x}}")
            .with_parameter(ParameterSpec::required("x"))
            .with_parameter(ParameterSpec::optional("x"));
        let result = validate(&template);

        assert!(!result.is_valid());
        assert!(result.errors().any(|i| i.code == codes::DUPLICATE_PARAMETER));
    }

    #[test]
    fn test_default_kind_mismatch() {
        let template = Template::new("t", "T", "{{count}}")
            .with_parameter(ParameterSpec::optional("count").with_kind(ParameterKind::Number).with_default(json!("three")));
        let result = validate(&template);

        assert!(!result.is_valid());
        assert!(result.errors().any(|i| i.code == codes::DEFAULT_KIND_MISMATCH));
    }

    #[test]
    fn test_self_dependency() {
        let template = Template::new("t", "T", "{{t}}").with_dependency("t");
        let result = validate(&template);
        assert!(result.errors().any(|i| i.code == codes::SELF_DEPENDENCY));
    }

    #[test]
    fn test_unused_parameter_is_warning_only() {
        let template = Template::new("t", "T", "static text plus {{used}}")
            .with_parameter(ParameterSpec::optional("used"))
            .with_parameter(ParameterSpec::optional("unused"));
        let result = validate(&template);

        assert!(result.is_valid());
        assert!(result.warnings().any(|i| i.code == codes::UNUSED_PARAMETER));
    }

    #[test]
    fn test_legacy_placeholder_warning() {
        let template = Template::new("t", "T", "Value: {legacy} and {{x}}")
            .with_parameter(ParameterSpec::optional("x"));
        let result = validate(&template);

        assert!(result.is_valid());
        assert!(result.warnings().any(|i| i.code == codes::LEGACY_PLACEHOLDER && i.field_path == "legacy"));
    }

    #[test]
    fn test_malformed_placeholder_is_error() {
        let template = Template::new("t", "T", "broken {{not valid!}} here");
        let result = validate(&template);
        assert!(result.errors().any(|i| i.code == codes::MALFORMED_PLACEHOLDER));
    }

    #[test]
    fn test_nested_json_content_is_valid() {
        let template = Template::new("extract", "Extract", r#"{"concept": {"name": "{{name}}"}}"#)
            .with_parameter(ParameterSpec::required("name"));
        let result = validate(&template);
        assert!(result.is_valid(), "unexpected issues: {}", result);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let template = Template::new("t", "T", "{{a}} {legacy} {{missing}}")
            .with_parameter(ParameterSpec::required("a"))
            .with_parameter(ParameterSpec::optional("spare"));

        let first = validate(&template);
        let second = validate(&template);
        assert_eq!(first, second);
    }

    #[test]
    fn test_required_without_default_not_flagged_at_validation_time() {
        // Required-but-absent is a fill-time concern, not a schema concern
        let template = Template::new("t", "T", "{{must_have}}")
            .with_parameter(ParameterSpec::required("must_have"));
        assert!(validate(&template).is_valid());
    }
}
