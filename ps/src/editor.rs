//! Editing facade
//!
//! One entry point for authoring tools: analyze a draft without touching
//! the registry, then commit it. Commit guards destructive edits: removing
//! a parameter or dependency from a template other templates build on is
//! refused unless forced.

use tracing::info;

use crate::domain::Template;
use crate::error::TemplateError;
use crate::grammar;
use crate::store::TemplateStore;
use crate::validator::{self, ValidationResult};

/// Shape metrics for a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMetrics {
    pub parameter_count: usize,
    pub placeholder_count: usize,
    pub dependency_count: usize,
}

/// Everything an authoring tool needs to render feedback on a draft
#[derive(Debug, Clone)]
pub struct Analysis {
    pub validation: ValidationResult,
    pub metrics: TemplateMetrics,
}

/// Authoring operations over a store
pub struct Editor<'a> {
    store: &'a TemplateStore,
}

impl<'a> Editor<'a> {
    pub fn new(store: &'a TemplateStore) -> Self {
        Self { store }
    }

    /// Validate and measure a draft; never touches the registry
    pub fn analyze(&self, draft: &Template) -> Analysis {
        Analysis {
            validation: validator::validate(draft),
            metrics: TemplateMetrics {
                parameter_count: draft.parameters.len(),
                placeholder_count: grammar::extract(&draft.content).len(),
                dependency_count: draft.dependencies.len(),
            },
        }
    }

    /// Register a brand new template
    pub fn create(&self, draft: Template) -> Result<ValidationResult, TemplateError> {
        self.store.insert(draft)
    }

    /// Commit an edit to an existing template
    ///
    /// An edit that drops parameters or dependencies while other templates
    /// depend on this one is destructive and needs `force`.
    pub fn commit(&self, draft: Template, force: bool) -> Result<ValidationResult, TemplateError> {
        if let Some(existing) = self.store.get(&draft.id) {
            if !force && is_destructive(&existing, &draft) {
                let dependents = self.store.snapshot().dependents(&draft.id);
                if !dependents.is_empty() {
                    return Err(TemplateError::HasDependents {
                        id: draft.id,
                        dependents,
                    });
                }
            }
        }

        info!(template_id = %draft.id, "committing edit");
        self.store.upsert(draft)
    }

    /// Remove a template via the store's dependent check
    pub fn delete(&self, id: &str, force: bool) -> Result<Template, TemplateError> {
        self.store.remove(id, force)
    }
}

/// An edit is destructive when it drops a declared parameter or dependency
fn is_destructive(existing: &Template, draft: &Template) -> bool {
    let dropped_param = existing
        .parameters
        .iter()
        .any(|p| draft.parameter(&p.name).is_none());
    let dropped_dep = existing.dependencies.iter().any(|d| !draft.depends_on(d));
    dropped_param || dropped_dep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParameterSpec;

    fn seeded_store() -> TemplateStore {
        let store = TemplateStore::new();
        store
            .insert(
                Template::new("base", "Base", "base {{x}} and {{y}}")
                    .with_parameter(ParameterSpec::required("x"))
                    .with_parameter(ParameterSpec::optional("y")),
            )
            .unwrap();
        store
            .insert(Template::new("top", "Top", "see {{base}}").with_dependency("base"))
            .unwrap();
        store
    }

    #[test]
    fn test_analyze_metrics() {
        let store = TemplateStore::new();
        let editor = Editor::new(&store);

        let draft = Template::new("t", "T", "{{a}} {{b}} {{dep}}")
            .with_parameter(ParameterSpec::required("a"))
            .with_parameter(ParameterSpec::optional("b"))
            .with_dependency("dep");
        let analysis = editor.analyze(&draft);

        assert!(analysis.validation.is_valid());
        assert_eq!(
            analysis.metrics,
            TemplateMetrics {
                parameter_count: 2,
                placeholder_count: 3,
                dependency_count: 1,
            }
        );
    }

    #[test]
    fn test_analyze_does_not_commit() {
        let store = TemplateStore::new();
        let editor = Editor::new(&store);
        editor.analyze(&Template::new("draft", "Draft", "text"));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_commit_nondestructive_edit() {
        let store = seeded_store();
        let editor = Editor::new(&store);

        let mut draft = store.get("base").unwrap();
        draft.content = "base {{x}} and {{y}} extended".to_string();
        editor.commit(draft, false).unwrap();
        assert!(store.get("base").unwrap().content.ends_with("extended"));
    }

    #[test]
    fn test_destructive_edit_with_dependents_refused() {
        let store = seeded_store();
        let editor = Editor::new(&store);

        // Drop parameter y while top depends on base
        let draft = Template::new("base", "Base", "base {{x}}")
            .with_parameter(ParameterSpec::required("x"));
        let err = editor.commit(draft.clone(), false).unwrap_err();
        assert!(matches!(err, TemplateError::HasDependents { .. }));

        editor.commit(draft, true).unwrap();
        assert_eq!(store.get("base").unwrap().parameters.len(), 1);
    }

    #[test]
    fn test_destructive_edit_without_dependents_allowed() {
        let store = seeded_store();
        let editor = Editor::new(&store);

        // top has no dependents, so dropping its dependency is fine
        let draft = Template::new("top", "Top", "standalone now");
        editor.commit(draft, false).unwrap();
        assert!(store.get("top").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_create_duplicate_refused() {
        let store = seeded_store();
        let editor = Editor::new(&store);
        let err = editor.create(Template::new("base", "Base", "again")).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateId(_)));
    }

    #[test]
    fn test_delete_routes_dependent_check() {
        let store = seeded_store();
        let editor = Editor::new(&store);
        assert!(editor.delete("base", false).is_err());
        assert!(editor.delete("top", false).is_ok());
        assert!(editor.delete("base", false).is_ok());
    }
}
