//! Template store
//!
//! The store owns an immutable [`Registry`] snapshot behind a lock. Readers
//! take an `Arc` and never block writers; writers clone the registry, apply
//! a mutation, and publish the new snapshot atomically. A mutation that
//! fails validation or would corrupt the dependency graph publishes
//! nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::{Category, Template, TemplateFile};
use crate::error::TemplateError;
use crate::graph::DependencyGraph;
use crate::validator::{self, codes, ValidationIssue, ValidationResult};

/// Definition file extensions the loader accepts
const DEFINITION_EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

/// One immutable view of every template and category
///
/// Built by the store, shared read-only. Iteration order of templates and
/// categories is insertion order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub(crate) templates: HashMap<String, Template>,
    pub(crate) order: Vec<String>,
    pub(crate) graph: DependencyGraph,
    pub(crate) categories: HashMap<String, Category>,
    pub(crate) category_order: Vec<String>,
    /// Topological fill order per template, cached at publish time
    pub(crate) fill_orders: HashMap<String, Vec<String>>,
}

impl Registry {
    /// Look up a template by id
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Check whether an id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Templates in insertion order
    pub fn list(&self) -> Vec<&Template> {
        self.order.iter().filter_map(|id| self.templates.get(id)).collect()
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True when no templates are registered
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Look up a category by id
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Categories in insertion order
    pub fn list_categories(&self) -> Vec<&Category> {
        self.category_order.iter().filter_map(|id| self.categories.get(id)).collect()
    }

    /// Cached dependency-first fill order for a template
    pub fn fill_order(&self, id: &str) -> Option<&[String]> {
        self.fill_orders.get(id).map(Vec::as_slice)
    }

    /// Direct dependents of a template, transitively closed
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.graph.dependents(id)
    }

    /// Put a template into the maps and graph, rejecting cycles
    pub(crate) fn commit_template(&mut self, template: Template) -> Result<(), TemplateError> {
        self.graph.add_or_update(&template.id, &template.dependencies)?;
        if !self.templates.contains_key(&template.id) {
            self.order.push(template.id.clone());
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    /// Recompute every cached fill order; call after any graph change
    pub(crate) fn rebuild_fill_orders(&mut self) {
        self.fill_orders.clear();
        for id in &self.order {
            if let Ok(order) = self.graph.fill_order(id) {
                self.fill_orders.insert(id.clone(), order);
            }
        }
    }

    /// Cross-template warnings that only make sense against the registry:
    /// declared dependencies and categories nobody has registered yet
    fn registry_warnings(&self, template: &Template) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for dep in &template.dependencies {
            if !self.templates.contains_key(dep) {
                issues.push(ValidationIssue::warning(
                    codes::UNKNOWN_DEPENDENCY,
                    "dependencies",
                    format!("dependency '{}' is not registered", dep),
                ));
            }
        }
        if let Some(category) = &template.category {
            if !self.categories.contains_key(category) {
                issues.push(ValidationIssue::warning(
                    codes::UNKNOWN_CATEGORY,
                    "category",
                    format!("category '{}' is not registered", category),
                ));
            }
        }
        issues
    }
}

/// A definition file the loader could not register
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a best-effort directory load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Templates registered by this load
    pub loaded: usize,
    /// Files skipped with the reason each was skipped
    pub failed: Vec<FailedFile>,
    /// Non-fatal findings, one line per finding
    pub warnings: Vec<String>,
}

/// Thread-safe handle over the current [`Registry`] snapshot
#[derive(Debug, Default)]
pub struct TemplateStore {
    inner: RwLock<Arc<Registry>>,
    /// Serializes mutators across the whole clone-build-publish sequence;
    /// readers only touch `inner`
    writer: Mutex<()>,
}

impl TemplateStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot; stays consistent for as long as the caller
    /// holds it, regardless of later writes
    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.read_guard())
    }

    /// Clone a template out of the current snapshot
    pub fn get(&self, id: &str) -> Option<Template> {
        self.snapshot().get(id).cloned()
    }

    /// Load every definition file under a directory
    ///
    /// Files are visited in lexicographic path order. A file that fails to
    /// parse or validate is reported and skipped; the rest still load. The
    /// new snapshot is published once, after the whole pass.
    pub fn load(&self, dir: &Path, recursive: bool) -> Result<LoadReport, TemplateError> {
        let _writer = self.writer_guard();
        self.load_into(Registry::clone(&self.snapshot()), dir, recursive)
    }

    /// Replace the whole registry with a directory's contents
    ///
    /// Readers holding an older snapshot keep it; everyone else sees only
    /// the new registry, never a mix.
    pub fn reload(&self, dir: &Path, recursive: bool) -> Result<LoadReport, TemplateError> {
        let _writer = self.writer_guard();
        let mut base = Registry::default();
        // Categories survive a reload; they are not defined by template files
        let current = self.snapshot();
        base.categories = current.categories.clone();
        base.category_order = current.category_order.clone();
        self.load_into(base, dir, recursive)
    }

    fn load_into(&self, mut registry: Registry, dir: &Path, recursive: bool) -> Result<LoadReport, TemplateError> {
        let mut report = LoadReport::default();

        for path in definition_paths(dir, recursive)? {
            let template = match parse_definition(&path) {
                Ok(template) => template,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping definition file");
                    report.failed.push(FailedFile {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let result = validator::validate(&template);
            if !result.is_valid() {
                report.failed.push(FailedFile {
                    path,
                    reason: result.to_string(),
                });
                continue;
            }
            for warning in result.warnings() {
                report.warnings.push(format!("{}: {}", template.id, warning));
            }

            if registry.contains(&template.id) {
                report.failed.push(FailedFile {
                    path,
                    reason: TemplateError::DuplicateId(template.id.clone()).to_string(),
                });
                continue;
            }

            for issue in registry.registry_warnings(&template) {
                report.warnings.push(format!("{}: {}", template.id, issue));
            }

            let id = template.id.clone();
            match registry.commit_template(template) {
                Ok(()) => {
                    debug!(template_id = %id, path = %path.display(), "loaded template");
                    report.loaded += 1;
                }
                Err(err) => {
                    report.failed.push(FailedFile {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }

        registry.rebuild_fill_orders();
        self.publish(registry);
        info!(
            loaded = report.loaded,
            failed = report.failed.len(),
            dir = %dir.display(),
            "directory load complete"
        );
        Ok(report)
    }

    /// Register a new template, rejecting duplicates
    ///
    /// Returns the validation result so callers can surface warnings on a
    /// template that was nonetheless accepted.
    pub fn insert(&self, template: Template) -> Result<ValidationResult, TemplateError> {
        let _writer = self.writer_guard();
        if self.snapshot().contains(&template.id) {
            return Err(TemplateError::DuplicateId(template.id));
        }
        self.commit(template)
    }

    /// Register or replace a template
    pub fn upsert(&self, template: Template) -> Result<ValidationResult, TemplateError> {
        let _writer = self.writer_guard();
        self.commit(template)
    }

    /// Remove a template, returning the removed definition
    ///
    /// Refused while other templates depend on it unless `force` is set.
    pub fn remove(&self, id: &str, force: bool) -> Result<Template, TemplateError> {
        let _writer = self.writer_guard();
        let mut registry = Registry::clone(&self.snapshot());

        let Some(removed) = registry.templates.remove(id) else {
            return Err(TemplateError::NotFound(id.to_string()));
        };

        let dependents = registry.graph.dependents(id);
        if !dependents.is_empty() && !force {
            return Err(TemplateError::HasDependents {
                id: id.to_string(),
                dependents,
            });
        }
        if !dependents.is_empty() {
            warn!(%id, ?dependents, "force-removing template with dependents");
        }

        registry.order.retain(|x| x != id);
        registry.graph.remove(id);
        registry.rebuild_fill_orders();
        self.publish(registry);
        Ok(removed)
    }

    /// Validate, commit into a cloned registry, publish
    fn commit(&self, template: Template) -> Result<ValidationResult, TemplateError> {
        let mut result = validator::validate(&template);
        if !result.is_valid() {
            return Err(TemplateError::Schema {
                template_id: template.id.clone(),
                result,
            });
        }

        let mut registry = Registry::clone(&self.snapshot());
        for issue in registry.registry_warnings(&template) {
            result.push(issue);
        }
        registry.commit_template(template)?;
        registry.rebuild_fill_orders();
        self.publish(registry);
        Ok(result)
    }

    /// Swap in a new snapshot
    ///
    /// Callers must hold the writer guard so concurrent mutators cannot
    /// build from the same stale snapshot and overwrite each other.
    pub(crate) fn publish(&self, registry: Registry) {
        *self.write_guard() = Arc::new(registry);
    }

    /// Serialize a mutation; held across clone, build, and publish
    pub(crate) fn writer_guard(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Arc<Registry>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Arc<Registry>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Collect definition file paths under a directory, sorted
pub fn definition_paths(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, TemplateError> {
    let depth = if recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();

    for entry in WalkDir::new(dir).max_depth(depth).follow_links(false) {
        let entry = entry.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if DEFINITION_EXTENSIONS.contains(&ext) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Parse a single definition file by extension
pub fn parse_definition(path: &Path) -> Result<Template, TemplateError> {
    let text = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let file: TemplateFile = match ext {
        "yml" | "yaml" => serde_yaml::from_str(&text)?,
        "json" => serde_json::from_str(&text)?,
        other => return Err(TemplateError::UnsupportedFormat(other.to_string())),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template");
    Ok(file.into_template(stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParameterSpec;
    use std::fs;
    use tempfile::TempDir;

    fn template(id: &str) -> Template {
        Template::new(id, id.to_uppercase(), format!("Body of {{{{x}}}} in {}", id))
            .with_parameter(ParameterSpec::required("x"))
    }

    #[test]
    fn test_insert_and_get() {
        let store = TemplateStore::new();
        let result = store.insert(template("a")).unwrap();
        assert!(result.is_valid());
        assert_eq!(store.get("a").unwrap().id, "a");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = TemplateStore::new();
        store.insert(template("a")).unwrap();
        let err = store.insert(template("a")).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn test_invalid_template_not_committed() {
        let store = TemplateStore::new();
        let err = store.insert(Template::new("bad", "", "")).unwrap_err();
        assert!(matches!(err, TemplateError::Schema { .. }));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_cycle_not_committed() {
        let store = TemplateStore::new();
        store
            .insert(Template::new("a", "A", "uses {{b}}").with_dependency("b"))
            .unwrap();

        let err = store
            .insert(Template::new("b", "B", "uses {{a}}").with_dependency("a"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::CyclicDependency { .. }));

        // The failed insert left no trace
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("b").is_none());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let store = TemplateStore::new();
        store.insert(template("a")).unwrap();
        store.insert(template("b")).unwrap();

        let mut updated = template("a");
        updated.description = "updated".to_string();
        store.upsert(updated).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("a").unwrap().description, "updated");
        let ids: Vec<&str> = snapshot.list().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_remove_with_dependents_refused() {
        let store = TemplateStore::new();
        store.insert(template("base")).unwrap();
        store
            .insert(Template::new("top", "Top", "see {{base}}").with_dependency("base"))
            .unwrap();

        let err = store.remove("base", false).unwrap_err();
        match err {
            TemplateError::HasDependents { dependents, .. } => {
                assert_eq!(dependents, vec!["top".to_string()]);
            }
            other => panic!("expected HasDependents, got {:?}", other),
        }
        assert!(store.get("base").is_some());

        let removed = store.remove("base", true).unwrap();
        assert_eq!(removed.id, "base");
        assert!(store.get("base").is_none());
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let store = TemplateStore::new();
        let err = store.remove("ghost", false).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[test]
    fn test_unknown_dependency_is_warning() {
        let store = TemplateStore::new();
        let result = store
            .insert(Template::new("a", "A", "see {{later}}").with_dependency("later"))
            .unwrap();
        assert!(result.is_valid());
        assert!(result.warnings().any(|i| i.code == codes::UNKNOWN_DEPENDENCY));
    }

    #[test]
    fn test_load_directory_best_effort() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a_concept.yml"),
            "id: concept\nname: Concept\ncontent: 'Concept: {{display_name}}'\nparameters:\n  - name: display_name\n    required: true\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b_summary.json"),
            r#"{"id": "summary", "name": "Summary", "content": "From {{concept}}", "dependencies": ["concept"]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.yml"), "id: [not: valid").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = TemplateStore::new();
        let report = store.load(dir.path(), false).unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].path.ends_with("broken.yml"));
        assert!(store.get("concept").is_some());
        assert!(store.get("summary").is_some());
    }

    #[test]
    fn test_load_uses_file_stem_when_id_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("greeting_prompt.yml"), "content: 'Hi {{name}}'\nparameters:\n  - name: name\n").unwrap();

        let store = TemplateStore::new();
        let report = store.load(dir.path(), false).unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(store.get("greeting_prompt").unwrap().name, "Greeting Prompt");
    }

    #[test]
    fn test_load_recursive() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("medical");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("deep.yml"), "id: deep\nname: Deep\ncontent: text\n").unwrap();

        let store = TemplateStore::new();
        assert_eq!(store.load(dir.path(), false).unwrap().loaded, 0);
        assert_eq!(store.load(dir.path(), true).unwrap().loaded, 1);
    }

    #[test]
    fn test_reload_replaces_registry() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fresh.yml"), "id: fresh\nname: Fresh\ncontent: text\n").unwrap();

        let store = TemplateStore::new();
        store.insert(template("stale")).unwrap();

        let report = store.reload(dir.path(), false).unwrap();
        assert_eq!(report.loaded, 1);

        let snapshot = store.snapshot();
        assert!(snapshot.get("stale").is_none());
        assert!(snapshot.get("fresh").is_some());
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_fill_order_cached_on_publish() {
        let store = TemplateStore::new();
        store.insert(template("base")).unwrap();
        store
            .insert(Template::new("top", "Top", "see {{base}}").with_dependency("base"))
            .unwrap();

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.fill_order("top"),
            Some(&["base".to_string(), "top".to_string()][..])
        );
    }

    #[test]
    fn test_concurrent_inserts_all_commit() {
        use std::sync::Barrier;
        use std::thread;

        let store = Arc::new(TemplateStore::new());
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.insert(template(&format!("t{}", i))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every successful insert is visible; no publish overwrote another
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), threads);
        for i in 0..threads {
            assert!(snapshot.contains(&format!("t{}", i)));
        }
    }

    #[test]
    fn test_snapshot_isolated_from_later_writes() {
        let store = TemplateStore::new();
        store.insert(template("a")).unwrap();
        let before = store.snapshot();
        store.insert(template("b")).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }
}
