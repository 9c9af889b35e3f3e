//! Export and import
//!
//! Bundles are self-contained documents carrying templates plus the
//! categories they reference, stamped with a format version and export
//! time. Import is atomic: every incoming template is validated and
//! committed into a scratch registry first, and the snapshot is published
//! only when the whole bundle fits.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Category, Template};
use crate::error::TemplateError;
use crate::grammar::{self, Span};
use crate::store::{Registry, TemplateStore};
use crate::validator;

/// Current bundle format version
pub const FORMAT_VERSION: &str = "1.0";

/// A portable set of templates and their categories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub format_version: String,
    pub exported_at: DateTime<Utc>,
    pub templates: Vec<Template>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl ExportBundle {
    fn new(templates: Vec<Template>, categories: Vec<Category>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            exported_at: Utc::now(),
            templates,
            categories,
        }
    }
}

/// What to do when an incoming template id already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail the whole import on the first conflict
    #[default]
    Reject,
    /// Replace the existing template
    Overwrite,
    /// Give the incoming template a fresh id and rewrite references to it
    /// inside the bundle
    Rename,
}

/// Outcome of a successful import
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Ids registered by this import, post-rename
    pub imported: Vec<String>,
    /// (original id, assigned id) pairs for renamed templates
    pub renamed: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

impl TemplateStore {
    /// Bundle every template and category
    pub fn export_all(&self) -> ExportBundle {
        let snapshot = self.snapshot();
        ExportBundle::new(
            snapshot.list().into_iter().cloned().collect(),
            snapshot.list_categories().into_iter().cloned().collect(),
        )
    }

    /// Bundle the named templates and the categories they sit in
    pub fn export(&self, ids: &[String]) -> Result<ExportBundle, TemplateError> {
        let snapshot = self.snapshot();
        let mut templates = Vec::new();
        for id in ids {
            let template = snapshot
                .get(id)
                .cloned()
                .ok_or_else(|| TemplateError::NotFound(id.clone()))?;
            templates.push(template);
        }
        let categories = referenced_categories(&snapshot, &templates);
        Ok(ExportBundle::new(templates, categories))
    }

    /// Bundle the named templates plus their full dependency closure
    pub fn export_with_dependencies(&self, ids: &[String]) -> Result<ExportBundle, TemplateError> {
        let snapshot = self.snapshot();
        let mut closure: Vec<String> = Vec::new();

        for id in ids {
            if !snapshot.contains(id) {
                return Err(TemplateError::NotFound(id.clone()));
            }
            let order = match snapshot.fill_order(id) {
                Some(cached) => cached.to_vec(),
                None => snapshot.graph.fill_order(id)?,
            };
            for step in order {
                if !closure.contains(&step) {
                    closure.push(step);
                }
            }
        }

        self.export(&closure)
    }

    /// Import a bundle under a conflict policy
    ///
    /// All incoming templates are validated before anything commits; one
    /// bad template fails the whole bundle and the registry is untouched.
    pub fn import(&self, bundle: ExportBundle, policy: ConflictPolicy) -> Result<ImportReport, TemplateError> {
        let _writer = self.writer_guard();
        let mut report = ImportReport::default();
        let mut registry = Registry::clone(&self.snapshot());
        let mut templates = bundle.templates;

        // Two definitions of one id inside a single bundle is an authoring
        // error, not a conflict a policy can resolve
        {
            let mut seen = HashSet::new();
            for template in &templates {
                if !seen.insert(template.id.as_str()) {
                    return Err(TemplateError::DuplicateId(template.id.clone()));
                }
            }
        }

        // Resolve id conflicts up front so reference rewriting sees the
        // complete rename map
        let mut renames: Vec<(String, String)> = Vec::new();
        for template in &templates {
            if registry.contains(&template.id) {
                match policy {
                    ConflictPolicy::Reject => {
                        return Err(TemplateError::ImportConflict {
                            id: template.id.clone(),
                        });
                    }
                    ConflictPolicy::Overwrite => {}
                    ConflictPolicy::Rename => {
                        let fresh = format!("{}_{}", template.id, short_suffix());
                        renames.push((template.id.clone(), fresh));
                    }
                }
            }
        }
        for (old, new) in &renames {
            rewrite_refs(&mut templates, old, new);
            report.renamed.push((old.clone(), new.clone()));
        }

        for template in &templates {
            let result = validator::validate(template);
            if !result.is_valid() {
                return Err(TemplateError::Schema {
                    template_id: template.id.clone(),
                    result,
                });
            }
            for warning in result.warnings() {
                report.warnings.push(format!("{}: {}", template.id, warning));
            }
        }

        for category in bundle.categories {
            if registry.categories.contains_key(&category.id) {
                if policy != ConflictPolicy::Overwrite {
                    continue;
                }
            } else {
                registry.category_order.push(category.id.clone());
            }
            registry.categories.insert(category.id.clone(), category);
        }

        for template in templates {
            let id = template.id.clone();
            if !registry.contains(&id) || policy == ConflictPolicy::Overwrite || renames.iter().any(|(_, n)| *n == id) {
                registry.commit_template(template)?;
                report.imported.push(id);
            }
        }

        registry.rebuild_fill_orders();
        self.publish(registry);
        info!(imported = report.imported.len(), renamed = report.renamed.len(), "bundle imported");
        Ok(report)
    }
}

/// Write a bundle to disk, format chosen by extension
pub fn write_bundle(bundle: &ExportBundle, path: &Path) -> Result<(), TemplateError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let text = match ext {
        "yml" | "yaml" => serde_yaml::to_string(bundle)?,
        "json" => serde_json::to_string_pretty(bundle)?,
        other => return Err(TemplateError::UnsupportedFormat(other.to_string())),
    };
    std::fs::write(path, text)?;
    debug!(path = %path.display(), templates = bundle.templates.len(), "wrote bundle");
    Ok(())
}

/// Read a bundle from disk, format chosen by extension
pub fn read_bundle(path: &Path) -> Result<ExportBundle, TemplateError> {
    let text = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => Ok(serde_yaml::from_str(&text)?),
        "json" => Ok(serde_json::from_str(&text)?),
        other => Err(TemplateError::UnsupportedFormat(other.to_string())),
    }
}

/// Categories assigned to any of the templates, plus their ancestors
fn referenced_categories(registry: &Registry, templates: &[Template]) -> Vec<Category> {
    let mut ids: Vec<String> = Vec::new();
    for template in templates {
        if let Some(assigned) = &template.category {
            for ancestor in registry.category_path(assigned) {
                if !ids.contains(&ancestor) {
                    ids.push(ancestor);
                }
            }
        }
    }
    // Parents before children so re-import can add them in order
    ids.sort_by_key(|id| registry.category_path(id).len());
    ids.iter().filter_map(|id| registry.category(id).cloned()).collect()
}

/// Rewrite dependency lists and flat placeholders after a rename
fn rewrite_refs(templates: &mut [Template], old: &str, new: &str) {
    for template in templates {
        if template.id == old {
            template.id = new.to_string();
        }
        let referenced = template.dependencies.iter().any(|d| d == old);
        for dep in &mut template.dependencies {
            if dep == old {
                *dep = new.to_string();
            }
        }
        if referenced {
            template.content = rewrite_placeholders(&template.content, old, new);
        }
    }
}

/// Rebuild content with flat `{{old}}` placeholders renamed
fn rewrite_placeholders(content: &str, old: &str, new: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for span in grammar::scan(content) {
        match span {
            Span::Literal(text) => out.push_str(&text),
            Span::Placeholder(expr) if expr.is_flat() && expr.root == old => {
                out.push_str("{{");
                out.push_str(new);
                out.push_str("}}");
            }
            Span::Placeholder(expr) => {
                out.push_str("{{");
                out.push_str(&expr.raw);
                out.push_str("}}");
            }
        }
    }
    out
}

/// Eight hex characters from a fresh v7 uuid
fn short_suffix() -> String {
    let id = Uuid::now_v7().simple().to_string();
    id[..8].to_string()
}
