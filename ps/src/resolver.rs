//! Variable resolution
//!
//! Fills a template's placeholders from a parameter map, a fill context,
//! and the rendered output of its dependencies. Dependencies render first,
//! in the registry's cached topological order, so a `{{dep_id}}` placeholder
//! substitutes fully resolved text. Resolution is all-or-nothing: the first
//! unfillable placeholder aborts with an error and no partial output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::Template;
use crate::error::TemplateError;
use crate::grammar::{self, Expr, PathSegment, Span};
use crate::store::Registry;
use crate::validator::CONTEXT_VARIABLES;

/// Ambient variables available to every template at fill time
#[derive(Debug, Clone)]
pub struct FillContext {
    pub language: String,
    pub audience: String,
}

impl Default for FillContext {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            audience: "general".to_string(),
        }
    }
}

impl FillContext {
    /// Look up a context variable by name
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "language" => Some(&self.language),
            "audience" => Some(&self.audience),
            _ => None,
        }
    }
}

/// Fills templates against one registry snapshot
pub struct Resolver {
    registry: Arc<Registry>,
}

impl Resolver {
    /// Resolver over a snapshot
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Fill a template with the default context
    pub fn fill(&self, id: &str, params: &Map<String, Value>) -> Result<String, TemplateError> {
        self.fill_with_context(id, params, &FillContext::default())
    }

    /// Fill a template, rendering its dependency closure first
    pub fn fill_with_context(
        &self,
        id: &str,
        params: &Map<String, Value>,
        context: &FillContext,
    ) -> Result<String, TemplateError> {
        if !self.registry.contains(id) {
            return Err(TemplateError::NotFound(id.to_string()));
        }

        let order = match self.registry.fill_order(id) {
            Some(cached) => cached.to_vec(),
            None => self.registry.graph.fill_order(id)?,
        };

        // Only dependencies some placeholder actually reaches are rendered;
        // a declared-but-unreferenced dependency costs nothing at fill time
        let needed = self.referenced_deps(id);

        let mut rendered: HashMap<String, String> = HashMap::new();
        for step in &order {
            if step != id && !needed.contains(step.as_str()) {
                continue;
            }
            let template = self
                .registry
                .get(step)
                .ok_or_else(|| TemplateError::NotFound(step.clone()))?;
            let output = render(template, params, context, &rendered)?;
            rendered.insert(step.clone(), output);
        }

        let output = rendered
            .remove(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;

        // Guard against parameter values smuggling placeholder syntax back in
        if grammar::contains_placeholder_syntax(&output) {
            let expression = grammar::extract(&output)
                .first()
                .map(|e| e.raw.clone())
                .unwrap_or_else(|| "{{".to_string());
            return Err(TemplateError::UnresolvedPlaceholder {
                template_id: id.to_string(),
                expression,
            });
        }

        debug!(template_id = %id, steps = order.len(), "filled template");
        Ok(output)
    }

    /// Fill a template and parse the output as a JSON document
    pub fn fill_structured(
        &self,
        id: &str,
        params: &Map<String, Value>,
        context: &FillContext,
    ) -> Result<Value, TemplateError> {
        let output = self.fill_with_context(id, params, context)?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Dependency ids reachable through flat placeholders, transitively
    fn referenced_deps(&self, id: &str) -> HashSet<String> {
        let mut needed = HashSet::new();
        let mut stack = vec![id.to_string()];

        while let Some(current) = stack.pop() {
            let Some(template) = self.registry.get(&current) else { continue };
            for expr in grammar::extract(&template.content) {
                if expr.is_flat() && template.depends_on(&expr.root) && needed.insert(expr.root.clone()) {
                    stack.push(expr.root);
                }
            }
        }

        needed
    }
}

/// Render one template's content given already-rendered dependency output
fn render(
    template: &Template,
    params: &Map<String, Value>,
    context: &FillContext,
    rendered_deps: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.content.len());

    for span in grammar::scan(&template.content) {
        match span {
            Span::Literal(text) => output.push_str(&text),
            Span::Placeholder(expr) => {
                output.push_str(&substitute(template, &expr, params, context, rendered_deps)?);
            }
        }
    }

    Ok(output)
}

/// Resolve a single placeholder expression to text
///
/// Lookup order: rendered dependency output, declared parameter (supplied
/// value, then default), context variable. Anything else is undefined.
fn substitute(
    template: &Template,
    expr: &Expr,
    params: &Map<String, Value>,
    context: &FillContext,
    rendered_deps: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    if expr.is_flat() && template.depends_on(&expr.root) {
        if let Some(dep_output) = rendered_deps.get(&expr.root) {
            return Ok(dep_output.clone());
        }
    }

    if let Some(spec) = template.parameter(&expr.root) {
        let value = params.get(&expr.root).or(spec.default.as_ref());
        return match value {
            Some(value) => {
                let resolved = walk_path(value, &expr.path).ok_or_else(|| {
                    TemplateError::MissingParameter {
                        template_id: template.id.clone(),
                        parameter: expr.raw.clone(),
                    }
                })?;
                Ok(stringify(resolved))
            }
            None if spec.required => Err(TemplateError::MissingParameter {
                template_id: template.id.clone(),
                parameter: expr.raw.clone(),
            }),
            // Absent optional parameter renders as empty text
            None => Ok(String::new()),
        };
    }

    if expr.is_flat() && CONTEXT_VARIABLES.contains(&expr.root.as_str()) {
        if let Some(value) = context.get(&expr.root) {
            return Ok(value.to_string());
        }
    }

    Err(TemplateError::UndefinedVariable {
        template_id: template.id.clone(),
        expression: expr.raw.clone(),
    })
}

/// Follow a dotted path into a JSON value
fn walk_path<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = match segment {
            PathSegment::Key(key) => current.get(key)?,
            PathSegment::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

/// Render a JSON value as prompt text
///
/// Strings are raw (no quotes), lists become one `- item` line per element,
/// objects become `key: value` pairs.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", stringify(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify(v)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
