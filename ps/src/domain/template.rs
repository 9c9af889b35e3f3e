//! Template domain type
//!
//! A Template is a named, versioned text generator with declared parameters
//! and content containing `{{expr}}` placeholders. Definition files carry
//! exactly these fields; unknown fields are folded into `metadata` so older
//! or richer corpora load without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a filled result is expected to be consumed downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    /// Plain text prompt
    #[default]
    Text,
    /// Prompt whose resolved content is a JSON document
    Structured,
    /// Prompt fed to an embedding backend
    Embedding,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Structured => write!(f, "structured"),
            Self::Embedding => write!(f, "embedding"),
        }
    }
}

/// Closed set of parameter shapes, checked structurally at validation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    #[default]
    String,
    Number,
    Boolean,
    Object,
    List,
}

impl ParameterKind {
    /// Check whether a JSON value has this shape
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::List => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object => write!(f, "object"),
            Self::List => write!(f, "list"),
        }
    }
}

/// A declared template parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name, the root of matching placeholder expressions
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Expected value shape
    #[serde(default, rename = "type")]
    pub kind: ParameterKind,

    /// Whether the parameter must be supplied (or defaulted) at fill time
    #[serde(default)]
    pub required: bool,

    /// Value used when the parameter is absent at fill time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// Create a required parameter with no default
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: ParameterKind::String,
            required: true,
            default: None,
        }
    }

    /// Create an optional parameter with no default
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: ParameterKind::String,
            required: false,
            default: None,
        }
    }

    /// Set the expected value shape
    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// The core registry entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Globally unique, stable identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Display description
    #[serde(default)]
    pub description: String,

    /// Free-form version tag, no enforced ordering
    #[serde(default)]
    pub version: String,

    /// Downstream consumption type
    #[serde(default, rename = "type")]
    pub template_type: TemplateType,

    /// Content with zero or more `{{expr}}` placeholders
    #[serde(default)]
    pub content: String,

    /// Declared parameters, order preserved
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    /// Ids of templates whose rendered output may be embedded
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Optional category id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Free-form domain/usage/author tags, opaque to the engine
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Template {
    /// Create a template with the given id, name, and content
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0".to_string(),
            template_type: TemplateType::Text,
            content: content.into(),
            parameters: Vec::new(),
            dependencies: Vec::new(),
            category: None,
            metadata: Map::new(),
        }
    }

    /// Add a declared parameter
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// Add a declared dependency
    pub fn with_dependency(mut self, dep_id: impl Into<String>) -> Self {
        self.dependencies.push(dep_id.into());
        self
    }

    /// Assign a category
    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category = Some(category_id.into());
        self
    }

    /// Add a metadata tag
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a declared parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check whether an id is a declared dependency
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d == id)
    }
}

/// Raw shape of a definition file
///
/// Accepts legacy spellings (`template_id` for `id`, `template` for
/// `content`) and captures unknown top-level fields so they can be folded
/// into `metadata` instead of rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateFile {
    #[serde(default, alias = "template_id")]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default, rename = "type")]
    pub template_type: TemplateType,

    #[serde(default, alias = "template")]
    pub content: String,

    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Unknown top-level fields, preserved opaquely
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TemplateFile {
    /// Convert a parsed file into a [`Template`]
    ///
    /// Missing `id` falls back to the file stem; missing `name` to a
    /// title-cased id. Unknown fields land in `metadata` without
    /// clobbering declared tags.
    pub fn into_template(self, file_stem: &str) -> Template {
        let id = self.id.unwrap_or_else(|| file_stem.to_string());
        let name = self.name.unwrap_or_else(|| title_case(&id));
        let mut metadata = self.metadata;
        for (key, value) in self.extra {
            metadata.entry(key).or_insert(value);
        }
        Template {
            id,
            name,
            description: self.description,
            version: self.version.unwrap_or_else(|| "1.0".to_string()),
            template_type: self.template_type,
            content: self.content,
            parameters: self.parameters,
            dependencies: self.dependencies,
            category: self.category,
            metadata,
        }
    }
}

/// Title-case an id for use as a display name ("concept_embedding" -> "Concept Embedding")
fn title_case(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
