//! Category domain type
//!
//! Categories form a tree: each category may name a parent that must
//! already exist in the registry. Cycle checks live in the category
//! manager, which is the sole authority for tree shape.

use serde::{Deserialize, Serialize};

/// A node in the hierarchical template classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Parent category id; `None` for roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Category {
    /// Create a root category
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent: None,
        }
    }

    /// Create a category under the given parent
    pub fn child_of(id: impl Into<String>, name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent: Some(parent.into()),
        }
    }

    /// Check if this category is a tree root
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
