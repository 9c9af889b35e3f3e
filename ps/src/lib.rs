//! promptstore - prompt template registry and resolver
//!
//! promptstore manages a registry of prompt templates: versioned text
//! generators with declared parameters, `{{expr}}` placeholders, and
//! dependencies on other templates. Registered templates are validated,
//! organized into a category tree, filled against parameter maps, and
//! exchanged as portable bundles.
//!
//! # Core Concepts
//!
//! - **Validate Before Commit**: A template that fails schema validation
//!   never enters the registry
//! - **Immutable Snapshots**: Readers work against a consistent registry
//!   view; writers publish a new snapshot atomically
//! - **Dependencies Render First**: A `{{dep_id}}` placeholder substitutes
//!   the dependency's fully resolved output
//! - **Cycles Never Commit**: The dependency graph rejects any update that
//!   would close a cycle
//!
//! # Modules
//!
//! - [`store`] - Registry snapshots, loading, and mutation
//! - [`validator`] - Schema and placeholder validation
//! - [`resolver`] - Variable resolution and dependency rendering
//! - [`grammar`] - The placeholder grammar
//! - [`exchange`] - Export and import bundles
//! - [`cli`] - Command-line interface

pub mod category;
pub mod cli;
pub mod config;
pub mod domain;
pub mod editor;
pub mod error;
pub mod exchange;
pub mod grammar;
pub mod graph;
pub mod resolver;
pub mod store;
pub mod suggest;
pub mod validator;

// Re-export commonly used types
pub use config::{Config, FillConfig, StoreConfig};
pub use domain::{Category, ParameterKind, ParameterSpec, Template, TemplateFile, TemplateType};
pub use editor::{Analysis, Editor, TemplateMetrics};
pub use error::TemplateError;
pub use exchange::{ConflictPolicy, ExportBundle, ImportReport, read_bundle, write_bundle};
pub use graph::DependencyGraph;
pub use resolver::{FillContext, Resolver};
pub use store::{FailedFile, LoadReport, Registry, TemplateStore};
pub use suggest::{Suggestion, SuggestionEngine, UsageContext};
pub use validator::{Severity, ValidationIssue, ValidationResult, validate};
