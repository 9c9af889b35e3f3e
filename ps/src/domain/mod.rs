//! Domain types
//!
//! Core entities managed by the registry: templates with their declared
//! parameters, and the category tree used for classification.

mod category;
mod template;

pub use category::Category;
pub use template::{ParameterKind, ParameterSpec, Template, TemplateFile, TemplateType};
