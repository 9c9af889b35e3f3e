//! Category management
//!
//! Read-side queries live on [`Registry`], mutations on [`TemplateStore`].
//! The tree invariants: every parent exists, no category is its own
//! ancestor, and a category with children or assigned templates is only
//! removed by force, which reparents both onto the removed node's parent.

use tracing::{debug, warn};

use crate::domain::Category;
use crate::error::TemplateError;
use crate::store::{Registry, TemplateStore};

impl Registry {
    /// Templates assigned to a category, optionally including its subtree
    ///
    /// Ordered by subtree traversal, then registry insertion order within
    /// each category.
    pub fn list_by_category(&self, category_id: &str, include_subtree: bool) -> Vec<&crate::domain::Template> {
        let ids: Vec<String> = if include_subtree {
            self.category_subtree(category_id)
        } else {
            vec![category_id.to_string()]
        };

        let mut templates = Vec::new();
        for id in &ids {
            templates.extend(
                self.list()
                    .into_iter()
                    .filter(|t| t.category.as_deref() == Some(id.as_str())),
            );
        }
        templates
    }

    /// Category ids in a subtree, rooted at and including `category_id`
    pub fn category_subtree(&self, category_id: &str) -> Vec<String> {
        let mut subtree = vec![category_id.to_string()];
        let mut frontier = vec![category_id.to_string()];

        while let Some(current) = frontier.pop() {
            for id in &self.category_order {
                let Some(category) = self.categories.get(id) else { continue };
                if category.parent.as_deref() == Some(current.as_str()) && !subtree.contains(id) {
                    subtree.push(id.clone());
                    frontier.push(id.clone());
                }
            }
        }

        subtree
    }

    /// Ancestor chain from root to the given category, inclusive
    pub fn category_path(&self, category_id: &str) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(category_id.to_string());

        while let Some(id) = current {
            // Guard against a malformed chain ever looping
            if path.contains(&id) {
                break;
            }
            current = self.categories.get(&id).and_then(|c| c.parent.clone());
            path.push(id);
        }

        path.reverse();
        path
    }

    /// Direct children of a category
    pub fn category_children(&self, category_id: &str) -> Vec<&Category> {
        self.list_categories()
            .into_iter()
            .filter(|c| c.parent.as_deref() == Some(category_id))
            .collect()
    }
}

impl TemplateStore {
    /// Register a new category
    ///
    /// The parent, when named, must already exist.
    pub fn add_category(&self, category: Category) -> Result<(), TemplateError> {
        let _writer = self.writer_guard();
        let mut registry = Registry::clone(&self.snapshot());

        if registry.categories.contains_key(&category.id) {
            return Err(TemplateError::DuplicateId(category.id));
        }
        if let Some(parent) = &category.parent {
            if !registry.categories.contains_key(parent) {
                return Err(TemplateError::NotFound(parent.clone()));
            }
        }

        debug!(category_id = %category.id, parent = ?category.parent, "added category");
        registry.category_order.push(category.id.clone());
        registry.categories.insert(category.id.clone(), category);
        self.publish(registry);
        Ok(())
    }

    /// Replace an existing category, rejecting ancestor cycles
    pub fn update_category(&self, category: Category) -> Result<(), TemplateError> {
        let _writer = self.writer_guard();
        let mut registry = Registry::clone(&self.snapshot());

        if !registry.categories.contains_key(&category.id) {
            return Err(TemplateError::NotFound(category.id));
        }
        if let Some(parent) = &category.parent {
            if !registry.categories.contains_key(parent) {
                return Err(TemplateError::NotFound(parent.clone()));
            }
            if let Some(cycle) = ancestor_cycle(&registry, &category.id, parent) {
                return Err(TemplateError::CyclicDependency { cycle });
            }
        }

        registry.categories.insert(category.id.clone(), category);
        self.publish(registry);
        Ok(())
    }

    /// Remove a category
    ///
    /// Refused while child categories or assigned templates remain, unless
    /// `force` is set; force reparents both onto the removed node's parent.
    pub fn remove_category(&self, id: &str, force: bool) -> Result<Category, TemplateError> {
        let _writer = self.writer_guard();
        let mut registry = Registry::clone(&self.snapshot());

        let Some(removed) = registry.categories.get(id).cloned() else {
            return Err(TemplateError::NotFound(id.to_string()));
        };

        let mut dependents: Vec<String> = registry
            .category_children(id)
            .iter()
            .map(|c| c.id.clone())
            .collect();
        dependents.extend(
            registry
                .list_by_category(id, false)
                .iter()
                .map(|t| t.id.clone()),
        );

        if !dependents.is_empty() && !force {
            return Err(TemplateError::HasDependents {
                id: id.to_string(),
                dependents,
            });
        }
        if !dependents.is_empty() {
            warn!(category_id = %id, ?dependents, "force-removing category, reparenting dependents");
        }

        for category in registry.categories.values_mut() {
            if category.parent.as_deref() == Some(id) {
                category.parent = removed.parent.clone();
            }
        }
        for template in registry.templates.values_mut() {
            if template.category.as_deref() == Some(id) {
                template.category = removed.parent.clone();
            }
        }

        registry.categories.remove(id);
        registry.category_order.retain(|x| x != id);
        self.publish(registry);
        Ok(removed)
    }
}

/// Walk the proposed parent chain; a chain that reaches `id` is a cycle
fn ancestor_cycle(registry: &Registry, id: &str, new_parent: &str) -> Option<Vec<String>> {
    let mut chain = vec![id.to_string()];
    let mut current = Some(new_parent.to_string());

    while let Some(ancestor) = current {
        chain.push(ancestor.clone());
        if ancestor == id {
            return Some(chain);
        }
        if chain.iter().filter(|c| **c == ancestor).count() > 1 {
            return Some(chain);
        }
        current = registry.categories.get(&ancestor).and_then(|c| c.parent.clone());
    }

    None
}
