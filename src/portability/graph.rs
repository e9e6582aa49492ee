//! Category hierarchy and inclusion resolution.
//!
//! The graph is built once per run over a fixed slice of service descriptors.
//! Nodes are addressed by their index in that slice, so the orchestrator can
//! walk it level by level without rebuilding filtered lists.

use crate::models::CategoryName;
use std::collections::{HashMap, HashSet, VecDeque};

/// Static description of one discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Category the service owns.
    pub category: CategoryName,
    /// Parent category; `None` for top-level services.
    pub parent: Option<CategoryName>,
    /// Lower runs first among siblings.
    pub priority: i32,
}

impl ServiceDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(category: impl Into<CategoryName>, parent: Option<CategoryName>, priority: i32) -> Self {
        Self {
            category: category.into(),
            parent,
            priority,
        }
    }

    /// Returns `true` for a top-level service.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Parent/child adjacency over service descriptors.
///
/// A child is attached to the first descriptor (in discovery order) owning
/// its parent category. Descriptors that cannot be reached from any root are
/// orphans.
#[derive(Debug, Clone, Default)]
pub struct CategoryGraph {
    roots: Vec<usize>,
    children: Vec<Vec<usize>>,
    orphans: Vec<usize>,
}

impl CategoryGraph {
    /// Builds the adjacency for `descriptors`.
    #[must_use]
    pub fn build(descriptors: &[ServiceDescriptor]) -> Self {
        let mut owner: HashMap<&CategoryName, usize> = HashMap::new();
        for (idx, descriptor) in descriptors.iter().enumerate() {
            owner.entry(&descriptor.category).or_insert(idx);
        }

        let mut roots = Vec::new();
        let mut children = vec![Vec::new(); descriptors.len()];
        for (idx, descriptor) in descriptors.iter().enumerate() {
            match &descriptor.parent {
                None => roots.push(idx),
                Some(parent) => {
                    if let Some(&parent_idx) = owner.get(parent) {
                        if parent_idx != idx {
                            children[parent_idx].push(idx);
                        }
                    }
                },
            }
        }

        let mut reachable = vec![false; descriptors.len()];
        let mut queue: VecDeque<usize> = roots.iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            if std::mem::replace(&mut reachable[idx], true) {
                continue;
            }
            queue.extend(children[idx].iter().copied());
        }
        let orphans = (0..descriptors.len()).filter(|&idx| !reachable[idx]).collect();

        Self {
            roots,
            children,
            orphans,
        }
    }

    /// Top-level descriptors in discovery order.
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Direct children of `idx` in discovery order.
    #[must_use]
    pub fn children(&self, idx: usize) -> &[usize] {
        self.children.get(idx).map_or(&[][..], Vec::as_slice)
    }

    /// Descriptors unreachable from any root, in discovery order.
    #[must_use]
    pub fn orphans(&self) -> &[usize] {
        &self.orphans
    }
}

/// Computes the categories that must execute for a request.
///
/// Single pass: the requested categories, the direct children of each
/// requested category, `pages` when a page sub-selection exists, and `portal`
/// whenever the result is non-empty. Deeper descendants are reached during
/// level traversal.
#[must_use]
pub fn resolve_included(
    requested: &[CategoryName],
    descriptors: &[ServiceDescriptor],
    pages_selected: bool,
) -> HashSet<CategoryName> {
    let mut included: HashSet<CategoryName> = requested.iter().cloned().collect();

    for name in requested {
        included.extend(
            descriptors
                .iter()
                .filter(|d| d.parent.as_ref() == Some(name))
                .map(|d| d.category.clone()),
        );
    }

    if pages_selected {
        included.insert(CategoryName::pages());
    }
    if !included.is_empty() {
        included.insert(CategoryName::portal());
    }
    included
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(name: &str, priority: i32) -> ServiceDescriptor {
        ServiceDescriptor::new(name, None, priority)
    }

    fn child(name: &str, parent: &str, priority: i32) -> ServiceDescriptor {
        ServiceDescriptor::new(name, Some(CategoryName::new(parent)), priority)
    }

    fn names(set: &HashSet<CategoryName>) -> Vec<String> {
        let mut names: Vec<String> = set.iter().map(CategoryName::key).collect();
        names.sort();
        names
    }

    #[test]
    fn test_resolve_pulls_direct_children_only() {
        let descriptors = vec![
            root("A", 1),
            root("B", 2),
            child("A1", "A", 0),
            child("A2", "A", 1),
            child("A1x", "A1", 0),
        ];
        let included = resolve_included(&[CategoryName::new("A")], &descriptors, false);
        assert_eq!(names(&included), vec!["a", "a1", "a2", "portal"]);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let descriptors = vec![root("Users", 0), child("user-profiles", "USERS", 0)];
        let included = resolve_included(&[CategoryName::new("users")], &descriptors, false);
        assert!(included.contains(&CategoryName::new("USER-PROFILES")));
    }

    #[test]
    fn test_resolve_forces_pages_and_portal() {
        let included = resolve_included(&[CategoryName::new("roles")], &[], true);
        assert_eq!(names(&included), vec!["pages", "portal", "roles"]);
    }

    #[test]
    fn test_resolve_empty_stays_empty() {
        assert!(resolve_included(&[], &[root("A", 0)], false).is_empty());
    }

    #[test]
    fn test_graph_levels_and_orphans() {
        let descriptors = vec![
            root("A", 1),
            child("A1", "A", 0),
            root("B", 2),
            child("X", "missing", 0),
            child("A2", "a", 0),
            child("P", "Q", 0),
            child("Q", "P", 0),
        ];
        let graph = CategoryGraph::build(&descriptors);
        assert_eq!(graph.roots(), &[0, 2]);
        assert_eq!(graph.children(0), &[1, 4]);
        assert!(graph.children(2).is_empty());
        assert_eq!(graph.orphans(), &[3, 5, 6]);
        assert!(graph.children(99).is_empty());
    }

    #[test]
    fn test_graph_self_parent_is_orphan() {
        let graph = CategoryGraph::build(&[child("loop", "loop", 0)]);
        assert!(graph.roots().is_empty());
        assert_eq!(graph.orphans(), &[0]);
    }
}
