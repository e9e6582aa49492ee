//! Property-based tests for category resolution and the service graph.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Category names compare and hash without regard to case
//! - The resolved category set always covers requests and their children
//! - Every service lands in the graph exactly once
//! - Page selections cover descendants only when asked to

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use porter::models::PageSelection;
use porter::portability::{ServiceDescriptor, resolve_included};
use porter::{CategoryGraph, CategoryName};
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};

fn descriptors_strategy() -> impl Strategy<Value = Vec<ServiceDescriptor>> {
    prop::collection::vec((0usize..8, prop::option::of(0usize..10), -5i32..5), 0..12).prop_map(
        |specs| {
            specs
                .into_iter()
                .map(|(name, parent, priority)| {
                    ServiceDescriptor::new(
                        format!("c{name}"),
                        parent.map(|p| CategoryName::new(format!("c{p}"))),
                        priority,
                    )
                })
                .collect()
        },
    )
}

fn alternate_case(s: &str) -> String {
    s.chars()
        .enumerate()
        .map(|(i, c)| {
            if i % 2 == 0 {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

proptest! {
    /// Property: category names equal their case variants and collapse in sets.
    #[test]
    fn prop_category_name_case_insensitive(name in "[a-zA-Z][a-zA-Z0-9_-]{0,30}") {
        let original = CategoryName::new(&name);
        let upper = CategoryName::new(name.to_uppercase());
        let mixed = CategoryName::new(alternate_case(&name));

        prop_assert_eq!(&original, &upper);
        prop_assert_eq!(&original, &mixed);
        prop_assert_eq!(original.as_str(), name.as_str());

        let set: HashSet<CategoryName> = [original, upper, mixed].into_iter().collect();
        prop_assert_eq!(set.len(), 1);
    }

    /// Property: the resolved set holds every request, their direct children and the portal.
    #[test]
    fn prop_resolve_included_covers_requests(
        descriptors in descriptors_strategy(),
        requested in prop::collection::vec(0usize..10, 0..5),
        pages_selected in any::<bool>(),
    ) {
        let requested: Vec<CategoryName> =
            requested.iter().map(|i| CategoryName::new(format!("C{i}"))).collect();
        let included = resolve_included(&requested, &descriptors, pages_selected);

        for name in &requested {
            prop_assert!(included.contains(name));
        }
        for descriptor in &descriptors {
            if descriptor.parent.as_ref().is_some_and(|p| requested.contains(p)) {
                prop_assert!(included.contains(&descriptor.category));
            }
        }
        let pages_expected = pages_selected || requested.contains(&CategoryName::pages());
        prop_assert_eq!(included.contains(&CategoryName::pages()), pages_expected);

        let portal = included.contains(&CategoryName::portal());
        prop_assert_eq!(portal, !requested.is_empty() || pages_selected);
    }

    /// Property: roots plus their descendants plus orphans partition the services.
    #[test]
    fn prop_graph_places_every_service_once(descriptors in descriptors_strategy()) {
        let graph = CategoryGraph::build(&descriptors);

        let mut seen = vec![0usize; descriptors.len()];
        let mut queue: VecDeque<usize> = graph.roots().iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            seen[idx] += 1;
            prop_assert!(seen[idx] == 1, "service {} reached twice", idx);
            queue.extend(graph.children(idx));
        }
        for &idx in graph.orphans() {
            seen[idx] += 1;
        }

        prop_assert!(seen.iter().all(|&count| count == 1), "placement counts {:?}", seen);
        for &idx in graph.roots() {
            prop_assert!(descriptors[idx].is_root());
        }
    }

    /// Property: a page tree selection covers every descendant, a single page only itself.
    #[test]
    fn prop_page_selection_children(
        base in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
        rest in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
    ) {
        let child = format!("{base}/{rest}");
        let tree = PageSelection { path: base.clone(), include_children: true };
        let single = PageSelection { path: base.clone(), include_children: false };

        prop_assert!(tree.matches(&base));
        prop_assert!(tree.matches(&child));
        prop_assert!(tree.matches(&child.to_uppercase()));
        prop_assert!(single.matches(&base));
        prop_assert!(!single.matches(&child));
        let joined = format!("{base}{rest}");
        prop_assert!(!tree.matches(&joined));
    }
}
