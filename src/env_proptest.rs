//! Property-based tests for environment resolution.

#[cfg(test)]
mod proptest_tests {
    use std::collections::HashSet;

    use crate::env::EnvTree;
    use crate::error::{Collect, Propagate};
    use proptest::prelude::*;

    fn distinct(entries: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect()
    }

    proptest! {
        /// Values without references come back verbatim, in insertion order.
        #[test]
        fn literals_keep_value_and_order(
            entries in prop::collection::vec(("[A-Z][A-Z0-9_]{0,6}", "[a-z0-9 /.:-]{0,12}"), 0..10)
        ) {
            let entries = distinct(entries);
            let mut tree = EnvTree::new();
            let scope = tree.add_scope("root", None);
            for (key, value) in &entries {
                tree.add(scope, key, value).unwrap();
            }
            tree.resolve(scope, None, &Propagate).unwrap();
            prop_assert_eq!(tree.as_ordered_pairs(scope, false), entries);
        }

        /// A chain of references resolves whatever order it was declared in.
        #[test]
        fn reference_chains_resolve(
            base in "[a-z0-9/]{0,8}",
            length in 1usize..8,
            reversed in any::<bool>(),
        ) {
            let mut keys: Vec<usize> = (0..length).collect();
            if reversed {
                keys.reverse();
            }
            let mut tree = EnvTree::new();
            let scope = tree.add_scope("root", None);
            for i in keys {
                let raw = if i == 0 {
                    base.clone()
                } else {
                    format!("@K{}@-", i - 1)
                };
                tree.add(scope, &format!("K{}", i), &raw).unwrap();
            }
            tree.resolve(scope, None, &Propagate).unwrap();
            let last = format!("K{}", length - 1);
            let expected = format!("{}{}", base, "-".repeat(length - 1));
            prop_assert_eq!(tree.lookup(scope, &last), Some(expected.as_str()));
        }

        /// Arbitrary reference graphs, cycles included, always terminate and
        /// leave plain text behind when errors are collected.
        #[test]
        fn arbitrary_references_terminate(
            targets in prop::collection::vec(prop::collection::vec(0usize..6, 0..3), 1..6)
        ) {
            let count = targets.len();
            let mut tree = EnvTree::new();
            let scope = tree.add_scope("root", None);
            for (i, refs) in targets.iter().enumerate() {
                let raw: String = refs
                    .iter()
                    .map(|j| format!("x@K{}@", j % count))
                    .collect();
                tree.add(scope, &format!("K{}", i), &raw).unwrap();
            }
            let collect = Collect::new();
            prop_assert!(tree.resolve(scope, None, &collect).is_ok());
            for (_, value) in tree.as_ordered_pairs(scope, false) {
                prop_assert!(!value.contains('@'), "unresolved value {:?}", value);
            }
        }

        /// A child entry shadows its parent's without disturbing the parent.
        #[test]
        fn child_shadows_parent(
            key in "[A-Z][A-Z0-9_]{0,6}",
            parent_value in "[a-z0-9]{0,8}",
            child_value in "[a-z0-9]{0,8}",
        ) {
            let mut tree = EnvTree::new();
            let parent = tree.add_scope("parent", None);
            let child = tree.add_scope("child", Some(parent));
            tree.add(parent, &key, &parent_value).unwrap();
            tree.add(child, &key, &child_value).unwrap();
            tree.resolve(child, None, &Propagate).unwrap();
            prop_assert_eq!(tree.lookup(child, &key), Some(child_value.as_str()));
            prop_assert_eq!(tree.lookup(parent, &key), Some(parent_value.as_str()));
            prop_assert_eq!(tree.as_ordered_pairs(child, true).len(), 1);
        }

        /// `@@` always yields a single literal `@`.
        #[test]
        fn doubled_at_is_literal(left in "[a-z]{0,6}", right in "[a-z]{0,6}") {
            let mut tree = EnvTree::new();
            let scope = tree.add_scope("root", None);
            tree.add(scope, "MAIL", &format!("{}@@{}", left, right)).unwrap();
            tree.resolve(scope, None, &Propagate).unwrap();
            let expected = format!("{}@{}", left, right);
            prop_assert_eq!(tree.lookup(scope, "MAIL"), Some(expected.as_str()));
        }
    }
}
