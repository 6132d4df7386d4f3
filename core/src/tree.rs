//! Tree materialization.
//!
//! Backends store keys as a flat parent-pointer relation. `materialize`
//! expands that relation into an owned tree by asking a [`ChildSource`]
//! for the direct children of each node, depth first, keeping the order in
//! which the source reports them. Trees are snapshots: nothing caches or
//! invalidates them.

use serde::Serialize;

use crate::error::Result;
use crate::path;
use crate::types::ConfigKey;


/// Anything that can enumerate the direct children of a key.
///
/// `chain` is the ancestor chain the children live under (empty at the
/// top). Implementations copy it into each returned key's `path`.
pub trait ChildSource {
    fn children(&self, parent: &ConfigKey, chain: &str) -> Result<Vec<ConfigKey>>;
}


/// One node: the key it holds and its children in discovery order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyNode {
    pub key: ConfigKey,
    pub children: Vec<KeyNode>,
}

impl KeyNode {
    pub fn new(key: ConfigKey) -> Self {
        KeyNode {
            key,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}


/// A materialized configuration tree rooted at a single node.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyTree {
    root: KeyNode,
}

impl KeyTree {
    pub fn root(&self) -> &KeyNode {
        &self.root
    }

    pub fn into_root(self) -> KeyNode {
        self.root
    }

    /// Total node count including the root.
    pub fn node_count(&self) -> usize {
        count_nodes(&self.root)
    }

    /// Pre-order flattened list with depth. Depth 0 = the root.
    pub fn pre_order(&self) -> Vec<(&KeyNode, usize)> {
        let mut out = Vec::new();
        flatten_node(&self.root, 0, &mut out);
        out
    }

    /// Every key below the root in pre-order.
    pub fn keys(&self) -> Vec<&ConfigKey> {
        self.pre_order()
            .into_iter()
            .skip(1)
            .map(|(node, _)| &node.key)
            .collect()
    }

    /// Find a node by its full path (`folder/key1`), searching below the root.
    pub fn find(&self, full_path: &str) -> Option<&KeyNode> {
        let wanted = path::tokens(full_path);
        let mut current = &self.root;
        for token in wanted {
            current = current.children.iter().find(|c| c.key.key == token)?;
        }
        Some(current)
    }
}


/// Expand `root` into a full tree. `chain` is the ancestor chain of the
/// root's children: empty for a synthetic top node, the root's own full
/// path otherwise.
pub fn materialize<S>(source: &S, root: ConfigKey, chain: &str) -> Result<KeyTree>
where
    S: ChildSource + ?Sized,
{
    let mut node = KeyNode::new(root);
    expand(source, &mut node, chain)?;
    Ok(KeyTree { root: node })
}


fn expand<S>(source: &S, node: &mut KeyNode, chain: &str) -> Result<()>
where
    S: ChildSource + ?Sized,
{
    for child in source.children(&node.key, chain)? {
        let child_chain = path::join(chain, &child.key);
        let mut child_node = KeyNode::new(child);
        expand(source, &mut child_node, &child_chain)?;
        node.children.push(child_node);
    }
    Ok(())
}


fn count_nodes(node: &KeyNode) -> usize {
    1 + node.children.iter().map(count_nodes).sum::<usize>()
}


fn flatten_node<'a>(node: &'a KeyNode, depth: usize, out: &mut Vec<(&'a KeyNode, usize)>) {
    out.push((node, depth));
    for child in &node.children {
        flatten_node(child, depth + 1, out);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    /// Flat (id, parent, key) relation, served in insertion order.
    struct Rows(Vec<(i64, i64, &'static str)>);

    impl ChildSource for Rows {
        fn children(&self, parent: &ConfigKey, chain: &str) -> Result<Vec<ConfigKey>> {
            Ok(self
                .0
                .iter()
                .filter(|(_, p, _)| *p == parent.id)
                .map(|(id, p, k)| ConfigKey {
                    id: *id,
                    parent_id: *p,
                    key: k.to_string(),
                    path: chain.to_string(),
                    ..ConfigKey::default()
                })
                .collect())
        }
    }

    fn sample() -> Rows {
        Rows(vec![
            (1, 0, "folder"),
            (2, 1, "key1"),
            (3, 2, "key1_2"),
            (4, 0, "key2"),
            (5, 4, "key2-1"),
            (6, 1, "alpha"),
        ])
    }

    #[test]
    fn counts_root_plus_every_key() {
        let tree = materialize(&sample(), ConfigKey::synthetic_root(1), "").unwrap();
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.keys().len(), 6);
        assert_eq!(tree.root().key.key, "/");
    }

    #[test]
    fn keeps_discovery_order() {
        let tree = materialize(&sample(), ConfigKey::synthetic_root(1), "").unwrap();
        let folder = tree.find("folder").unwrap();
        let names: Vec<&str> = folder.children.iter().map(|c| c.key.key.as_str()).collect();
        assert_eq!(names, vec!["key1", "alpha"]);
    }

    #[test]
    fn paths_match_ancestor_chain() {
        let tree = materialize(&sample(), ConfigKey::synthetic_root(1), "").unwrap();
        let deep = tree.find("folder/key1/key1_2").unwrap();
        assert_eq!(deep.key.path, "folder/key1");
        assert!(deep.is_leaf());

        // Every node's path equals the joined keys of its ancestors.
        fn check(node: &KeyNode, chain: &str) {
            for child in &node.children {
                assert_eq!(child.key.path, chain);
                check(child, &path::join(chain, &child.key.key));
            }
        }
        check(tree.root(), "");
    }

    #[test]
    fn pre_order_visits_parents_first() {
        let tree = materialize(&sample(), ConfigKey::synthetic_root(1), "").unwrap();
        let order: Vec<(&str, usize)> = tree
            .pre_order()
            .into_iter()
            .map(|(n, d)| (n.key.key.as_str(), d))
            .collect();
        assert_eq!(
            order,
            vec![
                ("/", 0),
                ("folder", 1),
                ("key1", 2),
                ("key1_2", 3),
                ("alpha", 2),
                ("key2", 1),
                ("key2-1", 2),
            ]
        );
    }

    #[test]
    fn subtree_uses_given_chain() {
        let start = ConfigKey {
            id: 1,
            key: "folder".into(),
            ..ConfigKey::default()
        };
        let tree = materialize(&sample(), start, "folder").unwrap();
        assert_eq!(tree.node_count(), 4);
        let key1 = tree.find("key1").unwrap();
        assert_eq!(key1.key.path, "folder");
        assert_eq!(key1.children[0].key.path, "folder/key1");
    }

    #[test]
    fn find_missing_is_none() {
        let tree = materialize(&sample(), ConfigKey::synthetic_root(1), "").unwrap();
        assert!(tree.find("folder/nope").is_none());
    }

    #[test]
    fn serializes_nested_json() {
        let tree = materialize(&sample(), ConfigKey::synthetic_root(1), "").unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["root"]["children"][0]["key"]["key"], "folder");
    }
}
