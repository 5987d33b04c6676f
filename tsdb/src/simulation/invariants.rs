//! Invariant checking for deterministic simulation testing.
//!
//! Verifies a tree against the red-black rules and against a reference
//! `BTreeMap` holding what the tree is expected to contain.

use std::collections::BTreeMap;

use crate::storage::{NodeRef, RecordStore, RedBlackTree, StoreError, TreeKey};

/// A detected invariant violation.
#[derive(Debug)]
pub enum InvariantViolation {
    /// In-order traversal is not strictly increasing.
    OutOfOrder { previous: String, next: String },
    /// A red node has a red child.
    RedRed { key: String },
    /// Two root-to-leaf paths have different black counts.
    BlackHeight { key: String, left: usize, right: usize },
    /// The root is red.
    RedRoot,
    /// The tree content differs from the model.
    ContentMismatch { expected: usize, actual: usize },
    /// A value differs from the model.
    ValueMismatch { key: String, expected: String, actual: String },
    /// The tree could not be read.
    Store(StoreError),
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrder { previous, next } => {
                write!(f, "key {next} follows {previous} in order")
            }
            Self::RedRed { key } => write!(f, "red node {key} has a red parent"),
            Self::BlackHeight { key, left, right } => write!(
                f,
                "black height differs below {key} (left {left}, right {right})"
            ),
            Self::RedRoot => write!(f, "root is red"),
            Self::ContentMismatch { expected, actual } => {
                write!(f, "expected {expected} entries, found {actual}")
            }
            Self::ValueMismatch {
                key,
                expected,
                actual,
            } => write!(f, "key {key}: expected {expected:?}, found {actual:?}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for InvariantViolation {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for InvariantViolation {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Check ordering, red-black rules, and content against `model`.
///
/// Returns the black height of the tree.
pub fn check_against_model<K, S>(
    tree: &mut RedBlackTree<K, S>,
    model: &BTreeMap<K, String>,
) -> Result<usize, InvariantViolation>
where
    K: TreeKey + Ord,
    S: RecordStore,
{
    let root = tree.root().clone();
    if tree.resolve(&root)?.is_some_and(|node| node.is_red()) {
        return Err(InvariantViolation::RedRoot);
    }

    let mut entries = Vec::new();
    let black_height = walk(tree, &root, false, &mut entries)?;

    for pair in entries.windows(2) {
        if pair[0].0 >= pair[1].0 {
            return Err(InvariantViolation::OutOfOrder {
                previous: format!("{:?}", pair[0].0),
                next: format!("{:?}", pair[1].0),
            });
        }
    }

    if entries.len() != model.len() {
        return Err(InvariantViolation::ContentMismatch {
            expected: model.len(),
            actual: entries.len(),
        });
    }
    for ((key, actual), (_, expected)) in entries.iter().zip(model) {
        if actual != expected {
            return Err(InvariantViolation::ValueMismatch {
                key: format!("{key:?}"),
                expected: expected.clone(),
                actual: actual.clone(),
            });
        }
    }

    Ok(black_height)
}

/// In-order walk collecting entries; returns the subtree's black height.
fn walk<K, S>(
    tree: &mut RedBlackTree<K, S>,
    node_ref: &NodeRef<K>,
    parent_red: bool,
    entries: &mut Vec<(K, String)>,
) -> Result<usize, InvariantViolation>
where
    K: TreeKey,
    S: RecordStore,
{
    let Some(node) = tree.resolve(node_ref)? else {
        return Ok(1);
    };
    if parent_red && node.is_red() {
        return Err(InvariantViolation::RedRed {
            key: format!("{:?}", node.key),
        });
    }

    let left = walk(tree, &node.left, node.is_red(), entries)?;
    let value = node.value.materialize(tree.store_mut())?.to_string();
    entries.push((node.key.clone(), value));
    let right = walk(tree, &node.right, node.is_red(), entries)?;

    if left != right {
        return Err(InvariantViolation::BlackHeight {
            key: format!("{:?}", node.key),
            left,
            right,
        });
    }
    Ok(left + usize::from(node.is_black()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulatedStore;
    use crate::storage::{Color, Node, ValueCell};

    #[test]
    fn test_detects_red_red() {
        // A black root whose red child has a red child.
        let grandchild = NodeRef::resident(Node::leaf(3_i64, ValueCell::resident("c")));
        let child = NodeRef::resident(Node {
            right: grandchild,
            ..Node::leaf(2_i64, ValueCell::resident("b"))
        });
        let root = NodeRef::resident(Node {
            right: child,
            color: Color::Black,
            ..Node::leaf(1_i64, ValueCell::resident("a"))
        });

        let mut store = SimulatedStore::new(3);
        let address = root.persist(&mut store).expect("persist");
        store.commit_root(address).expect("commit");
        let mut tree: RedBlackTree<i64, _> = RedBlackTree::new(store).expect("reload");

        let model = [(1, "a"), (2, "b"), (3, "c")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        let violation = check_against_model(&mut tree, &model).expect_err("red-red");
        assert!(matches!(violation, InvariantViolation::RedRed { .. }));
        assert_eq!(violation.to_string(), "red node 3 has a red parent");
    }

    #[test]
    fn test_detects_content_mismatch() {
        let mut tree: RedBlackTree<i64, _> =
            RedBlackTree::new(SimulatedStore::new(3)).expect("tree");
        tree.set(1, "a").expect("set");

        let model = BTreeMap::from([(1, "b".to_string())]);
        assert!(matches!(
            check_against_model(&mut tree, &model),
            Err(InvariantViolation::ValueMismatch { .. })
        ));
    }
}
