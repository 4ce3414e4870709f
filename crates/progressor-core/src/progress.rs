//! Weighted, memoized completion percentages over the task forest.
//!
//! A childless task scores 100 when completed and 0 otherwise. Any other
//! node scores the weight-averaged progress of its children, where a child
//! contributes only if its own `completed` flag is set:
//!
//! ```text
//! progress = Σ(child_fraction · child_weight | child.completed) / Σ child_weight · 100
//! ```
//!
//! A node's own flag is ignored once it has children. Memoized values live
//! in the [`ProgressEngine`] that computed them and are never refreshed by
//! later data changes, so scope an engine to one render or invalidate
//! explicitly after writes.

use crate::entity::EntityKind;
use crate::error::ValidationError;
use std::collections::HashMap;

/// Number of glyphs in a rendered bar.
pub const BAR_WIDTH: usize = 10;

const FILLED: char = '█';
const EMPTY: char = '░';

/// Identity of a node in the memo table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub kind: EntityKind,
    pub id: i64,
}

impl NodeKey {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }
}

/// A node whose children are already loaded.
pub trait ProgressNode {
    fn node_key(&self) -> NodeKey;

    /// Whether a childless node is scored by its own flag.
    fn is_leaf_kind(&self) -> bool {
        self.node_key().kind.is_leaf_kind()
    }

    fn completed(&self) -> bool;

    fn weight(&self) -> f64;

    fn children(&self) -> Vec<&dyn ProgressNode>;
}

/// Progress calculator with its memo table.
#[derive(Debug, Default)]
pub struct ProgressEngine {
    memo: HashMap<NodeKey, f64>,
}

impl ProgressEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion percentage in `[0, 100]` for `node`.
    pub fn progress(&mut self, node: &dyn ProgressNode) -> f64 {
        let key = node.node_key();
        if let Some(&known) = self.memo.get(&key) {
            return known;
        }

        let children = node.children();
        let progress = if children.is_empty() && node.is_leaf_kind() {
            if node.completed() {
                100.0
            } else {
                0.0
            }
        } else {
            let mut weighted_completed = 0.0;
            let mut all_weight = 0.0;
            for child in children {
                let fraction = self.progress(child) / 100.0;
                let weight = child.weight();
                if child.completed() {
                    weighted_completed += fraction * weight;
                }
                all_weight += weight;
            }
            if all_weight > 0.0 {
                weighted_completed / all_weight * 100.0
            } else {
                0.0
            }
        };

        self.memo.insert(key, progress);
        progress
    }

    /// Previously computed value for `key`, if any.
    pub fn memoized(&self, key: NodeKey) -> Option<f64> {
        self.memo.get(&key).copied()
    }

    /// Seed the memo table, e.g. with values rendered earlier.
    pub fn remember(&mut self, key: NodeKey, progress: f64) {
        self.memo.insert(key, progress);
    }

    /// Drop one memoized value so the next call recomputes it.
    pub fn invalidate(&mut self, key: NodeKey) {
        self.memo.remove(&key);
    }

    pub fn clear(&mut self) {
        self.memo.clear();
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

/// Render `percentage` as `[█████░░░░░] 50.0%`.
pub fn progress_bar(percentage: f64) -> Result<String, ValidationError> {
    if !percentage.is_finite() {
        return Err(ValidationError::new("percentage", "must be a number"));
    }
    if !(0.0..=100.0).contains(&percentage) {
        return Err(ValidationError::new(
            "percentage",
            format!("must be between 0 and 100, got {percentage}"),
        ));
    }
    let filled = ((percentage / 10.0) as usize).min(BAR_WIDTH);
    let bar: String = std::iter::repeat(FILLED)
        .take(filled)
        .chain(std::iter::repeat(EMPTY).take(BAR_WIDTH - filled))
        .collect();
    Ok(format!("[{bar}] {percentage:.1}%"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Task stand-in that counts how often its children are read.
    struct Node {
        id: i64,
        completed: bool,
        weight: f64,
        children: Vec<Node>,
        reads: Cell<usize>,
    }

    fn node(id: i64, completed: bool, weight: f64, children: Vec<Node>) -> Node {
        Node {
            id,
            completed,
            weight,
            children,
            reads: Cell::new(0),
        }
    }

    impl ProgressNode for Node {
        fn node_key(&self) -> NodeKey {
            NodeKey::new(EntityKind::Task, self.id)
        }
        fn completed(&self) -> bool {
            self.completed
        }
        fn weight(&self) -> f64 {
            self.weight
        }
        fn children(&self) -> Vec<&dyn ProgressNode> {
            self.reads.set(self.reads.get() + 1);
            self.children.iter().map(|c| c as &dyn ProgressNode).collect()
        }
    }

    fn key(id: i64) -> NodeKey {
        NodeKey::new(EntityKind::Task, id)
    }

    #[test]
    fn test_memoized_value_is_returned_as_is() {
        let mut engine = ProgressEngine::new();
        engine.remember(key(1), 50.0);
        let task = node(1, false, 1.0, vec![]);
        assert_eq!(engine.progress(&task), 50.0);
        assert_eq!(engine.len(), 1);
        assert_eq!(task.reads.get(), 0);
    }

    #[test]
    fn test_leaf_not_completed() {
        let mut engine = ProgressEngine::new();
        assert_eq!(engine.progress(&node(1, false, 1.0, vec![])), 0.0);
        assert_eq!(engine.memoized(key(1)), Some(0.0));
    }

    #[test]
    fn test_leaf_completed() {
        let mut engine = ProgressEngine::new();
        assert_eq!(engine.progress(&node(1, true, 1.0, vec![])), 100.0);
        assert_eq!(engine.memoized(key(1)), Some(100.0));
    }

    #[test]
    fn test_children_none_completed() {
        let parent = node(
            1,
            false,
            1.0,
            vec![node(2, false, 1.0, vec![]), node(3, false, 1.0, vec![])],
        );
        let mut engine = ProgressEngine::new();
        assert_eq!(engine.progress(&parent), 0.0);
        assert_eq!(engine.memoized(key(2)), Some(0.0));
        assert_eq!(engine.memoized(key(3)), Some(0.0));
    }

    #[test]
    fn test_children_half_completed() {
        let parent = node(
            1,
            false,
            1.0,
            vec![node(2, true, 1.0, vec![]), node(3, false, 1.0, vec![])],
        );
        let mut engine = ProgressEngine::new();
        assert_eq!(engine.progress(&parent), 50.0);
        assert_eq!(engine.memoized(key(2)), Some(100.0));
        assert_eq!(engine.memoized(key(3)), Some(0.0));
    }

    #[test]
    fn test_children_all_completed_fractional_weights() {
        let parent = node(
            1,
            false,
            1.0,
            vec![node(2, true, 0.5, vec![]), node(3, true, 0.5, vec![])],
        );
        assert_eq!(ProgressEngine::new().progress(&parent), 100.0);
    }

    #[test]
    fn test_parent_flag_ignored_when_it_has_children() {
        let parent = node(1, true, 1.0, vec![node(2, false, 1.0, vec![])]);
        assert_eq!(ProgressEngine::new().progress(&parent), 0.0);
    }

    #[test]
    fn test_nested_children() {
        let child1 = node(2, true, 5.0, vec![node(4, true, 10.0, vec![])]);
        let child2 = node(3, false, 5.0, vec![]);
        let parent = node(1, false, 1.0, vec![child1, child2]);
        let mut engine = ProgressEngine::new();
        assert_eq!(engine.progress(&parent), 50.0);
        assert_eq!(engine.memoized(key(2)), Some(100.0));
        assert_eq!(engine.memoized(key(4)), Some(100.0));
    }

    #[test]
    fn test_different_weights() {
        let parent = node(
            1,
            false,
            1.0,
            vec![
                node(2, true, 20.0, vec![]),
                node(3, false, 65.0, vec![]),
                node(4, false, 10.0, vec![]),
                node(5, true, 5.0, vec![]),
            ],
        );
        assert_eq!(ProgressEngine::new().progress(&parent), 25.0);
    }

    #[test]
    fn test_incomplete_subtree_does_not_contribute() {
        // Child 2 is half done underneath but not itself marked completed.
        let child = node(
            2,
            false,
            1.0,
            vec![node(4, true, 1.0, vec![]), node(5, false, 1.0, vec![])],
        );
        let parent = node(1, false, 1.0, vec![child, node(3, true, 1.0, vec![])]);
        let mut engine = ProgressEngine::new();
        assert_eq!(engine.progress(&parent), 50.0);
        assert_eq!(engine.memoized(key(2)), Some(50.0));
    }

    #[test]
    fn test_zero_total_weight() {
        let parent = node(
            1,
            false,
            1.0,
            vec![node(2, false, 0.0, vec![]), node(3, false, 0.0, vec![])],
        );
        assert_eq!(ProgressEngine::new().progress(&parent), 0.0);
    }

    #[test]
    fn test_second_call_does_not_recompute() {
        let parent = node(
            1,
            false,
            1.0,
            vec![node(2, true, 1.0, vec![]), node(3, false, 1.0, vec![])],
        );
        let mut engine = ProgressEngine::new();
        let first = engine.progress(&parent);
        let second = engine.progress(&parent);
        assert_eq!(first, second);
        assert_eq!(parent.reads.get(), 1);
        assert_eq!(parent.children[0].reads.get(), 1);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let parent = node(1, false, 1.0, vec![node(2, true, 1.0, vec![])]);
        let mut engine = ProgressEngine::new();
        engine.progress(&parent);
        engine.invalidate(key(1));
        engine.progress(&parent);
        assert_eq!(parent.reads.get(), 2);
        assert_eq!(parent.children[0].reads.get(), 1);

        engine.clear();
        assert!(engine.is_empty());
    }

    #[test]
    fn test_progress_bar_rendering() {
        assert_eq!(progress_bar(75.0).unwrap(), "[███████░░░] 75.0%");
        assert_eq!(progress_bar(50.0).unwrap(), "[█████░░░░░] 50.0%");
        assert_eq!(progress_bar(25.0).unwrap(), "[██░░░░░░░░] 25.0%");
        assert_eq!(progress_bar(0.0).unwrap(), "[░░░░░░░░░░] 0.0%");
        assert_eq!(progress_bar(100.0).unwrap(), "[██████████] 100.0%");
        assert_eq!(progress_bar(33.333).unwrap(), "[███░░░░░░░] 33.3%");
    }

    #[test]
    fn test_progress_bar_rejects_out_of_range() {
        assert!(progress_bar(-0.1).is_err());
        assert!(progress_bar(100.5).is_err());
        assert!(progress_bar(f64::NAN).is_err());
        assert!(progress_bar(f64::INFINITY).is_err());
    }
}
