//! In-memory task forest built from flat task rows.

use crate::entity::{EntityKind, Task, Workspace};
use crate::progress::{NodeKey, ProgressNode};
use std::collections::{HashMap, HashSet};

/// A task with its loaded subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub task: Task,
    pub children: Vec<TaskNode>,
}

/// A workspace with its root tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceNode {
    pub workspace: Workspace,
    pub tasks: Vec<TaskNode>,
}

impl ProgressNode for TaskNode {
    fn node_key(&self) -> NodeKey {
        NodeKey::new(EntityKind::Task, self.task.id)
    }

    fn completed(&self) -> bool {
        self.task.completed
    }

    fn weight(&self) -> f64 {
        self.task.weight
    }

    fn children(&self) -> Vec<&dyn ProgressNode> {
        self.children.iter().map(|c| c as &dyn ProgressNode).collect()
    }
}

impl ProgressNode for WorkspaceNode {
    fn node_key(&self) -> NodeKey {
        NodeKey::new(EntityKind::Workspace, self.workspace.id)
    }

    fn completed(&self) -> bool {
        false
    }

    fn weight(&self) -> f64 {
        1.0
    }

    fn children(&self) -> Vec<&dyn ProgressNode> {
        self.tasks.iter().map(|t| t as &dyn ProgressNode).collect()
    }
}

/// Flat rows of one workspace, indexed by parent.
pub struct Forest {
    by_id: HashMap<i64, Task>,
    children: HashMap<Option<i64>, Vec<i64>>,
}

impl Forest {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut children: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
        for task in &tasks {
            children.entry(task.parent_id).or_default().push(task.id);
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
        }
        let by_id = tasks.into_iter().map(|t| (t.id, t)).collect();
        Self { by_id, children }
    }

    /// Root tasks (no parent) with their subtrees.
    ///
    /// Rows whose parent chain never reaches a root, including members of a
    /// parent cycle, are left out.
    pub fn roots(&self) -> Vec<TaskNode> {
        let mut seen = HashSet::new();
        self.attach(None, &mut seen)
    }

    /// The subtree under `task_id`, if that task is present.
    pub fn subtree(&self, task_id: i64) -> Option<TaskNode> {
        let task = self.by_id.get(&task_id)?.clone();
        let mut seen = HashSet::from([task_id]);
        let children = self.attach(Some(task_id), &mut seen);
        Some(TaskNode { task, children })
    }

    fn attach(&self, parent: Option<i64>, seen: &mut HashSet<i64>) -> Vec<TaskNode> {
        let Some(ids) = self.children.get(&parent) else {
            return Vec::new();
        };
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(task) = self.by_id.get(id) {
                let children = self.attach(Some(*id), seen);
                nodes.push(TaskNode {
                    task: task.clone(),
                    children,
                });
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEngine;

    fn task(id: i64, parent_id: Option<i64>, completed: bool, weight: f64) -> Task {
        Task {
            id,
            workspace_id: 1,
            parent_id,
            name: format!("T{id}"),
            description: None,
            completed,
            weight,
            owner_name: "alice".to_string(),
        }
    }

    fn workspace() -> Workspace {
        Workspace {
            id: 1,
            name: "W".to_string(),
            description: None,
            owner_name: "alice".to_string(),
        }
    }

    #[test]
    fn test_roots_and_nesting() {
        let forest = Forest::new(vec![
            task(3, Some(1), true, 1.0),
            task(1, None, false, 1.0),
            task(2, None, true, 1.0),
        ]);
        let roots = forest.roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].task.id, 1);
        assert_eq!(roots[0].children[0].task.id, 3);
        assert!(roots[1].children.is_empty());
    }

    #[test]
    fn test_cycle_members_are_dropped() {
        let forest = Forest::new(vec![
            task(1, None, false, 1.0),
            task(2, Some(3), false, 1.0),
            task(3, Some(2), false, 1.0),
        ]);
        let roots = forest.roots();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].children.is_empty());

        let sub = forest.subtree(2).unwrap();
        assert_eq!(sub.children.len(), 1);
        assert!(sub.children[0].children.is_empty());
    }

    #[test]
    fn test_workspace_progress_half() {
        let forest = Forest::new(vec![task(1, None, true, 1.0), task(2, None, false, 1.0)]);
        let ws = WorkspaceNode {
            workspace: workspace(),
            tasks: forest.roots(),
        };
        assert_eq!(ProgressEngine::new().progress(&ws), 50.0);
    }

    #[test]
    fn test_empty_workspace_is_zero() {
        let ws = WorkspaceNode {
            workspace: workspace(),
            tasks: Vec::new(),
        };
        assert_eq!(ProgressEngine::new().progress(&ws), 0.0);
    }

    #[test]
    fn test_workspace_and_task_keys_do_not_collide() {
        let forest = Forest::new(vec![task(1, None, true, 1.0)]);
        let ws = WorkspaceNode {
            workspace: workspace(),
            tasks: forest.roots(),
        };
        let mut engine = ProgressEngine::new();
        engine.progress(&ws);
        assert_eq!(
            engine.memoized(NodeKey::new(EntityKind::Workspace, 1)),
            Some(100.0)
        );
        assert_eq!(engine.memoized(NodeKey::new(EntityKind::Task, 1)), Some(100.0));
    }
}
