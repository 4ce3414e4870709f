//! Load task forests out of the repository for progress scoring.

use crate::keys::Filters;
use crate::repository::Repository;
use progressor_core::{
    entity::{Entity, EntityKind, Task, Workspace},
    error::ProgressorError,
    tree::{Forest, TaskNode, WorkspaceNode},
};

/// Every task of a workspace, in id order.
pub async fn workspace_tasks(
    repo: &Repository,
    workspace_id: i64,
) -> Result<Vec<Task>, ProgressorError> {
    repo.get_by_custom_fields(
        EntityKind::Task,
        &Filters::new().eq("workspace_id", workspace_id),
    )
    .await?
    .into_iter()
    .map(Task::from_record)
    .collect()
}

/// A workspace with its whole task forest, or `None` if it does not exist.
pub async fn load_workspace(
    repo: &Repository,
    workspace_id: i64,
) -> Result<Option<WorkspaceNode>, ProgressorError> {
    let Some(record) = repo.get_by_id(EntityKind::Workspace, workspace_id).await? else {
        return Ok(None);
    };
    let workspace = Workspace::from_record(record)?;
    let forest = Forest::new(workspace_tasks(repo, workspace.id).await?);
    Ok(Some(WorkspaceNode {
        tasks: forest.roots(),
        workspace,
    }))
}

/// A task with its subtree, or `None` if it does not exist.
pub async fn load_task(repo: &Repository, task_id: i64) -> Result<Option<TaskNode>, ProgressorError> {
    let Some(record) = repo.get_by_id(EntityKind::Task, task_id).await? else {
        return Ok(None);
    };
    let task = Task::from_record(record)?;
    let forest = Forest::new(workspace_tasks(repo, task.workspace_id).await?);
    Ok(forest.subtree(task.id))
}
