//! Task dialogs.

use super::state::{self, DialogState};
use super::{workspaces, CommandContext};
use progressor_core::{
    entity::{Entity, EntityKind, Record, Task, User, Workspace},
    error::{ProgressorError, ValidationError},
    progress::{progress_bar, ProgressEngine},
    record,
    validate::{TaskDraft, NAME_FIELD, PARENT_NAME_FIELD},
};
use progressor_store::{tree, Filters, Repository, UnitOfWork};
use tracing::info;

const PROMPT: &str = "Send the task as lines of \"Field - Value\":\n\
                      Name - <task name>\n\
                      Workspace Name - <workspace name>\n\
                      Optional fields: Weight (0-100, default 1), Parent Name, \
                      Description, Completed (Да/Нет)";

/// `/create_task [fields]`.
pub(super) async fn handle_create(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let user = ctx.user().await?;
    info!("User {} triggered /create_task", ctx.telegram_username);
    let args = ctx.args();
    if !args.is_empty() {
        return create_from_message(ctx, &user, args).await;
    }
    state::set_state(ctx.repo, ctx.telegram_username, DialogState::CreatingTask).await?;
    Ok(PROMPT.to_string())
}

/// Create a task from `Field - Value` lines.
pub(super) async fn create_from_message(
    ctx: &CommandContext<'_>,
    user: &User,
    text: &str,
) -> Result<String, ProgressorError> {
    let draft = TaskDraft::from_message(text)?;
    let workspace = workspaces::find(ctx.repo, &user.username, &draft.workspace_name).await?;
    let parent_id = match draft.parent_name.as_deref() {
        Some(parent) => Some(find_in_workspace(ctx.repo, &workspace, parent).await?.id),
        None => None,
    };

    let mut uow = ctx.repo.transaction().await?;
    let result = insert(&mut uow, user, &workspace, parent_id, &draft).await;
    uow.finish(result).await?;
    info!(
        "Created new Task for {} named {} in {}",
        user.username, draft.name, workspace.name
    );

    state::clear_state(ctx.repo, ctx.telegram_username).await?;
    Ok(format!(
        "Successfully created Task named: {name}.\n\
         You can use command /view Task {name} to check it",
        name = draft.name
    ))
}

async fn insert(
    uow: &mut UnitOfWork,
    user: &User,
    workspace: &Workspace,
    parent_id: Option<i64>,
    draft: &TaskDraft,
) -> Result<Record, ProgressorError> {
    let same_name = uow
        .get_by_custom_fields(
            EntityKind::Task,
            &Filters::new()
                .eq("workspace_id", workspace.id)
                .eq("name", draft.name.as_str()),
        )
        .await?;
    if !same_name.is_empty() {
        return Err(ValidationError::new(
            NAME_FIELD,
            format!(
                "workspace '{}' already has a task named '{}'",
                workspace.name, draft.name
            ),
        )
        .into());
    }
    uow.create(
        EntityKind::Task,
        record! {
            "workspace_id" => (workspace.id),
            "parent_id" => parent_id,
            "name" => (draft.name.as_str()),
            "description" => (draft.description.as_deref()),
            "completed" => (draft.completed),
            "weight" => (draft.weight),
            "owner_name" => (user.username.as_str()),
        },
    )
    .await
}

/// The first task of `owner` called `name`.
pub(super) async fn find(repo: &Repository, owner: &str, name: &str) -> Result<Task, ProgressorError> {
    let found = repo
        .get_by_custom_fields(
            EntityKind::Task,
            &Filters::new().eq("owner_name", owner).eq("name", name),
        )
        .await?;
    match found.into_iter().next() {
        Some(record) => Task::from_record(record),
        None => Err(ValidationError::new(NAME_FIELD, format!("you have no task named '{name}'")).into()),
    }
}

async fn find_in_workspace(
    repo: &Repository,
    workspace: &Workspace,
    name: &str,
) -> Result<Task, ProgressorError> {
    let found = repo
        .get_by_custom_fields(
            EntityKind::Task,
            &Filters::new()
                .eq("workspace_id", workspace.id)
                .eq("name", name),
        )
        .await?;
    match found.into_iter().next() {
        Some(record) => Task::from_record(record),
        None => Err(ValidationError::new(
            PARENT_NAME_FIELD,
            format!("workspace '{}' has no task named '{name}'", workspace.name),
        )
        .into()),
    }
}

/// `/done <task name>`.
pub(super) async fn handle_done(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let user = ctx.user().await?;
    let name = ctx.args();
    if name.is_empty() {
        return Err(ValidationError::new(NAME_FIELD, "field required").into());
    }
    let task = find(ctx.repo, &user.username, name).await?;
    if task.completed {
        return Ok(format!("Task {} is already completed.", task.name));
    }
    ctx.repo
        .update(EntityKind::Task, task.id, record! { "completed" => true })
        .await?;
    info!("User {} completed Task {}", user.username, task.id);

    let mut reply = format!("Task {} marked as completed.", task.name);
    if let Some(node) = tree::load_workspace(ctx.repo, task.workspace_id).await? {
        let bar = progress_bar(ProgressEngine::new().progress(&node))?;
        reply.push_str(&format!("\n{}: {bar}", node.workspace.name));
    }
    Ok(reply)
}

/// `/delete Task <name>`.
pub(super) async fn delete(
    ctx: &CommandContext<'_>,
    user: &User,
    name: &str,
) -> Result<String, ProgressorError> {
    let task = find(ctx.repo, &user.username, name).await?;
    ctx.repo.delete(EntityKind::Task, task.id).await?;
    info!("User {} deleted Task {}", user.username, task.id);
    Ok(format!(
        "Deleted Task {} together with its subtasks.",
        task.name
    ))
}
