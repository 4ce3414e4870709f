//! Workspace dialogs.

use super::state::{self, DialogState};
use super::CommandContext;
use progressor_core::{
    entity::{Entity, EntityKind, Record, User, Workspace},
    error::{ProgressorError, ValidationError},
    record,
    validate::{WorkspaceDraft, WORKSPACE_NAME_FIELD},
};
use progressor_store::{Filters, Repository, UnitOfWork};
use tracing::info;

const PROMPT: &str = "What name would you like to give your workspace?\n\
                      You can also add a description:\n\
                      Name - <workspace name>\n\
                      Description - <what it is about>";

/// `/create_workspace [name]`.
pub(super) async fn handle_create(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let user = ctx.user().await?;
    info!("User {} triggered /create_workspace", ctx.telegram_username);
    let args = ctx.args();
    if !args.is_empty() {
        return create_from_message(ctx, &user, args).await;
    }
    state::set_state(ctx.repo, ctx.telegram_username, DialogState::CreatingWorkspace).await?;
    Ok(PROMPT.to_string())
}

/// Create a workspace from the user's answer.
pub(super) async fn create_from_message(
    ctx: &CommandContext<'_>,
    user: &User,
    text: &str,
) -> Result<String, ProgressorError> {
    let draft = WorkspaceDraft::from_message(text)?;

    let mut uow = ctx.repo.transaction().await?;
    let result = insert(&mut uow, user, &draft).await;
    uow.finish(result).await?;
    info!(
        "Created new Workspace for {} named {}",
        user.username, draft.name
    );

    state::clear_state(ctx.repo, ctx.telegram_username).await?;
    Ok(format!(
        "Successfully created Workspace named: {}.\n\
         You can use command /view to check your workspaces",
        draft.name
    ))
}

async fn insert(
    uow: &mut UnitOfWork,
    user: &User,
    draft: &WorkspaceDraft,
) -> Result<Record, ProgressorError> {
    let same_name = uow
        .get_by_custom_fields(
            EntityKind::Workspace,
            &Filters::new()
                .eq("owner_name", user.username.as_str())
                .eq("name", draft.name.as_str()),
        )
        .await?;
    if !same_name.is_empty() {
        return Err(ValidationError::new(
            "Name",
            format!("you already have a workspace named '{}'", draft.name),
        )
        .into());
    }
    uow.create(
        EntityKind::Workspace,
        record! {
            "name" => (draft.name.as_str()),
            "description" => (draft.description.as_deref()),
            "owner_name" => (user.username.as_str()),
        },
    )
    .await
}

/// The workspace of `owner` called `name`.
pub(super) async fn find(
    repo: &Repository,
    owner: &str,
    name: &str,
) -> Result<Workspace, ProgressorError> {
    let found = repo
        .get_by_custom_fields(
            EntityKind::Workspace,
            &Filters::new().eq("owner_name", owner).eq("name", name),
        )
        .await?;
    match found.into_iter().next() {
        Some(record) => Workspace::from_record(record),
        None => Err(ValidationError::new(
            WORKSPACE_NAME_FIELD,
            format!("you have no workspace named '{name}'"),
        )
        .into()),
    }
}

/// `/delete Workspace <name>`.
pub(super) async fn delete(
    ctx: &CommandContext<'_>,
    user: &User,
    name: &str,
) -> Result<String, ProgressorError> {
    let workspace = find(ctx.repo, &user.username, name).await?;
    ctx.repo
        .delete(EntityKind::Workspace, workspace.id)
        .await?;
    info!("User {} deleted Workspace {}", user.username, workspace.id);
    Ok(format!(
        "Deleted Workspace {} together with its tasks.",
        workspace.name
    ))
}
