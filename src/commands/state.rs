//! Per-user dialog state, persisted as `UserState` rows.

use super::CommandContext;
use progressor_core::{
    entity::{Entity, EntityKind, UserState},
    error::ProgressorError,
    record,
};
use progressor_store::{Repository, UnitOfWork};

/// What the next free-text message from a user means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    CreatingWorkspace,
    CreatingTask,
}

impl DialogState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatingWorkspace => "creating_workspace",
            Self::CreatingTask => "creating_task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creating_workspace" => Some(Self::CreatingWorkspace),
            "creating_task" => Some(Self::CreatingTask),
            _ => None,
        }
    }
}

/// Current dialog state; `None` when idle.
pub async fn get_state(
    repo: &Repository,
    telegram_username: &str,
) -> Result<Option<DialogState>, ProgressorError> {
    let Some(record) = repo
        .get_by_id(EntityKind::UserState, telegram_username)
        .await?
    else {
        return Ok(None);
    };
    let row = UserState::from_record(record)?;
    Ok(row.state.as_deref().and_then(DialogState::parse))
}

/// Enter `state`, creating the user's state row on first use.
pub async fn set_state(
    repo: &Repository,
    telegram_username: &str,
    state: DialogState,
) -> Result<(), ProgressorError> {
    let mut uow = repo.transaction().await?;
    let result = upsert(&mut uow, telegram_username, state).await;
    uow.finish(result).await
}

async fn upsert(
    uow: &mut UnitOfWork,
    telegram_username: &str,
    state: DialogState,
) -> Result<(), ProgressorError> {
    let fields = record! { "state" => (state.as_str()) };
    if !uow
        .update(EntityKind::UserState, telegram_username, fields)
        .await?
    {
        uow.create(
            EntityKind::UserState,
            record! {
                "telegram_username" => telegram_username,
                "state" => (state.as_str()),
            },
        )
        .await?;
    }
    Ok(())
}

/// Return to idle. Idempotent.
pub async fn clear_state(repo: &Repository, telegram_username: &str) -> Result<(), ProgressorError> {
    repo.delete(EntityKind::UserState, telegram_username).await?;
    Ok(())
}

/// `/cancel`.
pub(super) async fn handle_cancel(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    if get_state(ctx.repo, ctx.telegram_username).await?.is_none() {
        return Ok("There is nothing to cancel.".to_string());
    }
    clear_state(ctx.repo, ctx.telegram_username).await?;
    Ok("Cancelled. Send /help to see what I can do.".to_string())
}
