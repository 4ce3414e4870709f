//! Greeting, help and registration.

use super::CommandContext;
use progressor_core::{
    entity::{Entity, EntityKind, User},
    error::ProgressorError,
    record,
};

pub(super) const ABOUT: &str =
    "Hello, im Progressor bot, i'll help to keep track of your progress in any field";

pub(super) fn help() -> String {
    [
        "Available commands:",
        "/start - greeting",
        "/about - what this bot does",
        "/create_user - register your Telegram account",
        "/create_workspace - create a workspace",
        "/create_task - add a task to a workspace",
        "/view - list your workspaces",
        "/view Workspace <name> - progress of a workspace",
        "/view Task <name> - progress of a task",
        "/done <task name> - mark a task as completed",
        "/delete Workspace <name> - delete a workspace with its tasks",
        "/delete Task <name> - delete a task with its subtasks",
        "/cancel - abandon the current dialog",
    ]
    .join("\n")
}

/// `/start`: greet known users, point newcomers at registration.
pub(super) async fn handle_start(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let known = ctx
        .repo
        .get_by_custom_field(EntityKind::User, "telegram_username", ctx.telegram_username)
        .await?;
    match known {
        Some(record) => {
            let user = User::from_record(record)?;
            Ok(format!(
                "Hello, {}, how can I help you? \n\
                 /view to view your workspaces \n\
                 /create_workspace to create new workspace",
                user.username
            ))
        }
        None => Ok(format!(
            "{ABOUT}\n\n\
             Seems like, i can't find you in my system, would you like to create an account? \
             Send /create_user or {}",
            super::NEW_USER_BUTTON
        )),
    }
}

/// `/create_user` (or the registration keyboard button).
pub(super) async fn handle_create_user(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let username = ctx.telegram_username;
    ctx.repo
        .create(
            EntityKind::User,
            record! {
                "username" => username,
                "active" => true,
                "telegram_username" => username,
            },
        )
        .await?;
    tracing::info!("Created new user: {username}");
    Ok(format!(
        "Successfully registered you in the system with username: {username}. \n\
         You can use command /view to check your workspaces\n\
         You can use command /create_workspace to create new workspace"
    ))
}
