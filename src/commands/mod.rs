//! Conversation controller: bot commands and the dialogs they start.
//!
//! Every request is answered with a single text reply. Failures are logged,
//! reported to the user and end any dialog in progress.

mod state;
mod tasks;
mod users;
mod view;
mod workspaces;

#[cfg(test)]
mod tests;

pub use state::DialogState;
pub(crate) use view::render_workspace;

use progressor_core::{
    entity::{Entity, EntityKind, User},
    error::{ProgressorError, ValidationError},
    message::IncomingMessage,
};
use progressor_store::Repository;
use tracing::{error, info, warn};

/// Prefix of every failure reply.
pub const ERROR_REPLY: &str = "There was an error with your request";

/// Reply-keyboard text that registers a new user.
pub const NEW_USER_BUTTON: &str = "Новый";

const NO_USERNAME: &str =
    "Please set a Telegram username in your profile settings, I use it to tell users apart.";
const UNKNOWN_COMMAND: &str = "Unknown command. Send /help to see what I can do.";
const NO_DIALOG: &str = "I'm not sure what to do with that. Send /help to see what I can do.";

/// Grouped context for command execution.
pub struct CommandContext<'a> {
    pub repo: &'a Repository,
    pub telegram_username: &'a str,
    pub text: &'a str,
}

impl CommandContext<'_> {
    /// Text after the command word.
    pub fn args(&self) -> &str {
        self.text
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim())
            .unwrap_or("")
    }

    /// The registered user behind this chat.
    pub async fn user(&self) -> Result<User, ProgressorError> {
        let record = self
            .repo
            .get_by_custom_field(EntityKind::User, "telegram_username", self.telegram_username)
            .await?
            .ok_or_else(|| {
                ValidationError::new("User", "you are not registered yet, send /create_user first")
            })?;
        User::from_record(record)
    }
}

/// Known bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    About,
    Help,
    CreateUser,
    CreateWorkspace,
    CreateTask,
    View,
    Done,
    Delete,
    Cancel,
}

impl Command {
    /// Parse a command from message text. Returns `None` for free text and
    /// unknown `/` prefixes.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == NEW_USER_BUTTON {
            return Some(Self::CreateUser);
        }
        let first = text.split_whitespace().next()?;
        // Strip @botname suffix (e.g. "/help@progressor_bot" → "/help").
        let cmd = first.split('@').next().unwrap_or(first);
        match cmd {
            "/start" => Some(Self::Start),
            "/about" => Some(Self::About),
            "/help" => Some(Self::Help),
            "/create_user" => Some(Self::CreateUser),
            "/create_workspace" => Some(Self::CreateWorkspace),
            "/create_task" => Some(Self::CreateTask),
            "/view" => Some(Self::View),
            "/done" => Some(Self::Done),
            "/delete" => Some(Self::Delete),
            "/cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Handle one incoming message and return the reply text.
pub async fn handle(repo: &Repository, incoming: &IncomingMessage) -> String {
    let Some(telegram_username) = incoming.username.as_deref() else {
        warn!("message from {} without a username", incoming.sender_id);
        return NO_USERNAME.to_string();
    };
    let ctx = CommandContext {
        repo,
        telegram_username,
        text: incoming.text.trim(),
    };

    match dispatch(&ctx).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(
                "request from {telegram_username} failed: {e}. Full message - {:?}",
                incoming.text
            );
            if let Err(clear) = state::clear_state(repo, telegram_username).await {
                warn!("failed to clear dialog state of {telegram_username}: {clear}");
            }
            format!("{ERROR_REPLY}\n{e}")
        }
    }
}

async fn dispatch(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    match Command::parse(ctx.text) {
        Some(Command::Start) => users::handle_start(ctx).await,
        Some(Command::About) => Ok(users::ABOUT.to_string()),
        Some(Command::Help) => Ok(users::help()),
        Some(Command::CreateUser) => users::handle_create_user(ctx).await,
        Some(Command::CreateWorkspace) => workspaces::handle_create(ctx).await,
        Some(Command::CreateTask) => tasks::handle_create(ctx).await,
        Some(Command::View) => view::handle_view(ctx).await,
        Some(Command::Done) => tasks::handle_done(ctx).await,
        Some(Command::Delete) => handle_delete(ctx).await,
        Some(Command::Cancel) => state::handle_cancel(ctx).await,
        None if ctx.text.starts_with('/') => Ok(UNKNOWN_COMMAND.to_string()),
        None => handle_free_text(ctx).await,
    }
}

/// Free text continues the dialog the user is in, if any.
async fn handle_free_text(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let user = ctx.user().await?;
    match state::get_state(ctx.repo, ctx.telegram_username).await? {
        Some(DialogState::CreatingWorkspace) => {
            workspaces::create_from_message(ctx, &user, ctx.text).await
        }
        Some(DialogState::CreatingTask) => tasks::create_from_message(ctx, &user, ctx.text).await,
        None => {
            info!(
                "There is an unprocessed message from {}: {}",
                ctx.telegram_username, ctx.text
            );
            Ok(NO_DIALOG.to_string())
        }
    }
}

/// `/delete <Workspace|Task> <name>`.
async fn handle_delete(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let user = ctx.user().await?;
    let (kind, name) = parse_target(ctx.args())?;
    match kind {
        EntityKind::Workspace => workspaces::delete(ctx, &user, name).await,
        _ => tasks::delete(ctx, &user, name).await,
    }
}

/// Split `<Workspace|Task> <name…>` command arguments.
pub(crate) fn parse_target(args: &str) -> Result<(EntityKind, &str), ProgressorError> {
    let (kind, name) = args
        .split_once(char::is_whitespace)
        .map(|(k, n)| (k, n.trim()))
        .unwrap_or((args, ""));
    let kind: EntityKind = kind.parse()?;
    if !matches!(kind, EntityKind::Workspace | EntityKind::Task) {
        return Err(ProgressorError::InvalidType(kind.type_name().to_string()));
    }
    if name.is_empty() {
        return Err(ValidationError::new("Name", "field required").into());
    }
    Ok((kind, name))
}
