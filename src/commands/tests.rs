use super::state::{get_state, DialogState};
use super::*;
use chrono::Utc;
use progressor_store::MemoryCache;
use std::sync::Arc;
use uuid::Uuid;

async fn test_repo() -> Repository {
    Repository::in_memory(Arc::new(MemoryCache::new()))
        .await
        .unwrap()
}

fn msg_from(username: Option<&str>, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: Uuid::new_v4(),
        channel: "telegram".to_string(),
        sender_id: "42".to_string(),
        username: username.map(str::to_string),
        text: text.to_string(),
        timestamp: Utc::now(),
        reply_target: Some("42".to_string()),
    }
}

async fn send(repo: &Repository, text: &str) -> String {
    handle(repo, &msg_from(Some("alice_tg"), text)).await
}

async fn registered_repo() -> Repository {
    let repo = test_repo().await;
    let reply = send(&repo, "/create_user").await;
    assert!(reply.starts_with("Successfully registered"), "{reply}");
    repo
}

// --- Command::parse ---

#[test]
fn test_parse_known_commands() {
    assert_eq!(Command::parse("/start"), Some(Command::Start));
    assert_eq!(Command::parse("/help@progressor_bot"), Some(Command::Help));
    assert_eq!(
        Command::parse("/view Workspace Fitness"),
        Some(Command::View)
    );
    assert_eq!(
        Command::parse("/create_task\nName - Run"),
        Some(Command::CreateTask)
    );
    assert_eq!(Command::parse("Новый"), Some(Command::CreateUser));
}

#[test]
fn test_parse_non_commands() {
    assert_eq!(Command::parse("/unknown"), None);
    assert_eq!(Command::parse("Fitness"), None);
    assert_eq!(Command::parse(""), None);
}

#[test]
fn test_parse_target() {
    let (kind, name) = parse_target("Workspace Morning routine").unwrap();
    assert_eq!(kind, EntityKind::Workspace);
    assert_eq!(name, "Morning routine");

    let (kind, _) = parse_target("task Run").unwrap();
    assert_eq!(kind, EntityKind::Task);

    assert!(matches!(
        parse_target("Project X"),
        Err(ProgressorError::InvalidType(_))
    ));
    assert!(matches!(
        parse_target("User alice"),
        Err(ProgressorError::InvalidType(_))
    ));
    assert!(matches!(
        parse_target("Task"),
        Err(ProgressorError::Validation(_))
    ));
}

// --- dialogs ---

#[tokio::test]
async fn test_message_without_username() {
    let repo = test_repo().await;
    let reply = handle(&repo, &msg_from(None, "/start")).await;
    assert_eq!(reply, NO_USERNAME);
}

#[tokio::test]
async fn test_start_and_registration() {
    let repo = test_repo().await;
    let reply = send(&repo, "/start").await;
    assert!(reply.contains("can't find you"));

    let reply = send(&repo, "Новый").await;
    assert!(reply.contains("username: alice_tg"));

    let reply = send(&repo, "/start").await;
    assert!(reply.starts_with("Hello, alice_tg"));

    let reply = send(&repo, "/create_user").await;
    assert!(reply.starts_with(ERROR_REPLY), "{reply}");
}

#[tokio::test]
async fn test_unregistered_user_is_told_to_register() {
    let repo = test_repo().await;
    let reply = send(&repo, "/view").await;
    assert!(reply.starts_with(ERROR_REPLY));
    assert!(reply.contains("/create_user"));
}

#[tokio::test]
async fn test_unknown_command_and_idle_text() {
    let repo = registered_repo().await;
    assert_eq!(send(&repo, "/frobnicate").await, UNKNOWN_COMMAND);
    assert_eq!(send(&repo, "hello there").await, NO_DIALOG);
    assert_eq!(send(&repo, "/about").await, users::ABOUT);
    assert!(send(&repo, "/help").await.contains("/create_task"));
}

#[tokio::test]
async fn test_create_workspace_dialog() {
    let repo = registered_repo().await;
    let reply = send(&repo, "/create_workspace").await;
    assert!(reply.starts_with("What name would you like"));
    assert_eq!(
        get_state(&repo, "alice_tg").await.unwrap(),
        Some(DialogState::CreatingWorkspace)
    );

    let reply = send(&repo, "Fitness").await;
    assert!(reply.starts_with("Successfully created Workspace named: Fitness."));
    assert_eq!(get_state(&repo, "alice_tg").await.unwrap(), None);

    let reply = send(&repo, "/view").await;
    assert!(reply.contains("Fitness"));
    assert!(reply.contains("[░░░░░░░░░░] 0.0%"));
}

#[tokio::test]
async fn test_create_workspace_inline_with_description() {
    let repo = registered_repo().await;
    send(
        &repo,
        "/create_workspace\nName - Fitness\nDescription - Get fit by summer",
    )
    .await;
    let reply = send(&repo, "/view Workspace Fitness").await;
    let lines: Vec<&str> = reply.lines().collect();
    assert_eq!(lines[0], "[░░░░░░░░░░] 0.0%");
    assert_eq!(lines[1], "Fitness");
    assert_eq!(lines[2], "Get fit by summer");
}

#[tokio::test]
async fn test_duplicate_workspace_name_is_rejected() {
    let repo = registered_repo().await;
    send(&repo, "/create_workspace Fitness").await;
    let reply = send(&repo, "/create_workspace Fitness").await;
    assert!(reply.starts_with(ERROR_REPLY));
    assert!(reply.contains("already have a workspace"));
}

#[tokio::test]
async fn test_tasks_done_and_progress() {
    let repo = registered_repo().await;
    send(&repo, "/create_workspace Fitness").await;

    let reply = send(&repo, "/create_task").await;
    assert!(reply.contains("Workspace Name"));
    assert_eq!(
        get_state(&repo, "alice_tg").await.unwrap(),
        Some(DialogState::CreatingTask)
    );
    let reply = send(&repo, "Name - Run\nWorkspace Name - Fitness").await;
    assert!(reply.starts_with("Successfully created Task named: Run."), "{reply}");

    send(&repo, "/create_task\nName - Swim\nWorkspace Name - Fitness").await;
    send(
        &repo,
        "/create_task\nName - Warm up\nWorkspace Name - Fitness\nParent Name - Run\nCompleted - Да",
    )
    .await;

    let reply = send(&repo, "/view Task Run").await;
    assert!(reply.starts_with("[██████████] 100.0%\nRun"), "{reply}");
    assert!(reply.contains("Warm up"));

    // Run is not itself marked completed, so it does not count yet.
    let reply = send(&repo, "/view Workspace Fitness").await;
    assert!(reply.starts_with("[░░░░░░░░░░] 0.0%"), "{reply}");

    let reply = send(&repo, "/done Run").await;
    assert!(reply.contains("Task Run marked as completed."));
    assert!(reply.contains("Fitness: [█████░░░░░] 50.0%"), "{reply}");

    let reply = send(&repo, "/done Run").await;
    assert!(reply.contains("already completed"));
}

#[tokio::test]
async fn test_invalid_task_reports_error_and_clears_state() {
    let repo = registered_repo().await;
    send(&repo, "/create_workspace Fitness").await;
    send(&repo, "/create_task").await;

    let reply = send(&repo, "Name - Run\nWorkspace Name - Fitness\nWeight - 150").await;
    assert!(reply.starts_with(ERROR_REPLY));
    assert!(reply.contains("Weight"));
    assert_eq!(get_state(&repo, "alice_tg").await.unwrap(), None);
}

#[tokio::test]
async fn test_task_in_unknown_workspace() {
    let repo = registered_repo().await;
    let reply = send(&repo, "/create_task\nName - Run\nWorkspace Name - Nowhere").await;
    assert!(reply.starts_with(ERROR_REPLY));
    assert!(reply.contains("Nowhere"));
}

#[tokio::test]
async fn test_unknown_parent_is_rejected() {
    let repo = registered_repo().await;
    send(&repo, "/create_workspace Fitness").await;
    let reply = send(
        &repo,
        "/create_task\nName - Run\nWorkspace Name - Fitness\nParent Name - Ghost",
    )
    .await;
    assert!(reply.starts_with(ERROR_REPLY));
    assert!(reply.contains("Parent Name"));
}

#[tokio::test]
async fn test_view_rejects_unknown_type() {
    let repo = registered_repo().await;
    let reply = send(&repo, "/view Project Fitness").await;
    assert!(reply.starts_with(ERROR_REPLY));
    assert!(reply.contains("invalid entity type"));
}

#[tokio::test]
async fn test_delete_workspace_and_task() {
    let repo = registered_repo().await;
    send(&repo, "/create_workspace Fitness").await;
    send(&repo, "/create_task\nName - Run\nWorkspace Name - Fitness").await;

    let reply = send(&repo, "/delete Task Run").await;
    assert!(reply.starts_with("Deleted Task Run"));
    let reply = send(&repo, "/view Task Run").await;
    assert!(reply.starts_with(ERROR_REPLY));

    let reply = send(&repo, "/delete Workspace Fitness").await;
    assert!(reply.starts_with("Deleted Workspace Fitness"));
    let reply = send(&repo, "/view").await;
    assert!(reply.contains("no workspaces"));
}

#[tokio::test]
async fn test_cancel() {
    let repo = registered_repo().await;
    assert!(send(&repo, "/cancel").await.contains("nothing to cancel"));
    send(&repo, "/create_workspace").await;
    assert!(send(&repo, "/cancel").await.starts_with("Cancelled."));
    assert_eq!(get_state(&repo, "alice_tg").await.unwrap(), None);
    assert_eq!(send(&repo, "Fitness").await, NO_DIALOG);
}

#[tokio::test]
async fn test_users_do_not_see_each_other() {
    let repo = registered_repo().await;
    send(&repo, "/create_workspace Fitness").await;

    let bob = |text: &str| msg_from(Some("bob_tg"), text);
    handle(&repo, &bob("/create_user")).await;
    let reply = handle(&repo, &bob("/view Workspace Fitness")).await;
    assert!(reply.starts_with(ERROR_REPLY));
    let reply = handle(&repo, &bob("/view")).await;
    assert!(reply.contains("no workspaces"));
}
