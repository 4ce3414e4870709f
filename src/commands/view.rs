//! `/view`: progress bars for workspaces and tasks.

use super::{parse_target, tasks, workspaces, CommandContext};
use progressor_core::{
    entity::{Entity, EntityKind, User, Workspace},
    error::{ProgressorError, ValidationError},
    progress::{progress_bar, ProgressEngine},
    tree::{TaskNode, WorkspaceNode},
    validate::{NAME_FIELD, WORKSPACE_NAME_FIELD},
};
use progressor_store::{tree, Filters};

const NO_WORKSPACES: &str = "You have no workspaces yet. Use /create_workspace to create one.";

/// `/view`, `/view Workspace <name>` or `/view Task <name>`.
pub(super) async fn handle_view(ctx: &CommandContext<'_>) -> Result<String, ProgressorError> {
    let user = ctx.user().await?;
    let args = ctx.args();
    if args.is_empty() {
        return list_workspaces(ctx, &user).await;
    }

    let (kind, name) = parse_target(args)?;
    let mut engine = ProgressEngine::new();
    match kind {
        EntityKind::Workspace => {
            let workspace = workspaces::find(ctx.repo, &user.username, name).await?;
            let node = tree::load_workspace(ctx.repo, workspace.id)
                .await?
                .ok_or_else(|| vanished(WORKSPACE_NAME_FIELD, name))?;
            render_workspace(&node, &mut engine)
        }
        _ => {
            let task = tasks::find(ctx.repo, &user.username, name).await?;
            let node = tree::load_task(ctx.repo, task.id)
                .await?
                .ok_or_else(|| vanished(NAME_FIELD, name))?;
            render_task(&node, &mut engine)
        }
    }
}

/// Deleted between lookup and load.
fn vanished(field: &str, name: &str) -> ProgressorError {
    ValidationError::new(field, format!("'{name}' no longer exists")).into()
}

async fn list_workspaces(ctx: &CommandContext<'_>, user: &User) -> Result<String, ProgressorError> {
    let records = ctx
        .repo
        .get_by_custom_fields(
            EntityKind::Workspace,
            &Filters::new().eq("owner_name", user.username.as_str()),
        )
        .await?;
    if records.is_empty() {
        return Ok(NO_WORKSPACES.to_string());
    }

    let mut engine = ProgressEngine::new();
    let mut out = String::from("Your workspaces:\n");
    for record in records {
        let workspace = Workspace::from_record(record)?;
        if let Some(node) = tree::load_workspace(ctx.repo, workspace.id).await? {
            out.push_str(&line(&workspace.name, engine.progress(&node))?);
        }
    }
    Ok(out.trim_end().to_string())
}

pub(crate) fn render_workspace(
    node: &WorkspaceNode,
    engine: &mut ProgressEngine,
) -> Result<String, ProgressorError> {
    let progress = engine.progress(node);
    render(
        engine,
        progress,
        &node.workspace.name,
        node.workspace.description.as_deref(),
        &node.tasks,
    )
}

pub(crate) fn render_task(
    node: &TaskNode,
    engine: &mut ProgressEngine,
) -> Result<String, ProgressorError> {
    let progress = engine.progress(node);
    render(
        engine,
        progress,
        &node.task.name,
        node.task.description.as_deref(),
        &node.children,
    )
}

fn render(
    engine: &mut ProgressEngine,
    progress: f64,
    name: &str,
    description: Option<&str>,
    children: &[TaskNode],
) -> Result<String, ProgressorError> {
    let mut out = format!("{}\n{name}\n", progress_bar(progress)?);
    if let Some(description) = description {
        out.push_str(description);
        out.push('\n');
    }
    for child in children {
        out.push_str(&line(&child.task.name, engine.progress(child))?);
    }
    Ok(out.trim_end().to_string())
}

fn line(name: &str, progress: f64) -> Result<String, ProgressorError> {
    Ok(format!("    {name:<50} {}\n", progress_bar(progress)?))
}
