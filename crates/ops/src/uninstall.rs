//! Uninstall workflow

use crate::context::{Access, OpsCtx};
use crate::task::{StepResult, TaskHandle};
use pkgd_errors::InstallError;
use pkgd_types::{ModuleRef, TaskId, TaskOutput};
use std::sync::Arc;

pub(crate) fn submit(ctx: &Arc<OpsCtx>, id: TaskId, target: ModuleRef) {
    let runner = Arc::clone(ctx);
    ctx.queues.transaction.submit(async move {
        runner
            .run_queued(id, Access::Shared, move |ctx, task| execute(ctx, task, target))
            .await;
    });
}

/// Remove `target`, judging presence when the task runs rather than when
/// it was submitted
async fn execute(ctx: Arc<OpsCtx>, task: TaskHandle, target: ModuleRef) -> StepResult {
    task.checkpoint()?;

    let already_removed = if ctx.repository.installed_entry(&target).await?.is_some() {
        task.checkpoint()?;
        task.progress(50, format!("removing {target}"));
        ctx.repository.remove(&target).await?;
        false
    } else if ctx.registry.previously_uninstalled(&target, task.id()) {
        task.progress(50, format!("{target} was already removed"));
        true
    } else {
        return Err(InstallError::NotInstalled {
            package: target.to_string(),
        }
        .into());
    };

    Ok(TaskOutput::Uninstalled {
        reference: target.reference,
        module: target.module,
        already_removed,
    })
}
