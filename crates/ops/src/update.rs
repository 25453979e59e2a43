//! Update workflow
//!
//! The old version stays committed until the new one is, so a failure at
//! any step before the final removal leaves it usable.

use crate::context::{Access, OpsCtx};
use crate::install;
use crate::task::{StepResult, TaskHandle};
use pkgd_errors::InstallError;
use pkgd_types::{Module, ModuleRef, PackageReference, TaskId, TaskOutput};
use std::sync::Arc;

pub(crate) fn submit(
    ctx: &Arc<OpsCtx>,
    id: TaskId,
    from: PackageReference,
    to: PackageReference,
    module: Module,
) {
    let runner = Arc::clone(ctx);
    ctx.queues.transaction.submit(async move {
        runner
            .run_queued(id, Access::Shared, move |ctx, task| {
                execute(ctx, task, from, to, module)
            })
            .await;
    });
}

async fn execute(
    ctx: Arc<OpsCtx>,
    task: TaskHandle,
    from: PackageReference,
    to: PackageReference,
    module: Module,
) -> StepResult {
    task.checkpoint()?;
    if !from.same_package(&to) {
        return Err(InstallError::IdentityMismatch {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into());
    }
    if to.version <= from.version {
        return Err(InstallError::VersionNotNewer {
            current: from.to_string(),
            requested: to.to_string(),
        }
        .into());
    }

    let current = ModuleRef::new(from.clone(), module.clone());
    if ctx.repository.installed_entry(&current).await?.is_none() {
        return Err(InstallError::NotInstalled {
            package: current.to_string(),
        }
        .into());
    }

    task.progress(5, format!("resolving {to}"));
    let info = ctx.repository.resolve(&to).await?;
    install::install_dependencies(&ctx, &task, &info, &module).await?;

    let next = ModuleRef::new(to.clone(), module.clone());
    task.checkpoint()?;
    task.progress(60, format!("fetching {next}"));
    let content = ctx.repository.fetch(&next).await?;

    task.checkpoint()?;
    task.progress(80, format!("committing {next}"));
    ctx.repository.commit(&info, &module, content).await?;

    task.progress(90, format!("removing {current}"));
    ctx.repository.remove(&current).await?;
    tracing::info!(task_id = %task.id(), %from, %to, %module, "updated");

    Ok(TaskOutput::Updated { from, to, module })
}
