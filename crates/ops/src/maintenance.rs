//! Repository-wide maintenance: prune and format migration
//!
//! Both run as tasks whose identifier doubles as the job identifier of the
//! finished notification.

use crate::context::{Access, OpsCtx};
use crate::task::{StepResult, TaskHandle};
use pkgd_events::{AppEvent, EventEmitter, JobEvent};
use pkgd_types::{JobId, PackageInfo, PackageKind, TaskId, TaskOutcome, TaskOutput};
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) fn submit_prune(ctx: &Arc<OpsCtx>, id: TaskId) {
    let runner = Arc::clone(ctx);
    ctx.queues.maintenance.submit(async move {
        Arc::clone(&runner)
            .run_queued(id, Access::Shared, prune)
            .await;
        report(&runner, id, "prune");
    });
}

/// Queue a migration
///
/// The announcement is taken before anything is queued, so
/// work queued after this call cannot start ahead of the migration.
pub(crate) fn submit_migrate(ctx: &Arc<OpsCtx>, id: TaskId) {
    let announcement = ctx.gate.announce();
    let runner = Arc::clone(ctx);
    ctx.queues.migrate.submit(async move {
        Arc::clone(&runner)
            .run_queued(id, Access::Exclusive(announcement), migrate)
            .await;
        report(&runner, id, "migrate");
    });
}

/// Remove unreferenced non-app packages until none are left
///
/// Removing a package can leave its own dependencies unreferenced, so the
/// scan repeats until a pass removes nothing. Packages a live task targets
/// or relies on as a dependency are left alone.
async fn prune(ctx: Arc<OpsCtx>, task: TaskHandle) -> StepResult {
    let mut removed: Vec<PackageInfo> = Vec::new();
    let mut skipped = HashSet::new();

    loop {
        task.checkpoint()?;
        let mut candidates = Vec::new();
        for entry in ctx.repository.installed().await? {
            if entry.info.kind == PackageKind::App || skipped.contains(&entry.module_ref()) {
                continue;
            }
            if ctx.repository.referrers(&entry.info.reference).await? == 0 {
                candidates.push(entry);
            }
        }
        if candidates.is_empty() {
            break;
        }

        for entry in candidates {
            let key = entry.module_ref();
            let retention = ctx.retention.lock().await;
            let holder = ctx
                .registry
                .active_task(&key)
                .or_else(|| ctx.registry.pinned_by(&key));
            if let Some(holder) = holder {
                tracing::debug!(%key, task_id = %holder, "in use, not pruning");
                skipped.insert(key);
                continue;
            }
            task.checkpoint()?;
            task.progress(50, format!("removing {key}"));
            ctx.repository.remove(&key).await?;
            drop(retention);
            if !removed
                .iter()
                .any(|info| info.reference == entry.info.reference)
            {
                removed.push(entry.info);
            }
        }
    }

    tracing::info!(task_id = %task.id(), removed = removed.len(), "prune finished");
    Ok(TaskOutput::Pruned { removed })
}

async fn migrate(ctx: Arc<OpsCtx>, task: TaskHandle) -> StepResult {
    task.checkpoint()?;
    task.progress(10, "taking exclusive repository access");
    ctx.repository.begin_exclusive().await?;

    task.progress(50, "migrating repository format");
    let migrated = ctx.repository.migrate().await;
    // Release even when the migration failed
    let released = ctx.repository.end_exclusive().await;
    let migration = migrated?;
    released?;

    if migration.is_noop() {
        tracing::info!(format = migration.to_format, "repository format already current");
    } else {
        tracing::info!(
            from = migration.from_format,
            to = migration.to_format,
            "repository migrated"
        );
    }
    Ok(TaskOutput::Migrated {
        from_format: migration.from_format,
        to_format: migration.to_format,
    })
}

/// Publish the finished notification for a maintenance job
fn report(ctx: &OpsCtx, id: TaskId, operation: &str) {
    let job_id = JobId::from(id.as_uuid());
    let Ok(state) = ctx.registry.snapshot(id) else {
        return;
    };
    let event = match state.outcome {
        Some(TaskOutcome::Succeeded(TaskOutput::Pruned { removed })) => {
            JobEvent::PruneFinished { job_id, removed }
        }
        Some(TaskOutcome::Succeeded(TaskOutput::Migrated {
            from_format,
            to_format,
        })) => JobEvent::MigrateFinished {
            job_id,
            from_format,
            to_format,
        },
        Some(TaskOutcome::Failed(failure)) => JobEvent::Failed {
            job_id,
            operation: operation.to_string(),
            error: failure.to_string(),
        },
        Some(TaskOutcome::Canceled) => JobEvent::Failed {
            job_id,
            operation: operation.to_string(),
            error: "canceled".to_string(),
        },
        Some(TaskOutcome::Succeeded(_)) | None => return,
    };
    ctx.registry.emit(AppEvent::Job(event));
}
