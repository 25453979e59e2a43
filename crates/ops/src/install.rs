//! Dependency-aware install workflow
//!
//! An install resolves its package, installs every missing dependency
//! first (each as its own task, run inline on the installing worker),
//! asks before replacing an equal or newer installation, then fetches and
//! commits the module content. Dependencies are independent atomic
//! units: a later failure never rolls back a dependency already
//! committed.

use crate::context::{Access, OpsCtx};
use crate::task::{StepError, StepResult, TaskHandle};
use futures::future::BoxFuture;
use futures::FutureExt;
use pkgd_errors::{Error, ErrorKind, InstallError, PackageError};
use pkgd_repository::InstalledPackage;
use pkgd_types::{
    InteractionRequest, Module, ModuleRef, PackageInfo, TaskFailure, TaskId, TaskKind,
    TaskOutcome, TaskOutput, TaskState, TaskStatus, TaskTarget,
};
use std::collections::HashSet;
use std::sync::Arc;

const SKIP: &str = "skip";
const REINSTALL: &str = "reinstall";

pub(crate) fn target_of(module_ref: &ModuleRef) -> TaskTarget {
    TaskTarget::package(module_ref.reference.clone(), module_ref.module.clone())
}

/// Queue a caller-requested install task
pub(crate) fn submit(ctx: &Arc<OpsCtx>, id: TaskId, target: ModuleRef) {
    let runner = Arc::clone(ctx);
    ctx.queues.transaction.submit(async move {
        let cleanup = Arc::clone(&runner);
        runner
            .run_queued(id, Access::Shared, move |ctx, task| execute(ctx, task, target))
            .await;
        // Cancelled before it ran: drop whatever archive was staged for it
        cleanup.staged.remove(&id);
    });
}

/// Install `target` on behalf of `task`
///
/// Tasks without a parent were requested by a caller and ask before
/// reinstalling; dependency tasks skip silently when already satisfied.
pub(crate) fn execute(
    ctx: Arc<OpsCtx>,
    task: TaskHandle,
    target: ModuleRef,
) -> BoxFuture<'static, StepResult> {
    async move {
        let archive = ctx.take_staged(task.id());
        let requested = ctx.registry.snapshot(task.id())?.parent.is_none();

        task.progress(5, format!("resolving {}", target.reference));
        let info = match &archive {
            Some(archive) => archive.info.clone(),
            None => ctx.repository.resolve(&target.reference).await?,
        };

        install_dependencies(&ctx, &task, &info, &target.module).await?;

        task.checkpoint()?;
        if let Some(existing) = satisfying_installation(&ctx, &target).await? {
            if !requested {
                tracing::debug!(task_id = %task.id(), %target, "dependency already satisfied");
                return Ok(skipped(target));
            }
            let request = InteractionRequest::new(
                task.id(),
                format!(
                    "{} is already installed; reinstall {}?",
                    existing.info.reference, target.reference
                ),
                &[SKIP, REINSTALL],
            );
            let reply = ctx.broker.raise(&task, request).await?;
            if reply.is(SKIP) {
                return Ok(skipped(target));
            }
        }

        task.checkpoint()?;
        task.progress(60, format!("fetching {target}"));
        let content = match &archive {
            Some(archive) => archive
                .modules
                .get(&target.module)
                .cloned()
                .ok_or_else(|| PackageError::MissingModule {
                    module: target.module.to_string(),
                })?,
            None => ctx.repository.fetch(&target).await?,
        };

        task.checkpoint()?;
        task.progress(80, format!("committing {target}"));
        ctx.repository.commit(&info, &target.module, content).await?;

        Ok(TaskOutput::Installed {
            reference: target.reference,
            module: target.module,
        })
    }
    .boxed()
}

fn skipped(target: ModuleRef) -> TaskOutput {
    TaskOutput::Skipped {
        reference: target.reference,
        module: target.module,
    }
}

async fn satisfying_installation(
    ctx: &OpsCtx,
    target: &ModuleRef,
) -> Result<Option<InstalledPackage>, Error> {
    Ok(ctx
        .repository
        .installed()
        .await?
        .into_iter()
        .find(|entry| target.is_satisfied_by(&entry.module_ref())))
}

/// Install whatever `info` needs that is not installed yet
pub(crate) async fn install_dependencies(
    ctx: &Arc<OpsCtx>,
    task: &TaskHandle,
    info: &PackageInfo,
    module: &Module,
) -> Result<(), StepError> {
    let missing = {
        let _retention = ctx.retention.lock().await;
        let plan = plan(ctx, info, module).await?;
        ctx.registry.pin(
            task.id(),
            plan.satisfied.into_iter().chain(plan.missing.iter().cloned()),
        );
        plan.missing
    };
    let total = missing.len();
    for (done, dependency) in missing.into_iter().enumerate() {
        task.checkpoint()?;
        let percent = u8::try_from(10 + 40 * done / total).unwrap_or(50);
        task.progress(percent, format!("installing dependency {dependency}"));
        ensure_dependency(ctx, task, dependency).await?;
    }
    Ok(())
}

/// What installing a package's dependencies involves
struct Plan {
    /// Dependencies to install, dependencies before their dependents
    missing: Vec<ModuleRef>,
    /// Installed packages that already satisfy a requirement
    satisfied: Vec<ModuleRef>,
}

/// Plan the dependencies of `info`
///
/// Walks the graph depth-first without recursion. The stack doubles as the
/// set of requirements currently being resolved, so meeting one of them
/// again is a cycle. Satisfied requirements are not descended into.
async fn plan(ctx: &OpsCtx, info: &PackageInfo, module: &Module) -> Result<Plan, Error> {
    let installed: Vec<ModuleRef> = ctx
        .repository
        .installed()
        .await?
        .iter()
        .map(InstalledPackage::module_ref)
        .collect();
    let mut satisfied = Vec::new();

    let root = ModuleRef::new(info.reference.clone(), module.clone());
    let mut stack = vec![(root, info.dependencies.clone().into_iter())];
    let mut planned = HashSet::new();
    let mut order = Vec::new();

    loop {
        let Some((_, pending)) = stack.last_mut() else {
            break;
        };
        let Some(dependency) = pending.next() else {
            if let Some((finished, _)) = stack.pop() {
                if !stack.is_empty() && planned.insert(finished.clone()) {
                    order.push(finished);
                }
            }
            continue;
        };

        if planned.contains(&dependency) {
            continue;
        }
        if let Some(entry) = installed.iter().find(|entry| dependency.is_satisfied_by(entry)) {
            satisfied.push(entry.clone());
            continue;
        }
        if let Some(start) = stack.iter().position(|(node, _)| *node == dependency) {
            let chain = stack[start..]
                .iter()
                .map(|(node, _)| node.reference.name.as_str())
                .chain([dependency.reference.name.as_str()])
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(InstallError::DependencyCycle { chain }.into());
        }

        // Unresolvable dependencies are still planned; their own task fails
        let requires = match ctx.repository.resolve(&dependency.reference).await {
            Ok(resolved) => resolved.dependencies,
            Err(e) => {
                tracing::debug!(%dependency, error = %e, "dependency did not resolve");
                Vec::new()
            }
        };
        stack.push((dependency, requires.into_iter()));
    }

    Ok(Plan {
        missing: order,
        satisfied,
    })
}

/// Drive the install task for one dependency to a terminal state
///
/// A task nobody has started yet is run inline on this worker, so a
/// dependency queued behind its dependent on a serial queue cannot
/// deadlock it. A queued task of another kind holding the dependency
/// cannot be run inline either, so the install fails instead of waiting
/// for a worker it may itself be occupying.
async fn ensure_dependency(
    ctx: &Arc<OpsCtx>,
    parent: &TaskHandle,
    dependency: ModuleRef,
) -> Result<(), StepError> {
    let id = loop {
        match ctx
            .registry
            .claim(TaskKind::Install, target_of(&dependency), Some(parent.id()))
        {
            Ok(claim) => break claim.id(),
            Err(e) if e.kind() == ErrorKind::AlreadyInProgress => {
                let Some(holder) = ctx.registry.active_task(&dependency) else {
                    continue;
                };
                if ctx.registry.snapshot(holder)?.status == TaskStatus::Queued {
                    let failure = TaskFailure::from_error(&e).with_origin(holder);
                    return Err(StepError::caused_by(
                        InstallError::DependencyFailed {
                            dependency: dependency.to_string(),
                            message: failure.message.clone(),
                        },
                        failure,
                    ));
                }
                // Already running; let it finish
                wait_for(ctx, parent, holder).await?;
            }
            Err(e) => return Err(e.into()),
        }
    };

    if let Some(task) = ctx.registry.start(id) {
        let result = execute(Arc::clone(ctx), task.clone(), dependency.clone()).await;
        task.finish(result);
    }

    let state = wait_for(ctx, parent, id).await?;
    let failure = match state.outcome {
        Some(TaskOutcome::Succeeded(_)) => return Ok(()),
        Some(TaskOutcome::Failed(failure)) => failure,
        _ => TaskFailure::from_error(&Error::Cancelled),
    };
    Err(StepError::caused_by(
        InstallError::DependencyFailed {
            dependency: dependency.to_string(),
            message: failure.message.clone(),
        },
        failure.with_origin(id),
    ))
}

async fn wait_for(ctx: &OpsCtx, parent: &TaskHandle, id: TaskId) -> Result<TaskState, Error> {
    tokio::select! {
        biased;
        state = ctx.registry.wait(id) => state,
        () = parent.cancelled() => Err(Error::Cancelled),
    }
}
