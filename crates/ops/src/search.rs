//! Read-only catalogue search

use crate::context::OpsCtx;
use pkgd_errors::Error;
use pkgd_events::{AppEvent, EventEmitter, JobEvent};
use pkgd_repository::SearchQuery;
use pkgd_types::{JobId, PackageInfo};
use std::sync::Arc;

/// Queue a search whose results arrive as a `SearchFinished` event
pub(crate) fn submit(ctx: &Arc<OpsCtx>, job_id: JobId, query: SearchQuery) {
    let ctx_job = Arc::clone(ctx);
    ctx.queues.search.submit(async move {
        let event = match run(&ctx_job, &query).await {
            Ok(results) => {
                tracing::debug!(%job_id, %query, results = results.len(), "search finished");
                JobEvent::SearchFinished {
                    job_id,
                    query: query.text,
                    results,
                }
            }
            Err(e) => {
                tracing::warn!(%job_id, %query, error = %e, "search failed");
                JobEvent::Failed {
                    job_id,
                    operation: "search".to_string(),
                    error: e.to_string(),
                }
            }
        };
        ctx_job.registry.emit(AppEvent::Job(event));
    });
}

pub(crate) async fn run(ctx: &OpsCtx, query: &SearchQuery) -> Result<Vec<PackageInfo>, Error> {
    let _shared = ctx.gate.shared().await;
    ctx.repository.search(query).await
}
