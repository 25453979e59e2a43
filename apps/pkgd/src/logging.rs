//! Structured logging integration for events
//!
//! Converts [`EventMessage`]s into tracing records carrying the envelope
//! fields, so a JSON log stream can be grouped by task or job through the
//! correlation id.

use pkgd_events::{AppEvent, EventMessage, GeneralEvent, InteractionEvent, JobEvent, TaskEvent};
use pkgd_types::TaskStatus;
use tracing::{debug, error, info, warn};

/// Initialize tracing/logging
///
/// JSON output mode keeps stdout clean: logs go to stderr as JSON lines,
/// and only when debugging was asked for.
pub fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let filter = |fallback: &str| {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
    };

    if json_mode {
        if debug_enabled {
            tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .with_env_filter(filter("info,pkgd=debug,pkgd_ops=debug"))
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_writer(std::io::sink)
                .with_env_filter("off")
                .init();
        }
    } else if debug_enabled {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter("info,pkgd=debug,pkgd_ops=debug"))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter("warn,pkgd=warn,pkgd_ops=warn"))
            .init();
    }
}

/// Log an event using the tracing infrastructure with structured fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    let source = meta.source.as_str();
    let domain = message.event.log_target();

    match &message.event {
        AppEvent::Task(TaskEvent::Changed {
            task_id,
            kind,
            status,
            progress,
            message,
        }) => match status {
            TaskStatus::Failed => error!(
                source,
                domain,
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                %task_id,
                %kind,
                %status,
                message = %message,
                "Task failed"
            ),
            TaskStatus::Canceled => warn!(
                source,
                domain,
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                %task_id,
                %kind,
                "Task canceled"
            ),
            _ => info!(
                source,
                domain,
                event_id = %meta.event_id,
                correlation = ?meta.correlation_id,
                %task_id,
                %kind,
                %status,
                progress,
                message = %message,
                "Task changed"
            ),
        },
        AppEvent::Task(TaskEvent::ListChanged { task_id }) => debug!(
            source,
            domain,
            event_id = %meta.event_id,
            %task_id,
            "Task list changed"
        ),

        AppEvent::Interaction(InteractionEvent::Requested { request }) => info!(
            source,
            domain,
            event_id = %meta.event_id,
            correlation = ?meta.correlation_id,
            interaction_id = %request.id,
            choices = ?request.choices,
            suspend = request.suspend,
            message = %request.message,
            "Interaction requested"
        ),
        AppEvent::Interaction(InteractionEvent::Resolved {
            interaction_id,
            task_id,
            choice,
        }) => info!(
            source,
            domain,
            event_id = %meta.event_id,
            %interaction_id,
            %task_id,
            choice = %choice,
            "Interaction resolved"
        ),
        AppEvent::Interaction(InteractionEvent::Expired {
            interaction_id,
            task_id,
        }) => warn!(
            source,
            domain,
            event_id = %meta.event_id,
            %interaction_id,
            %task_id,
            "Interaction expired"
        ),

        AppEvent::Job(JobEvent::SearchFinished {
            job_id,
            query,
            results,
        }) => info!(
            source,
            domain,
            event_id = %meta.event_id,
            %job_id,
            query = %query,
            results = results.len(),
            "Search finished"
        ),
        AppEvent::Job(JobEvent::PruneFinished { job_id, removed }) => info!(
            source,
            domain,
            event_id = %meta.event_id,
            %job_id,
            removed = removed.len(),
            "Prune finished"
        ),
        AppEvent::Job(JobEvent::MigrateFinished {
            job_id,
            from_format,
            to_format,
        }) => info!(
            source,
            domain,
            event_id = %meta.event_id,
            %job_id,
            from_format,
            to_format,
            "Migration finished"
        ),
        AppEvent::Job(JobEvent::Failed {
            job_id,
            operation,
            error,
        }) => error!(
            source,
            domain,
            event_id = %meta.event_id,
            %job_id,
            operation = %operation,
            error = %error,
            "Job failed"
        ),

        AppEvent::General(GeneralEvent::Warning { message, context }) => warn!(
            source,
            domain,
            context = ?context,
            "{message}"
        ),
        AppEvent::General(GeneralEvent::Error { message, details }) => error!(
            source,
            domain,
            details = ?details,
            "{message}"
        ),
        AppEvent::General(GeneralEvent::DebugLog { message, context }) => debug!(
            source,
            domain,
            context = ?context,
            "{message}"
        ),
        AppEvent::General(GeneralEvent::OperationStarted { operation }) => info!(
            source,
            domain,
            operation = %operation,
            "Operation started"
        ),
        AppEvent::General(GeneralEvent::OperationCompleted { operation, success }) => info!(
            source,
            domain,
            operation = %operation,
            success,
            "Operation completed"
        ),
        AppEvent::General(GeneralEvent::ConfigurationUpdated { default_repo }) => info!(
            source,
            domain,
            default_repo = %default_repo,
            "Configuration updated"
        ),
    }
}
