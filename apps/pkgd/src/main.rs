//! pkgd - local package transaction service
//!
//! Seeds an in-process repository from a package catalogue, runs one
//! command through the transaction coordinator and renders the result.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, ConfigCommands, GlobalArgs};
use crate::display::{OperationResult, OutputRenderer};
use crate::error::CliError;
use crate::events::EventHandler;
use crate::logging::init_tracing;
use clap::Parser;
use pkgd_config::{Config, RemoteRepo};
use pkgd_events::EventReceiver;
use pkgd_ops::TransactionCoordinator;
use pkgd_repository::{Catalogue, MemoryRepository, Repository, SearchQuery};
use pkgd_types::{Module, PackageReference, TaskId, TaskState};
use std::collections::HashSet;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting pkgd v{}", env!("CARGO_PKG_VERSION"));

    // File (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);

    let repository = build_repository(&config, cli.global.catalogue.as_deref()).await?;

    let (event_sender, event_receiver) = pkgd_events::channel();
    let coordinator = TransactionCoordinator::builder()
        .with_repository(repository)
        .with_event_sender(event_sender)
        .with_config(config)
        .build()?;

    let renderer = OutputRenderer::new(cli.global.json, cli.global.color);
    let mut event_handler = EventHandler::new(
        renderer.colors_enabled(),
        !cli.global.json,
        cli.global.answer.clone(),
    );

    let result = execute_command_with_events(
        cli.global.preinstall,
        cli.command,
        &coordinator,
        event_receiver,
        &mut event_handler,
    )
    .await?;

    renderer.render_result(&result)?;

    match result.failed_tasks() {
        0 => {
            info!("Command completed successfully");
            Ok(())
        }
        failed => Err(CliError::TasksFailed(failed)),
    }
}

/// Execute command with concurrent event handling
///
/// Interaction requests are answered from here, so a task waiting for a
/// confirmation never blocks the command it belongs to.
async fn execute_command_with_events(
    preinstall: Vec<PackageReference>,
    command: Commands,
    coordinator: &TransactionCoordinator,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<OperationResult, CliError> {
    let mut command_future = Box::pin(execute_command(preinstall, command, coordinator));
    let mut events_open = true;

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(message) = event_receiver.try_recv() {
                    event_handler.handle_event(&message);
                }
                return result;
            }

            message = event_receiver.recv(), if events_open => {
                let Some(message) = message else {
                    events_open = false;
                    continue;
                };
                if let Some((interaction_id, choice)) = event_handler.handle_event(&message) {
                    if let Err(e) = coordinator.reply_interaction(interaction_id, choice) {
                        // The task may have been cancelled in the meantime
                        warn!(%interaction_id, error = %e, "could not answer interaction");
                    }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    preinstall: Vec<PackageReference>,
    command: Commands,
    coordinator: &TransactionCoordinator,
) -> Result<OperationResult, CliError> {
    if !preinstall.is_empty() {
        let ids = preinstall
            .into_iter()
            .map(|reference| coordinator.install(reference, Module::BINARY))
            .collect::<Result<Vec<_>, _>>()?;
        let failed = OperationResult::Tasks(wait_all(coordinator, &ids).await?).failed_tasks();
        if failed > 0 {
            return Err(CliError::TasksFailed(failed));
        }
    }

    match command {
        Commands::Install { packages, module } => {
            let module = Module::new(module);
            let ids = packages
                .into_iter()
                .map(|reference| coordinator.install(reference, module.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(OperationResult::Tasks(wait_all(coordinator, &ids).await?))
        }

        Commands::InstallArchive { path, format } => {
            let bytes = tokio::fs::read(&path).await?;
            let id = coordinator.install_from_archive(format, &bytes)?;
            Ok(OperationResult::Tasks(wait_all(coordinator, &[id]).await?))
        }

        Commands::Update { from, to, module } => {
            let id = coordinator.update(from, to, Module::new(module))?;
            Ok(OperationResult::Tasks(wait_all(coordinator, &[id]).await?))
        }

        Commands::Uninstall { packages, module } => {
            let module = Module::new(module);
            let ids = packages
                .into_iter()
                .map(|reference| coordinator.uninstall(reference, module.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(OperationResult::Tasks(wait_all(coordinator, &ids).await?))
        }

        Commands::Prune => Ok(OperationResult::Pruned(coordinator.prune_now().await?)),

        Commands::Migrate => {
            let id = coordinator.migrate()?;
            Ok(OperationResult::Tasks(wait_all(coordinator, &[id]).await?))
        }

        Commands::Search {
            query,
            channel,
            arch,
        } => {
            let query = SearchQuery {
                text: query,
                channel,
                arch,
            };
            Ok(OperationResult::SearchResults(
                coordinator.search_now(&query).await?,
            ))
        }

        Commands::List => Ok(OperationResult::Installed(coordinator.installed().await?)),

        Commands::Tasks => Ok(OperationResult::Tasks(coordinator.tasks())),

        Commands::Config(config_cmd) => {
            let mut config = coordinator.configuration().await?;
            match config_cmd {
                ConfigCommands::Show => return Ok(OperationResult::Configuration(config)),
                ConfigCommands::AddRepo {
                    name,
                    url,
                    priority,
                } => {
                    config.repos.insert(name, RemoteRepo { url, priority });
                }
                ConfigCommands::SetDefault { name } => config.default_repo = name,
            }
            coordinator.set_configuration(config.clone()).await?;
            Ok(OperationResult::Configuration(config))
        }
    }
}

/// Wait for `ids` and return them with every dependency task they spawned
async fn wait_all(
    coordinator: &TransactionCoordinator,
    ids: &[TaskId],
) -> Result<Vec<TaskState>, CliError> {
    futures::future::try_join_all(ids.iter().map(|id| coordinator.wait(*id))).await?;

    // Tasks are listed in creation order, so parents precede their children
    let mut related: HashSet<TaskId> = ids.iter().copied().collect();
    let tasks = coordinator
        .tasks()
        .into_iter()
        .filter(|task| {
            let include = related.contains(&task.id)
                || task.parent.is_some_and(|parent| related.contains(&parent));
            if include {
                related.insert(task.id);
            }
            include
        })
        .collect();
    Ok(tasks)
}

/// Seed the in-process repository from the catalogue, if one was given
async fn build_repository(
    config: &Config,
    catalogue: Option<&Path>,
) -> Result<Arc<dyn Repository>, CliError> {
    let catalogue = match catalogue {
        Some(path) => Catalogue::load(path).await?,
        None => Catalogue::default(),
    };
    let repository = MemoryRepository::from_catalogue(config.repository.clone(), catalogue).await?;
    Ok(Arc::new(repository))
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs) {
    if let Some(jobs) = global.jobs {
        config.queues.transaction = jobs;
    }
}
