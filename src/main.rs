//! Vehicle GPS emulator

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gps_emulator::{
    backend::HttpBackend,
    cli::{Cli, Command, CommandRunner},
    config::AppConfig,
    database::Database,
    errors::EmulatorError,
    manager::EmulatorManager,
    storage::LogStorageManager,
};

#[tokio::main]
async fn main() -> Result<(), EmulatorError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Explicit file first, then config/default, environment on top of either
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    config.validate()?;

    let backend = HttpBackend::new(&config.backend)?;
    if let Err(e) = backend.health().await {
        warn!("Backend {} not reachable: {}", backend.base_url(), e);
    }

    let mut storage = LogStorageManager::new(Arc::new(backend), config.retention.clone());
    if let Some(url) = &config.database.url {
        storage = storage.with_database(Database::connect(url).await?);
    }
    let storage = Arc::new(storage);

    let shutdown = CancellationToken::new();
    let sender = {
        let storage = storage.clone();
        let token = shutdown.clone();
        let retry_interval = config.backend.retry_interval;
        let initial_delay = config.backend.initial_delay;
        tokio::spawn(async move {
            storage
                .run_background_sender(retry_interval, initial_delay, token)
                .await
        })
    };

    let manager = EmulatorManager::new(
        storage.clone(),
        config.emulator.clone(),
        config.collection.clone(),
    );
    let mut runner = CommandRunner::new(manager.clone());

    let result = run(&mut runner, cli.command).await;
    if let Err(e) = &result {
        error!("{}", e);
    }

    let stopped = manager.stop_all().await;
    if stopped > 0 {
        info!("Stopped {} emulator(s)", stopped);
    }

    shutdown.cancel();
    if let Err(e) = sender.await {
        error!("Background sender failed: {}", e);
    }

    let summary = storage.summary().await;
    if summary.total > 0 {
        warn!("{} log(s) were not delivered", summary.total);
    }

    result
}

async fn run(runner: &mut CommandRunner, command: Option<Command>) -> Result<(), EmulatorError> {
    match command {
        None | Some(Command::Interactive) => runner.interactive().await,
        Some(command) => {
            let keep_running = matches!(
                command,
                Command::Start { .. } | Command::Generate { realtime: true, .. }
            );
            runner.execute(command).await?;

            if keep_running {
                info!("Running until Ctrl-C");
                signal::ctrl_c().await?;
                info!("Received shutdown signal");
            }
            Ok(())
        }
    }
}
