//! dashcache - operate the admin dashboard's operation cache
//!
//! Runs dashboard cache actions against the durable store on disk, using the
//! configured query endpoint for refreshes.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use dashcache::cli::{format_status, Cli, Command, Settings};
use dashcache::clock::SystemClock;
use dashcache::client::HttpQueryClient;
use dashcache::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};
use dashcache::store::FileStore;
use dashcache::{ActionResult, CacheOrchestrator};

/// Sets up logging to stderr so stdout carries only command output
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dashcache=debug")),
        )
        .init();
}

/// Prints an action result, turning failure into an error exit
fn report(result: ActionResult) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", format_status(&result.status));
    match result.error {
        Some(error) if !result.success => Err(error.into()),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_cli(&cli)?;
    info!(store_dir = %settings.store_dir.display(), endpoint = %settings.endpoint, "starting dashcache");

    let store = Arc::new(FileStore::with_dir(settings.store_dir.clone()));
    let client = Arc::new(HttpQueryClient::new(settings.endpoint.clone()));
    let orchestrator = CacheOrchestrator::assemble(store, client, Arc::new(SystemClock))
        .with_settle_delay(settings.settle_delay);

    match cli.command {
        Command::Status { json } => {
            let status = orchestrator.get_status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{}", format_status(&status));
            }
        }
        Command::RefreshAll => report(orchestrator.refresh_all().await)?,
        Command::ClearAll => report(orchestrator.clear_all().await)?,
        Command::Refresh { operation } => report(orchestrator.refresh_operation(&operation).await?)?,
        Command::Clear { operation } => report(orchestrator.clear_operation(&operation).await?)?,
        Command::RefreshGroup { group } => report(orchestrator.refresh_group(&group).await?)?,
        Command::ClearGroup { group } => report(orchestrator.clear_group(&group).await?)?,
        Command::Schedule => {
            let info = orchestrator.scheduled_refresh_info();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::SetTtl { operation, hours } => {
            if orchestrator.catalog().operation(&operation).is_none() {
                return Err(dashcache::CacheError::UnknownOperation(operation).into());
            }
            orchestrator.config().set_operation_ttl(&operation, hours);
            println!("{} TTL set to {} hours", operation, hours);
        }
        Command::Users => {
            let users = orchestrator.users();
            let output = serde_json::json!({
                "users": users.list_users().await?,
                "stats": users.user_stats().await?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Watch { interval_secs } => {
            let config = RefreshConfig {
                poll_interval: std::time::Duration::from_secs(interval_secs.max(1)),
                ..RefreshConfig::default()
            };
            let mut handle = RefreshHandle::spawn(Arc::new(orchestrator), config);
            loop {
                tokio::select! {
                    message = handle.receiver.recv() => match message {
                        Some(RefreshMessage::StatusUpdated(status)) => print!("{}", format_status(&status)),
                        Some(RefreshMessage::ScheduledRefreshStarted) => println!("Scheduled refresh started"),
                        Some(RefreshMessage::ScheduledRefreshCompleted { success, error }) => {
                            println!("Scheduled refresh finished: success={} {}", success, error.unwrap_or_default());
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            handle.shutdown().await;
        }
    }

    Ok(())
}
