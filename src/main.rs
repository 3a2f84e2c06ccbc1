mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, RemoteArgs};
use docmirror::api::{self, AppState};
use docmirror::config::Config;
use docmirror::driver::{Driver, DriverBackend, RemoteBackend};
use docmirror::observability;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();
    let config = Config::load()?;
    observability::init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Serve(args) => api::run(config, args.address, args.drive).await?,
        Commands::Drive(args) => {
            let backend = backend_for(&config, &args.remote)?;
            let actor = args.actor.unwrap_or_else(|| config.driver.actor.clone());
            let driver = Driver::new(backend, config.driver.clone()).with_actor(actor);

            let report = driver.run(api::shutdown_signal()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stop(args) => {
            let control = backend_for(&config, &args)?.stop().await?;
            println!("{}", serde_json::to_string_pretty(&control)?);
        }
        Commands::Status(args) => {
            let stats = backend_for(&config, &args)?.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Remote backend when a server URL is known, else the local data directory
fn backend_for(config: &Config, args: &RemoteArgs) -> Result<Arc<dyn DriverBackend>, AnyError> {
    let server = args.server.clone().or_else(|| config.driver.server_url.clone());

    match server {
        Some(url) => {
            let token = args
                .token
                .clone()
                .or_else(|| config.driver.token.clone())
                .ok_or("an admin token is required to talk to a server (--token or DOCMIRROR_TOKEN)")?;
            // Batch invocations may legitimately run for the worker's full budget
            let timeout = config.worker.batch_deadline() + std::time::Duration::from_secs(30);
            Ok(Arc::new(RemoteBackend::new(&url, &token, timeout)?))
        }
        None => {
            let state = AppState::open(config.clone())?;
            Ok(Arc::new(state.local_backend()))
        }
    }
}
