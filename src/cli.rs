use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "docmirror")]
#[command(about = "Mirror externally hosted document files into object storage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API (optionally with an embedded driver loop)
    Serve(ServeArgs),
    /// Run the driver loop until the run is stopped or Ctrl+C
    Drive(DriveArgs),
    /// Switch the run control record off
    Stop(RemoteArgs),
    /// Print queue counts and the run control record
    Status(RemoteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Also drive the queue from this process
    #[arg(long)]
    pub drive: bool,
}

#[derive(clap::Args, Debug)]
pub struct DriveArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Name recorded as the run's starter
    #[arg(long)]
    pub actor: Option<String>,
}

/// Without a server URL the local data directory is used directly
#[derive(clap::Args, Debug)]
pub struct RemoteArgs {
    /// Base URL of a running docmirror server (defaults to driver.server_url)
    #[arg(long)]
    pub server: Option<String>,

    /// Admin bearer token (defaults to driver.token)
    #[arg(long)]
    pub token: Option<String>,
}
