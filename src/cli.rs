use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "privacy-proxy")]
#[command(about = "Third party privacy proxy", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides PRIVACY_PROXY_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and the retrieval schedulers
    Serve(ServeArgs),
    /// Run one retrieval for a provider and exit
    Retrieve(RetrieveArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct RetrieveArgs {
    /// Provider name as configured under [providers.<name>]
    #[arg(long)]
    pub provider: String,
}
