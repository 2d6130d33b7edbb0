//! sortbin server - waste classification over HTTP.
//!
//! Reads `runtime.toml` (or `--config`) and serves `GET /` and `POST /predict`.

use std::path::PathBuf;

use clap::Parser;
use sortbin::{start_server, Overrides};

#[derive(Parser, Debug)]
#[command(name = "sortbin-server")]
#[command(version)]
#[command(about = "Classify waste photos and return disposal advice")]
struct Cli {
    /// Path to the runtime config
    #[arg(short, long, env = "SORTBIN_CONFIG", default_value = "runtime.toml")]
    config: PathBuf,

    /// Host to bind to (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    start_server(&cli.config, Overrides { host: cli.host, port: cli.port }).await
}
