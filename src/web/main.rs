use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use leafcheck::config::{BackendMode, Config};
use leafcheck::pipeline::AnalysisClient;
use leafcheck::server;

#[derive(Parser, Debug)]
#[command(
    name = "leafcheck-web",
    version,
    about = "Leaf disease identifier — web upload form"
)]
struct Cli {
    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.bind)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Analysis backend to use (overrides backend.mode)
    #[arg(long, value_name = "proxy|direct")]
    mode: Option<BackendMode>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(mode) = cli.mode {
        config.backend.mode = mode;
    }

    let client = Arc::new(AnalysisClient::from_config(&config)?);
    server::serve(&config, client).await
}
