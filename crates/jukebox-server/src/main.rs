mod api;
mod config;
mod ffmpeg_session;
mod openapi;
mod startup;
mod state;
mod ytdlp;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jukebox-server")]
pub(crate) struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Optional server config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for downloaded audio files
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,jukebox_server=info,jukebox_core=info")
        }))
        .init();

    startup::run(args).await
}
