//! Server bootstrap: resolve config, wire adapters, and run the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use jukebox_core::{session_events, ChatCommands, ChatQueueStore, PlaybackCoordinator};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{self, ServerConfig};
use crate::ffmpeg_session::FfmpegSessionBackend;
use crate::state::AppState;
use crate::ytdlp::YtDlpFetcher;
use crate::{api, openapi, Args};

pub(crate) async fn run(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?,
    };
    let download_dir = args
        .download_dir
        .unwrap_or_else(|| config::download_dir_from_config(&cfg));
    std::fs::create_dir_all(&download_dir)
        .with_context(|| format!("create download dir {:?}", download_dir))?;
    let fetch_timeout = config::fetch_timeout(&cfg)?;
    let session_timeout = config::session_timeout(&cfg)?;
    let ytdlp = config::ytdlp_settings(&cfg);
    let ffmpeg = config::ffmpeg_settings(&cfg)?;

    tracing::info!(
        bind = %bind,
        download_dir = %download_dir.display(),
        ytdlp = %ytdlp.bin.display(),
        ffmpeg = %ffmpeg.bin.display(),
        output_url = %ffmpeg.output_url,
        "starting jukebox server"
    );

    let (events_tx, events_rx) = session_events();
    let backend = Arc::new(FfmpegSessionBackend::new(ffmpeg, events_tx));
    let fetcher = Arc::new(YtDlpFetcher::new(download_dir, ytdlp));
    let coordinator = Arc::new(PlaybackCoordinator::new(
        Arc::new(ChatQueueStore::new()),
        backend,
        session_timeout,
    ));
    actix_web::rt::spawn(coordinator.clone().run_events(events_rx));

    let state = web::Data::new(AppState::new(ChatCommands::new(
        fetcher,
        coordinator.clone(),
        fetch_timeout,
    )));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(bind)
    .with_context(|| format!("bind {bind}"))?
    .run()
    .await
    .context("http server")?;

    tracing::info!("http server stopped; ending active sessions");
    coordinator.shutdown().await;
    Ok(())
}

/// Explicit `--config`, else `config.toml` next to the binary, else defaults.
fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    if let Some(path) = path {
        return ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => {
            tracing::info!(path = %path.display(), "using config next to binary");
            ServerConfig::load(&path)
        }
        _ => Ok(ServerConfig::default()),
    }
}
