//! Monolith server: HTTP upload surface, scheduler and ffmpeg pipeline in one
//! process.

use dpgonline::adapters::local::fs::prepare_dir;
use dpgonline::adapters::local::http::{router, AppState};
use dpgonline::adapters::local::FfmpegTools;
use dpgonline::application::pipeline::EncodePipeline;
use dpgonline::application::scheduler::Scheduler;
use dpgonline::config::ServerConfig;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Leftovers from a previous run belong to jobs nobody can reach anymore
    for dir in [&config.upload_dir, &config.download_dir] {
        if let Err(e) = prepare_dir(dir).await {
            tracing::error!(dir = %dir.display(), error = %e, "failed to prepare directory");
            std::process::exit(1);
        }
    }

    let tools = FfmpegTools::new(&config.ffmpeg_bin, &config.ffprobe_bin);
    let pipeline = EncodePipeline::new(tools).with_gop_strategy(config.gop_strategy);
    let scheduler = Scheduler::new(pipeline, config.scheduler_settings());
    let sweepers = scheduler.spawn_sweepers();

    let app = router(
        AppState::new(scheduler, &config.upload_dir),
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .expect("Server failed to start");

    sweepers.stop().await;
}
