//! Headless cinematic focus player binary.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cinefocus_media::{FocusConfig, RenderLoop};
use cinefocus_player::{ImageSequenceSource, PlayerConfig, Script};

const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("cinefocus_media=info".parse()?)
        .add_directive("cinefocus_player=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting cinefocus-player");

    let config = PlayerConfig::from_env();
    info!("Player config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics listening");
    }

    let engine_config = match &config.engine_config_path {
        Some(path) => FocusConfig::from_json_file(path)
            .with_context(|| format!("failed to load engine config {}", path.display()))?,
        None => FocusConfig::from_env(),
    };

    let script = match &config.script_path {
        Some(path) => Script::from_json_file(path)
            .with_context(|| format!("failed to load script {}", path.display()))?,
        None => Script::default(),
    };
    info!(
        cycles = script.cycles.len(),
        events = script.events.len(),
        "Script loaded"
    );

    let mut source = ImageSequenceSource::open(&config.frames_dir)
        .with_context(|| format!("failed to open frames in {}", config.frames_dir.display()))?;

    if let Some(dir) = &config.snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
    }

    let mut engine = RenderLoop::new(engine_config, Arc::new(script.detector()))
        .context("failed to create render loop")?;

    // Setup signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let mut rendered = 0u64;
    let mut last_report = Instant::now();

    let total = engine
        .run(&mut source, config.fps, shutdown_rx, |engine, frame| {
            rendered += 1;

            for event in script.events_at(rendered) {
                event.apply(engine);
            }

            if config.wants_snapshot(rendered) {
                if let Some(dir) = &config.snapshot_dir {
                    let path = dir.join(format!("frame_{rendered:06}.png"));
                    if let Err(e) = frame.image.save(&path) {
                        warn!(path = %path.display(), error = %e, "Failed to write snapshot");
                    }
                }
            }

            if last_report.elapsed() >= DIAGNOSTICS_INTERVAL {
                last_report = Instant::now();
                let diagnostics = engine.diagnostics();
                info!(
                    fps = diagnostics.fps,
                    frames = diagnostics.frames_rendered,
                    state = engine.tracking_state().phase(),
                    detect_latency = ?diagnostics.last_detect_latency,
                    last_error = ?diagnostics.last_error,
                    labels = frame.labels.len(),
                    "Diagnostics"
                );
            }

            match config.max_frames {
                Some(max) if rendered >= max => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })
        .await
        .context("render loop failed")?;

    engine.stop();
    info!(frames = total, "Player shutdown complete");
    Ok(())
}
