// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncBufRead;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zone_occupancy::input::{self, FrameReader, StreamClock};
use zone_occupancy::pipeline::{OccupancyEngine, PipelineMetrics};
use zone_occupancy::store::{
    JsonlStore, OccupancyStore, RestStore, SinkDispatcher, ZoneDescriptor, ZoneId,
};
use zone_occupancy::types::{Config, StoreBackend};

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-crossing occupancy counter for a single zone")]
struct Args {
    /// Path to the YAML config
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Detection input (JSON lines), "-" for stdin
    #[arg(short, long, default_value = "-")]
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, overrides) = Config::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    for var in overrides {
        info!("Config value overridden from ${}", var);
    }

    info!(
        "Zone occupancy starting: zone='{}' line_y={} capacity={}",
        config.zone.name, config.line.y, config.zone.max_capacity
    );

    let store: Arc<dyn OccupancyStore> = match config.store.backend {
        StoreBackend::Rest => {
            Arc::new(RestStore::connect(&config.store, config.store_api_key()).await?)
        }
        StoreBackend::Jsonl => Arc::new(JsonlStore::open(&config.store.jsonl_path)?),
    };
    info!(
        "Store: {} (extended metrics: {})",
        store.name(),
        store.capabilities().extended_metrics
    );

    let zone_id = store
        .register_zone(&ZoneDescriptor::from_config(&config))
        .await
        .context("Zone registration failed")?;
    info!("Registered zone '{}' as {}", config.zone.name, zone_id);

    if args.input == "-" {
        info!("Reading detections from stdin");
        run(&config, store, zone_id, input::stdin_frames()).await
    } else {
        info!("Reading detections from {}", args.input);
        let frames = input::file_frames(&args.input).await?;
        run(&config, store, zone_id, frames).await
    }
}

async fn run<R: AsyncBufRead + Unpin>(
    config: &Config,
    store: Arc<dyn OccupancyStore>,
    zone_id: ZoneId,
    mut frames: FrameReader<R>,
) -> Result<()> {
    let metrics = PipelineMetrics::new();
    let mut dispatcher = SinkDispatcher::spawn(
        store.clone(),
        config.sync.queue_capacity,
        zone_id.clone(),
        config.zone.label.clone(),
        config.store.log_crossings,
        metrics.clone(),
    );

    let mut clock = StreamClock::new(config.input.clock);
    let mut engine = OccupancyEngine::new(config, clock.now(), metrics.clone());

    let mut housekeeping =
        tokio::time::interval(Duration::from_millis(config.input.housekeeping_interval_ms));
    housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            frame = frames.next_frame() => {
                match frame {
                    Ok(Some(frame)) => {
                        let now = clock.on_frame(frame.timestamp);
                        let (detections, skipped) = frame.validated();
                        metrics.add(&metrics.malformed_detections, skipped as u64);
                        engine.process_frame(&detections, now);
                    }
                    Ok(None) => {
                        info!("End of detection input");
                        break;
                    }
                    Err(e) => {
                        error!("Detection input failed: {:#}", e);
                        break;
                    }
                }
            }
            _ = housekeeping.tick() => {
                engine.housekeeping(clock.now());
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        for event in engine.drain_events() {
            dispatcher.route(event);
        }
    }

    engine.flush(clock.now());
    for event in engine.drain_events() {
        dispatcher.route(event);
    }
    dispatcher.shutdown().await;

    if let Err(e) = store.deactivate_zone(&zone_id).await {
        error!("Failed to mark zone {} inactive: {:#}", zone_id, e);
    }

    let counters = engine.counters();
    info!(
        "Final counts: in={} out={} inside={} peak={}",
        counters.entries,
        counters.exits,
        counters.occupancy(),
        counters.peak_occupancy
    );
    match serde_json::to_string_pretty(&metrics.summary()) {
        Ok(json) => info!("Metrics summary:\n{}", json),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }

    Ok(())
}
