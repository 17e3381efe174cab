//! EdgeLens demo host: synthetic NV21 camera -> edge pipeline -> PNG snapshots

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use flume::{bounded, Receiver};
use tracing::{info, warn};

use edgelens::boundary::Engine;
use edgelens::capture::SyntheticCapture;
use edgelens::display::SnapshotWriter;
use edgelens::pipeline::FpsCounter;
use edgelens::{utils, DemoConfig, Frame, PixelFormat, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    utils::init_tracing("edgelens=info");

    info!("EdgeLens launching...");

    // Optional settings file as the first argument
    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(path.as_deref())?;
    let demo = settings.demo.clone();
    info!(?demo, tier = %settings.pipeline.quality_tier, "settings loaded");

    let engine = Arc::new(Engine::new(&settings)?);
    if !engine.initialize() {
        return Err(eyre!("processor initialization failed"));
    }

    let mut capture = SyntheticCapture::new(demo.width, demo.height, demo.fps)?;
    let (tx, rx) = bounded::<Frame>(demo.channel_capacity.max(1));

    let limit = demo.frames;
    let mut capture_task = tokio::spawn(async move {
        let mut sent = 0u64;
        loop {
            let frame = capture.capture_frame().await;
            if tx.send_async(frame).await.is_err() {
                warn!("worker gone, stopping capture");
                break;
            }
            sent += 1;
            if limit != 0 && sent >= limit {
                break;
            }
        }
        sent
    });

    let worker = {
        let engine = Arc::clone(&engine);
        let demo = demo.clone();
        thread::Builder::new()
            .name("edgelens-worker".into())
            .spawn(move || run_worker(&engine, rx, &demo))?
    };

    let captured = tokio::select! {
        sent = &mut capture_task => sent?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
            capture_task.abort();
            0
        }
    };

    // The sender is gone once capture ends, which drains and stops the worker.
    let processed = tokio::task::spawn_blocking(move || worker.join())
        .await?
        .map_err(|_| eyre!("worker thread panicked"))??;

    if let Some(m) = engine.metrics() {
        info!(
            captured,
            processed,
            fallbacks = m.fallbacks,
            avg_ms = m.avg_latency_ms,
            p99_ms = m.p99_latency_ms,
            "EdgeLens shutting down"
        );
    }
    Ok(())
}

/// Convert, process and optionally snapshot every frame until the channel closes.
fn run_worker(engine: &Engine, rx: Receiver<Frame>, demo: &DemoConfig) -> Result<u64> {
    if let Some(core) = demo.worker_core {
        utils::pin_current_thread(core);
    }

    let mut snapshots = match &demo.snapshot_dir {
        Some(dir) if demo.snapshot_every > 0 => Some(SnapshotWriter::new(dir, demo.snapshot_every)?),
        _ => None,
    };
    let mut fps = FpsCounter::new(30);
    let mut last_report = Instant::now();
    let mut processed = 0u64;

    for frame in rx.iter() {
        let rgb = engine.convert_planar_to_rgb(
            frame.as_slice(),
            frame.width(),
            frame.height(),
            frame.width(),
            demo.rotate,
        )?;
        let out = engine.process_frame(&rgb.bytes, rgb.width, rgb.height, demo.edge_detection)?;
        processed += 1;
        let rate = fps.tick();
        metrics::histogram!("edgelens_capture_to_output_ms")
            .record(frame.timestamp.elapsed().as_secs_f64() * 1000.0);

        if let Some(writer) = snapshots.as_mut() {
            let out = Frame::new(Bytes::from(out), rgb.width, rgb.height, PixelFormat::Rgb888)?
                .with_sequence(frame.meta.sequence);
            writer.offer(&out)?;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            if let Some(m) = engine.metrics() {
                info!(
                    fps = format_args!("{rate:.1}"),
                    last_ms = format_args!("{:.2}", m.last_latency_ms),
                    p99_ms = format_args!("{:.2}", m.p99_latency_ms),
                    fallbacks = m.fallbacks,
                    "pipeline"
                );
            }
            last_report = Instant::now();
        }
    }

    Ok(processed)
}
