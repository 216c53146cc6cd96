// src/main.rs

use anyhow::Result;
use fall_watch::pipeline::{AlertEvent, EventBus, PipelineMetrics, StatusBoard, StatusPublisher};
use fall_watch::replay::{self, AlertWriter, PoseLog};
use fall_watch::{Config, FallDetector, FrameInput};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

struct StreamStats {
    frames: u64,
    rejected: u64,
    alerts_written: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = replay::config_path_from_args(std::env::args());
    let config = replay::load_config_or_default(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🛏️  Fall watch starting");
    info!(
        "Thresholds: speed={:.2}, lying_alert={:.1}s, fall_cooldown={:.1}s, motion={}",
        config.detector.fall_threshold.vertical_speed,
        config.detector.alert.lying_alert_threshold,
        config.detector.alert.cooldown_seconds,
        if config.detector.motion.enabled { "on" } else { "off" }
    );

    let logs = replay::find_recordings(&config.replay)?;
    if logs.is_empty() {
        error!("No pose logs found in {}", config.replay.input_dir);
        return Ok(());
    }

    let board = StatusBoard::new();
    let metrics = PipelineMetrics::new();
    let mut workers = Vec::with_capacity(logs.len());

    for path in logs {
        let stream = replay::stream_name(&path);
        let publisher = board.publisher(&stream);
        let metrics = metrics.clone();
        let config = config.clone();
        workers.push((
            stream,
            tokio::task::spawn_blocking(move || replay_stream(&path, &config, &publisher, &metrics)),
        ));
    }

    for (stream, handle) in workers {
        match handle.await {
            Ok(Ok(stats)) => {
                metrics.inc(&metrics.streams_completed);
                info!(
                    "✓ [{}] {} frames ({} rejected), {} alert(s) written",
                    stream, stats.frames, stats.rejected, stats.alerts_written
                );
            }
            Ok(Err(e)) => {
                metrics.inc(&metrics.streams_failed);
                error!("[{}] replay failed: {:#}", stream, e);
            }
            Err(e) => {
                metrics.inc(&metrics.streams_failed);
                error!("[{}] worker panicked: {}", stream, e);
            }
        }
    }

    for status in board.all() {
        info!(
            "  [{}] final posture={} at t={:.2}s, last fall={:?}, last lying alert={:?}",
            status.stream,
            status.posture.as_str(),
            status.timestamp,
            status.last_fall_at,
            status.last_lying_alert_at
        );
    }

    let summary = metrics.summary();
    info!(
        "📊 {} streams, {} frames at {:.1} FPS, {} falls ({} motion, {} disappearance), {} lying alerts",
        summary.streams_completed + summary.streams_failed,
        summary.total_frames,
        summary.fps,
        summary.fall_events,
        summary.motion_falls,
        summary.disappearance_falls,
        summary.lying_events
    );
    if summary.rejected_frames > 0 || summary.streams_failed > 0 {
        warn!(
            "⚠️  {} frame(s) rejected, {} stream(s) failed",
            summary.rejected_frames, summary.streams_failed
        );
    }

    Ok(())
}

fn replay_stream(
    path: &Path,
    config: &Config,
    publisher: &StatusPublisher,
    metrics: &PipelineMetrics,
) -> Result<StreamStats> {
    let stream = publisher.stream().to_string();
    let mut detector = FallDetector::new(config.detector.clone())?;
    let mut bus = EventBus::new(config.replay.max_pending_events);
    let mut writer = AlertWriter::create(&PathBuf::from(&config.replay.output_dir), &stream)?;
    let mut log = PoseLog::open(path)?;
    info!("▶ [{}] replaying {}", stream, log.path().display());

    let mut stats = StreamStats {
        frames: 0,
        rejected: 0,
        alerts_written: 0,
    };

    let reject = |stats: &mut StreamStats, reason: String| {
        warn!("[{}] skipping frame: {}", stream, reason);
        metrics.inc(&metrics.rejected_frames);
        stats.rejected += 1;
    };

    // load_frame needs the log between records, so no for loop here
    while let Some(record) = log.next() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                reject(&mut stats, format!("{e:#}"));
                continue;
            }
        };
        let pose = match record.pose() {
            Ok(p) => p,
            Err(e) => {
                reject(&mut stats, format!("t={:.3}: {}", record.timestamp, e));
                continue;
            }
        };
        let frame = if config.replay.load_frames {
            match log.load_frame(&record) {
                Ok(f) => f,
                Err(e) => {
                    reject(&mut stats, format!("{e:#}"));
                    continue;
                }
            }
        } else {
            None
        };

        let input = match &frame {
            Some(f) => FrameInput::from_frame(f, pose.as_ref()),
            None => FrameInput::pose_only(record.timestamp, record.width, record.height, pose.as_ref()),
        };

        let started = Instant::now();
        let outcome = match detector.process_frame(input) {
            Ok(o) => o,
            Err(e) => {
                reject(&mut stats, format!("t={:.3}: {}", record.timestamp, e));
                continue;
            }
        };
        metrics.set_timing(&metrics.frame_time_us, started.elapsed().as_micros() as u64);
        metrics.record(&outcome, pose.is_some());
        publisher.publish(&outcome);
        stats.frames += 1;

        if let Some(event) = outcome.fall_event {
            bus.publish(AlertEvent::Fall {
                stream: stream.clone(),
                event,
            });
        }
        if let Some(event) = outcome.lying_event {
            bus.publish(AlertEvent::Lying {
                stream: stream.clone(),
                event,
            });
        }
        for alert in bus.drain() {
            match &alert {
                AlertEvent::Fall { event, .. } => info!(
                    "🚨 [{}] fall at t={:.2}s source={} confidence={:.2}",
                    stream,
                    event.timestamp,
                    event.source.as_str(),
                    event.confidence
                ),
                AlertEvent::Lying { event, .. } => info!(
                    "⚠️ [{}] lying for {:.1}s at t={:.2}s",
                    stream, event.duration, event.timestamp
                ),
            }
            writer.write(&alert)?;
        }
    }

    stats.alerts_written = writer.finish()?;
    Ok(stats)
}
