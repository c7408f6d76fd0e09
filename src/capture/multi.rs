//! Multi-camera capture: one worker thread per camera, one display/save loop.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::frame::{Frame, hconcat, placeholder};
use super::output::{MULTI_RUN_FORMAT, RunDirectory};
use super::pacing::{FpsCounter, remaining_interval};
use super::preview::Preview;
use super::source::FrameSource;
use super::store::CaptureContext;
use super::worker::{WorkerConfig, WorkerReport, spawn_worker};
use crate::settings::MultiSettings;

const WINDOW: &str = "Multi-Camera Live Feed";

#[derive(Debug, Clone)]
pub struct MultiCaptureReport {
    pub run_dir: PathBuf,
    pub iterations: u64,
    pub frames_saved: u64,
    pub save_failures: u64,
    /// One per configured camera, in configuration order
    pub workers: Vec<WorkerReport>,
}

/// Run until the quit key is pressed, then stop and join every worker.
///
/// `open_source` is called once per configured camera index, before its
/// worker starts.
pub fn run_multi_capture<F>(
    settings: &MultiSettings,
    mut open_source: F,
    preview: &mut dyn Preview,
) -> Result<MultiCaptureReport>
where
    F: FnMut(u32) -> Box<dyn FrameSource>,
{
    settings.validate()?;

    let run_dir = RunDirectory::create(&settings.output_root, Local::now(), MULTI_RUN_FORMAT)?;

    let ctx = Arc::new(CaptureContext::new());
    let mut handles: Vec<JoinHandle<WorkerReport>> = Vec::with_capacity(settings.camera_indices.len());
    for &index in &settings.camera_indices {
        let config = WorkerConfig {
            index,
            requested: settings.resolution(),
            retry_delay: settings.retry_delay(),
        };
        match spawn_worker(config, open_source(index), Arc::clone(&ctx)) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                ctx.request_stop();
                join_workers(handles);
                return Err(err).with_context(|| format!("failed to start worker for camera {index}"));
            }
        }
    }
    println!(
        "All camera threads started. Press '{}' then Enter (or Ctrl+C) to stop all.",
        settings.quit_key
    );
    println!("Saving combined frames to '{}'", run_dir.path().display());

    let mut report = MultiCaptureReport {
        run_dir: run_dir.path().to_path_buf(),
        iterations: 0,
        frames_saved: 0,
        save_failures: 0,
        workers: Vec::new(),
    };

    let outcome = display_loop(settings, &ctx, preview, &run_dir, &mut report);

    ctx.request_stop();
    report.workers = join_workers(handles);
    println!("All cameras stopped. Exiting.");
    preview.close();

    outcome?;
    Ok(report)
}

fn display_loop(
    settings: &MultiSettings,
    ctx: &CaptureContext,
    preview: &mut dyn Preview,
    run_dir: &RunDirectory,
    report: &mut MultiCaptureReport,
) -> Result<()> {
    let blank = Arc::new(placeholder(settings.width, settings.height));
    let interval = settings.frame_interval();
    let mut fps = FpsCounter::new(Instant::now());

    loop {
        let loop_start = Instant::now();
        report.iterations += 1;

        let slots = ctx.snapshot(&settings.camera_indices, &blank);
        let refs: Vec<&Frame> = slots.iter().map(Arc::as_ref).collect();
        if let Some(combined) = hconcat(&refs) {
            if let Some(rate) = fps.tick(Instant::now()) {
                tracing::info!("FPS: {:.2}", rate);
            }

            preview.show(WINDOW, &combined)?;

            match run_dir.save_jpeg(&combined, Local::now()) {
                Ok(path) => {
                    report.frames_saved += 1;
                    tracing::trace!(path = %path.display(), "saved combined frame");
                }
                Err(err) => {
                    report.save_failures += 1;
                    tracing::error!("{err:#}");
                }
            }
        }

        if let Some(wait) = remaining_interval(interval, loop_start.elapsed()) {
            std::thread::sleep(wait);
        }

        if preview.poll_key(Duration::from_millis(1)) == Some(settings.quit_key) {
            return Ok(());
        }
    }
}

fn join_workers(handles: Vec<JoinHandle<WorkerReport>>) -> Vec<WorkerReport> {
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let name = handle.thread().name().unwrap_or("camera").to_string();
        match handle.join() {
            Ok(report) => reports.push(report),
            Err(_) => tracing::error!(thread = %name, "camera worker panicked"),
        }
    }
    reports
}
