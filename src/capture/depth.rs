//! Single camera grabber: show every frame, save at most `target_fps` of them.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use super::output::{DEPTH_RUN_FORMAT, RunDirectory};
use super::pacing::SaveGate;
use super::preview::Preview;
use super::source::{CameraError, FrameSource};
use crate::settings::DepthSettings;

const WINDOW: &str = "video";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source reported it is no longer running
    SourceStopped,
    QuitKey,
}

#[derive(Debug, Clone)]
pub struct DepthCaptureReport {
    pub run_dir: PathBuf,
    pub frames_seen: u64,
    pub frames_saved: u64,
    pub save_failures: u64,
    pub stopped_by: StopReason,
}

pub fn run_depth_capture(
    settings: &DepthSettings,
    source: &mut dyn FrameSource,
    preview: &mut dyn Preview,
) -> Result<DepthCaptureReport> {
    settings.validate()?;

    let run_dir = RunDirectory::create(&settings.output_root, Local::now(), DEPTH_RUN_FORMAT)?;
    println!("Saving images to: {}", run_dir.path().display());

    let actual = source
        .open(settings.resolution())
        .with_context(|| format!("failed to start {}", source.describe()))?;
    tracing::info!(source = %source.describe(), %actual, rotate_180 = settings.rotate_180, "capture started");

    let mut report = DepthCaptureReport {
        run_dir: run_dir.path().to_path_buf(),
        frames_seen: 0,
        frames_saved: 0,
        save_failures: 0,
        stopped_by: StopReason::SourceStopped,
    };

    let outcome = capture_loop(settings, source, preview, &run_dir, &mut report);
    source.close();
    preview.close();
    outcome?;

    tracing::info!(
        seen = report.frames_seen,
        saved = report.frames_saved,
        failed = report.save_failures,
        stopped_by = ?report.stopped_by,
        "capture finished"
    );
    Ok(report)
}

fn capture_loop(
    settings: &DepthSettings,
    source: &mut dyn FrameSource,
    preview: &mut dyn Preview,
    run_dir: &RunDirectory,
    report: &mut DepthCaptureReport,
) -> Result<()> {
    // nothing cancels a depth read; the flag only satisfies the source API
    let never = AtomicBool::new(false);
    let mut gate = SaveGate::new(settings.target_fps);
    tracing::debug!(save_interval = ?gate.interval(), "save gate ready");

    while source.is_running() {
        let frame = match source.read(&never) {
            Ok(frame) => frame,
            Err(CameraError::Stopped(_)) => break,
            Err(err) => return Err(err).context("failed to fetch frame"),
        };
        report.frames_seen += 1;

        let frame = if settings.rotate_180 {
            frame.rotate_180()
        } else {
            frame
        };

        preview.show(WINDOW, &frame.image)?;

        if gate.try_pass(Instant::now()) {
            match run_dir.save_jpeg(&frame.image, frame.captured_at) {
                Ok(path) => {
                    report.frames_saved += 1;
                    tracing::debug!(path = %path.display(), "saved frame");
                }
                Err(err) => {
                    report.save_failures += 1;
                    tracing::error!("{err:#}");
                }
            }
        }

        if preview.poll_key(Duration::from_millis(1)) == Some(settings.quit_key) {
            report.stopped_by = StopReason::QuitKey;
            break;
        }
    }
    Ok(())
}
