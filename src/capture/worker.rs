//! One capture thread per camera.
//!
//! A worker opens its camera, then keeps publishing the newest frame into the
//! shared [`CaptureContext`] until stop is requested. Failed grabs are logged
//! and retried after a pause; only the stop flag ends a running worker. A
//! camera that cannot be opened ends its worker at once, which leaves that
//! camera's slot on the placeholder for the rest of the run.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::source::{CameraError, FrameSource, Resolution};
use super::store::CaptureContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Opening,
    Running,
    Stopping,
    Closed,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub index: u32,
    pub requested: Resolution,
    pub retry_delay: Duration,
}

/// What a worker did, returned when it is joined.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub index: u32,
    /// Resolution granted by the camera; `None` if it never opened
    pub actual: Option<Resolution>,
    pub frames: u64,
    pub failed_reads: u64,
    pub final_state: WorkerState,
}

impl WorkerReport {
    pub fn opened(&self) -> bool {
        self.actual.is_some()
    }
}

pub fn spawn_worker(
    config: WorkerConfig,
    source: Box<dyn FrameSource>,
    ctx: Arc<CaptureContext>,
) -> std::io::Result<JoinHandle<WorkerReport>> {
    std::thread::Builder::new()
        .name(format!("camera-{}", config.index))
        .spawn(move || run_worker(config, source, &ctx))
}

fn transition(index: u32, state: &mut WorkerState, next: WorkerState) {
    tracing::debug!(camera = index, from = ?*state, to = ?next, "worker state");
    *state = next;
}

pub fn run_worker(
    config: WorkerConfig,
    mut source: Box<dyn FrameSource>,
    ctx: &CaptureContext,
) -> WorkerReport {
    let index = config.index;
    let mut state = WorkerState::Opening;
    let mut report = WorkerReport {
        index,
        actual: None,
        frames: 0,
        failed_reads: 0,
        final_state: state,
    };

    let actual = match source.open(config.requested) {
        Ok(actual) => actual,
        Err(err) => {
            tracing::error!(camera = index, source = %source.describe(), %err, "camera could not be opened");
            transition(index, &mut state, WorkerState::Closed);
            report.final_state = state;
            return report;
        }
    };
    report.actual = Some(actual);
    tracing::info!(camera = index, source = %source.describe(), %actual, "camera started");
    transition(index, &mut state, WorkerState::Running);

    while !ctx.stop_requested() {
        match source.read(ctx.stop_flag()) {
            Ok(frame) => {
                ctx.publish(index, frame);
                report.frames += 1;
            }
            Err(CameraError::Cancelled) => break,
            Err(err) => {
                report.failed_reads += 1;
                tracing::warn!(camera = index, %err, "skipped a failed frame grab");
                ctx.wait_for_stop(config.retry_delay);
            }
        }
    }

    transition(index, &mut state, WorkerState::Stopping);
    tracing::info!(camera = index, frames = report.frames, failed = report.failed_reads, "releasing camera");
    source.close();
    transition(index, &mut state, WorkerState::Closed);
    report.final_state = state;
    report
}
