use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::frame::Frame;

/// State shared between the camera workers and the display loop: the latest
/// frame per camera index and the stop flag.
///
/// Frames are published as `Arc<Frame>`, fully built before the lock is
/// taken, so a snapshot can only ever see complete frames.
#[derive(Debug, Default)]
pub struct CaptureContext {
    frames: Mutex<HashMap<u32, Arc<Frame>>>,
    stop: AtomicBool,
    // pairs with `stop` so retry pauses end as soon as stop is requested
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Arc<Frame>>> {
        // a panicking worker cannot leave a half-inserted entry behind
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the latest frame for `index`.
    pub fn publish(&self, index: u32, frame: Frame) {
        let frame = Arc::new(frame);
        self.lock().insert(index, frame);
    }

    /// One frame per index, in the given order, `placeholder` where a camera
    /// has not published yet.
    pub fn snapshot(&self, indices: &[u32], placeholder: &Arc<Frame>) -> Vec<Arc<Frame>> {
        let frames = self.lock();
        indices
            .iter()
            .map(|i| frames.get(i).unwrap_or(placeholder).clone())
            .collect()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _guard = self.wake_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    /// Sleep for up to `timeout`, waking as soon as stop is requested.
    /// Returns whether stop was requested.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.wake_lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            // checked under `wake_lock`, so a notify cannot slip in between
            if self.stop_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .wake
                .wait_timeout(guard, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}
