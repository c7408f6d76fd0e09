//! Rate helpers for the capture loops.

use std::time::{Duration, Instant};

/// Time between frames for a rate in frames per second; `None` when the
/// rate is not positive or the interval does not fit a `Duration`.
pub fn checked_frame_interval(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}

/// Like [`checked_frame_interval`], with unusable rates mapped to zero.
pub fn frame_interval(fps: f64) -> Duration {
    checked_frame_interval(fps).unwrap_or(Duration::ZERO)
}

/// Lets a frame through only when at least one interval has elapsed since
/// the last frame it let through. The first frame always passes.
#[derive(Debug, Clone)]
pub struct SaveGate {
    interval: Duration,
    last: Option<Instant>,
}

impl SaveGate {
    pub fn new(target_fps: f64) -> Self {
        Self {
            interval: frame_interval(target_fps),
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn try_pass(&mut self, now: Instant) -> bool {
        let open = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if open {
            self.last = Some(now);
        }
        open
    }
}

/// Frames-per-second estimate over windows of a little more than a second.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    count: u64,
    window_start: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Count one frame. Once more than a second has passed since the window
    /// opened, returns the rate over the window and opens a new one.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed <= Duration::from_secs(1) {
            return None;
        }
        let fps = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.window_start = now;
        Some(fps)
    }
}

/// What is left of `interval` after `elapsed`; `None` when the iteration
/// already overran it.
pub fn remaining_interval(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_first_frame_passes() {
        let mut gate = SaveGate::new(10.0);
        assert!(gate.try_pass(Instant::now()));
    }

    #[test]
    fn test_gate_caps_saves_per_second() {
        // 60 fps input for three seconds into a 10 fps gate
        let mut gate = SaveGate::new(10.0);
        let start = Instant::now();
        let mut per_second = [0u32; 3];
        for i in 0..180u64 {
            let t = start + Duration::from_micros(i * 16_667);
            if gate.try_pass(t) {
                per_second[(i / 60) as usize] += 1;
            }
        }
        for saved in per_second {
            assert!(saved <= 11, "saved {saved} in one second");
            assert!(saved >= 8);
        }
    }

    #[test]
    fn test_gate_never_faster_than_source() {
        let mut gate = SaveGate::new(100.0);
        let start = Instant::now();
        let passed = (0..20u64)
            .filter(|i| gate.try_pass(start + Duration::from_millis(i * 50)))
            .count();
        assert_eq!(passed, 20);
    }

    #[test]
    fn test_fps_counter_reports_after_a_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);
        for i in 1..=10u64 {
            assert!(fps.tick(start + Duration::from_millis(i * 100)).is_none());
        }
        let rate = fps.tick(start + Duration::from_millis(1100)).unwrap();
        assert!((rate - 10.0).abs() < 0.01);
        // window was reset
        assert!(fps.tick(start + Duration::from_millis(1200)).is_none());
    }

    #[test]
    fn test_remaining_interval() {
        let i = Duration::from_millis(100);
        assert_eq!(
            remaining_interval(i, Duration::from_millis(30)),
            Some(Duration::from_millis(70))
        );
        assert_eq!(remaining_interval(i, Duration::from_millis(100)), None);
        assert_eq!(remaining_interval(i, Duration::from_millis(130)), None);
    }

    #[test]
    fn test_interval_for_bad_rates() {
        assert_eq!(frame_interval(0.0), Duration::ZERO);
        assert_eq!(frame_interval(f64::NAN), Duration::ZERO);
        assert_eq!(frame_interval(4.0), Duration::from_millis(250));
        assert_eq!(checked_frame_interval(-1.0), None);
    }

    #[test]
    fn test_tiny_rate_does_not_overflow() {
        assert_eq!(checked_frame_interval(1e-20), None);
        assert_eq!(frame_interval(1e-20), Duration::ZERO);
        // constructing a gate from such a rate must not panic
        let mut gate = SaveGate::new(1e-20);
        assert!(gate.try_pass(Instant::now()));
        assert_eq!(checked_frame_interval(1e-3), Some(Duration::from_secs(1000)));
    }
}
