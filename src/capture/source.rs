//! Frame sources.
//!
//! A [`FrameSource`] is anything that can be opened at a requested resolution
//! and then asked for frames one at a time:
//! - `synthetic`: a moving test pattern, paced in software (tests, demos)
//! - `replay:<dir>`: images from a directory, in file name order
//! - `v4l2`: a local V4L2 device (feature: v4l2)

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera {camera} could not be opened: {reason}")]
    Open { camera: String, reason: String },
    #[error("camera {camera}: frame grab failed: {reason}")]
    Read { camera: String, reason: String },
    #[error("camera {0} is not open")]
    NotOpen(String),
    #[error("camera {0} has stopped")]
    Stopped(String),
    #[error("capture cancelled")]
    Cancelled,
}

pub trait FrameSource: Send {
    /// Human readable name used in log lines.
    fn describe(&self) -> String;

    /// Open the device, asking for `requested`; returns what was granted.
    fn open(&mut self, requested: Resolution) -> Result<Resolution, CameraError>;

    /// Block until the next frame. Sources that wait in software return
    /// [`CameraError::Cancelled`] once `stop` is set.
    fn read(&mut self, stop: &AtomicBool) -> Result<Frame, CameraError>;

    /// Whether the source can still deliver frames.
    fn is_running(&self) -> bool {
        true
    }

    fn close(&mut self) {}
}

/// Which kind of source the capture tools should open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceKind {
    Synthetic,
    Replay(PathBuf),
    V4l2,
}

impl Default for SourceKind {
    fn default() -> Self {
        if cfg!(feature = "v4l2") {
            SourceKind::V4l2
        } else {
            SourceKind::Synthetic
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthetic" => Ok(SourceKind::Synthetic),
            "v4l2" => Ok(SourceKind::V4l2),
            other => match other.strip_prefix("replay:") {
                Some(dir) if !dir.is_empty() => Ok(SourceKind::Replay(PathBuf::from(dir))),
                _ => Err(format!(
                    "unknown source `{other}` (expected synthetic, v4l2 or replay:<dir>)"
                )),
            },
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Synthetic => f.write_str("synthetic"),
            SourceKind::Replay(dir) => write!(f, "replay:{}", dir.display()),
            SourceKind::V4l2 => f.write_str("v4l2"),
        }
    }
}

impl TryFrom<String> for SourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceKind> for String {
    fn from(value: SourceKind) -> Self {
        value.to_string()
    }
}

impl SourceKind {
    /// Source for the single-camera depth tool.
    pub fn open_single(&self) -> Box<dyn FrameSource> {
        match self {
            SourceKind::Synthetic => Box::new(SyntheticSource::new(SyntheticConfig::default())),
            SourceKind::Replay(dir) => Box::new(ReplaySource::new(dir)),
            SourceKind::V4l2 => device_source(0),
        }
    }

    /// Source for camera `index` of the multi-camera tool. Replay directories
    /// hold one sub-directory per camera index.
    pub fn open_camera(&self, index: u32) -> Box<dyn FrameSource> {
        match self {
            SourceKind::Synthetic => Box::new(SyntheticSource::new(SyntheticConfig {
                label: format!("synthetic-{index}"),
                seed: index as u8,
                ..SyntheticConfig::default()
            })),
            SourceKind::Replay(dir) => Box::new(ReplaySource::new(dir.join(index.to_string()))),
            SourceKind::V4l2 => device_source(index),
        }
    }
}

#[cfg(feature = "v4l2")]
fn device_source(index: u32) -> Box<dyn FrameSource> {
    Box::new(super::v4l2::V4l2Source::new(format!("/dev/video{index}")))
}

#[cfg(not(feature = "v4l2"))]
fn device_source(index: u32) -> Box<dyn FrameSource> {
    Box::new(Unsupported(format!("/dev/video{index}")))
}

/// Stands in for a device when the crate is built without driver support.
#[cfg(not(feature = "v4l2"))]
struct Unsupported(String);

#[cfg(not(feature = "v4l2"))]
impl FrameSource for Unsupported {
    fn describe(&self) -> String {
        self.0.clone()
    }

    fn open(&mut self, _requested: Resolution) -> Result<Resolution, CameraError> {
        Err(CameraError::Open {
            camera: self.0.clone(),
            reason: "built without the `v4l2` feature".to_string(),
        })
    }

    fn read(&mut self, _stop: &AtomicBool) -> Result<Frame, CameraError> {
        Err(CameraError::NotOpen(self.0.clone()))
    }
}

// ----------------------------------------------------------------------------
// Synthetic source
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub label: String,
    /// Frames per second; 0 delivers as fast as asked
    pub fps: f64,
    pub fail_open: bool,
    /// Every Nth read fails (1-based)
    pub fail_every: Option<u64>,
    /// Stop running after this many frames
    pub frame_limit: Option<u64>,
    /// Shifts the pattern so different cameras look different
    pub seed: u8,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            label: "synthetic".to_string(),
            fps: 30.0,
            fail_open: false,
            fail_every: None,
            frame_limit: None,
            seed: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    resolution: Option<Resolution>,
    reads: u64,
    delivered: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            resolution: None,
            reads: 0,
            delivered: 0,
            next_due: None,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn pace(&mut self, stop: &AtomicBool) -> Result<(), CameraError> {
        if self.config.fps <= 0.0 {
            return Ok(());
        }
        let period = Duration::from_secs_f64(1.0 / self.config.fps);
        let due = self.next_due.unwrap_or_else(Instant::now);
        loop {
            if stop.load(Ordering::Relaxed) {
                return Err(CameraError::Cancelled);
            }
            let now = Instant::now();
            if now >= due {
                break;
            }
            std::thread::sleep((due - now).min(Duration::from_millis(10)));
        }
        // after a stall, restart the cadence from now instead of bursting
        let next = due + period;
        let now = Instant::now();
        self.next_due = Some(if next < now { now } else { next });
        Ok(())
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.label.clone()
    }

    fn open(&mut self, requested: Resolution) -> Result<Resolution, CameraError> {
        if self.config.fail_open {
            return Err(CameraError::Open {
                camera: self.config.label.clone(),
                reason: "device not present".to_string(),
            });
        }
        self.resolution = Some(requested);
        self.next_due = None;
        tracing::debug!(camera = %self.config.label, %requested, "synthetic source opened");
        Ok(requested)
    }

    fn read(&mut self, stop: &AtomicBool) -> Result<Frame, CameraError> {
        let res = self
            .resolution
            .ok_or_else(|| CameraError::NotOpen(self.config.label.clone()))?;
        if !self.is_running() {
            return Err(CameraError::Stopped(self.config.label.clone()));
        }
        self.pace(stop)?;

        self.reads += 1;
        if let Some(n) = self.config.fail_every
            && n > 0
            && self.reads % n == 0
        {
            return Err(CameraError::Read {
                camera: self.config.label.clone(),
                reason: format!("simulated drop on read {}", self.reads),
            });
        }

        self.delivered += 1;
        let t = self.delivered as u32;
        let seed = self.config.seed as u32;
        let image = image::RgbImage::from_fn(res.width, res.height, |x, y| {
            image::Rgb([
                ((x + t * 4) % 256) as u8,
                ((y + t * 2) % 256) as u8,
                ((seed * 40 + x / 4 + y / 4) % 256) as u8,
            ])
        });
        Ok(Frame::new(image))
    }

    fn is_running(&self) -> bool {
        self.config
            .frame_limit
            .is_none_or(|limit| self.delivered < limit)
    }

    fn close(&mut self) {
        self.resolution = None;
    }
}

// ----------------------------------------------------------------------------
// Directory replay
// ----------------------------------------------------------------------------

pub struct ReplaySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    resolution: Option<Resolution>,
}

impl ReplaySource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            next: 0,
            resolution: None,
        }
    }

    fn open_error(&self, reason: impl Into<String>) -> CameraError {
        CameraError::Open {
            camera: self.describe(),
            reason: reason.into(),
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl FrameSource for ReplaySource {
    fn describe(&self) -> String {
        format!("replay:{}", self.dir.display())
    }

    fn open(&mut self, requested: Resolution) -> Result<Resolution, CameraError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| self.open_error(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        if files.is_empty() {
            return Err(self.open_error("no jpg/png files"));
        }
        files.sort();
        tracing::debug!(dir = %self.dir.display(), files = files.len(), "replay source opened");
        self.files = files;
        self.next = 0;
        self.resolution = Some(requested);
        Ok(requested)
    }

    fn read(&mut self, _stop: &AtomicBool) -> Result<Frame, CameraError> {
        let res = self.resolution.ok_or_else(|| CameraError::NotOpen(self.describe()))?;
        let Some(path) = self.files.get(self.next).cloned() else {
            return Err(CameraError::Stopped(self.describe()));
        };
        self.next += 1;
        let img = image::open(&path)
            .map_err(|e| CameraError::Read {
                camera: self.describe(),
                reason: format!("{}: {e}", path.display()),
            })?
            .to_rgb8();
        let img = if img.dimensions() == (res.width, res.height) {
            img
        } else {
            imageops::resize(&img, res.width, res.height, FilterType::Triangle)
        };
        Ok(Frame::new(img))
    }

    fn is_running(&self) -> bool {
        self.next < self.files.len()
    }

    fn close(&mut self) {
        self.resolution = None;
    }
}
