//! Capture tool settings.
//!
//! Defaults are the values the tools were tuned with; a JSON file can
//! override any subset of them and command line flags override the file.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::pacing::{checked_frame_interval, frame_interval};
use crate::capture::source::{Resolution, SourceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSettings {
    pub source: SourceKind,
    /// Camera mounted upside down
    pub rotate_180: bool,
    /// Saved frames per second
    pub target_fps: f64,
    pub width: u32,
    pub height: u32,
    pub output_root: PathBuf,
    pub quit_key: char,
}

impl Default for DepthSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            rotate_180: false,
            target_fps: 10.0,
            width: 1280,
            height: 720,
            output_root: PathBuf::from("captures"),
            quit_key: 'q',
        }
    }
}

impl DepthSettings {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn validate(&self) -> Result<()> {
        check_rate(self.target_fps)?;
        check_resolution(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiSettings {
    pub source: SourceKind,
    /// Cameras shown left to right, in this order
    pub camera_indices: Vec<u32>,
    /// Resolution requested from every camera, and of the placeholder
    pub width: u32,
    pub height: u32,
    /// Combined frames shown and saved per second
    pub target_fps: f64,
    /// Pause after a failed frame grab
    pub retry_delay_ms: u64,
    pub output_root: PathBuf,
    pub quit_key: char,
}

impl Default for MultiSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            camera_indices: vec![0, 1],
            width: 160,
            height: 122,
            target_fps: 11.0,
            retry_delay_ms: 100,
            output_root: PathBuf::from("captures"),
            quit_key: 'q',
        }
    }
}

impl MultiSettings {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn frame_interval(&self) -> Duration {
        frame_interval(self.target_fps)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        check_rate(self.target_fps)?;
        check_resolution(self.width, self.height)?;
        if self.camera_indices.is_empty() {
            tracing::warn!("no cameras configured; nothing will be shown or saved");
        }
        Ok(())
    }
}

fn check_rate(fps: f64) -> Result<()> {
    if checked_frame_interval(fps).is_none() {
        bail!("target fps must be a positive number with a representable frame interval, got {fps}");
    }
    Ok(())
}

fn check_resolution(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("resolution must be non-zero, got {width}x{height}");
    }
    Ok(())
}

/// Read settings from `path`, or the defaults when no path is given.
pub fn load<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid settings file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let depth = DepthSettings::default();
        assert!(!depth.rotate_180);
        assert_eq!(depth.target_fps, 10.0);
        assert_eq!(depth.resolution(), Resolution::new(1280, 720));

        let multi = MultiSettings::default();
        assert_eq!(multi.camera_indices, vec![0, 1]);
        assert_eq!(multi.resolution(), Resolution::new(160, 122));
        assert_eq!(multi.target_fps, 11.0);
        assert_eq!(multi.retry_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.json");
        std::fs::write(
            &path,
            r#"{"camera_indices": [2, 3, 4], "source": "replay:/data/thermal", "quit_key": "x"}"#,
        )
        .unwrap();
        let s: MultiSettings = load(Some(&path)).unwrap();
        assert_eq!(s.camera_indices, vec![2, 3, 4]);
        assert_eq!(s.source, SourceKind::Replay(PathBuf::from("/data/thermal")));
        assert_eq!(s.quit_key, 'x');
        assert_eq!(s.width, 160);
    }

    #[test]
    fn test_bad_source_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.json");
        std::fs::write(&path, r#"{"source": "webcam"}"#).unwrap();
        assert!(load::<DepthSettings>(Some(&path)).is_err());
    }

    #[test]
    fn test_validation() {
        let mut s = DepthSettings::default();
        assert!(s.validate().is_ok());
        s.target_fps = 0.0;
        assert!(s.validate().is_err());
        let mut m = MultiSettings::default();
        m.height = 0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_rate_too_small_for_an_interval_is_rejected() {
        let depth = DepthSettings {
            target_fps: 1e-20,
            ..DepthSettings::default()
        };
        assert!(depth.validate().is_err());
        let multi = MultiSettings {
            target_fps: 1e-20,
            ..MultiSettings::default()
        };
        assert!(multi.validate().is_err());
        let slow = DepthSettings {
            target_fps: 0.01,
            ..DepthSettings::default()
        };
        assert!(slow.validate().is_ok());
    }
}
