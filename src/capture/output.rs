use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Run directory name for the depth tool (one per second).
pub const DEPTH_RUN_FORMAT: &str = "%Y%m%d_%H%M%S";
/// Run directory name for the multi-camera tool.
pub const MULTI_RUN_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
/// Image file stem.
pub const FILE_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

const JPEG_QUALITY: u8 = 95;

/// Directory receiving the images of one capture run.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create `<root>/<started formatted with format>`; an existing directory
    /// is reused.
    pub fn create(root: &Path, started: DateTime<Local>, format: &str) -> Result<Self> {
        let path = root.join(started.format(format).to_string());
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create run directory: {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File path for an image captured at `ts`, suffixed `_1`, `_2`, ... when
    /// that microsecond is already taken.
    pub fn image_path(&self, ts: DateTime<Local>) -> PathBuf {
        let stem = ts.format(FILE_FORMAT).to_string();
        let mut candidate = self.path.join(format!("{stem}.jpg"));
        let mut n = 0;
        while candidate.exists() {
            n += 1;
            candidate = self.path.join(format!("{stem}_{n}.jpg"));
        }
        candidate
    }

    /// Encode `image` as JPEG under a unique name derived from `ts`.
    pub fn save_jpeg(&self, image: &RgbImage, ts: DateTime<Local>) -> Result<PathBuf> {
        let path = self.image_path(ts);
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
            .encode_image(image)
            .with_context(|| format!("failed to encode {}", path.display()))?;
        out.flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
