//! V4L2 camera source (feature: v4l2).
//!
//! Streams frames from `/dev/videoN` through memory-mapped buffers. The
//! driver is asked for packed RGB (`RGB3`); devices that only offer MJPEG
//! are decoded with the `image` crate. Reads block inside the driver and
//! cannot observe the stop flag once started.

use ouroboros::self_referencing;
use std::sync::atomic::{AtomicBool, Ordering};

use super::frame::Frame;
use super::source::{CameraError, FrameSource, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Rgb3,
    Mjpeg,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    path: String,
    state: Option<DeviceState>,
    encoding: Encoding,
    active: Resolution,
}

impl V4l2Source {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: None,
            encoding: Encoding::Rgb3,
            active: Resolution::new(0, 0),
        }
    }

    fn open_error(&self, reason: impl std::fmt::Display) -> CameraError {
        CameraError::Open {
            camera: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn read_error(&self, reason: impl std::fmt::Display) -> CameraError {
        CameraError::Read {
            camera: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn open(&mut self, requested: Resolution) -> Result<Resolution, CameraError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.path).map_err(|e| self.open_error(e))?;
        let mut format = device.format().map_err(|e| self.open_error(e))?;
        format.width = requested.width;
        format.height = requested.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                tracing::warn!(device = %self.path, %err, "failed to set format; keeping the device default");
                device.format().map_err(|e| self.open_error(e))?
            }
        };

        self.encoding = match &format.fourcc.repr {
            b"RGB3" => Encoding::Rgb3,
            b"MJPG" => Encoding::Mjpeg,
            other => {
                return Err(self.open_error(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        self.active = Resolution::new(format.width, format.height);

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| self.open_error(e))?;
        self.state = Some(state);

        tracing::debug!(device = %self.path, active = %self.active, encoding = ?self.encoding, "v4l2 stream started");
        Ok(self.active)
    }

    fn read(&mut self, stop: &AtomicBool) -> Result<Frame, CameraError> {
        use v4l::io::traits::CaptureStream;

        if stop.load(Ordering::Relaxed) {
            return Err(CameraError::Cancelled);
        }
        let path = self.path.clone();
        let state = self.state.as_mut().ok_or(CameraError::NotOpen(path))?;
        let bytes = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|e| self.read_error(e))?;

        let image = match self.encoding {
            Encoding::Rgb3 => image::RgbImage::from_raw(self.active.width, self.active.height, bytes)
                .ok_or_else(|| self.read_error("short RGB3 buffer"))?,
            Encoding::Mjpeg => image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)
                .map_err(|e| self.read_error(e))?
                .to_rgb8(),
        };
        Ok(Frame::new(image))
    }

    fn close(&mut self) {
        // dropping the stream unmaps the buffers before the device closes
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_fails_to_open() {
        let mut source = V4l2Source::new("/dev/video-sensorgrab-missing");
        let err = source.open(Resolution::new(160, 122)).unwrap_err();
        assert!(matches!(err, CameraError::Open { .. }));
        let stop = AtomicBool::new(false);
        assert!(matches!(source.read(&stop), Err(CameraError::NotOpen(_))));
    }
}
