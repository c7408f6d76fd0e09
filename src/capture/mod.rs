//! Camera capture tools.
//!
//! - [`depth`]: one camera, every frame previewed, saves rate limited
//! - [`multi`]: several cameras side by side, combined frames saved at a
//!   fixed cadence, one worker thread per camera

pub mod depth;
pub mod frame;
pub mod multi;
pub mod output;
pub mod pacing;
pub mod preview;
pub mod source;
pub mod store;
#[cfg(feature = "v4l2")]
pub mod v4l2;
pub mod worker;

pub use depth::{DepthCaptureReport, StopReason, run_depth_capture};
pub use frame::{Frame, hconcat, placeholder};
pub use multi::{MultiCaptureReport, run_multi_capture};
pub use preview::{Preview, TerminalPreview};
pub use source::{CameraError, FrameSource, Resolution, SourceKind};
pub use store::CaptureContext;
