//! sensorgrab - sensor data collection tools
//!
//! Three independent tools share this crate:
//!
//! - **Radar export**: dump every message of one radar topic in a ROS1
//!   `.bag` file as a line of text, decoding messages from the definition
//!   stored in the bag
//! - **Depth capture**: preview a single camera, optionally rotated 180°,
//!   and save JPEG snapshots at a bounded rate
//! - **Multi-camera capture**: grab from several cameras on worker threads,
//!   show them side by side and save the combined frame at a fixed cadence
//!
//! # Example
//!
//! ```rust,no_run
//! use sensorgrab::{ExportOptions, export_radar};
//!
//! let options = ExportOptions {
//!     bag_path: "drive.bag".to_string(),
//!     output_path: "radar.txt".to_string(),
//!     topic: "/radar/points".to_string(),
//!     show_progress: false,
//! };
//!
//! let summary = export_radar(&options)?;
//! println!("{} points", summary.lines_written);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod capture;
pub mod cli;
pub mod msgdef;
pub mod radar;
pub mod rosbags_io;
pub mod settings;

pub use capture::{run_depth_capture, run_multi_capture};
pub use radar::{ExportOptions, export_radar};
pub use rosbags_io::inspect_bag;
pub use settings::{DepthSettings, MultiSettings};
