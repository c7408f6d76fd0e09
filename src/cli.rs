use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::capture::SourceKind;

#[derive(Parser, Debug)]
#[command(name = "sensorgrab", about = "Radar bag export and camera capture tools", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List topics, types, message counts and time span of a bag
    Inspect {
        /// Path to the .bag file
        bag: String,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write every message of a radar topic as one line of text
    Radar {
        /// Path to the .bag file
        bag_file: String,
        /// Text file to create
        output_file: String,
        /// Topic carrying the radar points
        radar_topic: String,
        /// Do not show the progress spinner
        #[arg(long = "no-progress")]
        no_progress: bool,
    },

    /// Preview one camera and save snapshots at a bounded rate
    Depth {
        /// JSON settings file; flags below override it
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Frame source: v4l2, synthetic or replay:<dir>
        #[arg(long)]
        source: Option<SourceKind>,
        /// Rotate every frame by 180 degrees
        #[arg(long = "rotate-180")]
        rotate_180: bool,
        /// Maximum saved frames per second
        #[arg(long = "target-fps")]
        target_fps: Option<f64>,
        /// Directory that receives the run folder
        #[arg(long = "output-root")]
        output_root: Option<PathBuf>,
    },

    /// Show several cameras side by side and save the combined frames
    Multi {
        /// JSON settings file; flags below override it
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Frame source: v4l2, synthetic or replay:<dir>
        #[arg(long)]
        source: Option<SourceKind>,
        /// Camera indices, left to right (e.g. 0,1)
        #[arg(long, value_delimiter = ',')]
        cameras: Option<Vec<u32>>,
        /// Combined frames shown and saved per second
        #[arg(long = "target-fps")]
        target_fps: Option<f64>,
        /// Directory that receives the run folder
        #[arg(long = "output-root")]
        output_root: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_radar_positionals() {
        let cli = Cli::try_parse_from(["sensorgrab", "radar", "a.bag", "out.txt", "/radar"]).unwrap();
        match cli.command {
            Commands::Radar { bag_file, output_file, radar_topic, no_progress } => {
                assert_eq!(bag_file, "a.bag");
                assert_eq!(output_file, "out.txt");
                assert_eq!(radar_topic, "/radar");
                assert!(!no_progress);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_radar_requires_three_arguments() {
        assert!(Cli::try_parse_from(["sensorgrab", "radar", "a.bag", "out.txt"]).is_err());
    }

    #[test]
    fn test_multi_camera_list() {
        let cli = Cli::try_parse_from([
            "sensorgrab", "multi", "--cameras", "2,0,5", "--source", "synthetic",
        ])
        .unwrap();
        match cli.command {
            Commands::Multi { cameras, source, .. } => {
                assert_eq!(cameras, Some(vec![2, 0, 5]));
                assert_eq!(source, Some(SourceKind::Synthetic));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_source_is_rejected() {
        assert!(Cli::try_parse_from(["sensorgrab", "depth", "--source", "webcam"]).is_err());
    }
}
