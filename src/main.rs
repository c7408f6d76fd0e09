use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use sensorgrab::capture::{TerminalPreview, run_depth_capture, run_multi_capture};
use sensorgrab::cli::{Cli, Commands};
use sensorgrab::radar::{ExportOptions, export_radar};
use sensorgrab::rosbags_io;
use sensorgrab::settings::{self, DepthSettings, MultiSettings};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { bag, json } => rosbags_io::inspect_bag(&bag, json),
        Commands::Radar {
            bag_file,
            output_file,
            radar_topic,
            no_progress,
        } => {
            let options = ExportOptions {
                bag_path: bag_file,
                output_path: output_file,
                topic: radar_topic,
                show_progress: !no_progress,
            };
            export_radar(&options).map(|_| ())
        }
        Commands::Depth {
            settings: path,
            source,
            rotate_180,
            target_fps,
            output_root,
        } => {
            let mut cfg: DepthSettings = settings::load(path.as_deref())?;
            if let Some(source) = source {
                cfg.source = source;
            }
            if rotate_180 {
                cfg.rotate_180 = true;
            }
            if let Some(fps) = target_fps {
                cfg.target_fps = fps;
            }
            if let Some(root) = output_root {
                cfg.output_root = root;
            }

            let mut preview = TerminalPreview::new(cfg.quit_key)?;
            let mut camera = cfg.source.open_single();
            let report = run_depth_capture(&cfg, camera.as_mut(), &mut preview)?;
            println!(
                "Saved {} of {} frames to {}",
                report.frames_saved,
                report.frames_seen,
                report.run_dir.display()
            );
            Ok(())
        }
        Commands::Multi {
            settings: path,
            source,
            cameras,
            target_fps,
            output_root,
        } => {
            let mut cfg: MultiSettings = settings::load(path.as_deref())?;
            if let Some(source) = source {
                cfg.source = source;
            }
            if let Some(cameras) = cameras {
                cfg.camera_indices = cameras;
            }
            if let Some(fps) = target_fps {
                cfg.target_fps = fps;
            }
            if let Some(root) = output_root {
                cfg.output_root = root;
            }

            let mut preview = TerminalPreview::new(cfg.quit_key)?;
            let kind = cfg.source.clone();
            let report = run_multi_capture(&cfg, |index| kind.open_camera(index), &mut preview)?;
            for worker in &report.workers {
                if !worker.opened() {
                    tracing::warn!(camera = worker.index, "camera never opened; its slot showed the placeholder");
                }
            }
            println!(
                "Saved {} combined frames to {}",
                report.frames_saved,
                report.run_dir.display()
            );
            Ok(())
        }
    }
}
