//! Where the capture loops show frames and read the quit key.

use anyhow::{Context, Result};
use image::RgbImage;
use std::io::BufRead;
use std::time::Duration;

pub trait Preview {
    /// Present `image` in the window called `window`.
    fn show(&mut self, window: &str, image: &RgbImage) -> Result<()>;

    /// Wait up to `timeout` for a key press.
    fn poll_key(&mut self, timeout: Duration) -> Option<char>;

    fn close(&mut self) {}
}

/// Preview for terminals and headless hosts: frames are only traced, keys
/// come from stdin (first character of each line) and Ctrl+C acts as the
/// quit key.
pub struct TerminalPreview {
    keys: flume::Receiver<char>,
    shown: u64,
}

impl TerminalPreview {
    /// Only one instance may be created per process, since it installs the
    /// Ctrl+C handler.
    pub fn new(quit_key: char) -> Result<Self> {
        let (tx, rx) = flume::unbounded();

        let ctrlc_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = ctrlc_tx.send(quit_key);
        })
        .context("failed to install Ctrl+C handler")?;

        // blocked on stdin for the life of the process; never joined
        std::thread::Builder::new()
            .name("stdin-keys".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if let Some(key) = line.trim().chars().next()
                        && tx.send(key).is_err()
                    {
                        break;
                    }
                }
            })
            .context("failed to start stdin reader")?;

        Ok(Self { keys: rx, shown: 0 })
    }
}

impl Preview for TerminalPreview {
    fn show(&mut self, window: &str, image: &RgbImage) -> Result<()> {
        self.shown += 1;
        tracing::trace!(
            window,
            width = image.width(),
            height = image.height(),
            shown = self.shown,
            "preview frame"
        );
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<char> {
        self.keys.recv_timeout(timeout).ok()
    }

    fn close(&mut self) {
        tracing::debug!(shown = self.shown, "preview closed");
    }
}
