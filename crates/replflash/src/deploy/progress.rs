//! Progress display for file transfers
//!
//! This module provides a byte-based progress bar using indicatif,
//! integrated with tracing for clean log output.

use indicatif::{ProgressBar, ProgressStyle};
use std::cell::Cell;
use std::time::Duration;

use crate::Error;
use crate::remote::RemotePath;

/// Progress of one deployment
pub struct TransferProgress {
    bar: ProgressBar,
    files_done: Cell<usize>,
    total_files: usize,
}

impl TransferProgress {
    /// Create a progress bar over `total_bytes` spread across `total_files`
    pub fn new(total_files: usize, total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .expect("Invalid progress template")
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            files_done: Cell::new(0),
            total_files,
        }
    }

    /// Progress tracker that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            files_done: Cell::new(0),
            total_files: 0,
        }
    }

    /// A file transfer started
    pub fn start_file(&self, name: &str, remote: &RemotePath) {
        self.bar.set_message(format!(
            "({}/{}) {} -> {}",
            self.files_done.get() + 1,
            self.total_files,
            name,
            remote
        ));
    }

    /// The current file transfer finished after sending `bytes`
    pub fn finish_file(&self, bytes: u64) {
        self.files_done.set(self.files_done.get() + 1);
        self.bar.inc(bytes);
    }

    /// The current file transfer failed
    pub fn fail_file(&self, name: &str, error: &Error) {
        self.bar
            .abandon_with_message(format!("{}: FAILED - {}", name, error));
    }

    /// Finish the progress bar
    pub fn finish(&self) {
        self.bar
            .finish_with_message(format!("Sent {} files", self.files_done.get()));
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
