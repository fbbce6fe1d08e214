//! Deployment of a local tree to the board
//!
//! This module provides:
//! - Local snapshot and per-file classification
//! - Content encoding of single files (text and binary)
//! - Directory mirroring and erasure
//! - Bootstrap file management
//! - The orchestrator that sequences a full deployment

pub mod bootstrap;
pub mod encoder;
pub mod mirror;
pub mod orchestrator;
pub mod plan;
pub mod progress;

pub use bootstrap::{BootstrapManager, BootstrapState, EntryPoint, ObservedBootstrap};
pub use encoder::TextPacing;
pub use mirror::{Mirror, MirrorStats, ensure_remote_dir, erase_remote_directory};
pub use orchestrator::{
    BootstrapAction, Confirm, DeployOutcome, DeployPlan, DeployRequest, DeploySummary, Deployer,
};
pub use plan::{Classifier, EntryKind, LocalEntry, TransferMode};
pub use progress::TransferProgress;

/// Suffixes of files sent as text when not configured otherwise
pub const DEFAULT_TEXT_SUFFIXES: &[&str] = &[
    ".py", ".txt", ".json", ".csv", ".html", ".css", ".js", ".md", ".cfg", ".ini",
];

/// Settings shared by every deployment of one run
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// File suffixes sent line by line
    pub text_suffixes: Vec<String>,
    /// Flow control for text files
    pub pacing: TextPacing,
    /// Draw a progress bar while transferring
    pub show_progress: bool,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            text_suffixes: DEFAULT_TEXT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            pacing: TextPacing::default(),
            show_progress: true,
        }
    }
}
