//! Local project trees and simulated boards for end-to-end deployments

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use replflash::Result;
use replflash::deploy::{
    DeployOutcome, DeployPlan, DeployRequest, DeploySettings, DeploySummary, Deployer, TextPacing,
};
use replflash::transport::MemoryBoard;

/// A throwaway local directory to deploy from
pub struct Project {
    _temp_dir: TempDir,
    root: Utf8PathBuf,
}

impl Project {
    /// Create an empty project directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .expect("Temp dir path should be UTF-8");
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Project root
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Write a file below the root, creating its parent directories
    pub fn file(&self, relative: &str, content: impl AsRef<[u8]>) -> Utf8PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create a directory below the root
    pub fn dir(&self, relative: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).expect("Failed to create directory");
        path
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Default settings without pauses or progress output
pub fn test_settings() -> DeploySettings {
    DeploySettings {
        pacing: TextPacing {
            pause: Duration::ZERO,
            ..TextPacing::default()
        },
        show_progress: false,
        ..DeploySettings::default()
    }
}

/// Deploy to `board`, confirming automatically
pub fn deploy(board: &mut MemoryBoard, request: &DeployRequest) -> Result<DeployOutcome> {
    Deployer::new(test_settings()).deploy(request, board, &mut |_: &DeployPlan| true)
}

/// Deploy to `board` and expect completion
pub fn deploy_completed(board: &mut MemoryBoard, request: &DeployRequest) -> DeploySummary {
    match deploy(board, request).expect("Deployment failed") {
        DeployOutcome::Completed(summary) => summary,
        DeployOutcome::Aborted => panic!("Deployment was aborted"),
    }
}

/// Content of a remote file as text
pub fn remote_text(board: &MemoryBoard, path: &str) -> String {
    let bytes = board
        .file(path)
        .unwrap_or_else(|| panic!("{} does not exist on the board", path));
    String::from_utf8(bytes.to_vec()).expect("Remote file is not UTF-8")
}
