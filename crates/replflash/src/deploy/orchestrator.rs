//! Deployment orchestration
//!
//! A deployment runs in this order, aborting on the first failure:
//! 1. Resolve the local path and the remote target, and check that text
//!    sources decode (no board access)
//! 2. Ask for confirmation
//! 3. Optionally erase the application root
//! 4. Mirror the local file or directory
//! 5. Apply exactly one bootstrap transition

use std::fs;
use std::io;

use camino::Utf8PathBuf;

use crate::remote::{RemotePath, Session};
use crate::transport::Transport;
use crate::{Error, Result};

use super::bootstrap::{BootstrapManager, BootstrapState, EntryPoint};
use super::encoder::TextPacing;
use super::mirror::{self, Mirror, MirrorStats};
use super::plan::{Classifier, EntryKind, LocalEntry, TransferMode};
use super::progress::TransferProgress;
use super::DeploySettings;

/// Inputs of one deployment
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Local file or directory to deploy
    pub local_path: Utf8PathBuf,
    /// Optional subdirectory below the application root
    pub remote_subpath: Option<String>,
    /// Erase the application root before copying
    pub erase: bool,
    /// Send every file as binary
    pub force_binary: bool,
    /// Lines between text flushes, overriding the configured value
    pub flush_every: Option<usize>,
    /// Function to run on boot, as `module.function`
    pub entry_point: Option<String>,
    /// Remove the autorun call after deploying
    pub clear_entry_point: bool,
}

impl DeployRequest {
    /// Request to deploy `local_path` with default options
    pub fn new(local_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_subpath: None,
            erase: false,
            force_binary: false,
            flush_every: None,
            entry_point: None,
            clear_entry_point: false,
        }
    }
}

/// Bootstrap transition applied after mirroring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapAction {
    /// Leave the board with code importable and nothing autorunning
    PathOnly,
    /// Remove the autorun call
    ClearMain,
    /// Run a function on boot
    EntryPoint(EntryPoint),
}

/// A validated deployment, resolved before any board access
#[derive(Debug, Clone)]
pub struct DeployPlan {
    /// Snapshot of the local file or directory
    pub local: LocalEntry,
    /// Remote file (for a file) or directory (for a directory) to write
    pub target: RemotePath,
    /// Whether the application root is erased first
    pub erase: bool,
    /// Transition applied at the end
    pub bootstrap: BootstrapAction,
    classifier: Classifier,
    pacing: TextPacing,
}

impl DeployPlan {
    /// Validate a request and snapshot the local tree
    pub fn prepare(request: &DeployRequest, settings: &DeploySettings) -> Result<Self> {
        let flush_every = request.flush_every.unwrap_or(settings.pacing.flush_every);
        if flush_every == 0 {
            return Err(Error::precondition(
                "Flush interval must be at least one line",
                "Pass a positive value to --flush-every",
            ));
        }

        // Reject a bad entry point before reading anything
        let bootstrap = match (&request.entry_point, request.clear_entry_point) {
            (Some(reference), _) => BootstrapAction::EntryPoint(reference.parse()?),
            (None, true) => BootstrapAction::ClearMain,
            (None, false) => BootstrapAction::PathOnly,
        };

        if !request.local_path.exists() {
            return Err(Error::precondition(
                format!("Local path does not exist: {}", request.local_path),
                "Check the path of the file or directory to deploy",
            ));
        }

        let local = LocalEntry::snapshot(&request.local_path)?;
        match local.kind {
            EntryKind::Other => {
                return Err(Error::precondition(
                    format!("{} is neither a file nor a directory", local.path),
                    "Point replflash at a regular file or directory",
                ));
            }
            EntryKind::File { .. } if local.is_ignored() => {
                return Err(Error::precondition(
                    format!("{} is a compiled artifact and is never deployed", local.path),
                    "Deploy the source file instead",
                ));
            }
            _ => {}
        }

        let name = local.name();
        if name.is_empty() {
            return Err(Error::precondition(
                format!("Cannot derive a remote name from {}", local.path),
                "Deploy a named file or directory rather than the filesystem root",
            ));
        }

        let mut target = RemotePath::app_root();
        if let Some(subpath) = &request.remote_subpath {
            target = target.join(subpath);
        }
        let target = target.join(name);
        if target == RemotePath::app_root() || !target.starts_with(&RemotePath::app_root()) {
            return Err(Error::precondition(
                format!("Target {} is outside {}", target, RemotePath::app_root()),
                "Remove '..' segments from the remote subpath",
            ));
        }

        let plan = Self {
            classifier: Classifier::new(&settings.text_suffixes, request.force_binary),
            pacing: TextPacing {
                flush_every,
                pause: settings.pacing.pause,
            },
            local,
            target,
            erase: request.erase,
            bootstrap,
        };
        plan.check_text_sources()?;
        Ok(plan)
    }

    /// Text files are sent line by line and must decode as UTF-8
    fn check_text_sources(&self) -> Result<()> {
        for (local, _, mode) in self.transfers() {
            if mode != TransferMode::Text {
                continue;
            }
            let content = fs::read(&local).map_err(|e| Error::local_io(&local, e))?;
            if let Err(e) = std::str::from_utf8(&content) {
                return Err(Error::local_io(
                    &local,
                    io::Error::new(io::ErrorKind::InvalidData, e),
                ));
            }
        }
        Ok(())
    }

    /// Files to transfer with their remote paths and modes, in transfer order
    pub fn transfers(&self) -> Vec<(Utf8PathBuf, RemotePath, TransferMode)> {
        let base = match self.local.kind {
            EntryKind::Dir { .. } => self.local.path.clone(),
            _ => self
                .local
                .path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default(),
        };
        let remote_base = match self.local.kind {
            EntryKind::Dir { .. } => self.target.clone(),
            _ => self.target.parent().unwrap_or_else(RemotePath::root),
        };

        self.local
            .transferable_files()
            .into_iter()
            .map(|entry| {
                let relative = entry.path.strip_prefix(&base).unwrap_or(entry.path.as_path());
                (
                    entry.path.clone(),
                    remote_base.join_local(relative),
                    self.classifier.classify(entry.name()),
                )
            })
            .collect()
    }
}

/// Result of a deployment that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySummary {
    /// Remote file or directory that was written
    pub target: RemotePath,
    /// Entries removed by the erase step
    pub erased: usize,
    /// Mirroring counters
    pub mirror: MirrorStats,
    /// Bootstrap state left on the board
    pub bootstrap: BootstrapState,
}

/// How a deployment ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The user declined; the board was not touched
    Aborted,
    /// Every step succeeded
    Completed(DeploySummary),
}

/// Confirmation gate asked once before the board is modified
pub trait Confirm {
    /// Return `true` to proceed with `plan`
    fn confirm(&mut self, plan: &DeployPlan) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&DeployPlan) -> bool,
{
    fn confirm(&mut self, plan: &DeployPlan) -> bool {
        self(plan)
    }
}

/// Runs deployments with fixed settings
pub struct Deployer {
    settings: DeploySettings,
}

impl Deployer {
    /// Create a deployer
    pub fn new(settings: DeploySettings) -> Self {
        Self { settings }
    }

    /// Settings used by this deployer
    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Deploy a local file or directory to the board.
    ///
    /// Precondition failures are reported before the transport is opened.
    /// The session is closed on every exit path once opened.
    pub fn deploy(
        &self,
        request: &DeployRequest,
        transport: &mut dyn Transport,
        confirm: &mut dyn Confirm,
    ) -> Result<DeployOutcome> {
        let plan = DeployPlan::prepare(request, &self.settings)?;
        self.run(&plan, transport, confirm)
    }

    /// Execute an already prepared plan
    pub fn run(
        &self,
        plan: &DeployPlan,
        transport: &mut dyn Transport,
        confirm: &mut dyn Confirm,
    ) -> Result<DeployOutcome> {
        if !confirm.confirm(plan) {
            tracing::info!("Deployment aborted, nothing was changed");
            return Ok(DeployOutcome::Aborted);
        }

        let mut session = Session::open(transport)?;

        let erased = if plan.erase {
            tracing::info!("Erasing {}", RemotePath::app_root());
            mirror::erase_remote_directory(&mut session, &RemotePath::app_root())?
        } else {
            0
        };

        tracing::info!("Deploying {} to {}", plan.local.path, plan.target);
        let progress = if self.settings.show_progress {
            TransferProgress::new(
                plan.local.transferable_files().len(),
                plan.local.transferable_bytes(),
            )
        } else {
            TransferProgress::hidden()
        };
        let stats = Mirror::new(&plan.classifier, plan.pacing, &progress).mirror(
            &mut session,
            &plan.local,
            &plan.target,
        )?;
        progress.finish();

        let bootstrap = BootstrapManager::new(plan.pacing);
        let state = match &plan.bootstrap {
            BootstrapAction::EntryPoint(entry) => bootstrap.set_entry_point(&mut session, entry)?,
            BootstrapAction::ClearMain => bootstrap.clear_main(&mut session)?,
            BootstrapAction::PathOnly => bootstrap.init_path_only(&mut session)?,
        };

        session.close()?;

        tracing::info!(
            "Sent {} files ({} bytes), skipped {}",
            stats.files(),
            stats.bytes,
            stats.skipped.len()
        );

        Ok(DeployOutcome::Completed(DeploySummary {
            target: plan.target.clone(),
            erased,
            mirror: stats,
            bootstrap: state,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBoard;
    use camino::Utf8Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings() -> DeploySettings {
        DeploySettings {
            text_suffixes: vec![".py".to_string()],
            pacing: TextPacing {
                flush_every: 5,
                pause: Duration::ZERO,
            },
            show_progress: false,
        }
    }

    fn project(temp_dir: &TempDir) -> Utf8PathBuf {
        let root = Utf8Path::from_path(temp_dir.path()).unwrap().join("app");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("main.py"), "import lib.util\n").unwrap();
        fs::write(root.join("lib/util.py"), "def run():\n    pass\n").unwrap();
        root
    }

    fn yes() -> impl FnMut(&DeployPlan) -> bool {
        |_| true
    }

    #[test]
    fn test_prepare_resolves_targets() {
        let temp_dir = TempDir::new().unwrap();
        let root = project(&temp_dir);

        let plan = DeployPlan::prepare(&DeployRequest::new(&root), &settings()).unwrap();
        assert_eq!(plan.target.as_str(), "/apps/app");
        assert_eq!(plan.bootstrap, BootstrapAction::PathOnly);

        let mut request = DeployRequest::new(root.join("main.py"));
        request.remote_subpath = Some("v2\\bin".to_string());
        let plan = DeployPlan::prepare(&request, &settings()).unwrap();
        assert_eq!(plan.target.as_str(), "/apps/v2/bin/main.py");
    }

    #[test]
    fn test_transfers_lists_remote_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = project(&temp_dir);

        let plan = DeployPlan::prepare(&DeployRequest::new(&root), &settings()).unwrap();
        let remotes: Vec<String> = plan
            .transfers()
            .into_iter()
            .map(|(_, remote, _)| remote.to_string())
            .collect();
        assert_eq!(remotes, ["/apps/app/lib/util.py", "/apps/app/main.py"]);

        let plan =
            DeployPlan::prepare(&DeployRequest::new(root.join("main.py")), &settings()).unwrap();
        let transfers = plan.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].1.as_str(), "/apps/main.py");
        assert_eq!(transfers[0].2, TransferMode::Text);
    }

    #[test]
    fn test_entry_point_wins_over_clear() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.entry_point = Some("app.main.run".to_string());
        request.clear_entry_point = true;

        let plan = DeployPlan::prepare(&request, &settings()).unwrap();
        assert!(matches!(plan.bootstrap, BootstrapAction::EntryPoint(_)));
    }

    #[test]
    fn test_bad_entry_point_never_opens_session() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.entry_point = Some("run".to_string());

        let mut board = MemoryBoard::new();
        let mut asked = false;
        let err = Deployer::new(settings())
            .deploy(&request, &mut board, &mut |_: &DeployPlan| {
                asked = true;
                true
            })
            .unwrap_err();

        assert!(err.is_precondition());
        assert!(!asked);
        assert_eq!(board.open_count(), 0);
    }

    #[test]
    fn test_missing_local_path_is_precondition() {
        let temp_dir = TempDir::new().unwrap();
        let missing = Utf8Path::from_path(temp_dir.path()).unwrap().join("nope");

        let mut board = MemoryBoard::new();
        let err = Deployer::new(settings())
            .deploy(&DeployRequest::new(missing), &mut board, &mut yes())
            .unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(board.open_count(), 0);
    }

    #[test]
    fn test_subpath_cannot_leave_app_root() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.remote_subpath = Some("../..".to_string());

        let err = DeployPlan::prepare(&request, &settings()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_undecodable_text_fails_before_session() {
        let temp_dir = TempDir::new().unwrap();
        let root = project(&temp_dir);
        fs::write(root.join("lib/bad.py"), [0xffu8, 0xfe, b'\n']).unwrap();
        let mut request = DeployRequest::new(&root);
        request.erase = true;

        let mut board = MemoryBoard::new();
        board.add_file("/apps/old.py", b"old");
        let mut asked = false;
        let err = Deployer::new(settings())
            .deploy(&request, &mut board, &mut |_: &DeployPlan| {
                asked = true;
                true
            })
            .unwrap_err();

        let Error::LocalIo { path, source } = &err else {
            panic!("expected a local error, got {err:?}");
        };
        assert!(path.ends_with("lib/bad.py"));
        assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
        assert!(!asked);
        assert_eq!(board.open_count(), 0);
        assert_eq!(board.file_paths(), ["/apps/old.py"]);
    }

    #[test]
    fn test_force_binary_skips_text_check() {
        let temp_dir = TempDir::new().unwrap();
        let root = project(&temp_dir);
        fs::write(root.join("lib/bad.py"), [0xffu8, 0xfe, b'\n']).unwrap();
        let mut request = DeployRequest::new(&root);
        request.force_binary = true;

        assert!(DeployPlan::prepare(&request, &settings()).is_ok());
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.flush_every = Some(0);
        assert!(DeployPlan::prepare(&request, &settings())
            .unwrap_err()
            .is_precondition());
    }

    #[test]
    fn test_declined_confirmation_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.erase = true;

        let mut board = MemoryBoard::new();
        board.add_file("/apps/old.py", b"old");
        let outcome = Deployer::new(settings())
            .deploy(&request, &mut board, &mut |_: &DeployPlan| false)
            .unwrap();

        assert_eq!(outcome, DeployOutcome::Aborted);
        assert_eq!(board.open_count(), 0);
        assert!(board.issued().is_empty());
        assert_eq!(board.file("/apps/old.py").unwrap(), b"old");
    }

    #[test]
    fn test_deploy_directory_with_erase() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.erase = true;

        let mut board = MemoryBoard::new();
        board.add_file("/apps/stale/old.py", b"old");
        let outcome = Deployer::new(settings())
            .deploy(&request, &mut board, &mut yes())
            .unwrap();

        let DeployOutcome::Completed(summary) = outcome else {
            panic!("deployment should complete");
        };
        assert_eq!(summary.erased, 3);
        assert_eq!(summary.mirror.text_files, 2);
        assert_eq!(summary.bootstrap, BootstrapState::PathOnly);
        assert_eq!(
            board.file_paths(),
            ["/apps/app/lib/util.py", "/apps/app/main.py", "/main.py"]
        );
        assert_eq!(board.close_count(), 1);
        assert!(!board.is_open());
    }

    #[test]
    fn test_failure_still_closes_session() {
        let temp_dir = TempDir::new().unwrap();
        let request = DeployRequest::new(project(&temp_dir));

        let mut board = MemoryBoard::new();
        board.fail_when("util.py");
        let err = Deployer::new(settings())
            .deploy(&request, &mut board, &mut yes())
            .unwrap_err();

        assert!(matches!(err, Error::Transfer { .. }));
        assert_eq!(board.close_count(), 1);
        // The bootstrap file is never written after a failed transfer
        assert!(board.file("/main.py").is_none());
    }

    #[test]
    fn test_clear_entry_point_after_deploy() {
        let temp_dir = TempDir::new().unwrap();
        let mut request = DeployRequest::new(project(&temp_dir));
        request.clear_entry_point = true;

        let mut board = MemoryBoard::new();
        let outcome = Deployer::new(settings())
            .deploy(&request, &mut board, &mut yes())
            .unwrap();
        let DeployOutcome::Completed(summary) = outcome else {
            panic!("deployment should complete");
        };
        assert_eq!(summary.bootstrap, BootstrapState::PathOnly);
    }
}
