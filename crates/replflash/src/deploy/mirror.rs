//! Directory mirror
//!
//! This module keeps the remote tree consistent with the local one:
//! - `ensure_remote_dir` creates only the missing suffix of a remote path
//! - `Mirror` copies a snapshotted local tree level by level
//! - `erase_remote_directory` removes a remote tree children first

use crate::remote::{RemotePath, Session};
use crate::transport::RemoteError;
use crate::{Error, Result};

use super::encoder::{self, TextPacing};
use super::plan::{Classifier, EntryKind, LocalEntry, TransferMode};
use super::progress::TransferProgress;

/// Create every missing directory of `dir`, returning how many were created.
///
/// Each level is checked with one listing of its parent; once a level had to
/// be created its children cannot exist and are created without checking.
pub fn ensure_remote_dir(session: &mut Session<'_>, dir: &RemotePath) -> Result<usize> {
    let mut parent = RemotePath::root();
    let mut created = 0;

    for segment in dir.segments() {
        let current = parent.join(segment);
        let exists = created == 0 && session.list_dir(&parent)?.contains(segment);
        if !exists {
            tracing::debug!("Creating remote directory {}", current);
            session.mkdir(&current)?;
            created += 1;
        }
        parent = current;
    }

    Ok(created)
}

/// Remove a remote directory and everything below it.
///
/// Returns the number of removed entries; a missing directory is not an
/// error. The root itself is emptied but never removed.
pub fn erase_remote_directory(session: &mut Session<'_>, dir: &RemotePath) -> Result<usize> {
    if !session.exists(dir)? {
        tracing::debug!("Nothing to erase at {}", dir);
        return Ok(0);
    }
    Ok(erase_tree(session, dir)?)
}

fn erase_tree(session: &mut Session<'_>, dir: &RemotePath) -> std::result::Result<usize, RemoteError> {
    let mut removed = 0;

    for name in session.list_dir(dir)? {
        let child = dir.join(&name);
        if session.is_file(&child)? {
            tracing::debug!("Removing remote file {}", child);
            session.remove_file(&child)?;
            removed += 1;
        } else {
            removed += erase_tree(session, &child)?;
        }
    }

    if !dir.is_root() {
        tracing::debug!("Removing remote directory {}", dir);
        session.remove_dir(dir)?;
        removed += 1;
    }
    Ok(removed)
}

/// Counters of one mirroring run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Files sent line by line
    pub text_files: usize,
    /// Files sent as byte chunks
    pub binary_files: usize,
    /// Bytes read from local files
    pub bytes: u64,
    /// Remote directories created
    pub dirs_created: usize,
    /// Local entries skipped by the ignore patterns
    pub skipped: Vec<String>,
}

impl MirrorStats {
    /// Number of files transferred
    pub fn files(&self) -> usize {
        self.text_files + self.binary_files
    }
}

/// Copies snapshotted local entries to the board
pub struct Mirror<'a> {
    classifier: &'a Classifier,
    pacing: TextPacing,
    progress: &'a TransferProgress,
}

impl<'a> Mirror<'a> {
    /// Create a mirror using the given classification and pacing
    pub fn new(classifier: &'a Classifier, pacing: TextPacing, progress: &'a TransferProgress) -> Self {
        Self {
            classifier,
            pacing,
            progress,
        }
    }

    /// Copy a local file or directory to `remote`.
    ///
    /// For a file `remote` is the target file path, for a directory the
    /// target directory.
    pub fn mirror(
        &self,
        session: &mut Session<'_>,
        local: &LocalEntry,
        remote: &RemotePath,
    ) -> Result<MirrorStats> {
        let mut stats = MirrorStats::default();
        match &local.kind {
            EntryKind::Dir { .. } => self.mirror_directory(session, local, remote, &mut stats)?,
            _ => {
                if let Some(parent) = remote.parent() {
                    stats.dirs_created += ensure_remote_dir(session, &parent)?;
                }
                self.mirror_entry(session, local, remote, &mut stats)?;
            }
        }
        Ok(stats)
    }

    fn mirror_directory(
        &self,
        session: &mut Session<'_>,
        local: &LocalEntry,
        remote_dir: &RemotePath,
        stats: &mut MirrorStats,
    ) -> Result<()> {
        stats.dirs_created += ensure_remote_dir(session, remote_dir)?;

        if let EntryKind::Dir { children } = &local.kind {
            for child in children {
                let remote = remote_dir.join(child.name());
                self.mirror_entry(session, child, &remote, stats)?;
            }
        }
        Ok(())
    }

    fn mirror_entry(
        &self,
        session: &mut Session<'_>,
        local: &LocalEntry,
        remote: &RemotePath,
        stats: &mut MirrorStats,
    ) -> Result<()> {
        if local.is_ignored() {
            tracing::warn!("Skipping {}", local.path);
            stats.skipped.push(local.path.to_string());
            return Ok(());
        }

        match local.kind {
            EntryKind::Dir { .. } => self.mirror_directory(session, local, remote, stats),
            EntryKind::File { .. } => {
                let mode = self.classifier.classify(local.name());
                self.progress.start_file(local.name(), remote);
                let bytes = encoder::encode(session, &local.path, remote, mode, &self.pacing)
                    .inspect_err(|e| self.progress.fail_file(local.name(), e))?;
                self.progress.finish_file(bytes);

                match mode {
                    TransferMode::Text => stats.text_files += 1,
                    TransferMode::Binary => stats.binary_files += 1,
                }
                stats.bytes += bytes;
                Ok(())
            }
            EntryKind::Other => Err(Error::precondition(
                format!("{} is neither a file nor a directory", local.path),
                "Remove the entry or point replflash at a regular file or directory",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBoard;
    use camino::Utf8Path;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn mkdirs(board: &MemoryBoard) -> Vec<&str> {
        board
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("os.mkdir("))
            .collect()
    }

    #[test]
    fn test_ensure_remote_dir_creates_missing_suffix() {
        let mut board = MemoryBoard::new();
        board.add_dir("/apps");
        {
            let mut session = Session::open(&mut board).unwrap();
            let created =
                ensure_remote_dir(&mut session, &RemotePath::parse("/apps/pkg/sub")).unwrap();
            assert_eq!(created, 2);
        }
        assert_eq!(
            mkdirs(&board),
            ["os.mkdir('/apps/pkg')", "os.mkdir('/apps/pkg/sub')"]
        );
    }

    #[test]
    fn test_ensure_remote_dir_is_idempotent() {
        let mut board = MemoryBoard::new();
        let dir = RemotePath::parse("/apps/pkg");
        {
            let mut session = Session::open(&mut board).unwrap();
            assert_eq!(ensure_remote_dir(&mut session, &dir).unwrap(), 2);
        }
        board.clear_log();
        {
            let mut session = Session::open(&mut board).unwrap();
            assert_eq!(ensure_remote_dir(&mut session, &dir).unwrap(), 0);
        }
        assert!(mkdirs(&board).is_empty());
    }

    #[test]
    fn test_ensure_root_is_noop() {
        let mut board = MemoryBoard::new();
        {
            let mut session = Session::open(&mut board).unwrap();
            assert_eq!(ensure_remote_dir(&mut session, &RemotePath::root()).unwrap(), 0);
        }
        assert_eq!(board.statements(), ["import os"]);
    }

    #[test]
    fn test_erase_is_post_order() {
        let mut board = MemoryBoard::new();
        board.add_file("/apps/a.py", b"a");
        board.add_file("/apps/pkg/b.py", b"b");
        board.add_file("/apps/pkg/deep/c.bin", b"c");
        board.add_file("/main.py", b"keep");
        {
            let mut session = Session::open(&mut board).unwrap();
            let removed = erase_remote_directory(&mut session, &RemotePath::app_root()).unwrap();
            assert_eq!(removed, 6);
        }

        let removals: Vec<&str> = board
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("os.r"))
            .collect();
        let position = |needle: &str| removals.iter().position(|s| s.contains(needle)).unwrap();

        assert!(position("rmdir('/apps/pkg/deep')") > position("remove('/apps/pkg/deep/c.bin')"));
        assert!(position("rmdir('/apps/pkg')") > position("rmdir('/apps/pkg/deep')"));
        assert!(position("rmdir('/apps/pkg')") > position("remove('/apps/pkg/b.py')"));
        assert_eq!(removals.last(), Some(&"os.rmdir('/apps')"));

        assert_eq!(board.file_paths(), ["/main.py"]);
        assert!(!board.has_dir("/apps"));
    }

    #[test]
    fn test_erase_missing_directory() {
        let mut board = MemoryBoard::new();
        {
            let mut session = Session::open(&mut board).unwrap();
            assert_eq!(erase_remote_directory(&mut session, &RemotePath::app_root()).unwrap(), 0);
        }
        assert_eq!(board.statements(), ["import os"]);
    }

    #[test]
    fn test_mirror_directory_skips_caches() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap().join("app");
        fs::create_dir_all(root.join("lib/__pycache__")).unwrap();
        fs::write(root.join("main.py"), "import lib.util\n").unwrap();
        fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(root.join("lib/util.py"), "X = 1\n").unwrap();
        fs::write(root.join("lib/util.pyc"), [0u8; 4]).unwrap();
        fs::write(root.join("lib/__pycache__/util.cpython-312.pyc"), [0u8; 4]).unwrap();

        let local = LocalEntry::snapshot(&root).unwrap();
        let classifier = Classifier::new(&[".py".to_string()], false);
        let pacing = TextPacing {
            flush_every: 5,
            pause: Duration::ZERO,
        };
        let progress = TransferProgress::hidden();

        let mut board = MemoryBoard::new();
        let stats = {
            let mut session = Session::open(&mut board).unwrap();
            Mirror::new(&classifier, pacing, &progress)
                .mirror(&mut session, &local, &RemotePath::parse("/apps/app"))
                .unwrap()
        };

        assert_eq!(stats.text_files, 2);
        assert_eq!(stats.binary_files, 1);
        assert_eq!(stats.dirs_created, 3);
        assert_eq!(stats.skipped.len(), 2);
        assert_eq!(
            board.file_paths(),
            ["/apps/app/lib/util.py", "/apps/app/logo.png", "/apps/app/main.py"]
        );
        assert!(board.issued().iter().all(|i| !i.code().contains("pycache")));
        assert!(board.issued().iter().all(|i| !i.code().contains(".pyc")));
        assert_eq!(board.file("/apps/app/logo.png").unwrap(), [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_mirror_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = Utf8Path::from_path(temp_dir.path()).unwrap().join("app.py");
        fs::write(&file, "print('hi')\n").unwrap();

        let local = LocalEntry::snapshot(&file).unwrap();
        let classifier = Classifier::new(&[".py".to_string()], false);
        let progress = TransferProgress::hidden();

        let mut board = MemoryBoard::new();
        let stats = {
            let mut session = Session::open(&mut board).unwrap();
            Mirror::new(&classifier, TextPacing::default(), &progress)
                .mirror(&mut session, &local, &RemotePath::parse("/apps/app.py"))
                .unwrap()
        };

        assert_eq!(stats.files(), 1);
        assert_eq!(stats.dirs_created, 1);
        assert_eq!(board.file("/apps/app.py").unwrap(), b"print('hi')\n");
    }
}
