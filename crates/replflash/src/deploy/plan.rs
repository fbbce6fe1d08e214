//! Local tree snapshot and per-file classification

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use crate::{Error, Result};

/// Compiled artifacts that are never deployed
const IGNORED_FILE_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

/// Build-cache directories that are never deployed
const IGNORED_DIRS: &[&str] = &["__pycache__", ".pytest_cache", ".mypy_cache"];

/// How a file's content is sent to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Escaped and sent line by line
    Text,
    /// Sent as raw byte chunks
    Binary,
}

/// Decides the transfer mode of each file for one deployment
#[derive(Debug, Clone)]
pub struct Classifier {
    text_suffixes: Vec<String>,
    force_binary: bool,
}

impl Classifier {
    /// Create a classifier from the configured text suffixes
    pub fn new(text_suffixes: &[String], force_binary: bool) -> Self {
        Self {
            text_suffixes: text_suffixes.to_vec(),
            force_binary,
        }
    }

    /// Classify a file by name
    pub fn classify(&self, file_name: &str) -> TransferMode {
        if !self.force_binary
            && self
                .text_suffixes
                .iter()
                .any(|suffix| file_name.ends_with(suffix.as_str()))
        {
            TransferMode::Text
        } else {
            TransferMode::Binary
        }
    }
}

/// Kind of a snapshotted local entry
#[derive(Debug, Clone)]
pub enum EntryKind {
    /// Regular file
    File { size: u64 },
    /// Directory with its entries sorted by name.
    ///
    /// Ignored directories are recorded without children.
    Dir { children: Vec<LocalEntry> },
    /// Anything else (sockets, dangling links, ...)
    Other,
}

/// A local file or directory, captured once at the start of a deployment
#[derive(Debug, Clone)]
pub struct LocalEntry {
    /// Absolute path
    pub path: Utf8PathBuf,
    /// What the entry is
    pub kind: EntryKind,
}

impl LocalEntry {
    /// Snapshot `path` and, for a directory, everything below it.
    ///
    /// Every file is opened once, so a missing or unreadable file fails
    /// here. File contents are not read.
    pub fn snapshot(path: &Utf8Path) -> Result<Self> {
        let path = path.canonicalize_utf8().map_err(|e| Error::local_io(path, e))?;
        let metadata = std::fs::metadata(&path).map_err(|e| Error::local_io(&path, e))?;

        if metadata.is_dir() {
            let children = snapshot_children(&path)?;
            Ok(Self {
                path,
                kind: EntryKind::Dir { children },
            })
        } else if metadata.is_file() {
            std::fs::File::open(&path).map_err(|e| Error::local_io(&path, e))?;
            Ok(Self {
                path,
                kind: EntryKind::File {
                    size: metadata.len(),
                },
            })
        } else {
            Ok(Self {
                path,
                kind: EntryKind::Other,
            })
        }
    }

    /// File or directory name
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }

    /// Whether this entry is skipped by the mirror
    pub fn is_ignored(&self) -> bool {
        let name = self.name();
        match self.kind {
            EntryKind::File { .. } => IGNORED_FILE_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(suffix)),
            EntryKind::Dir { .. } => is_ignored_dir(name),
            EntryKind::Other => true,
        }
    }

    /// Files that will be transferred, in transfer order
    pub fn transferable_files(&self) -> Vec<&LocalEntry> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, files: &mut Vec<&'a LocalEntry>) {
        if self.is_ignored() {
            return;
        }
        match &self.kind {
            EntryKind::File { .. } => files.push(self),
            EntryKind::Dir { children } => {
                for child in children {
                    child.collect_files(files);
                }
            }
            EntryKind::Other => {}
        }
    }

    /// Total size of the files that will be transferred
    pub fn transferable_bytes(&self) -> u64 {
        self.transferable_files()
            .iter()
            .map(|entry| match entry.kind {
                EntryKind::File { size } => size,
                _ => 0,
            })
            .sum()
    }
}

fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

fn snapshot_children(dir: &Utf8Path) -> Result<Vec<LocalEntry>> {
    let mut children = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .and_then(Utf8Path::from_path)
                .map_or_else(|| dir.to_path_buf(), Utf8Path::to_path_buf);
            Error::local_io(path, e.into())
        })?;

        let path = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()).map_err(|p| {
            Error::precondition(
                format!("Path is not valid UTF-8: {:?}", p),
                "Rename the file so its path contains only valid UTF-8 characters",
            )
        })?;

        let file_type = entry.file_type();
        let kind = if file_type.is_dir() {
            if is_ignored_dir(&entry.file_name().to_string_lossy()) {
                EntryKind::Dir {
                    children: Vec::new(),
                }
            } else {
                EntryKind::Dir {
                    children: snapshot_children(&path)?,
                }
            }
        } else if file_type.is_file() {
            let metadata = entry.metadata().map_err(|e| Error::local_io(&path, e.into()))?;
            std::fs::File::open(&path).map_err(|e| Error::local_io(&path, e))?;
            EntryKind::File {
                size: metadata.len(),
            }
        } else {
            EntryKind::Other
        };

        children.push(LocalEntry { path, kind });
    }

    Ok(children)
}
