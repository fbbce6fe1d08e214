//! POSIX-style paths on the board's filesystem

use camino::{Utf8Component, Utf8Path};
use std::fmt;

use super::literal::quote_str;

/// Directory under which every deployed tree is mirrored
pub const APP_ROOT: &str = "/apps";

/// File the board runs automatically after boot
pub const BOOTSTRAP_FILE: &str = "/main.py";

/// Absolute path on the board, always `/`-separated
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    /// The filesystem root `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// The application root
    pub fn app_root() -> Self {
        Self(APP_ROOT.to_string())
    }

    /// The bootstrap file
    pub fn bootstrap_file() -> Self {
        Self(BOOTSTRAP_FILE.to_string())
    }

    /// Build an absolute path from a user supplied string.
    ///
    /// Backslashes are treated as separators, empty and `.` segments are
    /// dropped, and a missing leading `/` is added.
    pub fn parse(path: &str) -> Self {
        let mut out = Self::root();
        for segment in path.split(['/', '\\']) {
            out = out.join(segment);
        }
        out
    }

    /// Append a relative path, normalising separators.
    ///
    /// Empty and `.` segments are ignored. `..` removes the last segment but
    /// never climbs above the root.
    pub fn join(&self, relative: &str) -> Self {
        let mut segments: Vec<&str> = self.segments().collect();
        for segment in relative.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
        Self(format!("/{}", segments.join("/")))
    }

    /// Append the components of a local relative path
    pub fn join_local(&self, relative: &Utf8Path) -> Self {
        let mut out = self.clone();
        for component in relative.components() {
            if let Utf8Component::Normal(name) = component {
                out = out.join(name);
            }
        }
        out
    }

    /// Path segments below the root, in order
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Parent directory, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/').unwrap_or(0);
        if idx == 0 {
            Some(Self::root())
        } else {
            Some(Self(self.0[..idx].to_string()))
        }
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments().next_back()
    }

    /// Whether this is `/`
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Whether `self` equals `other` or lies below it
    pub fn starts_with(&self, other: &RemotePath) -> bool {
        other.is_root()
            || self.0 == other.0
            || self
                .0
                .strip_prefix(&other.0)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path as a quoted Python `str` literal
    pub fn literal(&self) -> String {
        quote_str(&self.0)
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
