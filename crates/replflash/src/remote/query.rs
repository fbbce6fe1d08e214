//! Typed filesystem queries and mutations
//!
//! Callers never build expression strings themselves; every remote path is
//! embedded as a quoted literal here.

use std::collections::BTreeSet;

use super::literal::{self, LiteralError};
use super::{RemotePath, Session};
use crate::transport::RemoteError;

/// Directory bit of `st_mode`
const S_IFDIR: i64 = 0x4000;

fn unparseable(value: String, expected: &'static str) -> impl FnOnce(LiteralError) -> RemoteError {
    move |_| RemoteError::Unparseable { value, expected }
}

impl Session<'_> {
    /// Names of the entries in a remote directory
    pub fn list_dir(&mut self, dir: &RemotePath) -> Result<BTreeSet<String>, RemoteError> {
        let value = self.eval(&format!("os.listdir({})", dir.literal()))?;
        let names = literal::parse_str_list(&value)
            .map_err(unparseable(value, "a list of names"))?;
        Ok(names.into_iter().collect())
    }

    /// Whether a remote path is a regular file (as opposed to a directory)
    pub fn is_file(&mut self, path: &RemotePath) -> Result<bool, RemoteError> {
        let value = self.eval(&format!("os.stat({})[0]", path.literal()))?;
        let mode = literal::parse_int(&value).map_err(unparseable(value, "a file mode"))?;
        Ok(mode & S_IFDIR == 0)
    }

    /// Whether a remote path exists, answered by listing its parent
    pub fn exists(&mut self, path: &RemotePath) -> Result<bool, RemoteError> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Ok(true);
        };
        if !parent.is_root() && !self.exists(&parent)? {
            return Ok(false);
        }
        Ok(self.list_dir(&parent)?.contains(name))
    }

    /// Create one directory; its parent must exist
    pub fn mkdir(&mut self, dir: &RemotePath) -> Result<(), RemoteError> {
        self.exec(&format!("os.mkdir({})", dir.literal()))
    }

    /// Remove one file
    pub fn remove_file(&mut self, path: &RemotePath) -> Result<(), RemoteError> {
        self.exec(&format!("os.remove({})", path.literal()))
    }

    /// Remove one empty directory
    pub fn remove_dir(&mut self, dir: &RemotePath) -> Result<(), RemoteError> {
        self.exec(&format!("os.rmdir({})", dir.literal()))
    }

    /// Whole content of a remote text file
    pub fn read_text(&mut self, path: &RemotePath) -> Result<String, RemoteError> {
        let value = self.eval(&format!("open({}).read()", path.literal()))?;
        literal::parse_str(&value).map_err(unparseable(value, "a string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBoard;

    #[test]
    fn test_list_dir() {
        let mut board = MemoryBoard::new();
        board.add_file("/main.py", b"");
        board.add_dir("/apps");

        let mut session = Session::open(&mut board).unwrap();
        let names = session.list_dir(&RemotePath::root()).unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), ["apps", "main.py"]);
    }

    #[test]
    fn test_is_file() {
        let mut board = MemoryBoard::new();
        board.add_file("/apps/a.py", b"x");

        let mut session = Session::open(&mut board).unwrap();
        assert!(session.is_file(&RemotePath::parse("/apps/a.py")).unwrap());
        assert!(!session.is_file(&RemotePath::app_root()).unwrap());
    }

    #[test]
    fn test_exists() {
        let mut board = MemoryBoard::new();
        board.add_dir("/apps/pkg");

        let mut session = Session::open(&mut board).unwrap();
        assert!(session.exists(&RemotePath::parse("/apps/pkg")).unwrap());
        assert!(!session.exists(&RemotePath::parse("/apps/other")).unwrap());
        assert!(!session.exists(&RemotePath::parse("/lib/deep/x")).unwrap());
        assert!(session.exists(&RemotePath::root()).unwrap());
    }

    #[test]
    fn test_read_text() {
        let mut board = MemoryBoard::new();
        board.add_file("/main.py", b"import sys\n");

        let mut session = Session::open(&mut board).unwrap();
        let text = session.read_text(&RemotePath::bootstrap_file()).unwrap();
        assert_eq!(text, "import sys\n");
    }
}
