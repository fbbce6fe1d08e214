//! Simulated board
//!
//! `MemoryBoard` keeps a filesystem in memory and interprets the fixed
//! statement vocabulary replflash emits. It records every statement so a
//! deployment can be previewed (`deploy --dry-run`) or asserted on in tests.

use std::collections::{BTreeMap, BTreeSet};

use super::{RemoteError, Transport};
use crate::remote::RemotePath;
use crate::remote::literal::{self, LiteralError, LiteralParser, quote_str};

const S_IFDIR: u32 = 0x4000;
const S_IFREG: u32 = 0x8000;

/// A statement or expression sent to the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issued {
    /// Statement that was waited for
    Exec(String),
    /// Statement sent without waiting
    ExecNoWait(String),
    /// Expression evaluation
    Eval(String),
}

impl Issued {
    /// Code of the statement or expression
    pub fn code(&self) -> &str {
        match self {
            Issued::Exec(code) | Issued::ExecNoWait(code) | Issued::Eval(code) => code,
        }
    }
}

#[derive(Debug)]
enum HandleMode {
    Write,
    Read { pos: usize },
}

#[derive(Debug)]
struct Handle {
    path: String,
    mode: HandleMode,
}

/// In-memory board with a raw REPL front end
#[derive(Debug)]
pub struct MemoryBoard {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    handle: Option<Handle>,
    issued: Vec<Issued>,
    open: bool,
    opens: usize,
    closes: usize,
    fail_on: Option<String>,
    deferred: Option<RemoteError>,
}

impl Default for MemoryBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBoard {
    /// Board with an empty filesystem
    pub fn new() -> Self {
        Self {
            dirs: BTreeSet::from(["/".to_string()]),
            files: BTreeMap::new(),
            handle: None,
            issued: Vec::new(),
            open: false,
            opens: 0,
            closes: 0,
            fail_on: None,
            deferred: None,
        }
    }

    /// Create a directory and its missing ancestors
    pub fn add_dir(&mut self, path: &str) {
        let mut dir = RemotePath::parse(path);
        loop {
            self.dirs.insert(dir.as_str().to_string());
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    /// Create a file, creating its missing parent directories
    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        let path = RemotePath::parse(path);
        if let Some(parent) = path.parent() {
            self.add_dir(parent.as_str());
        }
        self.files.insert(path.as_str().to_string(), content.to_vec());
    }

    /// Raise an exception for every statement containing `needle`
    pub fn fail_when(&mut self, needle: impl Into<String>) {
        self.fail_on = Some(needle.into());
    }

    /// Content of a remote file
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Whether a remote directory exists
    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    /// All remote file paths
    pub fn file_paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    /// All remote directory paths, including `/`
    pub fn dir_paths(&self) -> Vec<&str> {
        self.dirs.iter().map(String::as_str).collect()
    }

    /// Everything sent to the board, in order
    pub fn issued(&self) -> &[Issued] {
        &self.issued
    }

    /// Statements sent to the board, in order, without expression evaluations
    pub fn statements(&self) -> Vec<&str> {
        self.issued
            .iter()
            .filter(|i| !matches!(i, Issued::Eval(_)))
            .map(Issued::code)
            .collect()
    }

    /// Forget the recorded statements
    pub fn clear_log(&mut self) {
        self.issued.clear();
    }

    /// Number of times a session was opened
    pub fn open_count(&self) -> usize {
        self.opens
    }

    /// Number of times a session was closed
    pub fn close_count(&self) -> usize {
        self.closes
    }

    /// Whether a session is currently open
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn check_ready(&mut self) -> Result<(), RemoteError> {
        if !self.open {
            return Err(RemoteError::Closed);
        }
        match self.deferred.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn injected_failure(&self, code: &str) -> Option<RemoteError> {
        self.fail_on
            .as_deref()
            .filter(|needle| code.contains(needle))
            .map(|_| RemoteError::exception(code, "OSError: [Errno 5] EIO"))
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let is_child = |path: &String| {
            RemotePath::parse(path)
                .parent()
                .is_some_and(|parent| parent.as_str() == dir)
        };
        let mut names: Vec<String> = self
            .dirs
            .iter()
            .chain(self.files.keys())
            .filter(|p| is_child(p))
            .filter_map(|p| RemotePath::parse(p).file_name().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    fn parent_exists(&self, path: &str) -> bool {
        RemotePath::parse(path)
            .parent()
            .is_some_and(|parent| self.dirs.contains(parent.as_str()))
    }

    fn run(&mut self, code: &str) -> Result<(), RemoteError> {
        let error = |message: &str| RemoteError::exception(code, message);
        let enoent = || error("OSError: [Errno 2] ENOENT");
        let eexist = || error("OSError: [Errno 17] EEXIST");

        if code.starts_with("import ") {
            return Ok(());
        }
        if let Some(args) = call_args(code, "os.mkdir") {
            let path = path_arg(code, args)?;
            if self.dirs.contains(&path) || self.files.contains_key(&path) {
                return Err(eexist());
            }
            if !self.parent_exists(&path) {
                return Err(enoent());
            }
            self.dirs.insert(path);
            return Ok(());
        }
        if let Some(args) = call_args(code, "os.remove") {
            let path = path_arg(code, args)?;
            return match self.files.remove(&path) {
                Some(_) => Ok(()),
                None => Err(enoent()),
            };
        }
        if let Some(args) = call_args(code, "os.rmdir") {
            let path = path_arg(code, args)?;
            if !self.dirs.contains(&path) || path == "/" {
                return Err(enoent());
            }
            if !self.children(&path).is_empty() {
                return Err(error("OSError: [Errno 39] ENOTEMPTY"));
            }
            self.dirs.remove(&path);
            return Ok(());
        }
        if let Some(args) = code
            .strip_prefix("f = ")
            .and_then(|rest| call_args(rest, "open"))
        {
            let (path, mode) =
                open_args(args).map_err(|e| error(&format!("SyntaxError: {}", e.0)))?;
            if self.dirs.contains(&path) {
                return Err(error("OSError: [Errno 21] EISDIR"));
            }
            let mode = match mode.as_str() {
                "w" | "wb" => {
                    if !self.parent_exists(&path) {
                        return Err(enoent());
                    }
                    self.files.insert(path.clone(), Vec::new());
                    HandleMode::Write
                }
                "r" | "rb" => {
                    if !self.files.contains_key(&path) {
                        return Err(enoent());
                    }
                    HandleMode::Read { pos: 0 }
                }
                other => return Err(error(&format!("ValueError: mode {other}"))),
            };
            self.handle = Some(Handle { path, mode });
            return Ok(());
        }
        if let Some(args) = call_args(code, "f.write") {
            let data = if args.trim_start().starts_with('b') {
                literal::parse_bytes(args)
            } else {
                literal::parse_str(args).map(String::into_bytes)
            }
            .map_err(|e| error(&format!("SyntaxError: {}", e.0)))?;
            let handle = self
                .handle
                .as_ref()
                .ok_or_else(|| error("NameError: name 'f' isn't defined"))?;
            if !matches!(handle.mode, HandleMode::Write) {
                return Err(error("OSError: [Errno 9] EBADF"));
            }
            if let Some(file) = self.files.get_mut(&handle.path) {
                file.extend_from_slice(&data);
            }
            return Ok(());
        }
        if code == "f.flush()" {
            return match self.handle {
                Some(_) => Ok(()),
                None => Err(error("NameError: name 'f' isn't defined")),
            };
        }
        if code == "f.close()" {
            self.handle = None;
            return Ok(());
        }
        Err(error("SyntaxError: unsupported statement"))
    }

    fn evaluate(&mut self, expr: &str) -> Result<String, RemoteError> {
        let enoent = || RemoteError::exception(expr, "OSError: [Errno 2] ENOENT");

        if let Some(args) = call_args(expr, "os.listdir") {
            let path = path_arg(expr, args)?;
            if !self.dirs.contains(&path) {
                return Err(enoent());
            }
            let names: Vec<String> = self.children(&path).iter().map(|n| quote_str(n)).collect();
            return Ok(format!("[{}]", names.join(", ")));
        }
        if let Some(args) = expr
            .strip_suffix("[0]")
            .and_then(|rest| call_args(rest, "os.stat"))
        {
            let path = path_arg(expr, args)?;
            if self.dirs.contains(&path) {
                return Ok(S_IFDIR.to_string());
            }
            if self.files.contains_key(&path) {
                return Ok(S_IFREG.to_string());
            }
            return Err(enoent());
        }
        if let Some(args) = expr
            .strip_suffix(".read()")
            .and_then(|rest| call_args(rest, "open"))
        {
            let path = path_arg(expr, args)?;
            let content = self.files.get(&path).ok_or_else(enoent)?;
            return Ok(quote_str(&String::from_utf8_lossy(content)));
        }
        if let Some(args) = call_args(expr, "f.read") {
            let size: usize = args.trim().parse().map_err(|_| {
                RemoteError::exception(expr, "TypeError: can't convert to int")
            })?;
            let Some(Handle {
                path,
                mode: HandleMode::Read { pos },
            }) = self.handle.as_mut()
            else {
                return Err(RemoteError::exception(expr, "OSError: [Errno 9] EBADF"));
            };
            let content = self.files.get(path.as_str()).ok_or_else(enoent)?;
            let end = (*pos + size).min(content.len());
            let chunk = &content[*pos..end];
            *pos = end;
            return Ok(literal::bytes_literal(chunk));
        }
        Err(RemoteError::exception(expr, "SyntaxError: unsupported expression"))
    }
}

/// Arguments text of `func(...)` when `code` is exactly such a call
fn call_args<'a>(code: &'a str, func: &str) -> Option<&'a str> {
    code.strip_prefix(func)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn open_args(args: &str) -> Result<(String, String), LiteralError> {
    let mut parser = LiteralParser::new(args);
    let path = parser.string()?;
    parser.expect(',')?;
    let mode = parser.string()?;
    parser.end()?;
    Ok((path, mode))
}

fn path_arg(code: &str, args: &str) -> Result<String, RemoteError> {
    literal::parse_str(args)
        .map_err(|e| RemoteError::exception(code, format!("SyntaxError: {}", e.0)))
}

impl Transport for MemoryBoard {
    fn open(&mut self) -> Result<(), RemoteError> {
        if !self.open {
            self.open = true;
            self.opens += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        if self.open {
            self.open = false;
            self.closes += 1;
            self.handle = None;
            self.deferred = None;
        }
        Ok(())
    }

    fn exec(&mut self, code: &str) -> Result<(), RemoteError> {
        self.check_ready()?;
        self.issued.push(Issued::Exec(code.to_string()));
        if let Some(err) = self.injected_failure(code) {
            return Err(err);
        }
        self.run(code)
    }

    fn exec_no_wait(&mut self, code: &str) -> Result<(), RemoteError> {
        self.check_ready()?;
        self.issued.push(Issued::ExecNoWait(code.to_string()));
        let result = match self.injected_failure(code) {
            Some(err) => Err(err),
            None => self.run(code),
        };
        // Like the raw REPL, the outcome is only observed by the next call
        self.deferred = result.err();
        Ok(())
    }

    fn eval(&mut self, expr: &str) -> Result<String, RemoteError> {
        self.check_ready()?;
        self.issued.push(Issued::Eval(expr.to_string()));
        if let Some(err) = self.injected_failure(expr) {
            return Err(err);
        }
        self.evaluate(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_board() -> MemoryBoard {
        let mut board = MemoryBoard::new();
        board.open().unwrap();
        board
    }

    #[test]
    fn test_mkdir_requires_parent() {
        let mut board = open_board();
        assert!(board.exec("os.mkdir('/a/b')").is_err());
        board.exec("os.mkdir('/a')").unwrap();
        board.exec("os.mkdir('/a/b')").unwrap();
        assert!(board.has_dir("/a/b"));
        assert!(board.exec("os.mkdir('/a')").is_err());
    }

    #[test]
    fn test_rmdir_requires_empty() {
        let mut board = open_board();
        board.add_file("/a/x.py", b"");
        assert!(board.exec("os.rmdir('/a')").is_err());
        board.exec("os.remove('/a/x.py')").unwrap();
        board.exec("os.rmdir('/a')").unwrap();
        assert_eq!(board.dir_paths(), ["/"]);
    }

    #[test]
    fn test_write_text_decodes_python_escapes() {
        let mut board = open_board();
        board.exec("f = open('/t.py', 'w')").unwrap();
        board.exec_no_wait("f.write('it\\'s\\n')").unwrap();
        board.exec("f.close()").unwrap();
        assert_eq!(board.file("/t.py").unwrap(), b"it's\n");
    }

    #[test]
    fn test_listdir_and_stat() {
        let mut board = open_board();
        board.add_file("/apps/b.py", b"");
        board.add_dir("/apps/a");

        assert_eq!(board.eval("os.listdir('/apps')").unwrap(), "['a', 'b.py']");
        assert_eq!(board.eval("os.stat('/apps/a')[0]").unwrap(), "16384");
        assert_eq!(board.eval("os.stat('/apps/b.py')[0]").unwrap(), "32768");
        assert!(board.eval("os.stat('/nope')[0]").is_err());
    }

    #[test]
    fn test_no_wait_failure_is_deferred() {
        let mut board = open_board();
        board.exec_no_wait("f.write('x\\n')").unwrap();
        assert!(board.exec("f.flush()").is_err());
        // The deferred error is consumed once
        board.exec("import os").unwrap();
    }

    #[test]
    fn test_injected_failure() {
        let mut board = open_board();
        board.fail_when("os.mkdir");
        assert!(matches!(
            board.exec("os.mkdir('/x')"),
            Err(RemoteError::Exception { .. })
        ));
        assert!(!board.has_dir("/x"));
    }

    #[test]
    fn test_statements_require_open_session() {
        let mut board = MemoryBoard::new();
        assert!(matches!(board.exec("import os"), Err(RemoteError::Closed)));
    }
}
