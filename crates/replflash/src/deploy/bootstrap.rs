//! Bootstrap file management
//!
//! The board runs `/main.py` after every reset. replflash owns that file and
//! always rewrites it whole, in one of three states:
//! - cleared: a comment only
//! - path only: the application root is appended to `sys.path`
//! - entry point: path only, plus an import and a call of one function

use std::fmt;
use std::str::FromStr;

use crate::remote::{APP_ROOT, RemotePath, Session};
use crate::{Error, Result};

use super::encoder::{self, TextPacing};

const MANAGED_HEADER: &str = "# main.py: managed by replflash";
const CLEARED_MARKER: &str = "# nothing deployed";

/// Reference to a zero-argument function, as `package.module.function`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    module: String,
    function: String,
}

impl EntryPoint {
    /// Dotted module path
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Bare function name
    pub fn function(&self) -> &str {
        &self.function
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

impl FromStr for EntryPoint {
    type Err = Error;

    fn from_str(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let Some((module, function)) = reference.rsplit_once('.') else {
            return Err(Error::precondition(
                format!("Entry point '{}' has no module part", reference),
                "Use the form module.function, e.g. app.main.run",
            ));
        };
        if module.is_empty() || !module.split('.').all(is_identifier) || !is_identifier(function)
        {
            return Err(Error::precondition(
                format!("Entry point '{}' is not a valid dotted name", reference),
                "Module and function names must be Python identifiers separated by dots",
            ));
        }
        Ok(Self {
            module: module.to_string(),
            function: function.to_string(),
        })
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// Logical content of the bootstrap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing runs on boot
    Cleared,
    /// Deployed code is importable, nothing runs on boot
    PathOnly,
    /// Deployed code is importable and the function runs on boot
    EntryPoint(EntryPoint),
}

impl BootstrapState {
    /// Lines of the bootstrap file for this state
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![MANAGED_HEADER.to_string()];
        match self {
            BootstrapState::Cleared => lines.push(CLEARED_MARKER.to_string()),
            BootstrapState::PathOnly => lines.extend(path_lines()),
            BootstrapState::EntryPoint(entry) => {
                lines.extend(path_lines());
                lines.push(format!("from {} import {}", entry.module, entry.function));
                lines.push(format!("{}()", entry.function));
            }
        }
        lines
    }

    /// Recognise a bootstrap file written by `render`
    pub fn parse(content: &str) -> Option<Self> {
        let lines: Vec<&str> = content.lines().map(str::trim_end).collect();
        let path = path_lines();

        match lines.as_slice() {
            [header, marker] if *header == MANAGED_HEADER && *marker == CLEARED_MARKER => {
                Some(Self::Cleared)
            }
            [header, rest @ ..]
                if *header == MANAGED_HEADER
                    && rest.len() >= path.len()
                    && rest.iter().zip(&path).all(|(line, expected)| line == expected) =>
            {
                match &rest[path.len()..] {
                    [] => Some(Self::PathOnly),
                    [import, call] => {
                        let (module, function) = import
                            .strip_prefix("from ")?
                            .split_once(" import ")?;
                        if *call != format!("{}()", function) {
                            return None;
                        }
                        format!("{}.{}", module, function)
                            .parse::<EntryPoint>()
                            .ok()
                            .map(Self::EntryPoint)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapState::Cleared => f.write_str("cleared"),
            BootstrapState::PathOnly => write!(f, "{} on sys.path, no autorun", APP_ROOT),
            BootstrapState::EntryPoint(entry) => write!(f, "runs {}() on boot", entry),
        }
    }
}

fn path_lines() -> Vec<String> {
    vec![
        "import sys".to_string(),
        format!("sys.path.append('{}')", APP_ROOT),
    ]
}

/// What the board's bootstrap file currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedBootstrap {
    /// There is no bootstrap file
    Missing,
    /// A file written by replflash
    Managed(BootstrapState),
    /// A file replflash did not write
    Unmanaged,
}

/// Reads and rewrites the bootstrap file
pub struct BootstrapManager {
    pacing: TextPacing,
}

impl BootstrapManager {
    /// Create a manager writing with the given text pacing
    pub fn new(pacing: TextPacing) -> Self {
        Self { pacing }
    }

    /// Rewrite the bootstrap file for `state`
    pub fn write(&self, session: &mut Session<'_>, state: &BootstrapState) -> Result<()> {
        tracing::info!("Bootstrap: {}", state);
        let lines = state.render();
        encoder::write_lines(
            session,
            &RemotePath::bootstrap_file(),
            lines.iter().map(String::as_str),
            &self.pacing,
        )?;
        Ok(())
    }

    /// Nothing runs on boot
    pub fn clear(&self, session: &mut Session<'_>) -> Result<BootstrapState> {
        self.transition(session, BootstrapState::Cleared)
    }

    /// Make deployed code importable without running anything
    pub fn init_path_only(&self, session: &mut Session<'_>) -> Result<BootstrapState> {
        self.transition(session, BootstrapState::PathOnly)
    }

    /// Run `entry` on boot, on top of the path-only state
    pub fn set_entry_point(
        &self,
        session: &mut Session<'_>,
        entry: &EntryPoint,
    ) -> Result<BootstrapState> {
        self.transition(session, BootstrapState::EntryPoint(entry.clone()))
    }

    /// Remove the autorun call.
    ///
    /// Keeps deployed code importable when the application root exists,
    /// clears the file otherwise.
    pub fn clear_main(&self, session: &mut Session<'_>) -> Result<BootstrapState> {
        if session.exists(&RemotePath::app_root())? {
            self.init_path_only(session)
        } else {
            self.clear(session)
        }
    }

    /// Read the current bootstrap file
    pub fn read(&self, session: &mut Session<'_>) -> Result<ObservedBootstrap> {
        let file = RemotePath::bootstrap_file();
        if !session.exists(&file)? {
            return Ok(ObservedBootstrap::Missing);
        }
        let content = session.read_text(&file)?;
        Ok(match BootstrapState::parse(&content) {
            Some(state) => ObservedBootstrap::Managed(state),
            None => ObservedBootstrap::Unmanaged,
        })
    }

    fn transition(
        &self,
        session: &mut Session<'_>,
        state: BootstrapState,
    ) -> Result<BootstrapState> {
        self.write(session, &state)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBoard;
    use std::time::Duration;

    fn manager() -> BootstrapManager {
        BootstrapManager::new(TextPacing {
            flush_every: 5,
            pause: Duration::ZERO,
        })
    }

    fn bootstrap_text(board: &MemoryBoard) -> String {
        String::from_utf8(board.file("/main.py").unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_entry_point_parse() {
        let entry: EntryPoint = "pkg.mod.run".parse().unwrap();
        assert_eq!(entry.module(), "pkg.mod");
        assert_eq!(entry.function(), "run");
        assert_eq!(entry.to_string(), "pkg.mod.run");
    }

    #[test]
    fn test_entry_point_requires_separator() {
        let err = "run".parse::<EntryPoint>().unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_entry_point_rejects_bad_names() {
        for reference in [".run", "pkg.", "pkg..run", "pkg.mod.run()", "1pkg.run", "a-b.run"] {
            assert!(
                reference.parse::<EntryPoint>().is_err(),
                "{reference} should be rejected"
            );
        }
    }

    #[test]
    fn test_render_states() {
        assert_eq!(
            BootstrapState::Cleared.render(),
            [MANAGED_HEADER, CLEARED_MARKER]
        );
        assert_eq!(
            BootstrapState::PathOnly.render(),
            [MANAGED_HEADER, "import sys", "sys.path.append('/apps')"]
        );
        let entry = BootstrapState::EntryPoint("pkg.mod.run".parse().unwrap()).render();
        assert_eq!(&entry[..3], BootstrapState::PathOnly.render().as_slice());
        assert_eq!(&entry[3..], ["from pkg.mod import run", "run()"]);
    }

    #[test]
    fn test_parse_recognises_rendered_states() {
        let states = [
            BootstrapState::Cleared,
            BootstrapState::PathOnly,
            BootstrapState::EntryPoint("app.main.start".parse().unwrap()),
        ];
        for state in states {
            let content = state.render().join("\n") + "\n";
            assert_eq!(BootstrapState::parse(&content), Some(state));
        }
        assert_eq!(BootstrapState::parse("print('hello')\n"), None);
    }

    #[test]
    fn test_written_file_content() {
        let mut board = MemoryBoard::new();
        {
            let mut session = Session::open(&mut board).unwrap();
            let entry = "pkg.mod.run".parse().unwrap();
            manager().set_entry_point(&mut session, &entry).unwrap();
        }
        assert_eq!(
            bootstrap_text(&board),
            "# main.py: managed by replflash\nimport sys\nsys.path.append('/apps')\nfrom pkg.mod import run\nrun()\n"
        );
    }

    #[test]
    fn test_clear_main_with_app_root() {
        let mut board = MemoryBoard::new();
        board.add_dir("/apps");
        let state = {
            let mut session = Session::open(&mut board).unwrap();
            manager().clear_main(&mut session).unwrap()
        };
        assert_eq!(state, BootstrapState::PathOnly);
        assert_eq!(
            BootstrapState::parse(&bootstrap_text(&board)),
            Some(BootstrapState::PathOnly)
        );
    }

    #[test]
    fn test_clear_main_without_app_root() {
        let mut board = MemoryBoard::new();
        board.add_file("/main.py", b"import app\n");
        let state = {
            let mut session = Session::open(&mut board).unwrap();
            manager().clear_main(&mut session).unwrap()
        };
        assert_eq!(state, BootstrapState::Cleared);
        assert_eq!(
            BootstrapState::parse(&bootstrap_text(&board)),
            Some(BootstrapState::Cleared)
        );
    }

    #[test]
    fn test_read_observed_states() {
        let mut board = MemoryBoard::new();
        {
            let mut session = Session::open(&mut board).unwrap();
            assert_eq!(manager().read(&mut session).unwrap(), ObservedBootstrap::Missing);
            manager().init_path_only(&mut session).unwrap();
            assert_eq!(
                manager().read(&mut session).unwrap(),
                ObservedBootstrap::Managed(BootstrapState::PathOnly)
            );
        }

        board.add_file("/main.py", b"import machine\n");
        let mut session = Session::open(&mut board).unwrap();
        assert_eq!(manager().read(&mut session).unwrap(), ObservedBootstrap::Unmanaged);
    }
}
