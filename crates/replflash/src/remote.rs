//! Remote filesystem access over a raw REPL session
//!
//! This module provides:
//! - `Session`: exclusive use of a transport, torn down on every exit path
//! - Typed queries (`list_dir`, `is_file`, `exists`) wrapping expression evaluation
//! - `RemoteFileWriter`: rebuilding a file on the board statement by statement

pub mod literal;
mod path;
mod query;
mod writer;

pub use path::{APP_ROOT, BOOTSTRAP_FILE, RemotePath};
pub use writer::{RemoteFileWriter, WriteMode, read_chunks};

use crate::transport::{RemoteError, Transport};

/// One raw REPL connection.
///
/// Holds the transport exclusively for its lifetime. Dropping the session
/// leaves raw mode and closes the channel, whether or not the last
/// statement succeeded.
pub struct Session<'t> {
    transport: &'t mut dyn Transport,
    open: bool,
}

impl<'t> Session<'t> {
    /// Open the transport and prepare the board for filesystem statements
    pub fn open(transport: &'t mut dyn Transport) -> Result<Self, RemoteError> {
        transport.open()?;
        let mut session = Self {
            transport,
            open: true,
        };
        // If the prelude fails, dropping `session` still closes the channel
        session.exec("import os")?;
        Ok(session)
    }

    /// Run a statement and wait for it
    pub fn exec(&mut self, code: &str) -> Result<(), RemoteError> {
        tracing::debug!(target: "remote", "exec: {}", code);
        self.transport.exec(code)
    }

    /// Run a statement without waiting for its output
    pub fn exec_no_wait(&mut self, code: &str) -> Result<(), RemoteError> {
        tracing::debug!(target: "remote", "exec (no wait): {}", code);
        self.transport.exec_no_wait(code)
    }

    /// Evaluate an expression and return its `repr`
    pub fn eval(&mut self, expr: &str) -> Result<String, RemoteError> {
        let value = self.transport.eval(expr)?;
        tracing::debug!(target: "remote", "eval: {} -> {}", expr, value);
        Ok(value)
    }

    /// Close the session explicitly, surfacing a teardown failure
    pub fn close(mut self) -> Result<(), RemoteError> {
        self.open = false;
        self.transport.close()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.transport.close() {
                tracing::warn!("Failed to close raw REPL session: {}", e);
            }
        }
    }
}
