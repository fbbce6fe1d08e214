//! Remote execution channel to the board
//!
//! This module provides:
//! - `Transport`: the statement/expression primitives every higher layer uses
//! - `RawRepl`: the MicroPython raw REPL protocol over a serial byte stream
//! - `MemoryBoard`: a simulated board that interprets the statements replflash emits

mod memory;
mod raw_repl;

pub use memory::{Issued, MemoryBoard};
pub use raw_repl::{RawRepl, SerialStream};

use thiserror::Error;

/// Failure of a remote statement or of the channel carrying it
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The serial channel failed
    #[error("channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The serial device could not be opened or configured
    #[error("cannot open serial device: {0}")]
    Serial(#[from] serialport::Error),

    /// The statement raised on the board
    #[error("remote exception: {traceback}")]
    Exception { code: String, traceback: String },

    /// The board answered with bytes the raw REPL protocol does not allow
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A statement was issued outside an open session
    #[error("raw REPL session is not open")]
    Closed,

    /// An expression result could not be parsed as the expected value
    #[error("cannot parse remote value {value:?} as {expected}")]
    Unparseable { value: String, expected: &'static str },
}

impl RemoteError {
    /// Create an exception error for `code`
    pub fn exception(code: &str, traceback: impl Into<String>) -> Self {
        Self::Exception {
            code: code.to_string(),
            traceback: traceback.into(),
        }
    }
}

/// Remote execution primitives of a raw REPL channel
///
/// Implementations never interpret file semantics; they only run code.
pub trait Transport {
    /// Acquire the channel and switch the board into raw mode
    fn open(&mut self) -> Result<(), RemoteError>;

    /// Leave raw mode and release the channel.
    ///
    /// Must be safe to call after a failed statement and more than once.
    fn close(&mut self) -> Result<(), RemoteError>;

    /// Run a statement and wait for it to finish
    fn exec(&mut self, code: &str) -> Result<(), RemoteError>;

    /// Run a statement without waiting for its output.
    ///
    /// A failure of the statement surfaces on the next call.
    fn exec_no_wait(&mut self, code: &str) -> Result<(), RemoteError>;

    /// Evaluate an expression and return its printed `repr`
    fn eval(&mut self, expr: &str) -> Result<String, RemoteError>;
}
