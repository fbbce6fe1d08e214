//! Content encoder
//!
//! Turns one local file into the statements that rebuild it on the board:
//! - Text files are escaped and appended line by line, with a flush and a
//!   short pause every few lines so the board's input buffer is not flooded
//! - Binary files are sent as 64 byte `bytes` literals, each followed by a flush

use camino::Utf8Path;
use std::fs::File;
use std::io::Read;
use std::thread;
use std::time::Duration;

use crate::remote::{RemoteFileWriter, RemotePath, Session, WriteMode};
use crate::transport::RemoteError;
use crate::{Error, Result};

use super::plan::TransferMode;

/// Size of one binary chunk
pub const BINARY_CHUNK_SIZE: usize = 64;

/// Lines sent between two text flushes, unless configured otherwise
pub const DEFAULT_FLUSH_EVERY: usize = 5;

/// Pause after each text flush, unless configured otherwise
pub const DEFAULT_FLUSH_PAUSE: Duration = Duration::from_millis(20);

/// Flow control for text transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPacing {
    /// Lines between two flushes
    pub flush_every: usize,
    /// Pause after each flush
    pub pause: Duration,
}

impl Default for TextPacing {
    fn default() -> Self {
        Self {
            flush_every: DEFAULT_FLUSH_EVERY,
            pause: DEFAULT_FLUSH_PAUSE,
        }
    }
}

/// Escape one line for the single-quoted literal of `f.write('...')`.
///
/// Substitutions are applied in this order: single quote, double quote,
/// then the two-character sequences `\r` and `\n` already present in the
/// text. Other backslashes are left alone, so a line such as `a\\n` is
/// not reproduced exactly on the board.
///
/// A line ending in a backslash is worse: with the line terminator it
/// becomes `f.write('...\\n')`, so the board writes a literal backslash-n
/// and no newline, and the line runs into the next one. Send such files
/// as binary.
pub fn escape_for_remote_literal(line: &str) -> String {
    line.replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace("\\r", "\\\\r")
        .replace("\\n", "\\\\n")
}

/// Send a local file in the given mode, returning the bytes read
pub fn encode(
    session: &mut Session<'_>,
    local: &Utf8Path,
    remote: &RemotePath,
    mode: TransferMode,
    pacing: &TextPacing,
) -> Result<u64> {
    match mode {
        TransferMode::Text => encode_text(session, local, remote, pacing),
        TransferMode::Binary => encode_binary(session, local, remote),
    }
}

/// Send a local text file line by line
pub fn encode_text(
    session: &mut Session<'_>,
    local: &Utf8Path,
    remote: &RemotePath,
    pacing: &TextPacing,
) -> Result<u64> {
    // Read everything first so a decoding failure never leaves a truncated remote file
    let content = std::fs::read_to_string(local).map_err(|e| Error::local_io(local, e))?;
    tracing::debug!(file = %local, remote = %remote, "Sending as text");

    write_lines(session, remote, content.lines(), pacing)
        .map_err(|e| Error::transfer(local, remote, e))?;

    Ok(content.len() as u64)
}

/// Write `lines` to a remote text file, replacing its content
pub fn write_lines<'l>(
    session: &mut Session<'_>,
    remote: &RemotePath,
    lines: impl IntoIterator<Item = &'l str>,
    pacing: &TextPacing,
) -> std::result::Result<(), RemoteError> {
    let flush_every = pacing.flush_every.max(1);
    let mut writer = RemoteFileWriter::create(session, remote, WriteMode::Text)?;

    for (i, line) in lines.into_iter().enumerate() {
        tracing::trace!("{} > '{}'", i + 1, line);
        writer.write_escaped_line(&escape_for_remote_literal(line))?;

        if (i + 1) % flush_every == 0 {
            writer.flush()?;
            if !pacing.pause.is_zero() {
                thread::sleep(pacing.pause);
            }
        }
    }

    writer.close()
}

/// Send a local file as raw byte chunks
pub fn encode_binary(
    session: &mut Session<'_>,
    local: &Utf8Path,
    remote: &RemotePath,
) -> Result<u64> {
    let mut file = File::open(local).map_err(|e| Error::local_io(local, e))?;
    tracing::debug!(file = %local, remote = %remote, "Sending as binary");

    let mut writer = RemoteFileWriter::create(session, remote, WriteMode::Binary)
        .map_err(|e| Error::transfer(local, remote, e))?;

    let mut buffer = [0u8; BINARY_CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = file.read(&mut buffer).map_err(|e| Error::local_io(local, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_bytes(&buffer[..n])
            .and_then(|()| writer.flush())
            .map_err(|e| Error::transfer(local, remote, e))?;
        sent += n as u64;
    }

    writer
        .close()
        .map_err(|e| Error::transfer(local, remote, e))?;
    Ok(sent)
}
