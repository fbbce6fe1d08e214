//! Rebuilding a file on the board from statements
//!
//! The board has no file-copy primitive, so a file is reconstructed by a
//! program that writes it: open a handle, append literals, flush, close.

use super::literal::{self, quote_str};
use super::{RemotePath, Session};
use crate::transport::RemoteError;

/// Name of the file handle variable on the board
const HANDLE: &str = "f";

/// How the remote file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `open(path, 'w')`
    Text,
    /// `open(path, 'wb')`
    Binary,
}

impl WriteMode {
    fn flag(self) -> &'static str {
        match self {
            WriteMode::Text => "w",
            WriteMode::Binary => "wb",
        }
    }
}

/// Open write handle to one remote file.
///
/// Opening truncates the remote file. Writes and flushes are sent without
/// waiting; `close` waits, so any deferred failure surfaces there at the
/// latest.
pub struct RemoteFileWriter<'s, 't> {
    session: &'s mut Session<'t>,
    path: RemotePath,
}

impl<'s, 't> RemoteFileWriter<'s, 't> {
    /// Open `path` for writing
    pub fn create(
        session: &'s mut Session<'t>,
        path: &RemotePath,
        mode: WriteMode,
    ) -> Result<Self, RemoteError> {
        session.exec(&format!(
            "{HANDLE} = open({}, {})",
            path.literal(),
            quote_str(mode.flag())
        ))?;
        Ok(Self {
            session,
            path: path.clone(),
        })
    }

    /// Remote path being written
    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    /// Append an already escaped line body followed by a newline
    pub fn write_escaped_line(&mut self, escaped: &str) -> Result<(), RemoteError> {
        self.session
            .exec_no_wait(&format!("{HANDLE}.write('{escaped}\\n')"))
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        self.session
            .exec_no_wait(&format!("{HANDLE}.write({})", literal::bytes_literal(data)))
    }

    /// Flush the remote handle
    pub fn flush(&mut self) -> Result<(), RemoteError> {
        self.session.exec_no_wait(&format!("{HANDLE}.flush()"))
    }

    /// Close the remote handle and wait for completion
    pub fn close(self) -> Result<(), RemoteError> {
        self.session.exec(&format!("{HANDLE}.close()"))
    }
}

/// Read a remote file in chunks of `chunk` bytes
pub fn read_chunks(
    session: &mut Session<'_>,
    path: &RemotePath,
    chunk: usize,
    mut on_chunk: impl FnMut(&[u8]),
) -> Result<(), RemoteError> {
    session.exec(&format!("{HANDLE} = open({}, 'rb')", path.literal()))?;
    loop {
        let value = session.eval(&format!("{HANDLE}.read({chunk})"))?;
        let data = literal::parse_bytes(&value).map_err(|_| RemoteError::Unparseable {
            value,
            expected: "bytes",
        })?;
        if data.is_empty() {
            break;
        }
        on_chunk(&data);
    }
    session.exec(&format!("{HANDLE}.close()"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBoard;

    #[test]
    fn test_text_writer_statements() {
        let mut board = MemoryBoard::new();
        board.add_dir("/apps");
        {
            let mut session = Session::open(&mut board).unwrap();
            let path = RemotePath::parse("/apps/a.py");
            let mut writer = RemoteFileWriter::create(&mut session, &path, WriteMode::Text).unwrap();
            writer.write_escaped_line("x = 1").unwrap();
            writer.flush().unwrap();
            writer.close().unwrap();
        }

        assert_eq!(
            board.statements(),
            [
                "import os",
                "f = open('/apps/a.py', 'w')",
                "f.write('x = 1\\n')",
                "f.flush()",
                "f.close()",
            ]
        );
        assert_eq!(board.file("/apps/a.py").unwrap(), b"x = 1\n");
    }

    #[test]
    fn test_binary_writer() {
        let mut board = MemoryBoard::new();
        {
            let mut session = Session::open(&mut board).unwrap();
            let path = RemotePath::parse("/blob.bin");
            let mut writer =
                RemoteFileWriter::create(&mut session, &path, WriteMode::Binary).unwrap();
            writer.write_bytes(&[0, 1, 0xfe]).unwrap();
            writer.close().unwrap();
        }
        assert_eq!(board.file("/blob.bin").unwrap(), [0u8, 1, 0xfe]);
    }

    #[test]
    fn test_read_chunks() {
        let mut board = MemoryBoard::new();
        let content: Vec<u8> = (0..40).collect();
        board.add_file("/data.bin", &content);

        let mut session = Session::open(&mut board).unwrap();
        let mut chunks = Vec::new();
        read_chunks(&mut session, &RemotePath::parse("/data.bin"), 16, |c| {
            chunks.push(c.to_vec())
        })
        .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), content);
    }
}
