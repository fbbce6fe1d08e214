//! MicroPython raw REPL protocol
//!
//! The board accepts a block of code terminated by Ctrl-D, answers `OK`,
//! runs it, and then prints stdout, `\x04`, stderr, `\x04` and the `>` prompt.
//!
//! Every read is bounded by the stream's timeout; a board that stays silent
//! longer than that fails the session with a protocol error.

use camino::Utf8Path;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use super::{RemoteError, Transport};

const CTRL_A: u8 = 0x01;
const CTRL_B: u8 = 0x02;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;

const RAW_REPL_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";

/// Code is written in slices of this size so the board's input buffer keeps up
const WRITE_SLICE: usize = 256;

/// Raw REPL session over a serial byte stream
pub struct RawRepl<S: Read + Write> {
    stream: S,
    in_raw_mode: bool,
    pending_follow: Option<String>,
    slice_pause: Duration,
}

/// Serial port opened in raw mode with a read timeout
pub type SerialStream = Box<dyn serialport::SerialPort>;

impl RawRepl<SerialStream> {
    /// Open a serial device node such as `/dev/ttyACM0`.
    ///
    /// The line is put in raw 8N1 mode without flow control, and each read
    /// waits at most `timeout` for the board.
    pub fn open_device(
        path: &Utf8Path,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let port = serialport::new(path.as_str(), baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()?;
        Ok(Self::new(port))
    }
}

/// Turn a read timeout into a protocol error naming what was awaited
fn read_error(err: io::Error, waiting_for: &[u8]) -> RemoteError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => RemoteError::Protocol(format!(
            "board did not answer while waiting for {:?}",
            String::from_utf8_lossy(waiting_for)
        )),
        _ => RemoteError::Io(err),
    }
}

impl<S: Read + Write> RawRepl<S> {
    /// Wrap an already connected stream
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            in_raw_mode: false,
            pending_follow: None,
            slice_pause: Duration::from_millis(10),
        }
    }

    /// Set the pause between written slices of one statement
    pub fn with_slice_pause(mut self, pause: Duration) -> Self {
        self.slice_pause = pause;
        self
    }

    /// Consume the session and return the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read until `ending` has been received, returning everything before it
    fn read_until(&mut self, ending: &[u8]) -> Result<Vec<u8>, RemoteError> {
        let mut data = Vec::new();
        let mut byte = [0u8; 1];
        while !data.ends_with(ending) {
            let n = match self.stream.read(&mut byte) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_error(e, ending)),
            };
            if n == 0 {
                return Err(RemoteError::Protocol(format!(
                    "channel closed while waiting for {:?}",
                    String::from_utf8_lossy(ending)
                )));
            }
            data.push(byte[0]);
        }
        data.truncate(data.len() - ending.len());
        Ok(data)
    }

    fn send_code(&mut self, code: &str) -> Result<(), RemoteError> {
        if !self.in_raw_mode {
            return Err(RemoteError::Closed);
        }
        self.drain_pending()?;

        for slice in code.as_bytes().chunks(WRITE_SLICE) {
            self.stream.write_all(slice)?;
            if !self.slice_pause.is_zero() && code.len() > WRITE_SLICE {
                thread::sleep(self.slice_pause);
            }
        }
        self.stream.write_all(&[CTRL_D])?;
        self.stream.flush()?;

        let mut ack = [0u8; 2];
        self.stream
            .read_exact(&mut ack)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    RemoteError::Protocol("channel closed while waiting for \"OK\"".to_string())
                }
                _ => read_error(e, b"OK"),
            })?;
        if &ack != b"OK" {
            return Err(RemoteError::Protocol(format!(
                "expected OK, got {:?}",
                String::from_utf8_lossy(&ack)
            )));
        }
        Ok(())
    }

    /// Read stdout and stderr of the last statement
    fn follow(&mut self, code: &str) -> Result<String, RemoteError> {
        let stdout = self.read_until(&[CTRL_D])?;
        let stderr = self.read_until(&[CTRL_D])?;
        self.read_until(b">")?;

        if !stderr.is_empty() {
            return Err(RemoteError::exception(
                code,
                String::from_utf8_lossy(&stderr).trim_end(),
            ));
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn drain_pending(&mut self) -> Result<(), RemoteError> {
        if let Some(code) = self.pending_follow.take() {
            self.follow(&code)?;
        }
        Ok(())
    }
}

impl<S: Read + Write> Transport for RawRepl<S> {
    fn open(&mut self) -> Result<(), RemoteError> {
        if self.in_raw_mode {
            return Ok(());
        }
        // Interrupt whatever is running, then request raw mode
        self.stream.write_all(&[b'\r', CTRL_C, CTRL_C])?;
        self.stream.write_all(&[b'\r', CTRL_A])?;
        self.stream.flush()?;
        self.read_until(RAW_REPL_BANNER)?;
        self.in_raw_mode = true;
        tracing::debug!("Entered raw REPL");
        Ok(())
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        if !self.in_raw_mode {
            return Ok(());
        }
        self.in_raw_mode = false;
        self.pending_follow = None;
        self.stream.write_all(&[b'\r', CTRL_B])?;
        self.stream.flush()?;
        tracing::debug!("Left raw REPL");
        Ok(())
    }

    fn exec(&mut self, code: &str) -> Result<(), RemoteError> {
        self.send_code(code)?;
        self.follow(code)?;
        Ok(())
    }

    fn exec_no_wait(&mut self, code: &str) -> Result<(), RemoteError> {
        self.send_code(code)?;
        self.pending_follow = Some(code.to_string());
        Ok(())
    }

    fn eval(&mut self, expr: &str) -> Result<String, RemoteError> {
        let code = format!("print(repr({}))", expr);
        self.send_code(&code)?;
        let output = self.follow(&code)?;
        Ok(output.trim().to_string())
    }
}
