//! CLI subcommands

pub mod autorun;
pub mod deploy;
pub mod dump;
pub mod ls;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::transport::{RawRepl, SerialStream};
use crate::{Error, Result};

/// State shared by every subcommand
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory holding `replflash.toml`
    pub project_root: Utf8PathBuf,
    /// Effective configuration
    pub config: Config,
    /// Serial device node of the board
    pub port: Utf8PathBuf,
}

impl Context {
    /// Load the configuration of `project_root`; `port` overrides the configured device
    pub fn load(project_root: &Utf8Path, port: Option<Utf8PathBuf>) -> Result<Self> {
        let config = Config::load(project_root)?;
        let port = port.unwrap_or_else(|| config.device.port.clone());
        Ok(Self {
            project_root: project_root.to_path_buf(),
            config,
            port,
        })
    }

    /// Open the board's serial device without entering raw mode yet
    pub fn open_device(&self) -> Result<RawRepl<SerialStream>> {
        if !self.port.exists() {
            return Err(Error::precondition(
                format!("Device {} not found", self.port),
                "Connect the board, or pass --port or set [device] port in replflash.toml",
            ));
        }
        tracing::debug!("Opening {}", self.port);
        let device = &self.config.device;
        Ok(RawRepl::open_device(
            &self.port,
            device.baud_rate,
            device.timeout(),
        )?)
    }
}
