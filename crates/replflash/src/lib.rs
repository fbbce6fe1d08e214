//! replflash - deploy MicroPython applications over the raw REPL
//!
//! This crate provides both a library and CLI for replflash, including:
//! - Configuration file parsing and merging
//! - A raw REPL transport and an in-memory simulated board
//! - Remote filesystem queries and file writing over a session
//! - Content encoding, directory mirroring and bootstrap management
//! - Deployment orchestration

pub mod commands;
pub mod config;
pub mod deploy;
pub mod error;
pub mod remote;
pub mod transport;

pub use error::{Error, Result};
