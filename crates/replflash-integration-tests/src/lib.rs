//! Shared helpers for replflash integration tests

pub mod fixture;
