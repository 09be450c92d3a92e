//! Core infrastructure: configuration and its constants

pub mod config;
pub mod constants;

pub use config::{ClickhouseConfig, ClickhouseFileConfig, FileConfig};
