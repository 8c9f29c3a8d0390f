//! Subcommand implementations

pub mod optimize;
pub mod predict;
pub mod status;
pub mod train;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Parse a JSON argument given either inline or as a file path
pub fn read_json_arg<T: DeserializeOwned>(arg: &str) -> Result<T> {
    let trimmed = arg.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).context("Failed to parse inline JSON");
    }

    let content =
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read {}", arg))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", arg))
}
