//! Reads an image and runs the sniffer on it, given a [`SniffConfig`].

use anyhow::{Context, Result};

use crate::cli::sniff::SniffConfig;

/// Classifies `config.path`'s architecture and OS and prints the result.
///
/// # Errors
///
/// Returns an error if the file cannot be read, or if it could not be classified.
pub fn sniff(config: SniffConfig) -> Result<()> {
    let bytes = std::fs::read(&config.path)
        .with_context(|| format!("reading {}", config.path.display()))?;

    let (arch, os) = binhost_sniff::sniff(&bytes)
        .with_context(|| format!("classifying {}", config.path.display()))?;

    println!("{}: {arch} {os}", config.path.display());

    Ok(())
}
