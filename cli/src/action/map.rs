//! Builds an [`Instance`][binhost::Instance] for an image and prints its resolved memory map,
//! given a [`MapConfig`].

use anyhow::{Context, Result};
use binhost_dispatch::Registry;

use crate::cli::map::MapConfig;

/// Builds an instance for `config.path` and prints the table [`show_mapinfo`][smi] would, plus
/// the resolved architecture, OS, and entry point.
///
/// [smi]: binhost_memory::MemoryManager::show_mapinfo
///
/// # Errors
///
/// Returns an error if the file cannot be read, or if resolving or loading it fails.
pub fn map(config: MapConfig) -> Result<()> {
    let bytes = std::fs::read(&config.path)
        .with_context(|| format!("reading {}", config.path.display()))?;

    let registry = Registry::with_defaults();
    let instance = binhost::Instance::from_image(&bytes, &registry)
        .with_context(|| format!("resolving {}", config.path.display()))?;

    println!(
        "{}: arch={:?} os={:?} entry={:#x} base={:#x}",
        config.path.display(),
        instance.arch.arch,
        instance.os.os(),
        instance.loaded.entry_point,
        instance.loaded.base,
    );

    instance.mm.show_mapinfo();

    Ok(())
}
