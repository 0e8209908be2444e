//! Command line parsing and [`Action::Map`][am] construction.
//!
//! [am]: crate::cli::Action::Map

use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, value_parser};

/// Description of the `map` subcommand's parameters.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct MapConfig {
    /// Path of the image to build an instance for.
    pub path: PathBuf,
}

/// Parses the arguments required to produce a valid [`MapConfig`].
pub fn parse_arguments(matches: &ArgMatches) -> MapConfig {
    let path = matches
        .get_one::<PathBuf>("path")
        .cloned()
        .unwrap_or_else(|| unreachable!("`path` is a required argument"));

    MapConfig { path }
}

/// Returns the command parser for an [`Action::Map`][am].
///
/// [am]: crate::cli::Action::Map
pub fn subcommand_parser() -> Command {
    let path = Arg::new("path").value_parser(value_parser!(PathBuf)).required(true);

    Command::new("map")
        .about("Builds an instance for an image and prints its resolved memory map")
        .arg(path)
}
