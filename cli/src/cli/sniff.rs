//! Command line parsing and [`Action::Sniff`][as_] construction.
//!
//! [as_]: crate::cli::Action::Sniff

use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, value_parser};

/// Description of the `sniff` subcommand's parameters.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SniffConfig {
    /// Path of the image to classify.
    pub path: PathBuf,
}

/// Parses the arguments required to produce a valid [`SniffConfig`].
pub fn parse_arguments(matches: &ArgMatches) -> SniffConfig {
    let path = matches
        .get_one::<PathBuf>("path")
        .cloned()
        .unwrap_or_else(|| unreachable!("`path` is a required argument"));

    SniffConfig { path }
}

/// Returns the command parser for an [`Action::Sniff`][as_].
///
/// [as_]: crate::cli::Action::Sniff
pub fn subcommand_parser() -> Command {
    let path = Arg::new("path").value_parser(value_parser!(PathBuf)).required(true);

    Command::new("sniff")
        .about("Classifies an image's architecture and OS from its leading bytes")
        .arg(path)
}
