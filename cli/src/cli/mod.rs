//! Command line parsing and [`Action`] construction.

use clap::Command;

use crate::cli::{map::MapConfig, sniff::SniffConfig};

pub mod map;
pub mod sniff;

/// The action to carry out.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Action {
    /// Classify an image's architecture and OS.
    Sniff(SniffConfig),
    /// Build an instance for an image and print its resolved memory map.
    Map(MapConfig),
}

/// Parses `binhost-cli`'s arguments to construct an [`Action`].
pub fn get_action() -> Action {
    let matches = command_parser().get_matches();

    let Some((subcommand_name, subcommand_matches)) = matches.subcommand() else {
        unreachable!("subcommand is required");
    };
    match subcommand_name {
        "sniff" => Action::Sniff(sniff::parse_arguments(subcommand_matches)),
        "map" => Action::Map(map::parse_arguments(subcommand_matches)),
        _ => unreachable!("unexpected subcommand: {subcommand_name:?}"),
    }
}

/// Returns the command parser for all [`Action`]s.
fn command_parser() -> Command {
    Command::new("binhost")
        .about("Sniffs and maps guest program images")
        .subcommand(sniff::subcommand_parser())
        .subcommand(map::subcommand_parser())
        .subcommand_required(true)
        .arg_required_else_help(true)
}
