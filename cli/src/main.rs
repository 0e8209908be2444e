//! Command-line front end for sniffing a program image's architecture/OS and inspecting the
//! memory map a fresh instance resolves for it.

use anyhow::Result;

use crate::{action::map::map, action::sniff::sniff, cli::Action};

pub mod action;
pub mod cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli::get_action() {
        Action::Sniff(config) => sniff(config)?,
        Action::Map(config) => map(config)?,
    }

    Ok(())
}
