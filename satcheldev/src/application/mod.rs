pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use satchel_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    handlers::init_tracing();
    match cli.command {
        Commands::Export {
            at,
            out_dir,
            prefix,
            profile,
            codec,
            min_gain,
        } => handlers::handle_export(at, out_dir, prefix, profile, codec, min_gain),
        Commands::Import { archive, at } => handlers::handle_import(archive, at),
        Commands::List { archive } => handlers::handle_list(archive),
        Commands::Send { at, net } => handlers::handle_send(at, net),
        Commands::Receive { at, net } => handlers::handle_receive(at, net),
        Commands::Config { net } => handlers::handle_config(net),
    }
}
