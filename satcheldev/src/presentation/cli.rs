use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use satchel_core::ArchiveProfile;
use satchel_core::archive::export::DEFAULT_PREFIX;
use satchel_core::codec::{Codec, DEFAULT_MIN_GAIN};

#[derive(Parser)]
#[command(author, version, about = "satcheldev CLI (alpha)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the records and their media live on this machine.
#[derive(Args, Debug, Clone)]
pub struct Location {
    /// JSON record store file (created on first write)
    pub store: PathBuf,
    /// directory that relative image/voice paths resolve against
    pub media_root: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NetArgs {
    /// JSON file with transfer settings; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TCP port for the archive stream
    #[arg(long)]
    pub port: Option<u16>,

    /// UDP port for discovery
    #[arg(long = "discovery-port")]
    pub discovery_port: Option<u16>,

    /// Send discovery only to these addresses (repeatable)
    #[arg(long = "target")]
    pub targets: Vec<IpAddr>,

    /// archive profile: transfer (voices only) or full
    #[arg(long)]
    pub profile: Option<ArchiveProfile>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a backup archive of the store into a directory
    Export {
        #[command(flatten)]
        at: Location,
        out_dir: PathBuf,

        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,

        #[arg(long, default_value = "full")]
        profile: ArchiveProfile,

        #[arg(long, default_value = "deflate")]
        codec: Codec,

        /// min compression gain before falling back to STORE
        #[arg(long, default_value_t = DEFAULT_MIN_GAIN)]
        min_gain: f32,
    },

    /// Replace the store's contents with a backup archive
    Import {
        archive: PathBuf,
        #[command(flatten)]
        at: Location,
    },

    /// List archive contents
    List { archive: PathBuf },

    /// Find a receiver on the local network and send the store to it
    Send {
        #[command(flatten)]
        at: Location,
        #[command(flatten)]
        net: NetArgs,
    },

    /// Wait for a sender and replace the store with what it sends
    Receive {
        #[command(flatten)]
        at: Location,
        #[command(flatten)]
        net: NetArgs,
    },

    /// Print the effective transfer settings as JSON
    Config {
        #[command(flatten)]
        net: NetArgs,
    },
}
