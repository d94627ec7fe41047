use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Development loop for Python web apps: regenerates route and component
/// metadata on change, restarts the backend when its code changes, and
/// signals browsers to reload once it is serving again.
#[derive(Parser, Debug)]
#[command(
    name = "devloop",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dev loop until Ctrl-C.
    ///
    /// Allocates ports, starts the backend, writes the artifacts, then watches
    /// the application, component and asset trees.
    Dev {
        /// Project root containing devloop.toml.
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Extract component metadata once and write the registry.
    Components {
        /// Project root containing devloop.toml.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Print the registry as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Print the first free localhost port at or above START.
    Port {
        #[arg(default_value_t = 3000)]
        start: u16,
    },
}
