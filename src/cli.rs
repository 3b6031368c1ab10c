//! Command-line interface definition using clap

use clap::Parser;
use std::path::PathBuf;

/// Forwards serial port byte streams to remote network endpoints with durable buffering
#[derive(Parser, Debug)]
#[command(name = "forwarder-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration document
    #[arg(long, value_name = "PATH", default_value = "config.json")]
    pub config: PathBuf,

    /// Enable debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Load and validate the configuration, print the parsed port list, and exit
    ///
    /// This is a local config dry-run only; it does not implement the
    /// out-of-scope HTTP status surface.
    #[arg(long)]
    pub status: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["forwarder-daemon"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(!cli.verbose);
        assert!(!cli.status);
    }

    #[test]
    fn overrides() {
        let cli = Cli::parse_from([
            "forwarder-daemon",
            "--config",
            "other.json",
            "-v",
            "--status",
        ]);
        assert_eq!(cli.config, PathBuf::from("other.json"));
        assert!(cli.verbose);
        assert!(cli.status);
    }
}
