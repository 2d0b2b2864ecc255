use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "bookhub",
    about = "Harvest an e-book library listing into a local snapshot",
    version
)]
pub struct Cli {
    /// Configuration file (RON). Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "bookhub.ron")]
    pub config: PathBuf,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open a sync surface, harvest the library and store a snapshot.
    Sync {
        /// Library listing to harvest instead of the configured one.
        #[arg(long)]
        url: Option<String>,
    },
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the stored snapshot.
    Snapshot {
        /// Print the full snapshot as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_accepts_a_url_override() {
        let cli = Cli::parse_from(["bookhub", "--config", "x.ron", "sync", "--url", "https://e.test/"]);
        assert_eq!(cli.config, PathBuf::from("x.ron"));
        match cli.command {
            Commands::Sync { url } => assert_eq!(url.as_deref(), Some("https://e.test/")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_defaults_and_global_flags() {
        let cli = Cli::parse_from(["bookhub", "snapshot", "--json", "-v"]);
        assert_eq!(cli.config, PathBuf::from("bookhub.ron"));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Snapshot { json: true }));
    }
}
