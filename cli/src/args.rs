//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stratum layer engine tool.
#[derive(Parser, Debug)]
#[command(
    name = "stratum",
    about = "Replay edit scripts and inspect canvas snapshots",
    long_about = "Headless front end for the Stratum layer engine.\n\n\
        EXAMPLES:\n\
          # Run a script and store the resulting snapshot\n\
          stratum replay edits.json --config stratum.toml\n\
        \n\
          # Print the layers of a stored snapshot\n\
          stratum inspect .stratum/canvas-snapshot.json\n\
        \n\
          # Check whether a snapshot would load\n\
          stratum validate backup.json",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an edit script against a fresh engine and save the result.
    Replay {
        /// JSON script of edit steps.
        script: PathBuf,

        /// Engine configuration file.
        #[arg(long, default_value = "stratum.toml")]
        config: PathBuf,

        /// Snapshot directory (overrides `[storage] root`).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Snapshot key (overrides `[autosave] key`).
        #[arg(long)]
        key: Option<String>,

        /// Start from the stored snapshot instead of an empty canvas.
        #[arg(long)]
        resume: bool,

        /// Run the script without saving.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the layer summary of a snapshot file.
    Inspect {
        snapshot: PathBuf,

        /// Also list every object.
        #[arg(long)]
        objects: bool,
    },

    /// Report whether a snapshot file would load.
    Validate { snapshot: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_defaults() {
        let cli = Cli::try_parse_from(["stratum", "replay", "edits.json"]).unwrap();
        match cli.command {
            Command::Replay {
                script,
                config,
                out,
                resume,
                ..
            } => {
                assert_eq!(script, PathBuf::from("edits.json"));
                assert_eq!(config, PathBuf::from("stratum.toml"));
                assert!(out.is_none());
                assert!(!resume);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn inspect_requires_path() {
        assert!(Cli::try_parse_from(["stratum", "inspect"]).is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
