use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::MAX_ALERT_STAGE;

pub const DEFAULT_CONFIG_FILE: &str = "pomoguard.toml";

#[derive(Parser, Debug)]
#[command(
    name = "pomoguard",
    version,
    about = "Alternates game and study sessions and keeps you on the right window"
)]
pub struct Cli {
    /// Settings file to read and write
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a full cycle and enforce focus until it completes or is stopped
    Run,
    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the phase schedule built from the current settings
    Schedule {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the title of the focused window
    Window {
        /// Keep printing whenever the title changes
        #[arg(long, short = 'w')]
        watch: bool,
    },
    /// Play the alert sound for one escalation stage
    Sound {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=MAX_ALERT_STAGE as i64))]
        stage: u8,
        /// How long to play before stopping
        #[arg(long, default_value_t = 3)]
        secs: u64,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Show all settings
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a value, e.g. `durations.game_min 30` or `game_title Solitaire`
    Set { key: String, value: String },
    /// Print the settings file location
    Path,
    /// Check that configured executables and sound files exist
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_config_path() {
        let cli = Cli::try_parse_from(["pomoguard", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli =
            Cli::try_parse_from(["pomoguard", "config", "show", "--json", "-v", "--config", "x.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        match cli.command {
            Commands::Config { action } => assert_eq!(action, ConfigAction::Show { json: true }),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_set_takes_key_and_value() {
        let cli = Cli::try_parse_from(["pomoguard", "config", "set", "game_min", "30"]).unwrap();
        match cli.command {
            Commands::Config { action } => assert_eq!(
                action,
                ConfigAction::Set {
                    key: "game_min".into(),
                    value: "30".into()
                }
            ),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn sound_stage_is_bounded() {
        let cli = Cli::try_parse_from(["pomoguard", "sound", "5", "--secs", "1"]).unwrap();
        match cli.command {
            Commands::Sound { stage, secs } => {
                assert_eq!(stage, 5);
                assert_eq!(secs, 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["pomoguard", "sound", "6"]).is_err());
    }
}
