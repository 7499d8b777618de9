//! CLI interface for Waypoint
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Waypoint trip itinerary planner
///
/// Turns a free-text trip request into a day-by-day itinerary built from a
/// local attraction catalog.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan a trip from a free-text request
    Plan {
        /// The request, e.g. "3 days in Lisbon 2025-06-01 to 2025-06-03, relaxed"
        utterance: String,

        /// Catalog of candidates per destination (JSON)
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Do not store the compiled plan
        #[arg(long)]
        no_save: bool,
    },

    /// Check every catalog entry against the candidate rules
    Validate {
        /// Catalog of candidates per destination (JSON)
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,
    },

    /// Show stored plans
    History {
        /// Number of plans to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a stored plan
    Show {
        /// Plan ID
        plan_id: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_command() {
        let cli = Cli::parse_from([
            "waypoint",
            "plan",
            "two days in Ghent",
            "--catalog",
            "catalog.json",
        ]);
        if let Command::Plan {
            utterance,
            catalog,
            no_save,
        } = cli.command
        {
            assert_eq!(utterance, "two days in Ghent");
            assert_eq!(catalog, PathBuf::from("catalog.json"));
            assert!(!no_save);
        } else {
            panic!("Expected Plan command");
        }
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["waypoint", "--json", "--log", "debug", "history"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_plan_requires_catalog() {
        assert!(Cli::try_parse_from(["waypoint", "plan", "a trip"]).is_err());
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["waypoint", "history", "--limit", "20"]);
        if let Command::History { limit } = cli.command {
            assert_eq!(limit, 20);
        } else {
            panic!("Expected History command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["waypoint", "config", "path"]);
        if let Command::Config { action } = cli.command {
            assert!(matches!(action, ConfigAction::Path));
        } else {
            panic!("Expected Config command");
        }
    }
}
