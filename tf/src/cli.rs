//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Structured thinking prompt flow engine
#[derive(Debug, Parser)]
#[command(name = "tf", version, about)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered flow types
    Flows,

    /// List persisted sessions
    Sessions {
        /// Only sessions with this status (active | completed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one session in full
    Show {
        /// Session id
        session_id: String,
    },

    /// Drive a flow end to end with canned results, printing each envelope
    Demo {
        /// Flow type to run
        flow_type: String,

        /// Topic to think about
        topic: String,
    },
}
