//! Command-line interface definitions for News Archiver.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! The configuration file can be given as a flag or through the
//! `NEWS_ARCHIVER_CONFIG` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the News Archiver application.
///
/// # Examples
///
/// ```sh
/// # Poll every configured feed once
/// news_archiver --config config.yaml poll
///
/// # Poll one site every 10 minutes until Ctrl-C
/// news_archiver --config config.yaml poll --site tagi --every 600
///
/// # Poll everything at `poller.interval_secs` until Ctrl-C
/// news_archiver --config config.yaml poll --watch
///
/// # Download up to 500 missing bodies, then migrate legacy bodies
/// news_archiver --config config.yaml download --limit 500
/// news_archiver --config config.yaml compact --site blick
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "NEWS_ARCHIVER_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Poll the feeds and store new articles
    Poll {
        /// Only poll this site
        #[arg(long)]
        site: Option<String>,

        /// Keep polling at the configured interval until interrupted
        #[arg(long)]
        watch: bool,

        /// Keep polling every SECS seconds until interrupted (implies --watch)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        every: Option<u64>,
    },

    /// Download and store bodies of articles that have none yet
    Download {
        /// Only download for this site
        #[arg(long)]
        site: Option<String>,

        /// Maximum number of articles per site
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Migrate stored bodies to the canonical encoding
    Compact {
        /// Only compact this site
        #[arg(long)]
        site: Option<String>,

        /// Articles per page (overrides the configuration)
        #[arg(long)]
        page_size: Option<usize>,
    },
}
