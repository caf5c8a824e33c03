//! Command-line interface for dirfeed.
//!
//! Each handler command processes exactly one inbound message, read from a
//! file or stdin, and exits non-zero only when the message should be
//! redelivered.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::error;
use uuid::Uuid;

use crate::config::{self, ResolvedConfig};
use crate::core::{
    open_cache, CacheSink, Clients, GroupListing, MemberFanout, Outcome, PipelineSettings,
};
use crate::domain::InboundMessage;

/// dirfeed - Event-driven fan-out of directory group changes
#[derive(Parser, Debug)]
#[command(name = "dirfeed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// How the inbound message is supplied
#[derive(clap::Args, Debug, Clone)]
pub struct MessageArgs {
    /// Input file (reads from stdin if not provided)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Treat input as the bare payload instead of a push envelope
    #[arg(long)]
    pub raw: bool,

    /// Event id of a raw payload (generated if not provided)
    #[arg(long, requires = "raw")]
    pub event_id: Option<String>,

    /// Event timestamp of a raw payload, RFC 3339 (now if not provided)
    #[arg(long, requires = "raw")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fan out the members of a changed group
    Members {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Handle a scheduler trigger or a group query
    Groups {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Mirror a feed message into the cache
    CacheSink {
        #[command(flatten)]
        message: MessageArgs,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Members { message } => {
                let Some(inbound) = read_message(&message)? else {
                    return Ok(());
                };
                let cfg = config::config()?;
                let handler = MemberFanout::new(
                    Clients::initialize_or_capture(cfg),
                    PipelineSettings::from(cfg),
                );
                finish(handler.handle(&inbound).await)
            }
            Commands::Groups { message } => {
                let Some(inbound) = read_message(&message)? else {
                    return Ok(());
                };
                let cfg = config::config()?;
                let handler = GroupListing::new(
                    Clients::initialize_or_capture(cfg),
                    PipelineSettings::from(cfg),
                );
                finish(handler.handle(&inbound).await)
            }
            Commands::CacheSink { message } => {
                let Some(inbound) = read_message(&message)? else {
                    return Ok(());
                };
                let cfg = config::config()?;
                let cache = open_cache(cfg).map_err(|e| format!("{:#}", e));
                let handler = CacheSink::new(cache, cfg.service.retry_timeout_seconds);
                finish(handler.handle(&inbound).await)
            }
            Commands::Config => show_config(config::config()?),
        }
    }
}

/// Read the inbound message; `None` when an envelope is undecodable
///
/// An undecodable envelope can never succeed on redelivery, so it is
/// acknowledged rather than failed.
fn read_message(args: &MessageArgs) -> Result<Option<InboundMessage>> {
    let bytes = read_input(args.input.as_ref())?;

    if args.raw {
        let event_id = args
            .event_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = args.timestamp.unwrap_or_else(Utc::now);
        return Ok(Some(InboundMessage::new(event_id, timestamp, bytes)));
    }

    match InboundMessage::from_push_envelope(&bytes) {
        Ok(message) => Ok(Some(message)),
        Err(e) => {
            error!(error = %e, verdict = "dropped-malformed", "Failed to decode push envelope");
            Ok(None)
        }
    }
}

fn read_input(input_file: Option<&PathBuf>) -> Result<Vec<u8>> {
    if let Some(path) = input_file {
        return std::fs::read(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Map an outcome to the process exit status
fn finish<T>(outcome: Outcome<T>) -> Result<()> {
    if outcome.is_retryable() {
        std::process::exit(1);
    }
    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("dirfeed configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Home:        {}", cfg.home.display());
    println!("Cache:       {}", cfg.cache_path.display());
    println!("Project:     {}", cfg.project_id);
    println!(
        "Token:       {}",
        if cfg.access_token.is_some() { "(set)" } else { "(not set)" }
    );
    println!();
    println!("Directory:");
    println!("  Customer ID:     {}", cfg.directory.customer_id);
    println!("  API base:        {}", cfg.directory.api_base);
    println!("  Page size:       {}", cfg.directory.max_results_per_page);
    println!("  Record errors:   {:?}", cfg.directory.record_error_policy);
    println!();
    println!("Topics:");
    println!("  API base:        {}", cfg.pubsub.api_base);
    println!("  Members:         {}", cfg.pubsub.member_topic);
    println!("  Groups:          {}", cfg.pubsub.group_topic);
    println!("  Group queries:   {}", cfg.pubsub.group_query_topic);
    println!();
    println!("Service:");
    println!("  Retry horizon:   {}s", cfg.service.retry_timeout_seconds);
    println!("  Log every:       {} messages", cfg.service.log_event_every_x_msg);

    Ok(())
}
