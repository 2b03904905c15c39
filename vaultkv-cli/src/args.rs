use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// vaultkv - inspect TTL payloads and blob options
#[derive(Debug, Parser)]
#[command(name = "vaultkv", about = "VaultKV operator tooling", version)]
pub struct Args {
    /// Log filter, e.g. "debug" or "vaultkv_core=trace"
    #[arg(long, env = "VAULTKV_LOG", default_value = "info", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Append an expiration trailer to a value and print the payload as hex
    Encode {
        /// Value bytes, as UTF-8 text
        value: String,

        /// Absolute expiration in unix seconds (0 = never)
        #[arg(long, conflicts_with = "ttl")]
        expire_at: Option<u64>,

        /// Expiration relative to now, in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Decode a blob index payload and report its expiration
    Inspect {
        /// Payload as hex
        payload: String,

        /// Reference time in unix seconds (defaults to now)
        #[arg(long)]
        now: Option<u64>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a JSON blob options file
    CheckOptions {
        /// Path to the options file
        path: PathBuf,
    },
}

impl Command {
    /// Resolve `--expire-at` / `--ttl` into an absolute expiration
    pub fn expiration(expire_at: Option<u64>, ttl: Option<u64>, now: u64) -> u64 {
        match (expire_at, ttl) {
            (Some(at), _) => at,
            (None, Some(ttl)) => now.saturating_add(ttl),
            (None, None) => 0,
        }
    }
}
