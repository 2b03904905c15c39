//! VaultKV CLI - operator tooling for TTL payloads and blob options

mod args;

use anyhow::Context;
use args::{Args, Command};
use chrono::{TimeZone, Utc};
use clap::Parser;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vaultkv_core::blob::BlobIndex;
use vaultkv_core::storage::BlobDbOptions;
use vaultkv_core::ttl;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("vaultkv {}", vaultkv_core::VERSION);

    match args.command {
        Command::Encode {
            value,
            expire_at,
            ttl,
        } => {
            let expiration = Command::expiration(expire_at, ttl, ttl::now_secs());
            println!("{}", encode(value.as_bytes(), expiration));
        }
        Command::Inspect { payload, now, json } => {
            let report = inspect(&payload, now.unwrap_or_else(ttl::now_secs))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                print!("{}", report);
            }
        }
        Command::CheckOptions { path } => {
            let options = load_options(&path)?;
            info!("Options in {:?} are valid", path);
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
    }

    Ok(())
}

fn encode(value: &[u8], expiration: u64) -> String {
    hex::encode_upper(&ttl::with_ttl(value, expiration))
}

/// Decoded view of a blob index payload
#[derive(Debug)]
struct InspectReport {
    index: BlobIndex,
    trailer: u64,
    now: u64,
}

impl InspectReport {
    fn expiration(&self) -> u64 {
        self.index.effective_expiration(self.trailer)
    }

    fn expired(&self) -> bool {
        ttl::is_expired(self.expiration(), self.now)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "file_number": self.index.file_number,
            "offset": self.index.offset,
            "size": self.index.size,
            "embedded_expiration": self.index.expiration,
            "trailer_expiration": self.trailer,
            "effective_expiration": self.expiration(),
            "now": self.now,
            "expired": self.expired(),
        })
    }
}

impl std::fmt::Display for InspectReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "file_number:  {}", self.index.file_number)?;
        writeln!(f, "offset:       {}", self.index.offset)?;
        writeln!(f, "size:         {}", self.index.size)?;
        writeln!(f, "embedded:     {}", format_time(self.index.expiration))?;
        writeln!(f, "trailer:      {}", format_time(self.trailer))?;
        writeln!(f, "effective:    {}", format_time(self.expiration()))?;
        writeln!(f, "expired:      {}", self.expired())
    }
}

fn format_time(secs: u64) -> String {
    if secs == ttl::NO_EXPIRATION {
        return "never".to_string();
    }
    match i64::try_from(secs).ok().and_then(|s| Utc.timestamp_opt(s, 0).single()) {
        Some(time) => format!("{} ({})", secs, time.to_rfc3339()),
        None => secs.to_string(),
    }
}

fn inspect(payload_hex: &str, now: u64) -> anyhow::Result<InspectReport> {
    let payload = ttl::from_hex(payload_hex.trim()).context("payload is not valid hex")?;
    let (index, trailer) =
        BlobIndex::decode_with_trailer(&payload).context("payload is not a blob index")?;

    Ok(InspectReport {
        index,
        trailer,
        now,
    })
}

fn load_options(path: &Path) -> anyhow::Result<BlobDbOptions> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read options file {:?}", path))?;
    let options: BlobDbOptions = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse options file {:?}", path))?;
    options.validate()?;
    Ok(options)
}
