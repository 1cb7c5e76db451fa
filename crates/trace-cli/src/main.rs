//! Contact trace CLI
//!
//! Drives the contact store and matching engine from the command line:
//! record encounters, expire old ones, match published key batches.
//!
//! Usage:
//!   contact-trace add --id <ID> --lat 55.75 --lng 37.62 --accuracy 10
//!   contact-trace add --secret <BASE64> --at <EPOCH_MS> --lat .. --lng .. --accuracy ..
//!   contact-trace match --keys batch.json
//!   contact-trace expire
//!   contact-trace list --infected

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trace_core::{day_number, recover_pseudonym, seal_tag, Day, KeyBatch, TimestampMs};
use trace_store::{ContactStore, Encounter, KeyRingStore, Matcher, StoreConfig};

mod output;

#[derive(Parser, Debug)]
#[command(name = "contact-trace")]
#[command(about = "Local proximity contact store and exposure matching")]
struct Args {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Contact snapshot file (overrides config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Day key ring file (overrides config)
    #[arg(long, global = true)]
    keyring: Option<PathBuf>,

    /// Retention window in days (overrides config)
    #[arg(long, global = true)]
    retention_days: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record an encounter
    Add {
        /// Pseudonymous id, as received directly
        #[arg(long, conflicts_with = "secret", required_unless_present = "secret")]
        id: Option<String>,

        /// Sealed pseudonym from an exchange, opened with our key for the day
        #[arg(long)]
        secret: Option<String>,

        /// Encounter time in epoch ms (defaults to now)
        #[arg(long)]
        at: Option<TimestampMs>,

        #[arg(long)]
        rssi: Option<i32>,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        #[arg(long, default_value_t = 0)]
        accuracy: i32,
    },

    /// Remove contacts and day keys older than the retention window
    Expire {
        /// Reference time in epoch ms (defaults to now)
        #[arg(long)]
        now: Option<TimestampMs>,
    },

    /// Match a published infection key batch (JSON)
    Match {
        #[arg(long)]
        keys: PathBuf,

        /// Print every contact matched in this pass, not just the last
        #[arg(long)]
        all: bool,
    },

    /// Print the stored contacts as JSON
    List {
        /// Only contacts flagged as exposures
        #[arg(long)]
        infected: bool,
    },

    /// Ensure a day key exists and print it (hex)
    Keygen {
        /// Day number (defaults to today)
        #[arg(long, allow_hyphen_values = true)]
        day: Option<Day>,
    },

    /// Seal a fresh tag with our key for a day, to hand to a peer
    Tag {
        /// Day number (defaults to today)
        #[arg(long, allow_hyphen_values = true)]
        day: Option<Day>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    tracing::debug!(
        store = %config.store_path.display(),
        keyring = %config.keyring_path.display(),
        retention_days = config.retention_days,
        "Using config"
    );

    let store = Arc::new(ContactStore::open(&config.store_path));
    let keyring = KeyRingStore::open(&config.keyring_path);

    match args.command {
        Command::Add {
            id,
            secret,
            at,
            rssi,
            lat,
            lng,
            accuracy,
        } => {
            let tst = at.unwrap_or_else(now_ms);
            let id = match (id, secret) {
                (Some(id), _) => id,
                (None, Some(secret)) => {
                    let ring = keyring.load().context("loading key ring")?;
                    recover_pseudonym(&ring, &secret, tst)
                        .context("could not recover pseudonym; no contact recorded")?
                }
                (None, None) => anyhow::bail!("either --id or --secret is required"),
            };

            store
                .add_encounter(&id, Encounter::new(rssi, lat, lng, accuracy, tst))
                .context("contact store write failed")?;
            tracing::info!(id = %id, tst, "Recorded encounter");
        }

        Command::Expire { now } => {
            let now = now.unwrap_or_else(now_ms);
            let removed = store
                .remove_expired(now, config.retention_ms())
                .context("contact store write failed")?;
            let oldest_day = day_number(now.saturating_sub(config.retention_ms()));
            let pruned = keyring.prune_before(oldest_day)?;
            let summary = serde_json::json!({ "contacts_removed": removed, "keys_pruned": pruned });
            println!("{}", summary);
        }

        Command::Match { keys, all } => {
            let data = std::fs::read_to_string(&keys)
                .with_context(|| format!("reading {}", keys.display()))?;
            let batch: KeyBatch = serde_json::from_str(&data).context("parsing key batch")?;

            let report = Matcher::new(Arc::clone(&store)).match_report(&batch);
            if let Some(e) = &report.persist_error {
                tracing::warn!(
                    error = %e,
                    "Exposure flags were not saved; they will be recomputed on the next batch"
                );
            }

            let out = if all {
                serde_json::to_string_pretty(&report.matched)?
            } else {
                serde_json::to_string_pretty(&report.last_match)?
            };
            println!("{}", out);
        }

        Command::List { infected } => {
            let snapshot = store.get_all();
            let rows = output::contact_rows(&snapshot, infected);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Command::Keygen { day } => {
            let day = day.unwrap_or_else(|| day_number(now_ms()));
            let key = keyring.ensure_day(day)?;
            println!("{}", serde_json::json!({ "day": day, "key": key }));
        }

        Command::Tag { day } => {
            let day = day.unwrap_or_else(|| day_number(now_ms()));
            let tag = keyring.update(|ring| seal_tag(ring.get_or_generate(day), day))??;
            println!("{}", serde_json::json!({ "day": day, "tag": tag }));
        }
    }

    Ok(())
}

fn resolve_config(args: &Args) -> Result<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };

    if let Some(path) = &args.store {
        config.store_path = path.clone();
    }
    if let Some(path) = &args.keyring {
        config.keyring_path = path.clone();
    }
    if let Some(days) = args.retention_days {
        anyhow::ensure!(days > 0, "--retention-days must be at least 1");
        config.retention_days = days;
    }

    Ok(config)
}

fn now_ms() -> TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}
