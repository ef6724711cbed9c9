//! VaultKV CLI
//!
//! Command-line interface for a VaultKV store file.
//!
//! Values are stored as JSON: `set` wraps its argument in a JSON
//! string, `get` prints the raw JSON of whatever is stored.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use vaultkv::{Result, Store};

/// VaultKV CLI
#[derive(Parser, Debug)]
#[command(name = "vaultkv")]
#[command(about = "Single-file embedded key-value store")]
#[command(version)]
struct Args {
    /// Path to the store file (created if missing)
    path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value stored under a key
    Get {
        /// The bucket to read from
        bucket: String,
        /// The key to get
        key: String,
    },

    /// Store a value under a key
    Set {
        /// The bucket to write to
        bucket: String,
        /// The key to set
        key: String,
        /// The value to store (as a JSON string)
        value: String,
    },

    /// Delete a key
    Delete {
        /// The bucket to delete from
        bucket: String,
        /// The key to delete
        key: String,
    },

    /// Print every key in a bucket
    List {
        /// The bucket to list
        bucket: String,
    },

    /// Print every bucket in the store
    Buckets,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let store = Store::open(&args.path)?;

    match args.command {
        Commands::Get { bucket, key } => {
            let value: serde_json::Value = store.get(&bucket, &key)?;
            println!("{value}");
        }
        Commands::Set { bucket, key, value } => {
            let mut tx = store.writer();
            tx.set(&bucket, &key, &value)?;
            tx.commit()?;
        }
        Commands::Delete { bucket, key } => {
            let mut tx = store.writer();
            tx.delete(&bucket, &key);
            tx.commit()?;
        }
        Commands::List { bucket } => {
            let tx = store.reader();
            let mut keys = tx.list(&bucket)?;
            tx.commit()?;

            keys.sort();
            for key in keys {
                println!("{key}");
            }
        }
        Commands::Buckets => {
            let mut buckets = store.buckets()?;
            buckets.sort();
            for bucket in buckets {
                println!("{bucket:?}");
            }
        }
    }

    Ok(())
}
