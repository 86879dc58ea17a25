//! stagehand cache maintenance binary
//!
//! Pipelines themselves are authored in code against the library API; this
//! binary only inspects and cleans the cache directories they leave behind.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use serde::Serialize;
use stagehand::{CacheStore, Fingerprint};
use std::collections::HashSet;
use std::fs;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// JSON inventory of a cache directory
#[derive(Serialize)]
struct Inventory {
    cache_dir: String,
    entries: Vec<InventoryEntry>,
}

#[derive(Serialize)]
struct InventoryEntry {
    fingerprint: String,
    bytes: u64,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let store = CacheStore::new(&cli.cache_dir);

    let result = match cli.command {
        Command::List { json } => list_entries(&store, json),
        Command::Show { fingerprint } => show_entry(&store, &fingerprint),
        Command::Clear => clear_entries(&store),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn list_entries(store: &CacheStore, json: bool) -> stagehand::Result<()> {
    let mut fingerprints: Vec<Fingerprint> = store.list_all()?.into_iter().collect();
    fingerprints.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    if json {
        let entries = fingerprints
            .iter()
            .map(|fp| {
                let bytes = fs::metadata(store.entry_path(fp))
                    .map(|m| m.len())
                    .unwrap_or(0);
                InventoryEntry {
                    fingerprint: fp.as_str().to_string(),
                    bytes,
                }
            })
            .collect();

        let inventory = Inventory {
            cache_dir: store.cache_dir().display().to_string(),
            entries,
        };
        println!("{}", render_json(&inventory)?);
    } else {
        for fp in fingerprints {
            println!("{}", fp);
        }
    }

    Ok(())
}

fn show_entry(store: &CacheStore, fingerprint: &str) -> stagehand::Result<()> {
    let found = store
        .list_all()?
        .into_iter()
        .find(|fp| fp.as_str() == fingerprint);

    let fp = found.ok_or_else(|| {
        stagehand::PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "no cache entry '{}' in '{}'",
                fingerprint,
                store.cache_dir().display()
            ),
        ))
    })?;

    let state = store.load(&fp)?;
    println!("{}", render_json(&state)?);

    Ok(())
}

/// Pretty-print any serializable value for terminal output
fn render_json<T: Serialize>(value: &T) -> stagehand::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        stagehand::PipelineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn clear_entries(store: &CacheStore) -> stagehand::Result<()> {
    // Sweeping against an empty active set deletes every entry
    let removed = store.sweep(&HashSet::new())?;
    eprintln!(
        "Removed {} cache entr{} from '{}'",
        removed,
        if removed == 1 { "y" } else { "ies" },
        store.cache_dir().display()
    );
    Ok(())
}
