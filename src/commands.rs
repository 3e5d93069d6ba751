//! Bodies of the `dv` subcommands. Each prints human-readable output to
//! stdout; diagnostics go through `tracing` to stderr.

use anyhow::{bail, Context, Result};
use std::path::Path;

use docvault_core::records::cap_chars;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::storage::{DocumentStorage, StoreOutcome};

const EXCERPT_CHARS: usize = 160;

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.local.path).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Local store initialized at {}.", config.local.path.display());
    Ok(())
}

pub async fn run_store(
    config: &Config,
    path: &Path,
    user_id: &str,
    file_type: Option<&str>,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file_type = file_type
        .map(str::to_string)
        .unwrap_or_else(|| guess_file_type(path).to_string());

    let storage = DocumentStorage::from_config(config).await?;
    match storage
        .store_document(&file_name, &file_type, &content, user_id)
        .await?
    {
        StoreOutcome::Stored { backend, records } => {
            println!("Stored {} ({} record(s), {} backend).", file_name, records, backend);
        }
        StoreOutcome::Skipped { cleaned_chars } => {
            println!(
                "Skipped {}: only {} characters after cleaning.",
                file_name, cleaned_chars
            );
        }
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    user_id: Option<&str>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let top_k = top_k.unwrap_or(config.retrieval.default_top_k);
    if top_k == 0 {
        bail!("--top-k must be at least 1");
    }

    let storage = DocumentStorage::from_config(config).await?;
    let response = storage.search_documents(query, top_k, user_id).await?;

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        let meta = &result.metadata;
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            result.score,
            meta.file_name,
            meta.file_type
        );
        println!("    stored: {}", meta.timestamp);
        if let Some(ref user) = meta.user_id {
            println!("    user: {}", user);
        }
        println!(
            "    excerpt: \"{}\"",
            cap_chars(meta.content.replace('\n', " ").trim(), EXCERPT_CHARS)
        );
        println!();
    }
    println!("({} backend)", response.backend);
    Ok(())
}

pub async fn run_list(config: &Config, user_id: Option<&str>) -> Result<()> {
    let storage = DocumentStorage::from_config(config).await?;
    let listing = storage.list_user_documents(user_id).await?;

    if listing.documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &listing.documents {
        println!(
            "{:<40} {:<20} {:>4} chunk(s)  {}",
            doc.file_name, doc.file_type, doc.total_chunks, doc.timestamp
        );
    }
    println!("({} document(s), {} backend)", listing.documents.len(), listing.backend);
    Ok(())
}

pub async fn run_clear(config: &Config, user_id: Option<&str>) -> Result<()> {
    let storage = DocumentStorage::from_config(config).await?;
    let report = storage.clear_user_documents(user_id).await?;

    println!(
        "local:  {}",
        if report.local_cleared {
            format!("cleared ({} record(s))", report.local_removed)
        } else {
            "failed".to_string()
        }
    );
    if storage.has_remote() {
        println!(
            "remote: {}",
            if report.remote_cleared {
                format!("cleared ({} record(s))", report.remote_removed)
            } else {
                "failed".to_string()
            }
        );
    }
    Ok(())
}

/// Best-effort MIME type from the file extension.
fn guess_file_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") | Some("markdown") => "text/markdown",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        _ => "text/plain",
    }
}
