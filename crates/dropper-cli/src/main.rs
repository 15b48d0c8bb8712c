//! Dropper CLI: upload attachments and compose a chat message envelope.
//!
//! Storage is selected through the environment (see `dropper_core::Config`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dropper_cli::{init_tracing, render_batch};
use dropper_core::{format_time, Config, FileHandle};
use dropper_storage::create_storage;
use dropper_upload::{BatchUploader, TokioScheduler, UploadBatchTracker, UploadSettings};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "dropper", about = "Upload chat attachments with progress")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files as one batch and print the message envelope
    Send {
        /// Message text
        #[arg(long)]
        text: Option<String>,
        /// Files to attach
        files: Vec<PathBuf>,
        /// Also print signed links for the attachments
        #[arg(long)]
        sign: bool,
    },
    /// Print a signed link for a stored attachment
    Sign {
        /// Resolved location returned by an upload
        location: String,
        /// Link lifetime in seconds (defaults to SIGNED_URL_EXPIRY_SECS)
        #[arg(long)]
        expires_secs: Option<u64>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;

    match cli.command {
        Commands::Send { text, files, sign } => {
            let mut handles = Vec::with_capacity(files.len());
            for path in &files {
                let handle = FileHandle::from_path(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                handles.push(handle);
            }

            let scheduler =
                TokioScheduler::current().context("Scheduler requires a tokio runtime")?;
            let uploader = BatchUploader::new(
                storage,
                Arc::new(scheduler),
                UploadSettings::from_config(&config),
            );

            let tracker = Arc::new(UploadBatchTracker::new());
            let mut updates = tracker.subscribe();
            let renderer = tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let batch = updates.borrow_and_update().clone();
                    for line in render_batch(&batch) {
                        eprintln!("{}", line);
                    }
                }
            });

            tracker.create_batch(handles);
            uploader.upload_all(&tracker).await;
            let composed = uploader.compose_message(&tracker, text)?;

            // Closing the channel ends the renderer.
            drop(tracker);
            renderer.await.context("Progress renderer failed")?;

            if !composed.skipped.is_empty() {
                eprintln!(
                    "{} file(s) excluded from the message:",
                    composed.skipped.len()
                );
                for skipped in &composed.skipped {
                    eprintln!("  {} ({:?})", skipped.filename, skipped.reason);
                }
            }
            eprintln!("Composed at {}", format_time(&composed.message.iso_date)?);

            print_json(&composed.message)?;

            if sign {
                let links = uploader.sign_attachments(&composed.message.files).await;
                for (file, link) in composed.message.files.iter().zip(links) {
                    match link {
                        Ok(url) => println!("{}\t{}", file.filename, url),
                        Err(e) => {
                            tracing::warn!(filename = %file.filename, error = %e, "Signing failed")
                        }
                    }
                }
            }
        }
        Commands::Sign {
            location,
            expires_secs,
        } => {
            let expires_in = expires_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.signed_url_expiry());
            let url = storage.signed_url(&location, expires_in).await?;
            print_json(&serde_json::json!({ "location": location, "url": url }))?;
        }
    }

    Ok(())
}
