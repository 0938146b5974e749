//! Event Journal - Append-only JSONL Event Records
//!
//! Persists every event to daily JSONL files named
//! `<journal_dir>/YYYY-MM-DD.jsonl`. Each line is a self-contained JSON
//! object. A single writer task owns the files, so lines from
//! concurrent sessions never interleave.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::ports::notifier::{Event, Notifier};

/// One journal line.
#[derive(Debug, Serialize)]
struct JournalLine<'a> {
    recorded_at: String,
    #[serde(flatten)]
    event: &'a Event,
}

/// Notifier appending events to the JSONL journal.
pub struct JournalNotifier {
    sender: mpsc::UnboundedSender<Event>,
}

impl JournalNotifier {
    /// Create the journal directory and spawn the writer task.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub async fn new(journal_dir: &str) -> Result<Self> {
        let dir = Path::new(journal_dir).to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create journal directory {}", dir.display()))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(journal_worker(dir, receiver));
        Ok(Self { sender })
    }
}

impl Notifier for JournalNotifier {
    fn notify(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("Journal channel closed");
        }
    }
}

async fn journal_worker(dir: PathBuf, mut receiver: mpsc::UnboundedReceiver<Event>) {
    info!(dir = %dir.display(), "Event journal started");
    while let Some(event) = receiver.recv().await {
        if let Err(e) = append_event(&dir, &event).await {
            error!(error = %e, session = %event.session(), "Failed to journal event");
        }
    }
}

/// Append one event to today's file.
async fn append_event(dir: &Path, event: &Event) -> Result<()> {
    let now = Utc::now();
    let path = dir.join(format!("{}.jsonl", now.format("%Y-%m-%d")));

    let line = JournalLine {
        recorded_at: now.to_rfc3339(),
        event,
    };
    let mut json = serde_json::to_string(&line).context("Failed to serialize event")?;
    json.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .context("Failed to open journal file")?;
    file.write_all(json.as_bytes())
        .await
        .context("Failed to write journal line")?;
    file.flush().await.context("Failed to flush journal")?;
    Ok(())
}
