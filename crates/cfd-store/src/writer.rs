//! JSON Lines trade log.
//!
//! Daily-rotated append-mode files, one JSON object per line: partial
//! corruption only affects individual lines and interrupted writes never
//! truncate existing data.

use crate::error::StoreResult;
use cfd_core::TradeTick;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::{debug, info, warn};

struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only JSON Lines writer for trade rows.
pub struct TradeLogWriter {
    base_dir: String,
    active_writer: Option<ActiveWriter>,
}

impl TradeLogWriter {
    pub fn new(base_dir: &str) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, "Failed to create directory: {}", base_dir);
        }
        Self {
            base_dir: base_dir.to_string(),
            active_writer: None,
        }
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush trade log on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade log file"
            );
        }
    }

    fn create_new_writer(&mut self, date: &str) -> StoreResult<()> {
        let filename = format!("{}/trades_{}.jsonl", self.base_dir, date);
        info!(filename = %filename, "Opening trade log (append mode)");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    /// Append a batch of trade rows and flush to disk.
    pub fn append_batch(&mut self, ticks: &[TradeTick]) -> StoreResult<()> {
        if ticks.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active_writer();
        }
        if self.active_writer.is_none() {
            self.create_new_writer(&today)?;
        }

        let active = self
            .active_writer
            .as_mut()
            .expect("active_writer should exist");

        for tick in ticks {
            let json = serde_json::to_string(tick)?;
            writeln!(active.writer, "{}", json)?;
        }
        active.writer.flush()?;
        active.records_written += ticks.len();

        debug!(date = %today, records = ticks.len(), "Appended trades to log");
        Ok(())
    }
}

impl Drop for TradeLogWriter {
    fn drop(&mut self) {
        self.close_active_writer();
    }
}
