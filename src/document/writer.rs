use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::store::{CellRange, DocumentIo, TabRef};

/// Where transcript lines live inside a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Column letter, e.g. "C"
    pub column: String,

    /// First transcript row (the row right after the template header)
    pub header_offset: u32,

    /// Last row ever scanned or written
    pub last_row: u32,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            column: "C".to_string(),
            header_offset: 13,
            last_row: 1000,
        }
    }
}

impl ColumnLayout {
    fn scan_range(&self) -> CellRange {
        CellRange::new(self.column.clone(), self.header_offset, self.last_row)
    }
}

/// Result of appending one transcript line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    /// Row the content landed on
    pub row: u32,

    pub speaker: String,

    /// Whether a blank separator row was written before the content
    pub speaker_changed: bool,
}

/// Appends speaker-grouped transcript lines to a single column.
///
/// The next free row is re-derived from the document before every write,
/// so a restarted process continues below whatever is already there.
#[derive(Clone)]
pub struct TranscriptWriter {
    io: Arc<dyn DocumentIo>,
    layout: ColumnLayout,
}

impl TranscriptWriter {
    pub fn new(io: Arc<dyn DocumentIo>, layout: ColumnLayout) -> Self {
        Self { io, layout }
    }

    /// Row right after the last non-empty cell at or below the header offset
    pub async fn next_row(&self, tab: &TabRef) -> Result<u32> {
        let cells = self
            .io
            .read_column(tab, &self.layout.scan_range())
            .await
            .context("Failed to read transcript column")?;

        let occupied = cells
            .iter()
            .rposition(|cell| !cell.trim().is_empty())
            .map_or(0, |last| last + 1);

        Ok(self.layout.header_offset + occupied as u32)
    }

    /// Append `text` spoken by `speaker`.
    ///
    /// `previous_speaker` is the speaker of the last line this session wrote.
    /// A new turn gets a `[speaker]` prefix, and a blank row before it unless
    /// it is the session's first line. Continuation lines are written bare.
    pub async fn append(
        &self,
        tab: &TabRef,
        speaker: &str,
        text: &str,
        previous_speaker: Option<&str>,
    ) -> Result<AppendOutcome> {
        let cursor = self.next_row(tab).await?;

        let new_turn = previous_speaker != Some(speaker);
        let speaker_changed = new_turn && previous_speaker.is_some();

        let (first_row, values) = if speaker_changed {
            (cursor, vec![String::new(), format!("[{}] {}", speaker, text)])
        } else if new_turn {
            (cursor, vec![format!("[{}] {}", speaker, text)])
        } else {
            (cursor, vec![text.to_string()])
        };

        let row = first_row + values.len() as u32 - 1;
        if row > self.layout.last_row {
            bail!(
                "Transcript column is full (row {} exceeds {})",
                row,
                self.layout.last_row
            );
        }

        let range = CellRange::new(self.layout.column.clone(), first_row, row);
        self.io
            .write_cells(tab, &range, values)
            .await
            .context("Failed to write transcript line")?;

        debug!(
            "Wrote transcript line to {} (speaker={}, changed={})",
            range.a1(&tab.tab_name),
            speaker,
            speaker_changed
        );

        Ok(AppendOutcome {
            row,
            speaker: speaker.to_string(),
            speaker_changed,
        })
    }

    /// Rewrite every `[old_name]` turn prefix to `[new_name]`.
    ///
    /// Only the first line of a turn carries a label, so continuation lines
    /// are left untouched. Returns the number of cells changed.
    pub async fn relabel(&self, tab: &TabRef, old_name: &str, new_name: &str) -> Result<usize> {
        let range = self.layout.scan_range();
        let cells = self
            .io
            .read_column(tab, &range)
            .await
            .context("Failed to read transcript column")?;

        if cells.is_empty() {
            return Ok(0);
        }

        let old_prefix = format!("[{}]", old_name);
        let new_prefix = format!("[{}]", new_name);
        let mut changed = 0;

        let updated: Vec<String> = cells
            .into_iter()
            .map(|cell| match cell.strip_prefix(&old_prefix) {
                Some(rest) => {
                    changed += 1;
                    format!("{}{}", new_prefix, rest)
                }
                None => cell,
            })
            .collect();

        if changed == 0 {
            return Ok(0);
        }

        let write_range = CellRange::new(
            range.column.clone(),
            range.first_row,
            range.first_row + updated.len() as u32 - 1,
        );
        self.io
            .write_cells(tab, &write_range, updated)
            .await
            .context("Failed to write relabeled transcript lines")?;

        info!(
            "Relabeled {} transcript lines in {}: {} -> {}",
            changed, tab.tab_name, old_name, new_name
        );

        Ok(changed)
    }
}
