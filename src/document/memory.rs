use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::info;

use super::store::{CellRange, CreatedTab, DocumentCreator, DocumentIo, TabRef};

type Column = BTreeMap<u32, String>;

/// Process-local spreadsheet store.
///
/// Behaves like the Sheets backend: reads drop trailing empty cells and
/// writes are all-or-nothing. Used when no external document service is
/// configured, and by tests.
#[derive(Default)]
pub struct MemoryDocuments {
    /// (tab, column letter) -> row -> value
    columns: Mutex<HashMap<(TabRef, String), Column>>,
    next_tab_id: AtomicI64,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `column` from `first_row` to the last written row
    pub async fn column_values(&self, tab: &TabRef, column: &str, first_row: u32) -> Vec<String> {
        let columns = self.columns.lock().await;
        let Some(cells) = columns.get(&(tab.clone(), column.to_string())) else {
            return Vec::new();
        };
        let Some(last) = cells.keys().next_back().copied() else {
            return Vec::new();
        };

        (first_row..=last)
            .map(|row| cells.get(&row).cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait::async_trait]
impl DocumentCreator for MemoryDocuments {
    async fn create_tab(&self, title: &str, date: &str, time: &str) -> Result<CreatedTab> {
        let file_id = format!("memory-{}", uuid::Uuid::new_v4());
        let tab_id = self.next_tab_id.fetch_add(1, Ordering::SeqCst);
        let tab_name = format!("{} {}", date, title);

        info!(
            "Created in-memory meeting tab {} ({} {})",
            tab_name, date, time
        );

        Ok(CreatedTab {
            web_link: format!("memory://{}#{}", file_id, tab_id),
            file_id,
            tab_id: Some(tab_id),
            tab_name,
        })
    }
}

#[async_trait::async_trait]
impl DocumentIo for MemoryDocuments {
    async fn read_column(&self, tab: &TabRef, range: &CellRange) -> Result<Vec<String>> {
        let columns = self.columns.lock().await;
        let Some(cells) = columns.get(&(tab.clone(), range.column.clone())) else {
            return Ok(Vec::new());
        };

        let last_filled = cells
            .range(range.first_row..=range.last_row)
            .filter(|(_, value)| !value.is_empty())
            .map(|(row, _)| *row)
            .next_back();

        Ok(match last_filled {
            Some(last) => (range.first_row..=last)
                .map(|row| cells.get(&row).cloned().unwrap_or_default())
                .collect(),
            None => Vec::new(),
        })
    }

    async fn write_cells(&self, tab: &TabRef, range: &CellRange, values: Vec<String>) -> Result<()> {
        if values.len() != range.len() {
            bail!(
                "Range {} holds {} cells but {} values were given",
                range.a1(&tab.tab_name),
                range.len(),
                values.len()
            );
        }

        let mut columns = self.columns.lock().await;
        let cells = columns
            .entry((tab.clone(), range.column.clone()))
            .or_default();
        for (row, value) in (range.first_row..=range.last_row).zip(values) {
            cells.insert(row, value);
        }

        Ok(())
    }
}
