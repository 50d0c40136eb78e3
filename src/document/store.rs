use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Identifies one tab inside one spreadsheet file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabRef {
    pub file_id: String,
    pub tab_name: String,
}

/// Result of creating the meeting's target tab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedTab {
    pub file_id: String,
    pub tab_id: Option<i64>,
    pub tab_name: String,
    pub web_link: String,
}

impl CreatedTab {
    pub fn tab_ref(&self) -> TabRef {
        TabRef {
            file_id: self.file_id.clone(),
            tab_name: self.tab_name.clone(),
        }
    }
}

/// Inclusive, 1-based row span in a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRange {
    pub column: String,
    pub first_row: u32,
    pub last_row: u32,
}

impl CellRange {
    pub fn new(column: impl Into<String>, first_row: u32, last_row: u32) -> Self {
        Self {
            column: column.into(),
            first_row,
            last_row,
        }
    }

    pub fn len(&self) -> usize {
        (self.last_row + 1).saturating_sub(self.first_row) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A1 notation, e.g. `'Minutes'!C13:C1000`
    pub fn a1(&self, tab_name: &str) -> String {
        format!(
            "'{}'!{}{}:{}{}",
            tab_name.replace('\'', "''"),
            self.column,
            self.first_row,
            self.column,
            self.last_row
        )
    }
}

/// Creates the per-meeting document target
#[async_trait::async_trait]
pub trait DocumentCreator: Send + Sync {
    async fn create_tab(&self, title: &str, date: &str, time: &str) -> Result<CreatedTab>;
}

/// Reads and writes cells in one column of a tab
#[async_trait::async_trait]
pub trait DocumentIo: Send + Sync {
    /// Cell values from `range.first_row` on, in row order. Trailing empty
    /// cells may be omitted; interior empty cells are returned as "".
    async fn read_column(&self, tab: &TabRef, range: &CellRange) -> Result<Vec<String>>;

    /// Write `values` starting at `range.first_row`, atomically per call.
    /// `values.len()` must equal `range.len()`.
    async fn write_cells(&self, tab: &TabRef, range: &CellRange, values: Vec<String>) -> Result<()>;
}
