//! Transcript document output
//!
//! This module provides:
//! - Collaborator contracts for creating a meeting tab and reading/writing
//!   a single column of cells (`DocumentCreator`, `DocumentIo`)
//! - `TranscriptWriter`, the incremental append/relabel algorithm
//! - Backends: an in-memory store and Google Sheets over REST

mod memory;
mod sheets;
mod store;
mod writer;

pub use memory::MemoryDocuments;
pub use sheets::SheetsDocuments;
pub use store::{CellRange, CreatedTab, DocumentCreator, DocumentIo, TabRef};
pub use writer::{AppendOutcome, ColumnLayout, TranscriptWriter};
