//! Speaker identity resolution
//!
//! The recognition engine labels voices with small integer tags. This module
//! keeps the per-session table that turns those tags into display names and
//! tracks which tags still need a name from the client.

mod table;

pub use table::{placeholder_label, SpeakerResolution, SpeakerTable};
