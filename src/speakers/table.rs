use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Label used for a tag until the client names it
pub fn placeholder_label(tag: u32) -> String {
    format!("Speaker {}", tag)
}

/// Outcome of looking up a speaker tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerResolution {
    /// Mapped name, or the placeholder label
    pub name: String,

    /// Whether `name` is the placeholder label
    pub is_placeholder: bool,

    /// Set on the first sighting of an unnamed tag; the caller should ask
    /// the client to name it
    pub mapping_requested: bool,
}

/// Per-session mapping from engine speaker tags to display names
#[derive(Debug, Clone, Default)]
pub struct SpeakerTable {
    participants: Vec<String>,
    names: HashMap<u32, String>,
    unresolved: BTreeSet<u32>,
}

impl SpeakerTable {
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            participants,
            names: HashMap::new(),
            unresolved: BTreeSet::new(),
        }
    }

    /// Replace the expected participants; existing mappings are kept
    pub fn set_participants(&mut self, participants: Vec<String>) {
        self.participants = participants;
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Look up the display name for `tag`, marking it unresolved if unnamed
    pub fn resolve(&mut self, tag: u32) -> SpeakerResolution {
        if let Some(name) = self.names.get(&tag) {
            return SpeakerResolution {
                name: name.clone(),
                is_placeholder: false,
                mapping_requested: false,
            };
        }

        let first_sighting = self.unresolved.insert(tag);
        if first_sighting {
            debug!("Speaker tag {} seen for the first time", tag);
        }

        SpeakerResolution {
            name: placeholder_label(tag),
            is_placeholder: true,
            mapping_requested: first_sighting,
        }
    }

    /// Name `tag`, replacing any previous name. Returns the previous name.
    ///
    /// Any string is accepted, including names outside the participant list.
    pub fn assign(&mut self, tag: u32, name: impl Into<String>) -> Option<String> {
        let name = name.into();
        info!("Speaker tag {} mapped to {}", tag, name);

        self.unresolved.remove(&tag);
        self.names.insert(tag, name)
    }

    pub fn name_of(&self, tag: u32) -> Option<&str> {
        self.names.get(&tag).map(String::as_str)
    }

    pub fn is_unresolved(&self, tag: u32) -> bool {
        self.unresolved.contains(&tag)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = u32> + '_ {
        self.unresolved.iter().copied()
    }

    /// Participants not yet mapped to a tag other than `tag`, in configured order
    pub fn available_names(&self, tag: u32) -> Vec<String> {
        self.participants
            .iter()
            .filter(|participant| {
                !self
                    .names
                    .iter()
                    .any(|(other, name)| *other != tag && name == *participant)
            })
            .cloned()
            .collect()
    }
}
