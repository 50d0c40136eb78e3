use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Lifecycle phase of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Connection open, no "start" yet
    Idle,
    /// Started; the document target may or may not exist
    Active,
    /// Recognition stream running
    Streaming,
    /// Terminal
    Ended,
}

/// Point-in-time view of a session, for introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub speaker: String,
    pub meeting_title: Option<String>,
    pub start_time: Option<DateTime<Local>>,
    pub transcription_count: usize,
    pub sheet_link: Option<String>,
}

impl SessionSnapshot {
    fn new(session_id: &str, speaker: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: SessionPhase::Idle,
            speaker: speaker.to_string(),
            meeting_title: None,
            start_time: None,
            transcription_count: 0,
            sheet_link: None,
        }
    }
}

/// Shared view a session publishes about itself
pub struct SessionMonitor {
    snapshot: RwLock<SessionSnapshot>,
}

impl SessionMonitor {
    pub fn new(session_id: &str, speaker: &str) -> Self {
        Self {
            snapshot: RwLock::new(SessionSnapshot::new(session_id, speaker)),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn update(&self, apply: impl FnOnce(&mut SessionSnapshot)) {
        let mut snapshot = self.snapshot.write().await;
        apply(&mut snapshot);
    }
}

/// Process-wide registry of live sessions (session_id -> monitor).
///
/// Entries are added on connect and removed on teardown; nothing else
/// mutates the map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionMonitor>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session_id: &str, speaker: &str) -> Arc<SessionMonitor> {
        let monitor = Arc::new(SessionMonitor::new(session_id, speaker));
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), Arc::clone(&monitor));
        info!("Session registered: {} ({} active)", session_id, sessions.len());
        monitor
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(session_id).is_some();
        info!("Session removed: {} ({} active)", session_id, sessions.len());
        removed
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        let monitor = self.sessions.read().await.get(session_id).cloned()?;
        Some(monitor.snapshot().await)
    }

    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let monitors: Vec<Arc<SessionMonitor>> =
            self.sessions.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            snapshots.push(monitor.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        snapshots
    }
}
