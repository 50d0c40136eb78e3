use crate::session::{SessionRegistry, SessionServices};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session_id → monitor)
    pub sessions: Arc<SessionRegistry>,

    /// Collaborators handed to every new session
    pub services: Arc<SessionServices>,
}

impl AppState {
    pub fn new(services: SessionServices) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            services: Arc::new(services),
        }
    }
}
