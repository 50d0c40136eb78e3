//! HTTP and WebSocket API
//!
//! - GET /ws/record - Live transcription session (WebSocket)
//! - GET /sessions - List live sessions
//! - GET /sessions/:session_id - Inspect one session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
