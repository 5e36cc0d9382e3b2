//! Skygate Session Management
//!
//! Owns the process-wide session against the upstream AT Protocol host:
//! creates it on demand, refreshes it opportunistically in the background,
//! and falls back to backup credentials when the primary account fails.

mod token;

pub use token::{SessionInfo, TokenManager};
