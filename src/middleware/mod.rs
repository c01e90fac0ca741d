//! Middleware module for Daad Studio HTTP server
//!
//! Provides:
//! - Origin allow-list and optional access token for the session WebSocket

pub mod access;
