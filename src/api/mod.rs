//! REST API module for Daad Studio

pub mod health;

pub use health::health_routes;
