//! Daad Bridge - Interpreter process bridge
//!
//! Runs the external `daad` interpreter on behalf of UI sessions:
//! - Registry: at most one live run per session
//! - Runner: spawn, stream stdout/stderr as output events, enforce limits
//! - Stdin relay: forward UI input to the live process
//!
//! All session state lives in a [`ProcessBridge`] instance; several bridges
//! can coexist in one process.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod config;
mod decode;
pub mod error;
pub mod event;
pub mod handle;
pub mod registry;
mod runner;
mod stdin;

#[cfg(test)]
mod tests;

pub use bridge::ProcessBridge;
pub use config::{BridgeConfig, RunPolicy, DEFAULT_INTERPRETER, DEFAULT_MAX_BUFFER_BYTES};
pub use error::{Error, Result};
pub use event::{OutputEvent, OutputRouter, OutputStream, StreamKind};
pub use handle::{RunHandle, RunOutcome, Termination};
pub use registry::{RunInfo, RunState, SessionId};
