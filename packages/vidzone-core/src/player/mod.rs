//! Media renderer control.
//!
//! # Module Structure
//!
//! - `types` - Launch requests and backend events
//! - `traits` - [`MediaBackend`] abstraction for testability
//! - `ipc` - JSON IPC transport over a Unix socket
//! - `process` - [`MpvBackend`], the mpv subprocess implementation
//! - `retry` - Fixed-delay retry used while waiting for the IPC socket

pub mod ipc;
pub mod process;
pub(crate) mod retry;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use ipc::{EventKind, IpcTransport, MediaEvent, TransportError};
pub use process::MpvBackend;
pub use traits::{BackendError, BackendResult, MediaBackend};
pub use types::{BackendEvent, BackendEventKind, LaunchHandle, LaunchRequest};
