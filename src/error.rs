//! Error types for the harness.
//!
//! Wait timeouts are not errors: waits report them as `false` or `None`.
//! Everything here is either a setup failure the caller must abort on, or a
//! contract violation in the test code (see [`HarnessError::is_misuse`]).

use std::path::PathBuf;

use smithay::reexports::calloop;
use wayland_client::{backend::WaylandError, DispatchError};

use crate::interfaces::Interface;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("a Wayland connection is already open")]
    AlreadyConnected,
    #[error("no Wayland connection is open")]
    NotConnected,
    #[error("object belongs to a connection that was torn down")]
    StaleObject,
    #[error("cannot resolve socket {0:?}: XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir(String),
    #[error("failed to connect to {path:?}: {reason}")]
    Connect { path: PathBuf, reason: String },
    #[error("timed out waiting for globals: {missing:?}")]
    SetupTimeout { missing: Vec<Interface> },
    #[error("global {0} is not bound")]
    Unbound(Interface),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("invalid buffer size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("unsupported backend {0:?}")]
    UnsupportedBackend(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("window manager backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wayland(#[from] WaylandError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    EventLoop(#[from] calloop::Error),
}

impl HarnessError {
    /// Whether the error is a programming-contract violation of the caller
    /// rather than an environment failure.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            HarnessError::AlreadyConnected | HarnessError::NotConnected | HarnessError::StaleObject
        )
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misuse_classification() {
        assert!(HarnessError::AlreadyConnected.is_misuse());
        assert!(HarnessError::NotConnected.is_misuse());
        assert!(HarnessError::StaleObject.is_misuse());
        assert!(!HarnessError::Timeout("configure").is_misuse());
        assert!(!HarnessError::SetupTimeout { missing: vec![] }.is_misuse());
    }

    #[test]
    fn test_display_names_missing_globals() {
        let err = HarnessError::SetupTimeout {
            missing: vec![Interface::Seat, Interface::PlasmaShell],
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for globals: [Seat, PlasmaShell]"
        );
        assert_eq!(
            HarnessError::Unbound(Interface::WlShell).to_string(),
            "global wl_shell is not bound"
        );
    }
}
