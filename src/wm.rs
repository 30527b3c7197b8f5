//! The window manager under test, as seen by the harness.

use std::fmt;
use std::os::unix::net::UnixStream;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{HarnessError, Result};
use crate::journal::{Geometry, WmEvent};

/// Compositing backend the window manager is asked to start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Virtual outputs without hardware access
    #[default]
    Virtual,
    /// Any other backend, passed through to the window manager by name
    Named(String),
}

impl FromStr for BackendKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(HarnessError::Config("empty backend name".into())),
            "virtual" | "headless" => Ok(BackendKind::Virtual),
            other => Ok(BackendKind::Named(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Virtual => f.write_str("virtual"),
            BackendKind::Named(name) => f.write_str(name),
        }
    }
}

/// A screen reported by the window manager after backend start.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ScreenInfo {
    pub name: String,
    pub geometry: Geometry,
}

/// Hooks the harness needs from a window manager.
///
/// The window manager runs on the harness's primary event loop; it receives
/// the loop handle at construction and registers its own sources there.
pub trait WindowManager: Sized + 'static {
    /// Starts the compositing backend. Completion is reported later with
    /// [`WmEvent::BackendReady`].
    fn start_backend(&mut self, backend: &BackendKind) -> Result<()>;

    /// Screens of the started backend.
    fn screens(&self) -> Vec<ScreenInfo>;

    /// Serves a Wayland client on an already connected socket.
    fn insert_client(&mut self, stream: UnixStream) -> std::io::Result<()>;

    /// Adopts the window manager side of the X11 connection to Xwayland.
    fn set_x11_connection(&mut self, _stream: UnixStream) {}

    /// Notifications produced since the last call.
    fn take_events(&mut self) -> Vec<WmEvent>;

    fn is_screen_locked(&self) -> bool;

    /// Requests the screen locker. May complete asynchronously.
    fn lock_screen(&mut self);

    /// Requests unlocking. May complete asynchronously.
    fn unlock_screen(&mut self);

    /// Per-iteration work after events were dispatched, such as flushing
    /// clients.
    fn refresh(&mut self);
}
