//! wm-harness - Wayland window manager test harness
//!
//! Drives a window manager under test from the client side: one Wayland
//! connection served by a background thread, a primary event loop that hosts
//! the window manager, and blocking helpers that wait for what the window
//! manager reports (windows shown and destroyed, screen lock, seat
//! capabilities).
pub mod bootstrap;
pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod harness;
pub mod interfaces;
pub mod journal;
pub mod logging;
pub mod surface;
pub mod testing;
pub mod wm;

pub use bootstrap::{CompatServer, Stage, Startup, StartupError, StartupEvent, TestApplication};
pub use buffer::{Color, PixelBuffer, PixelFormat, Size};
pub use client::{resolve_socket_path, ConnectionId, GlobalHandle, Globals};
pub use config::BootstrapConfig;
pub use error::{HarnessError, Result};
pub use harness::{Harness, TestState, DEFAULT_TIMEOUT};
pub use interfaces::{AdditionalInterfaces, Interface};
pub use journal::{Cursor, Entry, Geometry, Journal, ShownWindow, WindowId, WmEvent};
pub use surface::{ShellSurface, ShellSurfaceKind, Surface, XdgShellSurface};
pub use wm::{BackendKind, ScreenInfo, WindowManager};
