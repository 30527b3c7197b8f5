//! Testing infrastructure
//!
//! The harness needs a window manager to talk to. This module provides a
//! headless one built on smithay, plus a fixture that starts it the way a
//! test binary would.
//!
//! # Architecture
//!
//! 1. **HeadlessBackend**: virtual outputs, laid out left to right, without
//!    DRM or GPU access.
//!
//! 2. **HeadlessWm**: the window manager. Shows xdg toplevels (and, when
//!    enabled, `wl_shell` toplevels) on the first output once they have a
//!    buffer and reports what it did as journal events.
//!
//! 3. **Fixture**: a started [`HeadlessWm`] on a private socket, usable as a
//!    [`Harness`](crate::Harness).
//!
//! # Example
//!
//! ```ignore
//! use wm_harness::testing::Fixture;
//! use wm_harness::{AdditionalInterfaces, Color, PixelFormat, ShellSurfaceKind, DEFAULT_TIMEOUT};
//!
//! let mut fixture = Fixture::new().unwrap();
//! fixture.connect(AdditionalInterfaces::SEAT).unwrap();
//! let surface = fixture.create_surface().unwrap();
//! let _shell = fixture.create_shell_surface(&surface, ShellSurfaceKind::XdgShell).unwrap();
//! let shown = fixture
//!     .render_and_wait_for_shown(&surface, (100, 50), Color::BLUE, PixelFormat::Argb8888, DEFAULT_TIMEOUT)
//!     .unwrap();
//! assert!(shown.is_some());
//! ```

mod fixture;
mod handlers;
mod headless;
mod legacy_shell;

pub use fixture::Fixture;
pub use headless::{HeadlessBackend, HeadlessOptions, HeadlessWm, VirtualOutput};
pub use legacy_shell::{LegacyShellHandler, LegacyShellState, LegacySurfaceData};
