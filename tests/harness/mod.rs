//! Harness tests against the headless window manager
//!
//! # Test Organization
//!
//! - `connection.rs` - Setup, teardown, global binding, seat capabilities
//! - `windows.rs` - Surface creation, rendering, shown-window correlation
//! - `lifecycle.rs` - Window destruction, screen locking, journal dumps
//! - `bootstrap.rs` - Startup sequence, screens, Xwayland launch

mod bootstrap;
mod connection;
mod lifecycle;
mod windows;
