//! Connection setup tests
//!
//! Tests for binding globals, misuse of the connection lifecycle and seat
//! capability waits.

use std::time::{Duration, Instant};

use wm_harness::testing::Fixture;
use wm_harness::{
    AdditionalInterfaces, Color, HarnessError, Interface, PixelFormat, ShellSurfaceKind,
    DEFAULT_TIMEOUT,
};

/// Test that required globals are bound and optional ones only on request
#[test]
fn test_setup_binds_required_globals() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::SEAT)
        .expect("Failed to connect");

    assert!(fixture.compositor().is_some());
    assert!(fixture.shm().is_some());
    assert!(fixture.xdg_wm_base().is_some());
    assert!(fixture.seat().is_some());

    // Not advertised by the headless window manager
    assert!(fixture.shell().is_none());
    // Advertised but not requested
    assert!(fixture.server_decoration().is_none());
    assert!(fixture.plasma_shell().is_none());
    assert!(fixture.window_management().is_none());
}

/// Test that the KDE decoration manager is bound when requested
#[test]
fn test_decoration_requested_is_bound() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::DECORATION)
        .expect("Failed to connect");

    let globals = fixture.globals().expect("No globals");
    assert!(globals.is_bound(Interface::ServerDecoration));
    assert!(!globals.is_bound(Interface::Seat));
}

/// Test that a requested global the window manager lacks fails setup
#[test]
fn test_missing_global_times_out() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.set_setup_timeout(Duration::from_millis(200));

    let err = fixture
        .connect(AdditionalInterfaces::SEAT | AdditionalInterfaces::PLASMA_SHELL)
        .unwrap_err();
    match err {
        HarnessError::SetupTimeout { missing } => {
            assert_eq!(missing, vec![Interface::PlasmaShell]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fixture.is_connected());
    assert!(fixture.compositor().is_none());
}

/// Test that a second setup without teardown is rejected
#[test]
fn test_double_setup_is_misuse() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let first = fixture.connection_id();

    let err = fixture.connect(AdditionalInterfaces::SEAT).unwrap_err();
    assert!(matches!(err, HarnessError::AlreadyConnected));
    assert!(err.is_misuse());

    // The original connection is untouched
    assert_eq!(fixture.connection_id(), first);
    assert!(fixture.seat().is_none());
}

/// Test that reconnecting yields a new connection with fresh globals
#[test]
fn test_reconnect_gets_fresh_connection() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let first = fixture.connection_id().expect("No connection id");

    fixture.teardown_connection();
    assert!(!fixture.is_connected());
    assert!(fixture.compositor().is_none());
    // Idempotent
    fixture.teardown_connection();

    fixture
        .connect(AdditionalInterfaces::SEAT)
        .expect("Failed to reconnect");
    let second = fixture.connection_id().expect("No connection id");
    assert_ne!(first, second);
    assert_eq!(
        fixture.compositor().map(|compositor| compositor.connection()),
        Some(second)
    );
    assert!(fixture.seat().is_some());
}

/// Test that objects of a closed connection are rejected
#[test]
fn test_stale_surface_after_reconnect() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let surface = fixture.create_surface().expect("Failed to create surface");

    fixture.teardown_connection();
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to reconnect");

    let err = fixture
        .render(&surface, (10, 10), Color::RED, PixelFormat::Argb8888)
        .unwrap_err();
    assert!(matches!(err, HarnessError::StaleObject));
    let err = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
        .unwrap_err();
    assert!(err.is_misuse());
}

/// Test that the headless seat announces all three devices
#[test]
fn test_seat_capabilities() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::SEAT)
        .expect("Failed to connect");

    assert!(fixture.wait_for_pointer(DEFAULT_TIMEOUT));
    assert!(fixture.wait_for_keyboard(DEFAULT_TIMEOUT));
    assert!(fixture.wait_for_touch(DEFAULT_TIMEOUT));
}

/// Test that device waits fail fast without a bound seat
#[test]
fn test_device_waits_without_seat() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");

    let start = Instant::now();
    assert!(!fixture.wait_for_pointer(DEFAULT_TIMEOUT));
    assert!(!fixture.wait_for_keyboard(DEFAULT_TIMEOUT));
    assert!(!fixture.wait_for_touch(DEFAULT_TIMEOUT));
    assert!(start.elapsed() < Duration::from_secs(1));
}
