//! Lifecycle tests
//!
//! Tests for window destruction, screen locking and the journal.

use std::time::Duration;

use insta::assert_snapshot;
use wm_harness::testing::Fixture;
use wm_harness::{
    AdditionalInterfaces, Color, PixelFormat, ShellSurface, ShellSurfaceKind, ShownWindow,
    Surface, WindowManager, WmEvent, DEFAULT_TIMEOUT,
};

fn show_window(fixture: &mut Fixture) -> (Surface, ShellSurface, ShownWindow) {
    let surface = fixture.create_surface().expect("Failed to create surface");
    let shell = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
        .expect("Failed to create shell surface");
    shell.set_title("lifecycle");
    let shown = fixture
        .render_and_wait_for_shown(
            &surface,
            (100, 50),
            Color::RED,
            PixelFormat::Argb8888,
            DEFAULT_TIMEOUT,
        )
        .expect("Failed to render")
        .expect("Window was not shown");
    (surface, shell, shown)
}

/// Test that destroying the toplevel is reported
#[test]
fn test_destroy_toplevel_reported() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let (surface, shell, shown) = show_window(&mut fixture);

    shell.destroy();
    surface.destroy();
    fixture.flush().expect("Failed to flush");

    assert!(fixture.wait_for_window_destroyed(shown.id, DEFAULT_TIMEOUT));
    assert!(!fixture.wm().is_shown(shown.id));
    // Already destroyed windows satisfy the wait immediately
    assert!(fixture.wait_for_window_destroyed(shown.id, Duration::ZERO));
}

/// Test that closing the connection destroys its windows
#[test]
fn test_teardown_closes_windows() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let (_surface, _shell, shown) = show_window(&mut fixture);

    fixture.teardown_connection();
    assert!(fixture.wait_for_window_destroyed(shown.id, DEFAULT_TIMEOUT));
    assert_eq!(fixture.wm().window_count(), 0);
}

/// Test that tearing down with live xdg windows is a clean disconnect
#[test]
fn test_teardown_with_live_windows_is_clean() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::SEAT)
        .expect("Failed to connect");
    let (_surface, _shell, shown) = show_window(&mut fixture);

    fixture.teardown_connection();
    assert!(fixture.wait_for_window_destroyed(shown.id, DEFAULT_TIMEOUT));
    assert_eq!(fixture.wm().protocol_errors(), Vec::<String>::new());

    // The window manager still accepts the next connection
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to reconnect");
}

/// Test that a live window is not reported destroyed
#[test]
fn test_live_window_not_destroyed() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let (_surface, _shell, shown) = show_window(&mut fixture);

    assert!(!fixture.wait_for_window_destroyed(shown.id, Duration::from_millis(100)));
}

/// Test locking and unlocking, including repeated requests
#[test]
fn test_lock_and_unlock() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");

    assert!(fixture.lock_screen(DEFAULT_TIMEOUT));
    assert!(fixture.wm().is_screen_locked());
    assert!(fixture.lock_screen(Duration::ZERO));

    assert!(fixture.unlock_screen(DEFAULT_TIMEOUT));
    assert!(!fixture.wm().is_screen_locked());
    assert!(fixture.unlock_screen(Duration::ZERO));

    let changes: Vec<bool> = fixture
        .journal()
        .entries()
        .iter()
        .filter_map(|entry| match entry.event {
            WmEvent::LockStateChanged { locked } => Some(locked),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![true, false]);
}

/// Test that a slow screen locker is waited for
#[test]
fn test_delayed_lock() {
    let mut fixture = Fixture::with_options(|options| {
        options.lock_delay = Duration::from_millis(150);
    })
    .expect("Failed to create fixture");

    assert!(fixture.lock_screen(DEFAULT_TIMEOUT));
    assert!(fixture.wm().is_screen_locked());
}

/// Test that a lock that does not complete in time reports failure
#[test]
fn test_lock_timeout() {
    let mut fixture = Fixture::with_options(|options| {
        options.lock_delay = Duration::from_secs(2);
    })
    .expect("Failed to create fixture");

    assert!(!fixture.lock_screen(Duration::from_millis(50)));
    assert!(!fixture.wm().is_screen_locked());
}

/// Test the journal dump after one window came and went
#[test]
fn test_journal_dump() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let (surface, shell, shown) = show_window(&mut fixture);
    shell.destroy();
    surface.destroy();
    fixture.flush().expect("Failed to flush");
    assert!(fixture.wait_for_window_destroyed(shown.id, DEFAULT_TIMEOUT));

    assert_snapshot!(
        fixture.journal().to_json().expect("Failed to dump journal"),
        @r#"[{"seq":0,"event":"backend_ready"},{"seq":1,"event":"window_shown","id":1,"geometry":{"x":0,"y":0,"width":100,"height":50},"title":"lifecycle"},{"seq":2,"event":"window_closed","id":1}]"#
    );
}
