//! Window tests
//!
//! Tests for surface creation, rendering and correlating shown windows with
//! the surfaces that caused them.

use std::time::Duration;

use wm_harness::testing::Fixture;
use wm_harness::{
    AdditionalInterfaces, Color, Geometry, HarnessError, Interface, PixelFormat,
    ShellSurfaceKind, DEFAULT_TIMEOUT,
};

fn connected() -> Fixture {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::SEAT)
        .expect("Failed to connect");
    fixture
}

/// Test the basic scenario: a 100x50 toplevel is shown at its size
#[test]
fn test_render_shows_window() {
    let mut fixture = connected();
    let surface = fixture.create_surface().expect("Failed to create surface");
    let _shell = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
        .expect("Failed to create shell surface");

    let shown = fixture
        .render_and_wait_for_shown(
            &surface,
            (100, 50),
            Color::BLUE,
            PixelFormat::Argb8888,
            DEFAULT_TIMEOUT,
        )
        .expect("Failed to render")
        .expect("Window was not shown");

    assert_eq!(
        shown.geometry,
        Geometry {
            x: 0,
            y: 0,
            width: 100,
            height: 50
        }
    );
    assert!(fixture.wm().is_shown(shown.id));
}

/// Test that the window's title and app id are reported with it
#[test]
fn test_title_and_app_id_reported() {
    let mut fixture = connected();
    let surface = fixture.create_surface().expect("Failed to create surface");
    let shell = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
        .expect("Failed to create shell surface");
    shell.set_title("Terminal");
    shell.set_app_id("org.example.term");

    let shown = fixture
        .render_and_wait_for_shown(
            &surface,
            (64, 64),
            Color::WHITE,
            PixelFormat::Xrgb8888,
            DEFAULT_TIMEOUT,
        )
        .expect("Failed to render")
        .expect("Window was not shown");
    assert_eq!(shown.title.as_deref(), Some("Terminal"));
    assert_eq!(shown.app_id.as_deref(), Some("org.example.term"));
}

/// Test that a window shown before a wait started does not satisfy it
#[test]
fn test_earlier_window_does_not_satisfy_wait() {
    let mut fixture = connected();
    let surface = fixture.create_surface().expect("Failed to create surface");
    let _shell = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
        .expect("Failed to create shell surface");
    fixture
        .render_and_wait_for_shown(
            &surface,
            (100, 50),
            Color::RED,
            PixelFormat::Argb8888,
            DEFAULT_TIMEOUT,
        )
        .expect("Failed to render")
        .expect("Window was not shown");

    assert!(fixture
        .wait_for_window_shown(Duration::from_millis(200))
        .is_none());
}

/// Test that each of two windows is matched to its own render
#[test]
fn test_two_windows_get_distinct_ids() {
    let mut fixture = connected();
    let mut ids = Vec::new();
    for size in [(100u32, 50u32), (30, 40)] {
        let surface = fixture.create_surface().expect("Failed to create surface");
        let _shell = fixture
            .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
            .expect("Failed to create shell surface");
        let shown = fixture
            .render_and_wait_for_shown(
                &surface,
                size,
                Color::GREEN,
                PixelFormat::Argb8888,
                DEFAULT_TIMEOUT,
            )
            .expect("Failed to render")
            .expect("Window was not shown");
        assert_eq!((shown.geometry.width, shown.geometry.height), (size.0 as i32, size.1 as i32));
        ids.push(shown.id);
    }
    assert_ne!(ids[0], ids[1]);
    assert_eq!(fixture.wm().window_count(), 2);
}

/// Test that a surface without a window role is never shown
#[test]
fn test_roleless_surface_not_shown() {
    let mut fixture = connected();
    let surface = fixture.create_surface().expect("Failed to create surface");

    let shown = fixture
        .render_and_wait_for_shown(
            &surface,
            (100, 50),
            Color::BLACK,
            PixelFormat::Argb8888,
            Duration::from_millis(200),
        )
        .expect("Failed to render");
    assert!(shown.is_none());
}

/// Test that wl_shell surfaces need a bound wl_shell
#[test]
fn test_wl_shell_unbound() {
    let mut fixture = connected();
    let surface = fixture.create_surface().expect("Failed to create surface");

    let err = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::WlShell)
        .unwrap_err();
    assert!(matches!(err, HarnessError::Unbound(Interface::WlShell)));
}

/// Test that a wl_shell toplevel is shown and destroyed like an xdg one
#[test]
fn test_wl_shell_window_shown() {
    let mut fixture = Fixture::with_options(|options| options.wl_shell = true)
        .expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    assert!(fixture.shell().is_some());

    let surface = fixture.create_surface().expect("Failed to create surface");
    let shell = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::WlShell)
        .expect("Failed to create shell surface");
    assert_eq!(shell.kind(), ShellSurfaceKind::WlShell);
    shell.set_title("Legacy");
    shell.set_app_id("org.example.legacy");

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
    assert_eq!((shown.geometry.width, shown.geometry.height), (100, 50));
    assert_eq!(shown.title.as_deref(), Some("Legacy"));
    assert_eq!(shown.app_id.as_deref(), Some("org.example.legacy"));

    shell.destroy();
    surface.destroy();
    fixture.flush().expect("Failed to flush");
    assert!(fixture.wait_for_window_destroyed(shown.id, DEFAULT_TIMEOUT));
    assert_eq!(fixture.wm().window_count(), 0);
    assert!(fixture.wm().protocol_errors().is_empty());
}

/// Test that an empty buffer is rejected before anything is sent
#[test]
fn test_zero_size_render_rejected() {
    let mut fixture = connected();
    let surface = fixture.create_surface().expect("Failed to create surface");

    let err = fixture
        .render(&surface, (0, 50), Color::RED, PixelFormat::Argb8888)
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::InvalidSize {
            width: 0,
            height: 50
        }
    ));
}

/// Test that a window manager that maps with a delay still satisfies the wait
#[test]
fn test_delayed_map() {
    let mut fixture = Fixture::with_options(|options| {
        options.map_delay = Some(Duration::from_millis(200));
    })
    .expect("Failed to create fixture");
    fixture
        .connect(AdditionalInterfaces::empty())
        .expect("Failed to connect");
    let surface = fixture.create_surface().expect("Failed to create surface");
    let _shell = fixture
        .create_shell_surface(&surface, ShellSurfaceKind::XdgShell)
        .expect("Failed to create shell surface");

    fixture
        .render(&surface, (100, 50), Color::RED, PixelFormat::Argb8888)
        .expect("Failed to render");
    let shown = fixture
        .wait_for_window_shown(DEFAULT_TIMEOUT)
        .expect("Window was not shown");
    assert_eq!(shown.geometry.width, 100);
}
