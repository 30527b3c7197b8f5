//! Startup tests
//!
//! Tests for the startup sequence: backend, screens and the Xwayland launch.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use insta::assert_snapshot;
use wm_harness::testing::{Fixture, HeadlessOptions, HeadlessWm};
use wm_harness::{BootstrapConfig, Geometry, Size, StartupError, TestApplication, WmEvent};

/// Test that the fixture starts with two 1280x1024 screens side by side
#[test]
fn test_default_screens() {
    let fixture = Fixture::new().expect("Failed to create fixture");

    let screens = fixture.screens();
    assert_eq!(screens.len(), 2);
    assert_eq!(
        screens[1].geometry,
        Geometry {
            x: 1280,
            y: 0,
            width: 1280,
            height: 1024
        }
    );
    assert_snapshot!(
        serde_json::to_string(screens).expect("Failed to serialize screens"),
        @r#"[{"name":"Virtual-1","geometry":{"x":0,"y":0,"width":1280,"height":1024}},{"name":"Virtual-2","geometry":{"x":1280,"y":0,"width":1280,"height":1024}}]"#
    );
}

/// Test that backend readiness is the first journal entry
#[test]
fn test_backend_ready_first() {
    let fixture = Fixture::new().expect("Failed to create fixture");
    let first = fixture.journal().entries().first().expect("Empty journal");
    assert_eq!(first.seq, 0);
    assert_eq!(first.event, WmEvent::BackendReady);
}

/// Test that custom outputs are honoured
#[test]
fn test_custom_outputs() {
    let fixture = Fixture::with_options(|options| {
        options.outputs = vec![Size::new(640, 480)];
    })
    .expect("Failed to create fixture");
    assert_eq!(fixture.screens().len(), 1);
    assert_eq!(fixture.screens()[0].geometry.width, 640);
}

/// Test that a window manager without screens fails startup
#[test]
fn test_no_screens_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = HeadlessOptions::new(dir.path().join("wayland-0"));
    options.outputs = Vec::new();

    let result = TestApplication::start(&BootstrapConfig::default(), |handle| {
        HeadlessWm::new(handle, options)
    });
    assert!(matches!(result, Err(StartupError::NoScreens)));
}

fn fake_xwayland(dir: &Path, script: &str) {
    let path = dir.join("Xwayland");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Test the full startup with Xwayland enabled
#[test]
fn test_startup_with_xwayland() {
    let dir = tempfile::tempdir().unwrap();
    // $2 is the -displayfd argument
    fake_xwayland(dir.path(), "#!/bin/sh\necho 7 > /proc/self/fd/$2\nexec sleep 5\n");
    let config = BootstrapConfig {
        plugin_path: vec![dir.path().to_path_buf()],
        xwayland: true,
        ..Default::default()
    };
    let options = HeadlessOptions::new(dir.path().join("wayland-0"));

    let app = TestApplication::start(&config, |handle| HeadlessWm::new(handle, options))
        .expect("Failed to start");
    assert_eq!(app.x11_display(), Some(7));
    assert!(app.harness().wm().has_x11_connection());
    assert_eq!(std::env::var("DISPLAY").as_deref(), Ok(":7"));
}
