//! wm-harness binary entry point
//!
//! Self-check: starts the headless window manager from the WMTEST_*
//! environment, connects, shows one 100x50 window and exits non-zero if the
//! window manager did not report it with that size.

use anyhow::{bail, Context};
use tracing::{error, info};
use wm_harness::testing::{HeadlessOptions, HeadlessWm};
use wm_harness::{
    logging, AdditionalInterfaces, BootstrapConfig, Color, PixelFormat, ShellSurfaceKind,
    TestApplication, DEFAULT_TIMEOUT,
};

fn main() {
    logging::init();

    if let Err(e) = run() {
        error!("Self-check failed: {:#}", e);
        std::process::exit(1);
    }
    info!("Self-check passed");
}

fn run() -> anyhow::Result<()> {
    let config = BootstrapConfig::from_env().context("invalid WMTEST_* environment")?;
    config.apply_environment();

    let dir = tempfile::tempdir().context("creating socket directory")?;
    let socket = dir.path().join("wayland-0");
    let mut options = HeadlessOptions::new(&socket);
    options.outputs = config.outputs.clone();

    let mut app = TestApplication::start(&config, |handle| HeadlessWm::new(handle, options))
        .context("starting window manager")?;
    for screen in app.screens() {
        info!("Screen {}: {:?}", screen.name, screen.geometry);
    }

    let harness = app.harness_mut();
    harness.setup_connection(&socket, AdditionalInterfaces::SEAT)?;
    let surface = harness.create_surface()?;
    let shell = harness.create_shell_surface(&surface, ShellSurfaceKind::XdgShell)?;
    shell.set_title("wm-harness self-check");

    let shown = harness
        .render_and_wait_for_shown(
            &surface,
            (100, 50),
            Color::RED,
            PixelFormat::Argb8888,
            DEFAULT_TIMEOUT,
        )?
        .context("window was not shown")?;
    info!("Window {:?} shown at {:?}", shown.id, shown.geometry);
    if (shown.geometry.width, shown.geometry.height) != (100, 50) {
        bail!("unexpected window geometry {:?}", shown.geometry);
    }

    shell.destroy();
    surface.destroy();
    harness.teardown_connection();
    Ok(())
}
