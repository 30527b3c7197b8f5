//! Test fixture for integration testing
//!
//! The Fixture starts a [`HeadlessWm`] through the regular startup sequence
//! on a socket in a private temporary directory. It dereferences to the
//! [`Harness`], so tests call harness operations on it directly.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::info;

use super::{HeadlessOptions, HeadlessWm};
use crate::bootstrap::{StartupError, TestApplication};
use crate::config::BootstrapConfig;
use crate::error::{HarnessError, Result};
use crate::harness::Harness;
use crate::interfaces::AdditionalInterfaces;
use crate::wm::ScreenInfo;

const SOCKET_NAME: &str = "wayland-0";

pub struct Fixture {
    app: TestApplication<HeadlessWm>,
    socket: PathBuf,
    _dir: TempDir,
}

impl Fixture {
    /// Starts the headless window manager with two 1280x1024 screens.
    pub fn new() -> std::result::Result<Self, StartupError> {
        Self::with_options(|_| {})
    }

    /// Like [`Fixture::new`], with `configure` adjusting the window
    /// manager's options first. The `WMTEST_*` variables apply.
    pub fn with_options<F>(configure: F) -> std::result::Result<Self, StartupError>
    where
        F: FnOnce(&mut HeadlessOptions),
    {
        let config = BootstrapConfig::from_env()?;
        Self::with_config(&config, configure)
    }

    /// Starts the fixture from an explicit configuration, ignoring the
    /// environment.
    pub fn with_config<F>(
        config: &BootstrapConfig,
        configure: F,
    ) -> std::result::Result<Self, StartupError>
    where
        F: FnOnce(&mut HeadlessOptions),
    {
        crate::logging::init_for_tests();

        let dir = tempfile::tempdir().map_err(HarnessError::from)?;
        let socket = dir.path().join(SOCKET_NAME);

        let mut options = HeadlessOptions::new(&socket);
        options.outputs = config.outputs.clone();
        configure(&mut options);

        let app = TestApplication::start(config, |handle| HeadlessWm::new(handle, options))?;
        info!("Test fixture listening on {:?}", socket);

        Ok(Self {
            app,
            socket,
            _dir: dir,
        })
    }

    /// Socket path of the fixture's window manager.
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Sets up the harness connection to the fixture's window manager.
    pub fn connect(&mut self, interfaces: AdditionalInterfaces) -> Result<()> {
        let socket = self.socket.clone();
        self.app.harness_mut().setup_connection(socket, interfaces)
    }

    /// Bound on later connection setups and initial configures.
    pub fn set_setup_timeout(&mut self, timeout: Duration) {
        self.app.harness_mut().set_setup_timeout(timeout);
    }

    /// Screens enumerated during startup.
    pub fn screens(&self) -> &[ScreenInfo] {
        self.app.screens()
    }
}

impl Deref for Fixture {
    type Target = Harness<HeadlessWm>;

    fn deref(&self) -> &Self::Target {
        self.app.harness()
    }
}

impl DerefMut for Fixture {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.app.harness_mut()
    }
}
