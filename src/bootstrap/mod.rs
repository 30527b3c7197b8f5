//! Startup sequencing of the test application.
//!
//! ```text
//! SelectBackend -> [EstablishAuxiliaryConnection] -> EnumerateScreens
//!               -> [LaunchCompatServer] -> Ready
//! ```
//!
//! The bracketed stages only run with Xwayland enabled. [`Startup`] is the
//! transition table; [`TestApplication::start`] drives it on the primary
//! loop, turning each asynchronous completion into a [`StartupEvent`].

mod xwayland;

pub use xwayland::CompatServer;

use std::os::unix::net::UnixStream;

use smithay::reexports::calloop::LoopHandle;
use tracing::{error, info, warn};

use crate::config::BootstrapConfig;
use crate::error::HarnessError;
use crate::harness::{Harness, TestState};
use crate::wm::{ScreenInfo, WindowManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelectBackend,
    EstablishAuxiliaryConnection,
    EnumerateScreens,
    LaunchCompatServer,
    Ready,
}

/// Completion of a startup stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupEvent {
    BackendReady,
    AuxiliaryConnectionEstablished,
    ScreensEnumerated(usize),
    CompatServerReady { display: u32 },
    CompatServerFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Xwayland failed to start: {0}")]
    CompatServer(String),
    #[error("the window manager reported no screens")]
    NoScreens,
    #[error("unexpected {event:?} during {stage:?}")]
    Unexpected { stage: Stage, event: StartupEvent },
    #[error("timed out during {0:?}")]
    Timeout(Stage),
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

impl StartupError {
    /// Errors after which the process cannot provide a usable environment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StartupError::CompatServer(_))
    }
}

/// Startup transition table.
#[derive(Debug, Clone)]
pub struct Startup {
    stage: Stage,
    xwayland: bool,
    history: Vec<Stage>,
}

impl Startup {
    pub fn new(xwayland: bool) -> Self {
        Self {
            stage: Stage::SelectBackend,
            xwayland,
            history: vec![Stage::SelectBackend],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Stages entered so far, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn advance(&mut self, event: StartupEvent) -> Result<Stage, StartupError> {
        let next = match (self.stage, &event) {
            (Stage::SelectBackend, StartupEvent::BackendReady) if self.xwayland => {
                Stage::EstablishAuxiliaryConnection
            }
            (Stage::SelectBackend, StartupEvent::BackendReady) => Stage::EnumerateScreens,
            (Stage::EstablishAuxiliaryConnection, StartupEvent::AuxiliaryConnectionEstablished) => {
                Stage::EnumerateScreens
            }
            (Stage::EnumerateScreens, StartupEvent::ScreensEnumerated(0)) => {
                return Err(StartupError::NoScreens)
            }
            (Stage::EnumerateScreens, StartupEvent::ScreensEnumerated(_)) if self.xwayland => {
                Stage::LaunchCompatServer
            }
            (Stage::EnumerateScreens, StartupEvent::ScreensEnumerated(_)) => Stage::Ready,
            (Stage::LaunchCompatServer, StartupEvent::CompatServerReady { .. }) => Stage::Ready,
            (Stage::LaunchCompatServer, StartupEvent::CompatServerFailed(reason)) => {
                return Err(StartupError::CompatServer(reason.clone()))
            }
            (stage, _) => {
                return Err(StartupError::Unexpected {
                    stage,
                    event: event.clone(),
                })
            }
        };
        info!("Startup: {:?} -> {:?}", self.stage, next);
        self.stage = next;
        self.history.push(next);
        Ok(next)
    }
}

/// A started window manager on its primary loop, ready for connections.
pub struct TestApplication<W: WindowManager> {
    harness: Harness<W>,
    screens: Vec<ScreenInfo>,
    compat_server: Option<CompatServer>,
}

impl<W: WindowManager> TestApplication<W> {
    /// Runs the startup sequence.
    ///
    /// A failing Xwayland launch terminates the process: a test run that
    /// asked for it cannot continue without it.
    pub fn start<F>(config: &BootstrapConfig, make_wm: F) -> Result<Self, StartupError>
    where
        F: FnOnce(LoopHandle<'static, TestState<W>>) -> crate::error::Result<W>,
    {
        let mut harness = Harness::new(make_wm)?;
        let mut startup = Startup::new(config.xwayland);
        let mut screens = Vec::new();
        let mut compat_server = None;
        let mut x11_server_end: Option<UnixStream> = None;

        loop {
            let event = match startup.stage() {
                Stage::SelectBackend => {
                    info!("Starting {} backend", config.backend);
                    harness.wm_mut().start_backend(&config.backend)?;
                    let ready = harness
                        .wait_until(config.startup_timeout, |state| state.journal().backend_ready());
                    if !ready {
                        return Err(StartupError::Timeout(Stage::SelectBackend));
                    }
                    StartupEvent::BackendReady
                }
                Stage::EstablishAuxiliaryConnection => {
                    let (wm_end, server_end) = UnixStream::pair().map_err(HarnessError::from)?;
                    harness.wm_mut().set_x11_connection(wm_end);
                    x11_server_end = Some(server_end);
                    StartupEvent::AuxiliaryConnectionEstablished
                }
                Stage::EnumerateScreens => {
                    screens = harness.wm().screens();
                    StartupEvent::ScreensEnumerated(screens.len())
                }
                Stage::LaunchCompatServer => match x11_server_end.take() {
                    None => StartupEvent::CompatServerFailed("no X11 connection".into()),
                    Some(wm_fd) => match CompatServer::launch(config, &mut harness, wm_fd) {
                        Ok(mut server) => {
                            let event = server.wait_ready(&mut harness, config.startup_timeout);
                            compat_server = Some(server);
                            event
                        }
                        Err(err) => StartupEvent::CompatServerFailed(err.to_string()),
                    },
                },
                Stage::Ready => break,
            };

            if let Err(err) = startup.advance(event) {
                // exit() skips destructors
                abandon(&mut compat_server);
                if err.is_fatal() {
                    fatal(&err);
                }
                return Err(err);
            }
        }

        if let Some(display) = compat_server.as_ref().and_then(CompatServer::display) {
            std::env::set_var("DISPLAY", format!(":{display}"));
        }
        info!("Test application ready with {} screen(s)", screens.len());

        Ok(Self {
            harness,
            screens,
            compat_server,
        })
    }

    pub fn harness(&self) -> &Harness<W> {
        &self.harness
    }

    pub fn harness_mut(&mut self) -> &mut Harness<W> {
        &mut self.harness
    }

    pub fn screens(&self) -> &[ScreenInfo] {
        &self.screens
    }

    /// X11 display number of the running Xwayland.
    pub fn x11_display(&self) -> Option<u32> {
        self.compat_server.as_ref().and_then(CompatServer::display)
    }
}

/// Kills and reaps a launched Xwayland after a failed startup step.
fn abandon(compat_server: &mut Option<CompatServer>) {
    if let Some(server) = compat_server.take() {
        warn!("Stopping Xwayland (pid {})", server.pid());
    }
}

fn fatal(err: &StartupError) -> ! {
    error!("Fatal startup error: {}", err);
    std::process::exit(1);
}
