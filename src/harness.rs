//! The harness: a primary event loop hosting the window manager under test,
//! plus at most one client connection to it.
//!
//! Every blocking call spins the primary loop until its condition holds or
//! its timeout elapses, so the window manager keeps running while a test
//! waits on it. Timeouts are ordinary outcomes and are reported as `false`
//! or `None`.

use std::path::Path;
use std::time::{Duration, Instant};

use smithay::reexports::calloop::{channel, EventLoop, LoopHandle, RegistrationToken};
use tracing::{debug, info, warn};
use wayland_client::{
    protocol::{
        wl_compositor::WlCompositor, wl_seat::Capability, wl_seat::WlSeat, wl_shell::WlShell,
        wl_shm::WlShm,
    },
    Proxy,
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;
use wayland_protocols_misc::server_decoration::client::org_kde_kwin_server_decoration_manager::OrgKdeKwinServerDecorationManager;
use wayland_protocols_plasma::{
    plasma_shell::client::org_kde_plasma_shell::OrgKdePlasmaShell,
    plasma_window_management::client::org_kde_plasma_window_management::OrgKdePlasmaWindowManagement,
};

use crate::buffer::{Color, PixelBuffer, PixelFormat, Size};
use crate::client::{
    resolve_socket_path, ConnectionId, DispatchThread, GlobalHandle, Globals, Session,
};
use crate::error::{HarnessError, Result};
use crate::interfaces::{AdditionalInterfaces, Interface};
use crate::journal::{Cursor, Journal, ShownWindow, WindowId};
use crate::surface::{ShellSurface, ShellSurfaceKind, Surface, XdgShellSurface};
use crate::wm::WindowManager;

/// Timeout used when a test has no reason to pick its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Longest single dispatch while waiting.
const DISPATCH_STEP: Duration = Duration::from_millis(10);

/// Data of the primary event loop.
pub struct TestState<W> {
    pub wm: W,
    pub(crate) session: Option<Session>,
    pub(crate) journal: Journal,
}

impl<W: WindowManager> TestState<W> {
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Capabilities last announced by the bound seat.
    pub fn seat_capabilities(&self) -> Capability {
        self.session
            .as_ref()
            .map_or(Capability::empty(), |session| session.seat_capabilities)
    }

    fn refresh(&mut self) {
        self.wm.refresh();
        for event in self.wm.take_events() {
            self.journal.record(event);
        }
    }
}

struct OpenConnection {
    thread: DispatchThread,
    token: RegistrationToken,
}

pub struct Harness<W: WindowManager> {
    event_loop: EventLoop<'static, TestState<W>>,
    state: TestState<W>,
    connection: Option<OpenConnection>,
    next_connection: u64,
    setup_timeout: Duration,
}

impl<W: WindowManager> Harness<W> {
    /// Creates the primary loop and the window manager on it.
    pub fn new<F>(make_wm: F) -> Result<Self>
    where
        F: FnOnce(LoopHandle<'static, TestState<W>>) -> Result<W>,
    {
        let event_loop: EventLoop<'static, TestState<W>> = EventLoop::try_new()?;
        let wm = make_wm(event_loop.handle())?;

        Ok(Self {
            event_loop,
            state: TestState {
                wm,
                session: None,
                journal: Journal::default(),
            },
            connection: None,
            next_connection: 1,
            setup_timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Bound on connection setup and on the initial xdg configure.
    pub fn set_setup_timeout(&mut self, timeout: Duration) {
        self.setup_timeout = timeout;
    }

    /// Handle of the primary loop, for registering sources on it.
    pub fn handle(&self) -> LoopHandle<'static, TestState<W>> {
        self.event_loop.handle()
    }

    /// Everything the primary loop dispatches to.
    pub fn state(&self) -> &TestState<W> {
        &self.state
    }

    /// The window manager under test.
    pub fn wm(&self) -> &W {
        &self.state.wm
    }

    /// Mutable access to the window manager, e.g. to start its backend.
    pub fn wm_mut(&mut self) -> &mut W {
        &mut self.state.wm
    }

    /// Notifications drained from the window manager so far.
    pub fn journal(&self) -> &Journal {
        &self.state.journal
    }

    /// Runs one iteration of the primary loop, then lets the window manager
    /// flush and collects its notifications.
    pub fn dispatch(&mut self, timeout: Duration) {
        if let Err(err) = self.event_loop.dispatch(Some(timeout), &mut self.state) {
            warn!("Event loop dispatch failed: {}", err);
        }
        self.state.refresh();
    }

    /// Spins the primary loop until `predicate` holds or `timeout` elapses.
    /// The predicate is checked before the first dispatch.
    pub fn wait_until<P>(&mut self, timeout: Duration, mut predicate: P) -> bool
    where
        P: FnMut(&TestState<W>) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.state) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.dispatch((deadline - now).min(DISPATCH_STEP));
        }
    }

    /// Opens the connection and blocks until every required global and
    /// every global in `interfaces` is bound.
    ///
    /// On failure the partial connection is torn down again.
    pub fn setup_connection(
        &mut self,
        socket_name: impl AsRef<Path>,
        interfaces: AdditionalInterfaces,
    ) -> Result<()> {
        if self.connection.is_some() {
            return Err(HarnessError::AlreadyConnected);
        }
        let socket = resolve_socket_path(socket_name)?;
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        info!(
            "Opening connection {} to {:?} with {:?}",
            id, socket, interfaces
        );

        let (thread, channel) = DispatchThread::spawn(id, socket.clone(), interfaces)?;
        let token = self
            .event_loop
            .handle()
            .insert_source(channel, |event, _, state| {
                if let channel::Event::Msg(event) = event {
                    if let Some(session) = state.session.as_mut() {
                        session.apply(event);
                    }
                }
            })
            .map_err(|err| HarnessError::EventLoop(err.error))?;
        self.state.session = Some(Session::new(id, socket, interfaces));
        self.connection = Some(OpenConnection { thread, token });

        let settled = self.wait_until(self.setup_timeout, |state| {
            state
                .session
                .as_ref()
                .map_or(true, |session| session.is_ready() || session.failure.is_some())
        });

        let result = match self.state.session.as_mut() {
            None => Err(HarnessError::NotConnected),
            Some(session) => match session.failure.take() {
                Some(err) => Err(err),
                None if !settled => Err(HarnessError::SetupTimeout {
                    missing: session.binder.missing(),
                }),
                None => Ok(()),
            },
        };
        match &result {
            Ok(()) => info!("Connection {} ready", id),
            Err(err) => {
                warn!("Connection {} setup failed: {}", id, err);
                self.teardown_connection();
            }
        }
        result
    }

    /// Closes the connection, if any. Returns once the dispatch thread has
    /// exited; no event of the closed connection is delivered afterwards.
    pub fn teardown_connection(&mut self) {
        let Some(mut open) = self.connection.take() else {
            return;
        };
        open.thread.stop();
        self.event_loop.handle().remove(open.token);
        if let Some(session) = self.state.session.take() {
            session.close();
        }
    }

    /// Whether a connection is open. False again after teardown.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Id of the open connection. Every setup gets a fresh one.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state.session.as_ref().map(|session| session.id)
    }

    /// Sends buffered requests to the server.
    pub fn flush(&self) -> Result<()> {
        self.session()?.flush()
    }

    /// All globals of the open connection, `None` without one.
    pub fn globals(&self) -> Option<&Globals> {
        self.state.session.as_ref().map(|session| &session.globals)
    }

    /// The bound `wl_compositor`.
    pub fn compositor(&self) -> Option<&GlobalHandle<WlCompositor>> {
        self.globals()?.compositor()
    }

    /// The bound `wl_shm`.
    pub fn shm(&self) -> Option<&GlobalHandle<WlShm>> {
        self.globals()?.shm()
    }

    /// The legacy `wl_shell`, if the window manager advertises it.
    pub fn shell(&self) -> Option<&GlobalHandle<WlShell>> {
        self.globals()?.shell()
    }

    /// The bound `xdg_wm_base`.
    pub fn xdg_wm_base(&self) -> Option<&GlobalHandle<XdgWmBase>> {
        self.globals()?.xdg_wm_base()
    }

    /// The `wl_seat`, bound only with [`AdditionalInterfaces::SEAT`].
    pub fn seat(&self) -> Option<&GlobalHandle<WlSeat>> {
        self.globals()?.seat()
    }

    /// The KDE decoration manager, bound only with
    /// [`AdditionalInterfaces::DECORATION`].
    pub fn server_decoration(&self) -> Option<&GlobalHandle<OrgKdeKwinServerDecorationManager>> {
        self.globals()?.server_decoration()
    }

    /// The plasma shell, bound only with
    /// [`AdditionalInterfaces::PLASMA_SHELL`].
    pub fn plasma_shell(&self) -> Option<&GlobalHandle<OrgKdePlasmaShell>> {
        self.globals()?.plasma_shell()
    }

    /// Plasma window management, bound only with
    /// [`AdditionalInterfaces::WINDOW_MANAGEMENT`].
    pub fn window_management(&self) -> Option<&GlobalHandle<OrgKdePlasmaWindowManagement>> {
        self.globals()?.window_management()
    }

    fn session(&self) -> Result<&Session> {
        self.state.session.as_ref().ok_or(HarnessError::NotConnected)
    }

    /// Creates a role-less surface.
    pub fn create_surface(&self) -> Result<Surface> {
        let session = self.session()?;
        let compositor = session
            .globals
            .compositor()
            .ok_or(HarnessError::Unbound(Interface::Compositor))?;
        let surface = compositor.create_surface(session.queue()?, ());
        Ok(Surface::new(surface, session.id))
    }

    /// Gives `surface` a toplevel window role.
    ///
    /// For [`ShellSurfaceKind::XdgShell`] this commits the surface and
    /// returns once the initial configure was acknowledged, so the surface
    /// can be rendered right away.
    pub fn create_shell_surface(
        &mut self,
        surface: &Surface,
        kind: ShellSurfaceKind,
    ) -> Result<ShellSurface> {
        let session = self.session()?;
        surface.check_connection(session.id)?;
        let qh = session.queue()?;

        match kind {
            ShellSurfaceKind::WlShell => {
                let shell = session
                    .globals
                    .shell()
                    .ok_or(HarnessError::Unbound(Interface::WlShell))?;
                let shell_surface = shell.get_shell_surface(surface.wl_surface(), qh, ());
                shell_surface.set_toplevel();
                session.flush()?;
                Ok(ShellSurface::WlShell(shell_surface))
            }
            ShellSurfaceKind::XdgShell => {
                let wm_base = session
                    .globals
                    .xdg_wm_base()
                    .ok_or(HarnessError::Unbound(Interface::XdgWmBase))?;
                let xdg_surface = wm_base.get_xdg_surface(surface.wl_surface(), qh, ());
                let toplevel = xdg_surface.get_toplevel(qh, ());
                surface.wl_surface().commit();
                session.flush()?;

                let id = xdg_surface.id();
                let configured = self.wait_until(self.setup_timeout, |state| {
                    state
                        .session
                        .as_ref()
                        .is_some_and(|session| session.is_configured(&id))
                });
                if !configured {
                    toplevel.destroy();
                    xdg_surface.destroy();
                    return Err(HarnessError::Timeout("initial xdg_surface configure"));
                }
                Ok(ShellSurface::Xdg(XdgShellSurface {
                    xdg_surface,
                    toplevel,
                }))
            }
        }
    }

    /// Attaches a buffer of `size` filled with `color`, damages all of it and
    /// commits. Nothing is awaited.
    pub fn render(
        &self,
        surface: &Surface,
        size: impl Into<Size>,
        color: Color,
        format: PixelFormat,
    ) -> Result<()> {
        let size = size.into();
        let session = self.session()?;
        surface.check_connection(session.id)?;
        let shm = session
            .globals
            .shm()
            .ok_or(HarnessError::Unbound(Interface::Shm))?;

        let pixels = PixelBuffer::filled(size, color, format)?;
        let buffer = pixels.create_wl_buffer(shm, session.queue()?);
        let wl_surface = surface.wl_surface();
        wl_surface.attach(Some(&buffer), 0, 0);
        wl_surface.damage(0, 0, size.width as i32, size.height as i32);
        wl_surface.commit();
        session.flush()
    }

    /// Waits for a window shown after this call starts. Windows shown
    /// earlier never satisfy it.
    pub fn wait_for_window_shown(&mut self, timeout: Duration) -> Option<ShownWindow> {
        let cursor = self.state.journal.cursor();
        self.wait_for_window_shown_since(cursor, timeout)
    }

    fn wait_for_window_shown_since(
        &mut self,
        cursor: Cursor,
        timeout: Duration,
    ) -> Option<ShownWindow> {
        self.wait_until(timeout, |state| state.journal.shown_since(cursor).is_some());
        let window = self.state.journal.shown_since(cursor).cloned();
        match &window {
            Some(window) => debug!("Window {:?} shown at {:?}", window.id, window.geometry),
            None => debug!("No window shown within {:?}", timeout),
        }
        window
    }

    /// [`render`](Self::render) followed by
    /// [`wait_for_window_shown`](Self::wait_for_window_shown).
    pub fn render_and_wait_for_shown(
        &mut self,
        surface: &Surface,
        size: impl Into<Size>,
        color: Color,
        format: PixelFormat,
        timeout: Duration,
    ) -> Result<Option<ShownWindow>> {
        let cursor = self.state.journal.cursor();
        self.render(surface, size, color, format)?;
        Ok(self.wait_for_window_shown_since(cursor, timeout))
    }

    /// Waits until the window manager reported `window` destroyed. True
    /// immediately if that already happened.
    pub fn wait_for_window_destroyed(&mut self, window: WindowId, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.journal.is_closed(window))
    }

    /// Locks the screen and waits for the window manager to confirm.
    /// Succeeds without waiting when already locked.
    pub fn lock_screen(&mut self, timeout: Duration) -> bool {
        if self.state.wm.is_screen_locked() {
            debug!("Screen already locked");
            return true;
        }
        self.state.wm.lock_screen();
        self.wait_until(timeout, |state| state.wm.is_screen_locked())
    }

    /// Unlocks the screen and waits for the window manager to confirm.
    /// Succeeds without waiting when already unlocked.
    pub fn unlock_screen(&mut self, timeout: Duration) -> bool {
        if !self.state.wm.is_screen_locked() {
            debug!("Screen already unlocked");
            return true;
        }
        self.state.wm.unlock_screen();
        self.wait_until(timeout, |state| !state.wm.is_screen_locked())
    }

    /// Waits until the seat announces a pointer.
    pub fn wait_for_pointer(&mut self, timeout: Duration) -> bool {
        self.wait_for_seat_capability(Capability::Pointer, timeout)
    }

    /// Waits until the seat announces touch.
    pub fn wait_for_touch(&mut self, timeout: Duration) -> bool {
        self.wait_for_seat_capability(Capability::Touch, timeout)
    }

    /// Waits until the seat announces a keyboard.
    pub fn wait_for_keyboard(&mut self, timeout: Duration) -> bool {
        self.wait_for_seat_capability(Capability::Keyboard, timeout)
    }

    /// False right away without a bound seat.
    fn wait_for_seat_capability(&mut self, capability: Capability, timeout: Duration) -> bool {
        if self.seat().is_none() {
            debug!("No seat bound, not waiting for {:?}", capability);
            return false;
        }
        self.wait_until(timeout, |state| {
            state.seat_capabilities().contains(capability)
        })
    }
}

impl<W: WindowManager> Drop for Harness<W> {
    fn drop(&mut self) {
        self.teardown_connection();
    }
}
