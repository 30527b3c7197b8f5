//! Headless reference window manager.
//!
//! A small smithay compositor that serves the harness over a Unix socket:
//! virtual outputs, xdg toplevels, shm buffers, a seat with keyboard,
//! pointer and touch, and KDE server-side decorations. `wl_shell` is only
//! advertised on request; the plasma shell and plasma window management
//! never are.

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smithay::{
    backend::renderer::utils::with_renderer_surface_state,
    desktop::{Space, Window},
    input::{Seat, SeatState},
    output::{Mode as OutputMode, Output, PhysicalProperties, Subpixel},
    reexports::{
        calloop::{
            generic::Generic,
            timer::{TimeoutAction, Timer},
            Interest, LoopHandle, Mode, PostAction,
        },
        wayland_protocols_misc::server_decoration::server::org_kde_kwin_server_decoration_manager::Mode as DecorationMode,
        wayland_server::{protocol::wl_surface::WlSurface, Display, DisplayHandle},
    },
    utils::{Logical, Size as LogicalSize, Transform},
    wayland::{
        compositor::{with_states, CompositorState},
        shell::{
            kde::decoration::KdeDecorationState,
            xdg::{XdgShellState, XdgToplevelSurfaceData},
        },
        shm::ShmState,
    },
};
use tracing::{debug, info, warn};

use super::handlers::ClientState;
use super::legacy_shell::LegacyShellState;
use crate::buffer::Size;
use crate::config::BootstrapConfig;
use crate::error::{HarnessError, Result};
use crate::harness::TestState;
use crate::journal::{Geometry, ShownWindow, WindowId, WmEvent};
use crate::wm::{BackendKind, ScreenInfo, WindowManager};

/// A virtual output
pub struct VirtualOutput {
    pub output: Output,
    pub size: Size,
}

/// Outputs of the virtual backend, laid out left to right.
#[derive(Default)]
pub struct HeadlessBackend {
    pub outputs: Vec<VirtualOutput>,
}

impl HeadlessBackend {
    pub fn add_output(
        &mut self,
        name: &str,
        size: Size,
        display_handle: &DisplayHandle,
        space: &mut Space<Window>,
    ) {
        let (width, height) = (size.width as i32, size.height as i32);
        let output = Output::new(
            name.to_string(),
            PhysicalProperties {
                size: (width, height).into(),
                subpixel: Subpixel::Unknown,
                make: "wm-harness".into(),
                model: "Virtual".into(),
            },
        );
        let mode = OutputMode {
            size: (width, height).into(),
            refresh: 60_000,
        };
        output.change_current_state(Some(mode), Some(Transform::Normal), None, None);
        output.set_preferred(mode);
        output.create_global::<HeadlessWm>(display_handle);

        let x_offset: i32 = self
            .outputs
            .iter()
            .map(|virt| virt.size.width as i32)
            .sum();
        space.map_output(&output, (x_offset, 0));
        info!("Added output {} ({}x{}) at x={}", name, width, height, x_offset);

        self.outputs.push(VirtualOutput { output, size });
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// Where the listening socket is created
    pub socket_path: PathBuf,
    pub outputs: Vec<Size>,
    /// Delay between a toplevel's first buffer and it being shown
    pub map_delay: Option<Duration>,
    /// Delay before a lock or unlock request takes effect
    pub lock_delay: Duration,
    /// Advertise the legacy `wl_shell`
    pub wl_shell: bool,
}

impl HeadlessOptions {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            outputs: BootstrapConfig::default().outputs,
            map_delay: None,
            lock_delay: Duration::ZERO,
            wl_shell: false,
        }
    }
}

pub struct HeadlessWm {
    pub display_handle: DisplayHandle,
    handle: LoopHandle<'static, TestState<HeadlessWm>>,
    pub space: Space<Window>,

    pub(super) compositor_state: CompositorState,
    pub(super) xdg_shell_state: XdgShellState,
    pub(super) shm_state: ShmState,
    pub(super) seat_state: SeatState<HeadlessWm>,
    pub(super) kde_decoration_state: KdeDecorationState,
    pub(super) legacy_shell_state: LegacyShellState,
    seat: Seat<HeadlessWm>,

    backend: Option<HeadlessBackend>,
    options: HeadlessOptions,

    pub(super) windows: HashMap<WindowId, Window>,
    /// `wl_shell` toplevels, by their surface
    pub(super) legacy_windows: HashMap<WindowId, WlSurface>,
    next_window_id: u32,
    shown: HashSet<WindowId>,
    pending_show: HashSet<WindowId>,
    pub(super) pending_events: Vec<WmEvent>,
    locked: bool,
    x11_connection: Option<UnixStream>,
    protocol_errors: Arc<Mutex<Vec<String>>>,
}

impl HeadlessWm {
    /// Creates the display and starts listening on `options.socket_path`.
    pub fn new(
        handle: LoopHandle<'static, TestState<HeadlessWm>>,
        options: HeadlessOptions,
    ) -> Result<Self> {
        let display: Display<HeadlessWm> =
            Display::new().map_err(|err| HarnessError::Backend(err.to_string()))?;
        let display_handle = display.handle();

        let compositor_state = CompositorState::new::<Self>(&display_handle);
        let xdg_shell_state = XdgShellState::new::<Self>(&display_handle);
        let shm_state = ShmState::new::<Self>(&display_handle, vec![]);
        let kde_decoration_state =
            KdeDecorationState::new::<Self>(&display_handle, DecorationMode::Server);
        let legacy_shell_state = if options.wl_shell {
            LegacyShellState::new::<Self>(&display_handle)
        } else {
            LegacyShellState::default()
        };

        let mut seat_state = SeatState::new();
        let mut seat = seat_state.new_wl_seat(&display_handle, "seat0");
        seat.add_keyboard(Default::default(), 200, 25)
            .map_err(|err| HarnessError::Backend(format!("keyboard: {err}")))?;
        seat.add_pointer();
        seat.add_touch();

        let listener = bind_socket(&options.socket_path)?;
        info!("Listening on {:?}", options.socket_path);

        handle
            .insert_source(
                Generic::new(listener, Interest::READ, Mode::Level),
                |_, listener, state| {
                    loop {
                        match listener.accept() {
                            Ok((stream, _)) => {
                                if let Err(err) = state.wm.insert_client(stream) {
                                    warn!("Failed to insert client: {}", err);
                                }
                            }
                            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                            Err(err) => {
                                warn!("Failed to accept client: {}", err);
                                break;
                            }
                        }
                    }
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|err| HarnessError::EventLoop(err.error))?;

        handle
            .insert_source(
                Generic::new(display, Interest::READ, Mode::Level),
                |_, display, state| {
                    // SAFETY: we don't drop the display while the event loop is running
                    let display = unsafe { display.get_mut() };
                    if let Err(err) = display.dispatch_clients(&mut state.wm) {
                        warn!("Failed to dispatch clients: {}", err);
                    }
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|err| HarnessError::EventLoop(err.error))?;

        Ok(Self {
            display_handle,
            handle,
            space: Space::default(),
            compositor_state,
            xdg_shell_state,
            shm_state,
            seat_state,
            kde_decoration_state,
            legacy_shell_state,
            seat,
            backend: None,
            options,
            windows: HashMap::new(),
            legacy_windows: HashMap::new(),
            next_window_id: 1,
            shown: HashSet::new(),
            pending_show: HashSet::new(),
            pending_events: Vec::new(),
            locked: false,
            x11_connection: None,
            protocol_errors: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.options.socket_path
    }

    pub fn seat(&self) -> &Seat<HeadlessWm> {
        &self.seat
    }

    pub fn backend(&self) -> Option<&HeadlessBackend> {
        self.backend.as_ref()
    }

    /// Toplevels that exist, shown or not.
    pub fn window_count(&self) -> usize {
        self.windows.len() + self.legacy_windows.len()
    }

    pub fn is_shown(&self, id: WindowId) -> bool {
        self.shown.contains(&id)
    }

    pub fn has_x11_connection(&self) -> bool {
        self.x11_connection.is_some()
    }

    /// Protocol errors that disconnected a client.
    pub fn protocol_errors(&self) -> Vec<String> {
        self.protocol_errors.lock().unwrap().clone()
    }

    pub(super) fn assign_window_id(&mut self) -> WindowId {
        let id = WindowId(self.next_window_id);
        self.next_window_id += 1;
        id
    }

    pub(super) fn window_for_surface(&self, surface: &WlSurface) -> Option<(WindowId, Window)> {
        self.windows.iter().find_map(|(id, window)| {
            window
                .toplevel()
                .is_some_and(|toplevel| toplevel.wl_surface() == surface)
                .then(|| (*id, window.clone()))
        })
    }

    pub(super) fn legacy_window_for_surface(&self, surface: &WlSurface) -> Option<WindowId> {
        self.legacy_windows
            .iter()
            .find_map(|(id, legacy)| (legacy == surface).then_some(*id))
    }

    /// A toplevel committed after its initial configure.
    pub(super) fn toplevel_committed(&mut self, id: WindowId, window: &Window) {
        self.request_show(id, window.geometry().size);
    }

    /// A `wl_shell` surface committed. It is shown once it is a toplevel
    /// with a buffer.
    pub(super) fn legacy_committed(&mut self, id: WindowId, surface: &WlSurface) {
        let is_toplevel = self
            .legacy_shell_state
            .surface_data(surface)
            .is_some_and(|data| data.toplevel);
        if !is_toplevel {
            return;
        }
        if let Some(size) = legacy_surface_size(surface) {
            self.request_show(id, size);
        }
    }

    fn request_show(&mut self, id: WindowId, size: LogicalSize<i32, Logical>) {
        if self.shown.contains(&id) || self.pending_show.contains(&id) {
            return;
        }
        if size.w <= 0 || size.h <= 0 {
            return;
        }

        self.pending_show.insert(id);
        match self.options.map_delay {
            None => self.show_window(id),
            Some(delay) => {
                debug!("Showing {:?} in {:?}", id, delay);
                self.schedule(delay, move |wm| wm.show_window(id));
            }
        }
    }

    fn show_window(&mut self, id: WindowId) {
        self.pending_show.remove(&id);
        let origin = self
            .space
            .outputs()
            .next()
            .and_then(|output| self.space.output_geometry(output))
            .map(|geo| geo.loc)
            .unwrap_or_default();

        let (size, title, app_id) = if let Some(window) = self.windows.get(&id).cloned() {
            self.space.map_element(window.clone(), origin, true);
            let (title, app_id) = window
                .toplevel()
                .map(|toplevel| {
                    with_states(toplevel.wl_surface(), |states| {
                        states
                            .data_map
                            .get::<XdgToplevelSurfaceData>()
                            .map(|data| {
                                let data = data.lock().unwrap();
                                (data.title.clone(), data.app_id.clone())
                            })
                            .unwrap_or_default()
                    })
                })
                .unwrap_or_default();
            (window.geometry().size, title, app_id)
        } else if let Some(surface) = self.legacy_windows.get(&id) {
            // Not mapped into the space, which only holds xdg windows
            let data = self
                .legacy_shell_state
                .surface_data(surface)
                .cloned()
                .unwrap_or_default();
            let size = legacy_surface_size(surface).unwrap_or_else(|| (0, 0).into());
            (size, data.title, data.class)
        } else {
            debug!("{:?} went away before it was shown", id);
            return;
        };
        self.shown.insert(id);

        info!("Showing {:?} at {:?} size {:?}", id, origin, size);
        self.pending_events.push(WmEvent::WindowShown(ShownWindow {
            id,
            geometry: Geometry {
                x: origin.x,
                y: origin.y,
                width: size.w,
                height: size.h,
            },
            title,
            app_id,
        }));
    }

    pub(super) fn window_destroyed(&mut self, id: WindowId) {
        if let Some(window) = self.windows.remove(&id) {
            self.space.unmap_elem(&window);
        }
        self.legacy_windows.remove(&id);
        self.shown.remove(&id);
        self.pending_show.remove(&id);
        info!("Window {:?} destroyed", id);
        self.pending_events.push(WmEvent::WindowClosed { id });
    }

    fn set_locked(&mut self, locked: bool) {
        if self.locked == locked {
            return;
        }
        self.locked = locked;
        info!("Screen {}", if locked { "locked" } else { "unlocked" });
        self.pending_events.push(WmEvent::LockStateChanged { locked });
    }

    /// Runs `action` on the primary loop after `delay`.
    fn schedule<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce(&mut HeadlessWm) + 'static,
    {
        let mut action = Some(action);
        let result = self
            .handle
            .insert_source(Timer::from_duration(delay), move |_, _, state| {
                if let Some(action) = action.take() {
                    action(&mut state.wm);
                }
                TimeoutAction::Drop
            });
        if let Err(err) = result {
            warn!("Failed to schedule timer: {}", err);
        }
    }
}

impl WindowManager for HeadlessWm {
    fn start_backend(&mut self, backend: &BackendKind) -> Result<()> {
        if self.backend.is_some() {
            return Err(HarnessError::Backend("backend already started".into()));
        }
        match backend {
            BackendKind::Named(name) => Err(HarnessError::UnsupportedBackend(name.clone())),
            BackendKind::Virtual => {
                let mut headless = HeadlessBackend::default();
                for (index, size) in self.options.outputs.iter().enumerate() {
                    let name = format!("Virtual-{}", index + 1);
                    headless.add_output(&name, *size, &self.display_handle, &mut self.space);
                }
                self.backend = Some(headless);
                self.schedule(Duration::ZERO, |wm| {
                    wm.pending_events.push(WmEvent::BackendReady)
                });
                Ok(())
            }
        }
    }

    fn screens(&self) -> Vec<ScreenInfo> {
        self.space
            .outputs()
            .filter_map(|output| {
                let geo = self.space.output_geometry(output)?;
                Some(ScreenInfo {
                    name: output.name(),
                    geometry: Geometry {
                        x: geo.loc.x,
                        y: geo.loc.y,
                        width: geo.size.w,
                        height: geo.size.h,
                    },
                })
            })
            .collect()
    }

    fn insert_client(&mut self, stream: UnixStream) -> io::Result<()> {
        let client_state = ClientState {
            compositor: Default::default(),
            protocol_errors: self.protocol_errors.clone(),
        };
        let client = self
            .display_handle
            .insert_client(stream, Arc::new(client_state))?;
        debug!("Inserted client {:?}", client.id());
        Ok(())
    }

    fn set_x11_connection(&mut self, stream: UnixStream) {
        self.x11_connection = Some(stream);
    }

    fn take_events(&mut self) -> Vec<WmEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn is_screen_locked(&self) -> bool {
        self.locked
    }

    fn lock_screen(&mut self) {
        self.schedule(self.options.lock_delay, |wm| wm.set_locked(true));
    }

    fn unlock_screen(&mut self) {
        self.schedule(self.options.lock_delay, |wm| wm.set_locked(false));
    }

    fn refresh(&mut self) {
        self.space.refresh();
        if let Err(err) = self.display_handle.flush_clients() {
            debug!("Failed to flush clients: {}", err);
        }
    }
}

impl Drop for HeadlessWm {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.options.socket_path);
    }
}

fn legacy_surface_size(surface: &WlSurface) -> Option<LogicalSize<i32, Logical>> {
    with_renderer_surface_state(surface, |state| state.surface_size()).flatten()
}

fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}
