//! Smithay protocol handlers of the headless window manager.

use std::sync::{Arc, Mutex};

use smithay::{
    backend::renderer::utils::on_commit_buffer_handler,
    delegate_compositor, delegate_kde_decoration, delegate_output, delegate_seat, delegate_shm,
    delegate_xdg_shell,
    desktop::Window,
    input::SeatState,
    reexports::wayland_server::{
        backend::{ClientData, ClientId, DisconnectReason},
        protocol::{wl_buffer::WlBuffer, wl_seat::WlSeat, wl_surface::WlSurface},
        Client,
    },
    utils::Serial,
    wayland::{
        buffer::BufferHandler,
        compositor::{
            get_parent, is_sync_subsurface, with_states, CompositorClientState,
            CompositorHandler, CompositorState,
        },
        output::OutputHandler,
        shell::{
            kde::decoration::{KdeDecorationHandler, KdeDecorationState},
            xdg::{
                PopupSurface, PositionerState, ToplevelSurface, XdgShellHandler, XdgShellState,
                XdgToplevelSurfaceData,
            },
        },
        shm::{ShmHandler, ShmState},
    },
};
use tracing::{debug, info, warn};

use super::headless::HeadlessWm;
use super::legacy_shell::{LegacyShellHandler, LegacyShellState};

#[derive(Default)]
pub struct ClientState {
    pub compositor: CompositorClientState,
    /// Shared with the window manager
    pub protocol_errors: Arc<Mutex<Vec<String>>>,
}

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        info!("Client connected: {:?}", client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        info!("Client disconnected: {:?}, reason: {:?}", client_id, reason);
        if let DisconnectReason::ProtocolError(err) = reason {
            warn!("Client {:?} sent a protocol error: {}", client_id, err);
            self.protocol_errors.lock().unwrap().push(err.to_string());
        }
    }
}

impl BufferHandler for HeadlessWm {
    fn buffer_destroyed(&mut self, _buffer: &WlBuffer) {}
}

impl CompositorHandler for HeadlessWm {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        &client.get_data::<ClientState>().unwrap().compositor
    }

    fn commit(&mut self, surface: &WlSurface) {
        on_commit_buffer_handler::<Self>(surface);

        // Parent commit applies sync subsurfaces
        if is_sync_subsurface(surface) {
            return;
        }

        let mut root = surface.clone();
        while let Some(parent) = get_parent(&root) {
            root = parent;
        }
        if let Some(id) = self.legacy_window_for_surface(&root) {
            self.legacy_committed(id, &root);
            return;
        }
        let Some((id, window)) = self.window_for_surface(&root) else {
            return;
        };
        window.on_commit();

        let initial_configure_sent = with_states(&root, |states| {
            states
                .data_map
                .get::<XdgToplevelSurfaceData>()
                .map_or(true, |data| data.lock().unwrap().initial_configure_sent)
        });
        if !initial_configure_sent {
            if let Some(toplevel) = window.toplevel() {
                debug!("Initial configure for {:?}", id);
                toplevel.send_configure();
            }
            return;
        }

        self.toplevel_committed(id, &window);
    }

    fn destroyed(&mut self, surface: &WlSurface) {
        // A wl_shell_surface dies with its surface
        if let Some(id) = self.legacy_window_for_surface(surface) {
            self.window_destroyed(id);
        }
    }
}
delegate_compositor!(HeadlessWm);

impl ShmHandler for HeadlessWm {
    fn shm_state(&self) -> &ShmState {
        &self.shm_state
    }
}
delegate_shm!(HeadlessWm);

impl smithay::input::SeatHandler for HeadlessWm {
    type KeyboardFocus = WlSurface;
    type PointerFocus = WlSurface;
    type TouchFocus = WlSurface;

    fn seat_state(&mut self) -> &mut SeatState<Self> {
        &mut self.seat_state
    }
}
delegate_seat!(HeadlessWm);

impl OutputHandler for HeadlessWm {}
delegate_output!(HeadlessWm);

impl XdgShellHandler for HeadlessWm {
    fn xdg_shell_state(&mut self) -> &mut XdgShellState {
        &mut self.xdg_shell_state
    }

    fn new_toplevel(&mut self, surface: ToplevelSurface) {
        let id = self.assign_window_id();
        self.windows.insert(id, Window::new_wayland_window(surface));
        info!("New toplevel {:?}", id);
    }

    fn toplevel_destroyed(&mut self, surface: ToplevelSurface) {
        let id = self.windows.iter().find_map(|(id, window)| {
            (window.toplevel() == Some(&surface)).then_some(*id)
        });
        if let Some(id) = id {
            self.window_destroyed(id);
        }
    }

    fn new_popup(&mut self, surface: PopupSurface, _positioner: PositionerState) {
        if let Err(err) = surface.send_configure() {
            warn!("error configuring popup: {err:?}");
        }
    }

    fn grab(&mut self, _surface: PopupSurface, _seat: WlSeat, _serial: Serial) {}

    fn reposition_request(
        &mut self,
        surface: PopupSurface,
        positioner: PositionerState,
        token: u32,
    ) {
        surface.with_pending_state(|state| {
            state.geometry = positioner.get_geometry();
            state.positioner = positioner;
        });
        surface.send_repositioned(token);
    }
}
delegate_xdg_shell!(HeadlessWm);

impl KdeDecorationHandler for HeadlessWm {
    fn kde_decoration_state(&self) -> &KdeDecorationState {
        &self.kde_decoration_state
    }
}
delegate_kde_decoration!(HeadlessWm);

impl LegacyShellHandler for HeadlessWm {
    fn legacy_shell_state(&mut self) -> &mut LegacyShellState {
        &mut self.legacy_shell_state
    }

    fn new_shell_surface(&mut self, surface: WlSurface) {
        let id = self.assign_window_id();
        self.legacy_windows.insert(id, surface);
        info!("New wl_shell surface {:?}", id);
    }

    fn shell_surface_destroyed(&mut self, surface: &WlSurface) {
        if let Some(id) = self.legacy_window_for_surface(surface) {
            self.window_destroyed(id);
        }
    }
}
crate::delegate_legacy_shell!(HeadlessWm);
