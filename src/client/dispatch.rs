//! Event handling on the dispatch thread.
//!
//! Only protocol housekeeping happens here (binding globals, answering
//! pings, acking configures, destroying released buffers). Everything else
//! is forwarded to the primary loop.

use smithay::reexports::calloop::channel::Sender;
use tracing::{debug, trace};
use wayland_client::{
    delegate_noop,
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_compositor::WlCompositor,
        wl_registry::{self, WlRegistry},
        wl_seat::{self, WlSeat},
        wl_shell::WlShell,
        wl_shell_surface::{self, WlShellSurface},
        wl_shm::WlShm,
        wl_shm_pool::WlShmPool,
        wl_surface::WlSurface,
    },
    Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::XdgToplevel,
    xdg_wm_base::{self, XdgWmBase},
};
use wayland_protocols_misc::server_decoration::client::org_kde_kwin_server_decoration_manager::OrgKdeKwinServerDecorationManager;
use wayland_protocols_plasma::{
    plasma_shell::client::org_kde_plasma_shell::OrgKdePlasmaShell,
    plasma_window_management::client::org_kde_plasma_window_management::OrgKdePlasmaWindowManagement,
};

use super::{BoundGlobal, ConnectionEvent};
use crate::interfaces::{AdditionalInterfaces, Interface, RegistryBinder};

/// State of the dispatch thread's event queue.
pub(crate) struct ClientState {
    binder: RegistryBinder,
    sender: Sender<ConnectionEvent>,
}

impl ClientState {
    pub fn new(requested: AdditionalInterfaces, sender: Sender<ConnectionEvent>) -> Self {
        Self {
            binder: RegistryBinder::new(requested),
            sender,
        }
    }

    fn send(&self, event: ConnectionEvent) {
        // The receiver is gone only while the connection is torn down
        if self.sender.send(event).is_err() {
            trace!("Dropping event for a closed connection");
        }
    }
}

impl Dispatch<WlRegistry, ()> for ClientState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                let Some(binding) = state.binder.offer(&interface, version) else {
                    trace!("Ignoring global {} v{}", interface, version);
                    return;
                };
                let version = binding.version;
                let global = match binding.interface {
                    Interface::Compositor => {
                        BoundGlobal::Compositor(registry.bind(name, version, qh, ()))
                    }
                    Interface::Shm => BoundGlobal::Shm(registry.bind(name, version, qh, ())),
                    Interface::WlShell => {
                        BoundGlobal::WlShell(registry.bind(name, version, qh, ()))
                    }
                    Interface::XdgWmBase => {
                        BoundGlobal::XdgWmBase(registry.bind(name, version, qh, ()))
                    }
                    Interface::Seat => BoundGlobal::Seat(registry.bind(name, version, qh, ())),
                    Interface::ServerDecoration => {
                        BoundGlobal::ServerDecoration(registry.bind(name, version, qh, ()))
                    }
                    Interface::PlasmaShell => {
                        BoundGlobal::PlasmaShell(registry.bind(name, version, qh, ()))
                    }
                    Interface::WindowManagement => {
                        BoundGlobal::WindowManagement(registry.bind(name, version, qh, ()))
                    }
                };
                debug!("Bound {} v{}", binding.interface, version);
                state.send(ConnectionEvent::Bound(global));
            }
            wl_registry::Event::GlobalRemove { name } => {
                debug!("Global {} removed", name);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for ClientState {
    fn event(
        state: &mut Self,
        _: &WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        {
            debug!("Seat capabilities: {:?}", capabilities);
            state.send(ConnectionEvent::SeatCapabilities(capabilities));
        }
    }
}

impl Dispatch<WlBuffer, ()> for ClientState {
    fn event(
        _: &mut Self,
        buffer: &WlBuffer,
        event: wl_buffer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            buffer.destroy();
        }
    }
}

impl Dispatch<WlShellSurface, ()> for ClientState {
    fn event(
        _: &mut Self,
        shell_surface: &WlShellSurface,
        event: wl_shell_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_shell_surface::Event::Ping { serial } = event {
            shell_surface.pong(serial);
        }
    }
}

impl Dispatch<XdgWmBase, ()> for ClientState {
    fn event(
        _: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for ClientState {
    fn event(
        state: &mut Self,
        xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            // Acked before the primary loop hears about it, so its next
            // commit is ordered after the ack on the wire
            xdg_surface.ack_configure(serial);
            state.send(ConnectionEvent::Configured(xdg_surface.id()));
        }
    }
}

delegate_noop!(ClientState: WlCompositor);
delegate_noop!(ClientState: WlShmPool);
delegate_noop!(ClientState: WlShell);
delegate_noop!(ClientState: ignore WlSurface);
delegate_noop!(ClientState: ignore WlShm);
delegate_noop!(ClientState: ignore XdgToplevel);
delegate_noop!(ClientState: ignore OrgKdeKwinServerDecorationManager);
delegate_noop!(ClientState: ignore OrgKdePlasmaShell);
delegate_noop!(ClientState: ignore OrgKdePlasmaWindowManagement);
