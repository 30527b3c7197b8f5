//! Bound globals of a connection.

use std::ops::Deref;

use tracing::debug;
use wayland_client::{
    protocol::{wl_compositor::WlCompositor, wl_seat::WlSeat, wl_shell::WlShell, wl_shm::WlShm},
    Proxy,
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;
use wayland_protocols_misc::server_decoration::client::org_kde_kwin_server_decoration_manager::OrgKdeKwinServerDecorationManager;
use wayland_protocols_plasma::{
    plasma_shell::client::org_kde_plasma_shell::OrgKdePlasmaShell,
    plasma_window_management::client::org_kde_plasma_window_management::OrgKdePlasmaWindowManagement,
};

use super::ConnectionId;
use crate::interfaces::Interface;

/// A bound global, tagged with the connection it belongs to.
///
/// Handles are borrowed from the harness and cannot outlive the
/// connection's teardown.
#[derive(Debug)]
pub struct GlobalHandle<T> {
    proxy: T,
    connection: ConnectionId,
}

impl<T> GlobalHandle<T> {
    pub fn proxy(&self) -> &T {
        &self.proxy
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }
}

impl<T> Deref for GlobalHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.proxy
    }
}

/// A global bound on the dispatch thread, on its way to the primary loop.
pub(crate) enum BoundGlobal {
    Compositor(WlCompositor),
    Shm(WlShm),
    WlShell(WlShell),
    XdgWmBase(XdgWmBase),
    Seat(WlSeat),
    ServerDecoration(OrgKdeKwinServerDecorationManager),
    PlasmaShell(OrgKdePlasmaShell),
    WindowManagement(OrgKdePlasmaWindowManagement),
}

impl BoundGlobal {
    pub fn interface(&self) -> Interface {
        match self {
            BoundGlobal::Compositor(_) => Interface::Compositor,
            BoundGlobal::Shm(_) => Interface::Shm,
            BoundGlobal::WlShell(_) => Interface::WlShell,
            BoundGlobal::XdgWmBase(_) => Interface::XdgWmBase,
            BoundGlobal::Seat(_) => Interface::Seat,
            BoundGlobal::ServerDecoration(_) => Interface::ServerDecoration,
            BoundGlobal::PlasmaShell(_) => Interface::PlasmaShell,
            BoundGlobal::WindowManagement(_) => Interface::WindowManagement,
        }
    }
}

/// Globals bound on one connection. Absent globals are `None`.
#[derive(Debug, Default)]
pub struct Globals {
    compositor: Option<GlobalHandle<WlCompositor>>,
    shm: Option<GlobalHandle<WlShm>>,
    shell: Option<GlobalHandle<WlShell>>,
    xdg_wm_base: Option<GlobalHandle<XdgWmBase>>,
    seat: Option<GlobalHandle<WlSeat>>,
    server_decoration: Option<GlobalHandle<OrgKdeKwinServerDecorationManager>>,
    plasma_shell: Option<GlobalHandle<OrgKdePlasmaShell>>,
    window_management: Option<GlobalHandle<OrgKdePlasmaWindowManagement>>,
}

impl Globals {
    pub(crate) fn insert(&mut self, global: BoundGlobal, connection: ConnectionId) {
        fn handle<T>(proxy: T, connection: ConnectionId) -> Option<GlobalHandle<T>> {
            Some(GlobalHandle { proxy, connection })
        }

        match global {
            BoundGlobal::Compositor(p) => self.compositor = handle(p, connection),
            BoundGlobal::Shm(p) => self.shm = handle(p, connection),
            BoundGlobal::WlShell(p) => self.shell = handle(p, connection),
            BoundGlobal::XdgWmBase(p) => self.xdg_wm_base = handle(p, connection),
            BoundGlobal::Seat(p) => self.seat = handle(p, connection),
            BoundGlobal::ServerDecoration(p) => self.server_decoration = handle(p, connection),
            BoundGlobal::PlasmaShell(p) => self.plasma_shell = handle(p, connection),
            BoundGlobal::WindowManagement(p) => self.window_management = handle(p, connection),
        }
    }

    pub fn compositor(&self) -> Option<&GlobalHandle<WlCompositor>> {
        self.compositor.as_ref()
    }

    pub fn shm(&self) -> Option<&GlobalHandle<WlShm>> {
        self.shm.as_ref()
    }

    /// The legacy `wl_shell`.
    pub fn shell(&self) -> Option<&GlobalHandle<WlShell>> {
        self.shell.as_ref()
    }

    pub fn xdg_wm_base(&self) -> Option<&GlobalHandle<XdgWmBase>> {
        self.xdg_wm_base.as_ref()
    }

    pub fn seat(&self) -> Option<&GlobalHandle<WlSeat>> {
        self.seat.as_ref()
    }

    pub fn server_decoration(&self) -> Option<&GlobalHandle<OrgKdeKwinServerDecorationManager>> {
        self.server_decoration.as_ref()
    }

    pub fn plasma_shell(&self) -> Option<&GlobalHandle<OrgKdePlasmaShell>> {
        self.plasma_shell.as_ref()
    }

    pub fn window_management(&self) -> Option<&GlobalHandle<OrgKdePlasmaWindowManagement>> {
        self.window_management.as_ref()
    }

    pub fn is_bound(&self, interface: Interface) -> bool {
        match interface {
            Interface::Compositor => self.compositor.is_some(),
            Interface::Shm => self.shm.is_some(),
            Interface::WlShell => self.shell.is_some(),
            Interface::XdgWmBase => self.xdg_wm_base.is_some(),
            Interface::Seat => self.seat.is_some(),
            Interface::ServerDecoration => self.server_decoration.is_some(),
            Interface::PlasmaShell => self.plasma_shell.is_some(),
            Interface::WindowManagement => self.window_management.is_some(),
        }
    }

    /// Releases the seat (v5+). `xdg_wm_base` is left to the disconnect:
    /// destroying it while xdg surfaces are alive is a protocol error, and
    /// `wl_shm` is bound at v1, which has no destructor.
    pub(crate) fn release(self) {
        if let Some(seat) = self.seat {
            if seat.version() >= 5 {
                seat.release();
            }
        }
        debug!("Released bound globals");
    }
}
