//! Client surfaces and their shell roles.

use wayland_client::{
    backend::ObjectId,
    protocol::{wl_shell_surface::WlShellSurface, wl_surface::WlSurface},
    Proxy,
};
use wayland_protocols::xdg::shell::client::{xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel};

use crate::client::ConnectionId;
use crate::error::{HarnessError, Result};

/// Which shell protocol gives a surface its window role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellSurfaceKind {
    /// Legacy `wl_shell`
    WlShell,
    /// `xdg_wm_base` toplevel
    XdgShell,
}

/// A `wl_surface` of one connection, without a role until a shell surface
/// is created for it.
#[derive(Debug, Clone)]
pub struct Surface {
    surface: WlSurface,
    connection: ConnectionId,
}

impl Surface {
    pub(crate) fn new(surface: WlSurface, connection: ConnectionId) -> Self {
        Self {
            surface,
            connection,
        }
    }

    pub fn wl_surface(&self) -> &WlSurface {
        &self.surface
    }

    pub fn id(&self) -> ObjectId {
        self.surface.id()
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub(crate) fn check_connection(&self, current: ConnectionId) -> Result<()> {
        if self.connection == current {
            Ok(())
        } else {
            Err(HarnessError::StaleObject)
        }
    }

    /// Destroys the surface. Its role objects must be destroyed first.
    pub fn destroy(self) {
        self.surface.destroy();
    }
}

#[derive(Debug, Clone)]
pub struct XdgShellSurface {
    pub xdg_surface: XdgSurface,
    pub toplevel: XdgToplevel,
}

/// The window role of a surface.
#[derive(Debug, Clone)]
pub enum ShellSurface {
    WlShell(WlShellSurface),
    Xdg(XdgShellSurface),
}

impl ShellSurface {
    pub fn kind(&self) -> ShellSurfaceKind {
        match self {
            ShellSurface::WlShell(_) => ShellSurfaceKind::WlShell,
            ShellSurface::Xdg(_) => ShellSurfaceKind::XdgShell,
        }
    }

    pub fn set_title(&self, title: &str) {
        match self {
            ShellSurface::WlShell(shell_surface) => shell_surface.set_title(title.to_string()),
            ShellSurface::Xdg(xdg) => xdg.toplevel.set_title(title.to_string()),
        }
    }

    /// Sets the application id (the window class for `wl_shell`).
    pub fn set_app_id(&self, app_id: &str) {
        match self {
            ShellSurface::WlShell(shell_surface) => shell_surface.set_class(app_id.to_string()),
            ShellSurface::Xdg(xdg) => xdg.toplevel.set_app_id(app_id.to_string()),
        }
    }

    /// Removes the role. A `wl_shell_surface` has no destructor and lives
    /// until its surface is destroyed.
    pub fn destroy(self) {
        match self {
            ShellSurface::WlShell(_) => {}
            ShellSurface::Xdg(xdg) => {
                xdg.toplevel.destroy();
                xdg.xdg_surface.destroy();
            }
        }
    }
}
