//! Minimal `wl_shell` for the headless window manager.
//!
//! Only what a toplevel needs: the role, `set_toplevel`, title and class.
//! Transient, popup, fullscreen and maximized requests are accepted and
//! ignored.

use std::collections::HashMap;

use smithay::reexports::wayland_server::backend::ClientId;
use smithay::reexports::wayland_server::protocol::{
    wl_shell::{self, WlShell},
    wl_shell_surface::{self, WlShellSurface},
    wl_surface::WlSurface,
};
use smithay::reexports::wayland_server::{
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use smithay::wayland::compositor::give_role;
use tracing::debug;

const VERSION: u32 = 1;

pub const ROLE: &str = "wl_shell_surface";

/// Client-set state of one `wl_shell_surface`.
#[derive(Debug, Clone, Default)]
pub struct LegacySurfaceData {
    pub toplevel: bool,
    pub title: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Default)]
pub struct LegacyShellState {
    surfaces: HashMap<WlSurface, LegacySurfaceData>,
}

pub trait LegacyShellHandler {
    fn legacy_shell_state(&mut self) -> &mut LegacyShellState;
    fn new_shell_surface(&mut self, surface: WlSurface);
    fn shell_surface_destroyed(&mut self, surface: &WlSurface);
}

impl LegacyShellState {
    /// Advertises the `wl_shell` global.
    pub fn new<D>(display: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<WlShell, ()>,
        D: Dispatch<WlShell, ()>,
        D: 'static,
    {
        display.create_global::<D, WlShell, _>(VERSION, ());
        Self::default()
    }

    pub fn surface_data(&self, surface: &WlSurface) -> Option<&LegacySurfaceData> {
        self.surfaces.get(surface)
    }
}

impl<D> GlobalDispatch<WlShell, (), D> for LegacyShellState
where
    D: GlobalDispatch<WlShell, ()>,
    D: Dispatch<WlShell, ()>,
    D: Dispatch<WlShellSurface, WlSurface>,
    D: LegacyShellHandler,
{
    fn bind(
        _state: &mut D,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlShell>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        data_init.init(resource, ());
    }
}

impl<D> Dispatch<WlShell, (), D> for LegacyShellState
where
    D: Dispatch<WlShell, ()>,
    D: Dispatch<WlShellSurface, WlSurface>,
    D: LegacyShellHandler,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &WlShell,
        request: <WlShell as Resource>::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            wl_shell::Request::GetShellSurface { id, surface } => {
                if give_role(&surface, ROLE).is_err() {
                    resource.post_error(wl_shell::Error::Role, "surface already has a role");
                    return;
                }
                data_init.init(id, surface.clone());
                state
                    .legacy_shell_state()
                    .surfaces
                    .insert(surface.clone(), LegacySurfaceData::default());
                state.new_shell_surface(surface);
            }
            _ => (),
        }
    }
}

impl<D> Dispatch<WlShellSurface, WlSurface, D> for LegacyShellState
where
    D: Dispatch<WlShellSurface, WlSurface>,
    D: LegacyShellHandler,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &WlShellSurface,
        request: <WlShellSurface as Resource>::Request,
        surface: &WlSurface,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let Some(data) = state.legacy_shell_state().surfaces.get_mut(surface) else {
            return;
        };
        match request {
            wl_shell_surface::Request::SetToplevel => data.toplevel = true,
            wl_shell_surface::Request::SetTitle { title } => data.title = Some(title),
            wl_shell_surface::Request::SetClass { class_ } => data.class = Some(class_),
            wl_shell_surface::Request::Pong { .. } => (),
            other => debug!("Ignoring wl_shell_surface request {:?}", other),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        _resource: &WlShellSurface,
        surface: &WlSurface,
    ) {
        state.legacy_shell_state().surfaces.remove(surface);
        state.shell_surface_destroyed(surface);
    }
}

#[macro_export]
macro_rules! delegate_legacy_shell {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            smithay::reexports::wayland_server::protocol::wl_shell::WlShell: ()
        ] => $crate::testing::LegacyShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            smithay::reexports::wayland_server::protocol::wl_shell::WlShell: ()
        ] => $crate::testing::LegacyShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            smithay::reexports::wayland_server::protocol::wl_shell_surface::WlShellSurface: smithay::reexports::wayland_server::protocol::wl_surface::WlSurface
        ] => $crate::testing::LegacyShellState);
    };
}
