//! Registry binding decisions.
//!
//! `RegistryBinder` decides which advertised globals the harness binds and
//! when the connection is usable. It is pure bookkeeping: the background
//! dispatch thread feeds it `wl_registry.global` announcements, and the
//! primary loop keeps a mirror of it to evaluate readiness.

use std::collections::BTreeSet;
use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Optional globals a test asks for on top of the required ones.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AdditionalInterfaces: u32 {
        const SEAT = 1 << 0;
        const DECORATION = 1 << 1;
        const PLASMA_SHELL = 1 << 2;
        const WINDOW_MANAGEMENT = 1 << 3;
    }
}

/// Every global the harness knows how to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Interface {
    Compositor,
    Shm,
    WlShell,
    XdgWmBase,
    Seat,
    ServerDecoration,
    PlasmaShell,
    WindowManagement,
}

impl Interface {
    pub const ALL: [Interface; 8] = [
        Interface::Compositor,
        Interface::Shm,
        Interface::WlShell,
        Interface::XdgWmBase,
        Interface::Seat,
        Interface::ServerDecoration,
        Interface::PlasmaShell,
        Interface::WindowManagement,
    ];

    /// Protocol name as announced by `wl_registry.global`.
    pub fn name(self) -> &'static str {
        match self {
            Interface::Compositor => "wl_compositor",
            Interface::Shm => "wl_shm",
            Interface::WlShell => "wl_shell",
            Interface::XdgWmBase => "xdg_wm_base",
            Interface::Seat => "wl_seat",
            Interface::ServerDecoration => "org_kde_kwin_server_decoration_manager",
            Interface::PlasmaShell => "org_kde_plasma_shell",
            Interface::WindowManagement => "org_kde_plasma_window_management",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|interface| interface.name() == name)
    }

    /// Highest version the client side dispatches.
    pub fn max_version(self) -> u32 {
        match self {
            Interface::Compositor => 4,
            Interface::Shm => 1,
            Interface::WlShell => 1,
            Interface::XdgWmBase => 3,
            Interface::Seat => 5,
            Interface::ServerDecoration => 1,
            Interface::PlasmaShell => 1,
            Interface::WindowManagement => 1,
        }
    }

    /// The flag that opts into this global, `None` for unconditional ones.
    pub fn flag(self) -> Option<AdditionalInterfaces> {
        match self {
            Interface::Compositor | Interface::Shm | Interface::WlShell | Interface::XdgWmBase => {
                None
            }
            Interface::Seat => Some(AdditionalInterfaces::SEAT),
            Interface::ServerDecoration => Some(AdditionalInterfaces::DECORATION),
            Interface::PlasmaShell => Some(AdditionalInterfaces::PLASMA_SHELL),
            Interface::WindowManagement => Some(AdditionalInterfaces::WINDOW_MANAGEMENT),
        }
    }

    fn is_shell(self) -> bool {
        matches!(self, Interface::WlShell | Interface::XdgWmBase)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decision to bind `interface` at `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub interface: Interface,
    pub version: u32,
}

/// Tracks which globals are wanted and which are bound.
///
/// `wl_compositor`, `wl_shm` and a shell are always required. Either
/// `wl_shell` or `xdg_wm_base` satisfies the shell requirement; both are
/// bound when both are advertised.
#[derive(Debug, Clone)]
pub struct RegistryBinder {
    requested: AdditionalInterfaces,
    bound: BTreeSet<Interface>,
}

impl RegistryBinder {
    pub fn new(requested: AdditionalInterfaces) -> Self {
        Self {
            requested,
            bound: BTreeSet::new(),
        }
    }

    pub fn requested(&self) -> AdditionalInterfaces {
        self.requested
    }

    /// Whether `interface` is required or was requested.
    pub fn wants(&self, interface: Interface) -> bool {
        match interface.flag() {
            None => true,
            Some(flag) => self.requested.contains(flag),
        }
    }

    /// Handles one announcement. Returns the binding to perform, or `None`
    /// for unknown, unwanted or already bound globals.
    pub fn offer(&mut self, name: &str, version: u32) -> Option<Binding> {
        let interface = Interface::from_name(name)?;
        if !self.wants(interface) || !self.bound.insert(interface) {
            return None;
        }
        Some(Binding {
            interface,
            version: version.min(interface.max_version()),
        })
    }

    /// Records a binding performed elsewhere.
    pub fn record_bound(&mut self, interface: Interface) {
        self.bound.insert(interface);
    }

    pub fn is_bound(&self, interface: Interface) -> bool {
        self.bound.contains(&interface)
    }

    pub fn is_ready(&self) -> bool {
        self.missing().is_empty()
    }

    /// Wanted globals still unbound. A missing shell is reported as
    /// `xdg_wm_base`.
    pub fn missing(&self) -> Vec<Interface> {
        let mut missing = Vec::new();
        for interface in [Interface::Compositor, Interface::Shm] {
            if !self.is_bound(interface) {
                missing.push(interface);
            }
        }
        if !self.bound.iter().any(|interface| interface.is_shell()) {
            missing.push(Interface::XdgWmBase);
        }
        missing.extend(
            Interface::ALL
                .into_iter()
                .filter(|interface| interface.flag().is_some())
                .filter(|interface| self.wants(*interface) && !self.is_bound(*interface)),
        );
        missing
    }
}
