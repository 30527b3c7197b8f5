//! Bootstrap configuration from the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `WMTEST_BACKEND` | compositing backend (`virtual`, or a name the window manager knows) | `virtual` |
//! | `WMTEST_PLUGIN_PATH` | colon-separated directories searched for helper binaries | empty |
//! | `WMTEST_FORCE_OWN_SOCKET` | serve clients only in-process; drops `WAYLAND_DISPLAY` | `1` |
//! | `WMTEST_XWAYLAND` | launch Xwayland during startup | `0` |
//! | `WMTEST_OUTPUTS` | virtual screens, `WxH` comma-separated | `1280x1024,1280x1024` |
//! | `WMTEST_STARTUP_TIMEOUT_MS` | bound on each asynchronous startup stage | `10000` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::buffer::Size;
use crate::error::{HarnessError, Result};
use crate::wm::BackendKind;

pub const BACKEND_ENV: &str = "WMTEST_BACKEND";
pub const PLUGIN_PATH_ENV: &str = "WMTEST_PLUGIN_PATH";
pub const FORCE_OWN_SOCKET_ENV: &str = "WMTEST_FORCE_OWN_SOCKET";
pub const XWAYLAND_ENV: &str = "WMTEST_XWAYLAND";
pub const OUTPUTS_ENV: &str = "WMTEST_OUTPUTS";
pub const STARTUP_TIMEOUT_ENV: &str = "WMTEST_STARTUP_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub backend: BackendKind,
    pub plugin_path: Vec<PathBuf>,
    pub force_own_socket: bool,
    pub xwayland: bool,
    pub outputs: Vec<Size>,
    pub startup_timeout: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Virtual,
            plugin_path: Vec::new(),
            force_own_socket: true,
            xwayland: false,
            outputs: vec![Size::new(1280, 1024), Size::new(1280, 1024)],
            startup_timeout: Duration::from_secs(10),
        }
    }
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key-value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = lookup(BACKEND_ENV) {
            config.backend = backend.parse()?;
        }
        if let Some(path) = lookup(PLUGIN_PATH_ENV) {
            config.plugin_path = env::split_paths(&path)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect();
        }
        if let Some(value) = lookup(FORCE_OWN_SOCKET_ENV) {
            config.force_own_socket = parse_flag(FORCE_OWN_SOCKET_ENV, &value)?;
        }
        if let Some(value) = lookup(XWAYLAND_ENV) {
            config.xwayland = parse_flag(XWAYLAND_ENV, &value)?;
        }
        if let Some(value) = lookup(OUTPUTS_ENV) {
            config.outputs = parse_outputs(&value)?;
        }
        if let Some(value) = lookup(STARTUP_TIMEOUT_ENV) {
            let millis = value.trim().parse::<u64>().map_err(|_| {
                HarnessError::Config(format!("{STARTUP_TIMEOUT_ENV}: not a number: {value:?}"))
            })?;
            config.startup_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Exports the configuration for the window manager and its children.
    /// With `force_own_socket`, any outer Wayland display is hidden so
    /// nothing connects to the session compositor by accident.
    pub fn apply_environment(&self) {
        env::set_var(BACKEND_ENV, self.backend.to_string());
        if !self.plugin_path.is_empty() {
            if let Ok(joined) = env::join_paths(&self.plugin_path) {
                env::set_var(PLUGIN_PATH_ENV, joined);
            }
        }
        if self.force_own_socket {
            env::set_var(FORCE_OWN_SOCKET_ENV, "1");
            env::remove_var("WAYLAND_DISPLAY");
            env::remove_var("WAYLAND_SOCKET");
        }
    }

    /// Finds a helper binary in the plugin path, then in `PATH`.
    pub fn find_helper(&self, name: &str) -> Option<PathBuf> {
        let system = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect::<Vec<_>>())
            .unwrap_or_default();
        self.plugin_path
            .iter()
            .chain(system.iter())
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarnessError::Config(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_outputs(value: &str) -> Result<Vec<Size>> {
    let invalid = |entry: &str| HarnessError::Config(format!("{OUTPUTS_ENV}: invalid screen {entry:?}"));

    let outputs = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (width, height) = entry.split_once('x').ok_or_else(|| invalid(entry))?;
            let width = width.parse::<u32>().map_err(|_| invalid(entry))?;
            let height = height.parse::<u32>().map_err(|_| invalid(entry))?;
            if width == 0 || height == 0 {
                return Err(invalid(entry));
            }
            Ok(Size::new(width, height))
        })
        .collect::<Result<Vec<_>>>()?;

    if outputs.is_empty() {
        return Err(HarnessError::Config(format!("{OUTPUTS_ENV}: no screens")));
    }
    Ok(outputs)
}
