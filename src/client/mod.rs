//! Client side of the harness.
//!
//! A connection is served by a dedicated background thread that reads the
//! socket and dispatches protocol events. Anything test code can observe is
//! marshalled to the primary loop as a [`ConnectionEvent`] over a calloop
//! channel and folded into the [`Session`] there, so bound globals and
//! surfaces are only ever touched from the primary loop.

mod dispatch;
mod globals;

pub(crate) use dispatch::ClientState;
pub(crate) use globals::BoundGlobal;
pub use globals::{GlobalHandle, Globals};

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use smithay::reexports::calloop::channel::{self, Channel, Sender};
use tracing::{debug, info, warn};
use wayland_client::{
    backend::{ObjectId, WaylandError},
    protocol::wl_seat::Capability,
    Connection, QueueHandle,
};

use crate::error::{HarnessError, Result};
use crate::interfaces::{AdditionalInterfaces, RegistryBinder};

/// How long the dispatch thread sleeps in poll before re-checking its stop
/// flag.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifies one connection of a harness. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Messages from the dispatch thread to the primary loop
pub(crate) enum ConnectionEvent {
    Connected {
        connection: Connection,
        queue: QueueHandle<ClientState>,
    },
    Bound(BoundGlobal),
    SeatCapabilities(Capability),
    /// An xdg_surface configure was acknowledged
    Configured(ObjectId),
    Disconnected(HarnessError),
}

/// Resolves a socket name the way `WAYLAND_DISPLAY` is resolved: absolute
/// paths are used as-is, anything else is relative to `$XDG_RUNTIME_DIR`.
pub fn resolve_socket_path(name: impl AsRef<Path>) -> Result<PathBuf> {
    resolve_socket_path_in(
        name.as_ref(),
        std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from),
    )
}

fn resolve_socket_path_in(name: &Path, runtime_dir: Option<PathBuf>) -> Result<PathBuf> {
    if name.is_absolute() {
        return Ok(name.to_path_buf());
    }
    match runtime_dir {
        Some(dir) => Ok(dir.join(name)),
        None => Err(HarnessError::NoRuntimeDir(name.display().to_string())),
    }
}

/// The background thread of one connection.
pub(crate) struct DispatchThread {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DispatchThread {
    /// Starts connecting to `socket`. Progress arrives on the returned
    /// channel.
    pub fn spawn(
        id: ConnectionId,
        socket: PathBuf,
        requested: AdditionalInterfaces,
    ) -> Result<(Self, Channel<ConnectionEvent>)> {
        let (sender, channel) = channel::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("wayland-client-{}", id.0))
            .spawn(move || {
                if let Err(err) = run(&socket, requested, &sender, &thread_stop) {
                    warn!("Connection {} to {:?} failed: {}", id, socket, err);
                    let _ = sender.send(ConnectionEvent::Disconnected(err));
                }
                debug!("Dispatch thread for connection {} exited", id);
            })?;

        Ok((
            Self {
                stop,
                handle: Some(handle),
            },
            channel,
        ))
    }

    /// Stops the thread and waits for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Dispatch thread panicked");
            }
        }
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    socket: &Path,
    requested: AdditionalInterfaces,
    sender: &Sender<ConnectionEvent>,
    stop: &AtomicBool,
) -> Result<()> {
    let connect_error = |reason: String| HarnessError::Connect {
        path: socket.to_path_buf(),
        reason,
    };
    let stream = UnixStream::connect(socket).map_err(|err| connect_error(err.to_string()))?;
    let connection =
        Connection::from_socket(stream).map_err(|err| connect_error(err.to_string()))?;

    let mut queue = connection.new_event_queue();
    let qh = queue.handle();
    connection.display().get_registry(&qh, ());

    let mut state = ClientState::new(requested, sender.clone());
    let connected = ConnectionEvent::Connected {
        connection: connection.clone(),
        queue: qh,
    };
    if sender.send(connected).is_err() {
        return Ok(());
    }
    info!("Connected to {:?}", socket);

    while !stop.load(Ordering::Acquire) {
        queue.dispatch_pending(&mut state)?;
        flush(&connection)?;

        if let Some(guard) = queue.prepare_read() {
            if wait_readable(guard.connection_fd(), POLL_INTERVAL)? {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    flush(&connection)?;
    Ok(())
}

/// Flushes, treating a full socket buffer as "try again later".
fn flush(connection: &Connection) -> Result<()> {
    match connection.flush() {
        Ok(()) => Ok(()),
        Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: pollfd is a single valid entry that outlives the call
    let ret = unsafe { libc::poll(&mut pollfd, 1, timeout.as_millis() as libc::c_int) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(ret > 0)
}

/// Primary-loop view of the open connection.
pub(crate) struct Session {
    pub id: ConnectionId,
    pub socket: PathBuf,
    pub binder: RegistryBinder,
    pub globals: Globals,
    pub seat_capabilities: Capability,
    pub failure: Option<HarnessError>,
    connection: Option<Connection>,
    queue: Option<QueueHandle<ClientState>>,
    configured: HashSet<ObjectId>,
}

impl Session {
    pub fn new(id: ConnectionId, socket: PathBuf, requested: AdditionalInterfaces) -> Self {
        Self {
            id,
            socket,
            binder: RegistryBinder::new(requested),
            globals: Globals::default(),
            seat_capabilities: Capability::empty(),
            failure: None,
            connection: None,
            queue: None,
            configured: HashSet::new(),
        }
    }

    pub fn apply(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { connection, queue } => {
                self.connection = Some(connection);
                self.queue = Some(queue);
            }
            ConnectionEvent::Bound(global) => {
                debug!("Connection {}: bound {}", self.id, global.interface());
                self.binder.record_bound(global.interface());
                self.globals.insert(global, self.id);
            }
            ConnectionEvent::SeatCapabilities(capabilities) => {
                self.seat_capabilities = capabilities;
            }
            ConnectionEvent::Configured(id) => {
                self.configured.insert(id);
            }
            ConnectionEvent::Disconnected(err) => {
                self.failure = Some(err);
            }
        }
    }

    /// Connected and every required and requested global is bound.
    pub fn is_ready(&self) -> bool {
        self.connection.is_some() && self.binder.is_ready()
    }

    pub fn is_configured(&self, id: &ObjectId) -> bool {
        self.configured.contains(id)
    }

    pub fn queue(&self) -> Result<&QueueHandle<ClientState>> {
        self.queue.as_ref().ok_or(HarnessError::NotConnected)
    }

    pub fn flush(&self) -> Result<()> {
        match &self.connection {
            Some(connection) => flush(connection),
            None => Err(HarnessError::NotConnected),
        }
    }

    /// Releases the bound globals and closes the connection. The dispatch
    /// thread must already be stopped.
    pub fn close(self) {
        self.globals.release();
        if let Some(connection) = &self.connection {
            if let Err(err) = flush(connection) {
                debug!("Flush on close of connection {} failed: {}", self.id, err);
            }
        }
        info!("Connection {} to {:?} closed", self.id, self.socket);
    }
}
