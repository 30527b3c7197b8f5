//! Xwayland launch.
//!
//! Xwayland is started rootless as a client of the window manager
//! (`WAYLAND_SOCKET`), with the window manager's X11 connection passed as
//! `-wm`. It announces its display number on `-displayfd`; end of file
//! without a number means it failed.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::time::Duration;

use smithay::reexports::calloop::{generic::Generic, Interest, Mode, PostAction};
use tracing::{debug, info, warn};

use super::StartupEvent;
use crate::config::BootstrapConfig;
use crate::error::{HarnessError, Result};
use crate::harness::Harness;
use crate::wm::WindowManager;

pub const XWAYLAND_BINARY: &str = "Xwayland";

/// A running Xwayland process. Killed on drop.
#[derive(Debug)]
pub struct CompatServer {
    child: Child,
    display: Option<u32>,
    /// Set by the display fd source on the primary loop
    outcome: Rc<RefCell<Option<StartupEvent>>>,
}

impl CompatServer {
    /// Spawns Xwayland and registers its display fd on the primary loop.
    pub fn launch<W: WindowManager>(
        config: &BootstrapConfig,
        harness: &mut Harness<W>,
        wm_fd: UnixStream,
    ) -> Result<Self> {
        let binary = config.find_helper(XWAYLAND_BINARY).ok_or_else(|| {
            HarnessError::Config(format!("{XWAYLAND_BINARY} not found in plugin path or PATH"))
        })?;

        let (display_read, display_write) = pipe()?;
        let (client_end, server_end) = UnixStream::pair()?;
        harness.wm_mut().insert_client(server_end)?;

        let inherited = [
            display_write.as_raw_fd(),
            client_end.as_raw_fd(),
            wm_fd.as_raw_fd(),
        ];
        let mut command = Command::new(&binary);
        command
            .arg("-displayfd")
            .arg(display_write.as_raw_fd().to_string())
            .arg("-rootless")
            .arg("-wm")
            .arg(wm_fd.as_raw_fd().to_string())
            .env("WAYLAND_SOCKET", client_end.as_raw_fd().to_string())
            .env_remove("DISPLAY")
            .stdin(Stdio::null());
        // SAFETY: only fcntl runs between fork and exec
        unsafe {
            command.pre_exec(move || {
                for fd in inherited {
                    clear_cloexec(fd)?;
                }
                Ok(())
            });
        }

        let child = command.spawn()?;
        info!("Launched {:?} (pid {})", binary, child.id());

        // The child holds its own copies now
        drop(display_write);
        drop(client_end);
        drop(wm_fd);

        let outcome = Rc::new(RefCell::new(None));
        let reported = outcome.clone();
        let mut announced = String::new();
        harness
            .handle()
            .insert_source(
                Generic::new(File::from(display_read), Interest::READ, Mode::Level),
                move |_, file, _| {
                    let mut buf = [0u8; 32];
                    // SAFETY: the file is not dropped while the source is registered
                    let file = unsafe { file.get_mut() };
                    let event = match file.read(&mut buf) {
                        Ok(0) => parse_display(&announced),
                        Ok(n) => {
                            announced.push_str(&String::from_utf8_lossy(&buf[..n]));
                            if !announced.contains('\n') {
                                return Ok(PostAction::Continue);
                            }
                            parse_display(&announced)
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                            return Ok(PostAction::Continue)
                        }
                        Err(err) => StartupEvent::CompatServerFailed(err.to_string()),
                    };
                    *reported.borrow_mut() = Some(event);
                    Ok(PostAction::Remove)
                },
            )
            .map_err(|err| HarnessError::EventLoop(err.error))?;

        Ok(Self {
            child,
            display: None,
            outcome,
        })
    }

    /// Spins the primary loop until Xwayland announced its display or
    /// failed.
    pub fn wait_ready<W: WindowManager>(
        &mut self,
        harness: &mut Harness<W>,
        timeout: Duration,
    ) -> StartupEvent {
        let reported = &self.outcome;
        harness.wait_until(timeout, |_| reported.borrow().is_some());

        let event = self.outcome.borrow_mut().take().unwrap_or_else(|| {
            StartupEvent::CompatServerFailed(format!("no display announced within {timeout:?}"))
        });
        match &event {
            StartupEvent::CompatServerReady { display: number } => {
                info!("Xwayland ready on :{}", number);
                self.display = Some(*number);
            }
            other => warn!("Xwayland not ready: {:?}", other),
        }
        event
    }

    pub fn display(&self) -> Option<u32> {
        self.display
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for CompatServer {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            debug!("Xwayland already gone: {}", err);
        }
        let _ = self.child.wait();
    }
}

fn parse_display(announced: &str) -> StartupEvent {
    match announced.trim().parse::<u32>() {
        Ok(display) => StartupEvent::CompatServerReady { display },
        Err(_) if announced.trim().is_empty() => {
            StartupEvent::CompatServerFailed("exited before announcing a display".into())
        }
        Err(_) => StartupEvent::CompatServerFailed(format!(
            "invalid display announcement {:?}",
            announced.trim()
        )),
    }
}

/// Close-on-exec pipe, `(read, write)`.
fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    // SAFETY: fds has room for the two descriptors pipe2 writes
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 succeeded, both descriptors are open and owned by us
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, no pointers involved
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HeadlessOptions, HeadlessWm};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn fake_xwayland(dir: &Path, script: &str) -> BootstrapConfig {
        let path = dir.join(XWAYLAND_BINARY);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        BootstrapConfig {
            plugin_path: vec![dir.to_path_buf()],
            xwayland: true,
            ..Default::default()
        }
    }

    fn harness(dir: &Path) -> Harness<HeadlessWm> {
        let options = HeadlessOptions::new(dir.join("wayland-0"));
        Harness::new(|handle| HeadlessWm::new(handle, options)).unwrap()
    }

    #[test]
    fn test_display_announcement() {
        assert_eq!(
            parse_display("12\n"),
            StartupEvent::CompatServerReady { display: 12 }
        );
        assert!(matches!(
            parse_display(""),
            StartupEvent::CompatServerFailed(_)
        ));
        assert!(matches!(
            parse_display("x\n"),
            StartupEvent::CompatServerFailed(_)
        ));
    }

    #[test]
    fn test_launch_reads_display_number() {
        let dir = tempfile::tempdir().unwrap();
        // $2 is the -displayfd argument
        let config = fake_xwayland(dir.path(), "#!/bin/sh\necho 5 > /proc/self/fd/$2\n");
        let mut harness = harness(dir.path());
        let (_wm_end, server_end) = UnixStream::pair().unwrap();

        let mut server = CompatServer::launch(&config, &mut harness, server_end).unwrap();
        let event = server.wait_ready(&mut harness, Duration::from_secs(5));
        assert_eq!(event, StartupEvent::CompatServerReady { display: 5 });
        assert_eq!(server.display(), Some(5));
    }

    #[test]
    fn test_launch_detects_early_exit() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_xwayland(dir.path(), "#!/bin/sh\nexit 1\n");
        let mut harness = harness(dir.path());
        let (_wm_end, server_end) = UnixStream::pair().unwrap();

        let mut server = CompatServer::launch(&config, &mut harness, server_end).unwrap();
        let event = server.wait_ready(&mut harness, Duration::from_secs(5));
        assert!(matches!(event, StartupEvent::CompatServerFailed(_)));
        assert_eq!(server.display(), None);
    }

    #[test]
    fn test_unannounced_server_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_xwayland(dir.path(), "#!/bin/sh\nexec sleep 30\n");
        let mut harness = harness(dir.path());
        let (_wm_end, server_end) = UnixStream::pair().unwrap();

        let mut server = CompatServer::launch(&config, &mut harness, server_end).unwrap();
        let pid = server.pid();
        let event = server.wait_ready(&mut harness, Duration::from_millis(200));
        assert!(matches!(event, StartupEvent::CompatServerFailed(_)));
        assert!(Path::new(&format!("/proc/{pid}")).exists());

        let mut launched = Some(server);
        super::super::abandon(&mut launched);
        assert!(launched.is_none());
        assert!(!Path::new(&format!("/proc/{pid}")).exists());
    }

    #[test]
    fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let config = BootstrapConfig {
            plugin_path: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        if config.find_helper(XWAYLAND_BINARY).is_some() {
            // A real Xwayland on PATH would be launched instead
            return;
        }
        let mut harness = harness(dir.path());
        let (_wm_end, server_end) = UnixStream::pair().unwrap();
        let err = CompatServer::launch(&config, &mut harness, server_end).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }
}
