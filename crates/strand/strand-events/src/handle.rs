//! Shared event-pair state: a small mmapped file holding the descriptor
//! numbers of the `recv_called` / `recv_ready` eventfds plus the enabled
//! flag.
//!
//! The driver process creates the descriptors (without CLOEXEC, so spawned
//! children inherit them at the same numbers) and publishes them through the
//! state file; any process attaching to the same file reuses the inherited
//! descriptors. On drop the creating side closes the descriptors first and
//! unlinks the state file second.

use crate::error::{EventError, Result};
use crate::event::Event;
use std::io;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use strand_mmap::MappedFileMut;

/// Directory under the shared-memory root holding all event-state files.
pub const EVENTS_DIR: &str = "cereal_events";

const RECV_CALLED: usize = 0;
const RECV_READY: usize = 1;

#[cfg(target_os = "linux")]
const SHM_ROOT: &str = "/dev/shm";
#[cfg(not(target_os = "linux"))]
const SHM_ROOT: &str = "/tmp";

/// On-disk event-pair state, shared across processes.
#[repr(C)]
pub struct EventState {
    fds: [AtomicI32; 2],
    enabled: AtomicBool,
}

/// Path of the event-state file for `endpoint`, under the optional namespace
/// `prefix` and per-driver `identifier`.
pub fn event_state_path(
    prefix: Option<&str>,
    identifier: Option<&str>,
    endpoint: &str,
) -> PathBuf {
    let mut path = PathBuf::from(SHM_ROOT);
    if let Some(prefix) = prefix {
        path.push(prefix);
    }
    path.push(EVENTS_DIR);
    if let Some(identifier) = identifier {
        path.push(identifier);
    }
    path.push(endpoint);
    path
}

/// Owner of one mapped event-pair state.
pub struct EventHandle {
    _mm: MappedFileMut,
    state: *const EventState,
    path: PathBuf,
    owned: bool,
}

// The state is only touched through its atomics.
unsafe impl Send for EventHandle {}

impl EventHandle {
    /// Create the event pair for `endpoint`: map the state file and install
    /// two fresh eventfds. Call this from the driver side only; subscribers
    /// use [`EventHandle::attach`].
    pub fn new(
        prefix: Option<&str>,
        identifier: Option<&str>,
        endpoint: &str,
    ) -> Result<Self> {
        // Ownership is taken only once both descriptors are installed, so a
        // half-constructed handle never closes descriptors it did not make.
        let mut handle = Self::map(prefix, identifier, endpoint)?;

        let fd0 = create_eventfd()?;
        let fd1 = match create_eventfd() {
            Ok(fd) => fd,
            Err(e) => {
                unsafe { libc::close(fd0) };
                return Err(e);
            }
        };

        let state = handle.state();
        state.fds[RECV_CALLED].store(fd0, Ordering::Release);
        state.fds[RECV_READY].store(fd1, Ordering::Release);
        handle.owned = true;
        Ok(handle)
    }

    /// Attach to an existing event pair, reusing the inherited descriptors.
    pub fn attach(
        prefix: Option<&str>,
        identifier: Option<&str>,
        endpoint: &str,
    ) -> Result<Self> {
        Self::map(prefix, identifier, endpoint)
    }

    fn map(prefix: Option<&str>, identifier: Option<&str>, endpoint: &str) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(EventError::InvalidArgument(
                "endpoint must not be empty".into(),
            ));
        }

        let path = event_state_path(prefix, identifier, endpoint);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(EventError::Io)?;
        }

        let (mm, created) =
            MappedFileMut::open_or_create_rw(&path, size_of::<EventState>() as u64)?;
        if mm.len() < size_of::<EventState>() {
            return Err(EventError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "event state file too small",
            )));
        }

        let state = mm.as_ptr() as *const EventState;
        let handle = Self {
            _mm: mm,
            state,
            path,
            owned: false,
        };
        if created {
            let state = handle.state();
            state.fds[RECV_CALLED].store(-1, Ordering::Release);
            state.fds[RECV_READY].store(-1, Ordering::Release);
        }
        Ok(handle)
    }

    #[inline]
    fn state(&self) -> &EventState {
        // SAFETY: the mapping is at least size_of::<EventState>() bytes and
        // lives as long as self.
        unsafe { &*self.state }
    }

    fn event(&self, which: usize) -> Result<Event> {
        let fd = self.state().fds[which].load(Ordering::Acquire);
        if fd < 0 {
            return Err(EventError::NotInitialized);
        }
        Ok(Event::from_fd(fd))
    }

    /// Event signaled by the subscriber when it enters `recv`.
    pub fn recv_called(&self) -> Result<Event> {
        self.event(RECV_CALLED)
    }

    /// Event signaled by the driver to release the subscriber's `recv`.
    pub fn recv_ready(&self) -> Result<Event> {
        self.event(RECV_READY)
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled.store(enabled, Ordering::Release);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        // Descriptors close before the state file disappears.
        let state = self.state();
        for cell in &state.fds {
            let fd = cell.load(Ordering::Acquire);
            if fd >= 0 {
                unsafe { libc::close(fd) };
            }
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Non-blocking eventfd, deliberately inheritable: the descriptor numbers
/// published in the state file must stay valid in exec'd children.
fn create_eventfd() -> Result<libc::c_int> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
    if fd < 0 {
        return Err(EventError::Io(io::Error::last_os_error()));
    }
    Ok(fd)
}
