//! A single cross-process binary event backed by an eventfd.
//!
//! The descriptor itself is owned by the [`EventHandle`](crate::EventHandle)
//! that created it; `Event` is a borrowed, copyable view used for the actual
//! set/clear/wait operations.

use crate::error::{EventError, Result};
use std::io;
use std::mem;
use std::os::unix::io::RawFd;

#[derive(Debug, Clone, Copy)]
pub struct Event {
    fd: RawFd,
}

impl Event {
    pub fn from_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.fd >= 0
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(EventError::NotInitialized)
        }
    }

    /// Signal the event. Never blocks.
    pub fn set(&self) -> Result<()> {
        self.ensure_valid()?;
        let value: u64 = 1;
        let rc = unsafe {
            libc::write(
                self.fd,
                &value as *const u64 as *const libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if rc < 0 {
            return Err(EventError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Consume the event, returning the accumulated count. The descriptor is
    /// non-blocking, so clearing an unsignaled event fails.
    pub fn clear(&self) -> Result<u64> {
        self.ensure_valid()?;
        let mut value: u64 = 0;
        let rc = unsafe {
            libc::read(
                self.fd,
                &mut value as *mut u64 as *mut libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if rc < 0 {
            return Err(EventError::Io(io::Error::last_os_error()));
        }
        Ok(value)
    }

    /// Block until the event is signaled. `timeout_sec < 0` waits forever.
    pub fn wait(&self, timeout_sec: i32) -> Result<()> {
        self.ensure_valid()?;

        let mut fds = [libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        }];
        ppoll(&mut fds, timeout_sec)?;
        Ok(())
    }

    /// Non-blocking readiness probe.
    pub fn peek(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        let mut fds = [libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        }];
        unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) > 0 }
    }

    /// Wait until any of `events` is signaled and return the index of the
    /// first ready one (lowest index wins when several are signaled).
    pub fn wait_for_any(events: &[Event], timeout_sec: i32) -> Result<usize> {
        if events.is_empty() {
            return Err(EventError::InvalidArgument("no events to wait for".into()));
        }

        let mut fds = Vec::with_capacity(events.len());
        let mut indices = Vec::with_capacity(events.len());
        for (i, event) in events.iter().enumerate() {
            if event.is_valid() {
                fds.push(libc::pollfd {
                    fd: event.fd,
                    events: libc::POLLIN,
                    revents: 0,
                });
                indices.push(i);
            }
        }
        if fds.is_empty() {
            return Err(EventError::InvalidArgument("all events are invalid".into()));
        }

        ppoll(&mut fds, timeout_sec)?;

        for (pollfd, &index) in fds.iter().zip(&indices) {
            if pollfd.revents & libc::POLLIN != 0 {
                return Ok(index);
            }
        }
        Err(EventError::Io(io::Error::other(
            "poll returned with no event ready",
        )))
    }
}

/// `ppoll` with the wait sigmask applied: every signal is blocked for the
/// duration except ALRM/INT/TERM/QUIT, whose delivery interrupts the wait.
fn ppoll(fds: &mut [libc::pollfd], timeout_sec: i32) -> Result<()> {
    let timeout = libc::timespec {
        tv_sec: timeout_sec as libc::time_t,
        tv_nsec: 0,
    };
    let timeout_ptr = if timeout_sec < 0 {
        std::ptr::null()
    } else {
        &timeout as *const libc::timespec
    };

    let mut mask: libc::sigset_t = unsafe { mem::zeroed() };
    unsafe {
        libc::sigfillset(&mut mask);
        libc::sigdelset(&mut mask, libc::SIGALRM);
        libc::sigdelset(&mut mask, libc::SIGINT);
        libc::sigdelset(&mut mask, libc::SIGTERM);
        libc::sigdelset(&mut mask, libc::SIGQUIT);
    }

    let rc = unsafe {
        libc::ppoll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout_ptr,
            &mask,
        )
    };

    match rc {
        0 => Err(EventError::Timeout),
        n if n < 0 => {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                Err(EventError::Interrupted)
            } else {
                Err(EventError::Io(err))
            }
        }
        _ => Ok(()),
    }
}
