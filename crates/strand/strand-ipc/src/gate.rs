//! Deterministic rendezvous between a test driver and a subscriber.
//!
//! While the shared event-pair state is enabled, every receive first
//! signals `recv_called` and then parks on `recv_ready` until the driver
//! releases it. The driver side runs the mirror image:
//!
//! ```text
//! subscriber                           driver
//! ──────────                           ──────
//! recv_called.set()      ──────────▶   recv_called.wait()
//! recv_ready.wait()      ◀──────────   recv_ready.set()
//! recv_ready.clear()
//! <underlying recv>
//! ```
//!
//! With the state disabled the gate is transparent.

use strand_events::{EventError, EventHandle};

pub struct FakeGate {
    handle: EventHandle,
}

impl FakeGate {
    /// Attach to the event pair for `endpoint`, inheriting the descriptors
    /// the driver created.
    pub fn attach(
        prefix: Option<&str>,
        identifier: Option<&str>,
        endpoint: &str,
    ) -> Result<Self, EventError> {
        let handle = EventHandle::attach(prefix, identifier, endpoint)?;
        Ok(Self { handle })
    }

    pub fn enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    /// Perform the rendezvous preceding one receive. No-op while disabled.
    pub fn before_recv(&self) -> Result<(), EventError> {
        if !self.handle.is_enabled() {
            return Ok(());
        }

        self.handle.recv_called()?.set()?;
        let ready = self.handle.recv_ready()?;
        ready.wait(-1)?;
        ready.clear()?;
        Ok(())
    }
}
