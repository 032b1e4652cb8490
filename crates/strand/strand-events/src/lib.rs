//! Cross-process event pairs for deterministic test synchronization.
//!
//! An [`EventHandle`] maps a small shared-memory state file holding two
//! eventfd descriptor numbers, `recv_called` and `recv_ready`, plus an
//! enabled flag. A driver process creates the pair; subscriber processes it
//! spawns inherit the descriptors and attach to the same state file. The
//! pair gates a subscriber's receive path on the driver, producing a
//! deterministic rendezvous (see `strand-ipc`'s fake gate).
//!
//! Waits mask every signal except ALRM/INT/TERM/QUIT; delivery of one of
//! those interrupts the wait with [`EventError::Interrupted`].

#[cfg(not(target_os = "linux"))]
compile_error!("strand-events requires Linux (eventfd).");

mod error;
mod event;
mod handle;

pub use error::EventError;
pub use event::Event;
pub use handle::{event_state_path, EventHandle, EventState, EVENTS_DIR};
