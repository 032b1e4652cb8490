//! Facade over the strand IPC substrate.
//!
//! [`Publisher`], [`Subscriber`] and [`Poller`] are the handles the rest of
//! the pipeline consumes. Backend selection (shared memory, optionally
//! behind the deterministic [`FakeGate`]) is decided once at construction
//! from a [`BackendConfig`] snapshot of the environment.
//!
//! ```ignore
//! use strand_ipc::{BackendConfig, Publisher, Subscriber};
//!
//! let config = BackendConfig::from_env();
//! let mut publisher = Publisher::create(&config, "sensor_state")?;
//! let mut subscriber = Subscriber::create(&config, "sensor_state", false)?;
//!
//! publisher.send(b"frame")?;
//! let msg = subscriber.recv()?;
//! ```

mod config;
mod error;
mod gate;
mod socket;

pub use config::{set_fake_prefix, toggle_fake_events, BackendConfig};
pub use error::IpcError;
pub use gate::FakeGate;
pub use socket::{Poller, Publisher, Subscriber, MAX_POLLERS};

pub use strand_ring::{Message, DEFAULT_SEGMENT_SIZE, DEFAULT_TIMEOUT_MS};
