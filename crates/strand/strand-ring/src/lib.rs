//! Lock-free single-producer / multi-consumer ring channel over shared
//! memory.
//!
//! One publisher process appends framed byte messages to a named,
//! memory-mapped circular buffer; subscriber processes claim reader slots in
//! the segment header and consume the stream independently. The hot path is
//! a single 64-bit release store (publisher) and acquire load (subscriber)
//! of a packed cycle+offset cursor, with no kernel round-trip and no locks.
//!
//! Slow subscribers never block the publisher: a reader that falls more than
//! one ring behind is lapped and resynchronizes to the newest complete frame
//! on its next receive. Crashed subscribers leave slots behind that later
//! subscribers reclaim after probing the owner pid.
//!
//! # Example
//!
//! ```ignore
//! use strand_ring::Channel;
//!
//! // Publisher process
//! let mut publisher = Channel::open("sensor_state", 1 << 20, None)?;
//! publisher.init_publisher()?;
//! publisher.send(b"frame")?;
//!
//! // Subscriber process
//! let mut subscriber = Channel::open("sensor_state", 1 << 20, None)?;
//! subscriber.init_subscriber(false)?;
//! if let Some(msg) = subscriber.recv(100)? {
//!     println!("got {} bytes", msg.len());
//! }
//! ```

#[cfg(not(unix))]
compile_error!("strand-ring only supports Unix-like operating systems.");

mod channel;
mod cursor;
mod error;
mod layout;
mod paths;
mod segment;

pub use channel::{Channel, Message, ReadyProbe};
pub use cursor::PackedCursor;
pub use error::ChannelError;
pub use layout::{
    align8, framed_len, DEFAULT_SEGMENT_SIZE, DEFAULT_TIMEOUT_MS, FRAME_HEADER_SIZE,
    NUM_READER_SLOTS,
};
pub use paths::{channel_path, shm_root};
pub use segment::SharedSegment;
