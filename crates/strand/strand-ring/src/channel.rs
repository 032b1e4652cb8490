//! Single-producer multi-consumer ring channel over a shared segment.
//!
//! One process initializes a handle as the publisher and appends framed
//! byte messages; up to [`NUM_READER_SLOTS`] subscriber processes claim
//! reader slots and consume the stream at their own pace. The publisher
//! never waits: a subscriber that falls more than one ring behind is lapped
//! and resynchronizes to the newest complete frame on its next receive.
//!
//! # Handle discipline
//! A `Channel` is thread-compatible, not thread-safe: one handle, one thread
//! at a time. Single-writer discipline across processes is the caller's
//! responsibility.

use crate::cursor::PackedCursor;
use crate::error::{ChannelError, Result};
use crate::layout::{
    framed_len, FrameHeader, FRAME_FLAG_WRAP, FRAME_HEADER_SIZE, NUM_READER_SLOTS,
};
use crate::paths::channel_path;
use crate::segment::SharedSegment;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sleep slice used while polling for new data in `recv`.
const RECV_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Upper bound on parse retries within one receive attempt. Retries only
/// happen when the publisher wraps mid-read, so hitting the bound means the
/// reader is being lapped continuously and behaves as if no data arrived.
const MAX_RECV_RETRIES: usize = 64;

/// Process-local generation counter folded into reader uids, so a restarted
/// subscriber never mistakes a stale slot for its own.
static NEXT_GENERATION: AtomicU32 = AtomicU32::new(0);

/// An owned message received from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
}

impl Message {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[derive(Debug)]
struct ReaderState {
    slot: usize,
    uid: u64,
    conflate: bool,
    overruns: u64,
}

#[derive(Debug)]
enum Role {
    Unassigned,
    Publisher,
    Subscriber(ReaderState),
}

/// A handle onto one named channel segment.
#[derive(Debug)]
pub struct Channel {
    segment: Arc<SharedSegment>,
    name: String,
    role: Role,
}

impl Channel {
    /// Open the channel `name`, creating its segment on first use.
    ///
    /// `data_size` is the ring capacity in bytes (rounded up to 8); an
    /// existing segment of a different size is rejected. The optional
    /// namespace `prefix` nests the segment file one directory down.
    pub fn open(name: &str, data_size: u32, prefix: Option<&str>) -> Result<Self> {
        if name.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "channel name must not be empty".into(),
            ));
        }
        let segment = SharedSegment::open_or_create(channel_path(prefix, name), data_size)?;
        Ok(Self {
            segment: Arc::new(segment),
            name: name.to_string(),
            role: Role::Unassigned,
        })
    }

    /// Remove the segment file backing `name`. Mapped handles keep working
    /// on the orphaned inode; later opens re-create a fresh segment.
    pub fn unlink(name: &str, prefix: Option<&str>) -> std::io::Result<()> {
        std::fs::remove_file(channel_path(prefix, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// High-water mark of reader slots ever claimed on this channel.
    pub fn num_readers(&self) -> usize {
        self.segment.header().num_readers.load(Ordering::Acquire) as usize
    }

    /// Largest payload this channel can carry.
    pub fn max_payload(&self) -> usize {
        (self.segment.data_size() - FRAME_HEADER_SIZE) as usize
    }

    /// Mark this handle as the channel's unique writer.
    pub fn init_publisher(&mut self) -> Result<()> {
        match self.role {
            Role::Unassigned => {
                self.role = Role::Publisher;
                Ok(())
            }
            _ => Err(ChannelError::InvalidArgument(
                "handle already initialized".into(),
            )),
        }
    }

    /// Claim a reader slot and start observing messages published from now
    /// on. With `conflate` set, every receive returns only the newest
    /// message, discarding intermediates.
    pub fn init_subscriber(&mut self, conflate: bool) -> Result<()> {
        if !matches!(self.role, Role::Unassigned) {
            return Err(ChannelError::InvalidArgument(
                "handle already initialized".into(),
            ));
        }

        let header = self.segment.header();
        let uid = next_reader_uid();

        // First pass: take any free slot.
        for slot in 0..NUM_READER_SLOTS {
            if header.reader_uids[slot]
                .compare_exchange(0, uid, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.adopt_slot(slot, uid, conflate);
                return Ok(());
            }
        }

        // Second pass: reclaim a slot whose owner process is gone.
        for slot in 0..NUM_READER_SLOTS {
            let current = header.reader_uids[slot].load(Ordering::Acquire);
            if current != 0
                && !pid_alive(uid_pid(current))
                && header.reader_uids[slot]
                    .compare_exchange(current, uid, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.adopt_slot(slot, uid, conflate);
                return Ok(());
            }
        }

        Err(ChannelError::SlotExhausted)
    }

    fn adopt_slot(&mut self, slot: usize, uid: u64, conflate: bool) {
        let header = self.segment.header();
        // Fresh and reclaimed slots alike start at the current write
        // position: a subscriber only sees messages published after it
        // joins.
        let w = header.write_cursor.load(Ordering::Acquire);
        header.reader_cursors[slot].store(w, Ordering::Release);
        header
            .num_readers
            .fetch_max(slot as u32 + 1, Ordering::AcqRel);
        self.role = Role::Subscriber(ReaderState {
            slot,
            uid,
            conflate,
            overruns: 0,
        });
    }

    /// Append one framed message. Never blocks on readers.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if !matches!(self.role, Role::Publisher) {
            return Err(ChannelError::NotInitialized);
        }

        let seg = self.segment.data_size();
        let max = (seg - FRAME_HEADER_SIZE) as usize;
        if payload.len() > max {
            return Err(ChannelError::MessageTooLarge {
                size: payload.len(),
                max,
            });
        }

        let header = self.segment.header();
        let data = self.segment.data_ptr();
        let need = framed_len(payload.len() as u32);

        // Single writer: no other process stores the write cursor.
        let mut w = PackedCursor::load(&header.write_cursor, Ordering::Relaxed);

        let remaining = seg - w.offset();
        if need > remaining {
            if remaining >= FRAME_HEADER_SIZE {
                // Sentinel telling readers to skip the tail and continue at
                // offset 0 of the next cycle.
                unsafe {
                    write_frame_header(data, w.offset(), FrameHeader {
                        size: 0,
                        flags: FRAME_FLAG_WRAP,
                    });
                }
            }
            w = w.wrap_add(remaining, seg);
        }

        unsafe {
            write_frame_header(data, w.offset(), FrameHeader {
                size: payload.len() as u32,
                flags: 0,
            });
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                data.add((w.offset() + FRAME_HEADER_SIZE) as usize),
                payload.len(),
            );
        }

        // Frame bytes first, cursor second: the release store is what makes
        // the frame visible to readers.
        let next = PackedCursor::new(w.cycle(), w.offset() + need);
        next.store(&header.write_cursor, Ordering::Release);
        Ok(())
    }

    /// True when every occupied, live reader slot has consumed the stream up
    /// to the current write position. Slots owned by dead processes are
    /// ignored.
    pub fn all_readers_updated(&self) -> bool {
        let header = self.segment.header();
        let w = header.write_cursor.load(Ordering::Acquire);
        let n = (header.num_readers.load(Ordering::Acquire) as usize).min(NUM_READER_SLOTS);

        for slot in 0..n {
            let uid = header.reader_uids[slot].load(Ordering::Acquire);
            if uid == 0 || !pid_alive(uid_pid(uid)) {
                continue;
            }
            if header.reader_cursors[slot].load(Ordering::Acquire) != w {
                return false;
            }
        }
        true
    }

    /// True when at least one unread message is available to this
    /// subscriber. False on an uninitialized handle.
    pub fn msg_ready(&self) -> bool {
        let Role::Subscriber(ref st) = self.role else {
            return false;
        };
        let header = self.segment.header();
        header.reader_cursors[st.slot].load(Ordering::Relaxed)
            != header.write_cursor.load(Ordering::Acquire)
    }

    /// Number of times this subscriber was lapped (or hit a corrupt frame)
    /// and had to resynchronize, dropping messages.
    pub fn overruns(&self) -> u64 {
        match self.role {
            Role::Subscriber(ref st) => st.overruns,
            _ => 0,
        }
    }

    /// Receive the next message, waiting up to `timeout_ms` for one to
    /// arrive. Negative means wait forever; an elapsed timeout is `Ok(None)`.
    pub fn recv(&mut self, timeout_ms: i64) -> Result<Option<Message>> {
        if !matches!(self.role, Role::Subscriber(_)) {
            return Err(ChannelError::NotInitialized);
        }

        let deadline = if timeout_ms >= 0 {
            Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
        } else {
            None
        };

        loop {
            if let Some(msg) = self.try_read() {
                return Ok(Some(msg));
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(RECV_POLL_INTERVAL.min(deadline - now));
                }
                None => std::thread::sleep(RECV_POLL_INTERVAL),
            }
        }
    }

    /// One non-blocking receive attempt.
    fn try_read(&mut self) -> Option<Message> {
        let Channel {
            ref segment,
            ref mut role,
            ..
        } = *self;
        let Role::Subscriber(st) = role else {
            return None;
        };

        let seg = segment.data_size();
        let data = segment.data_ptr();
        let header = segment.header();
        let cursor_cell = &header.reader_cursors[st.slot];

        let original = cursor_cell.load(Ordering::Relaxed);
        let mut r = PackedCursor::from_raw(original);

        for _ in 0..MAX_RECV_RETRIES {
            let w = PackedCursor::load(&header.write_cursor, Ordering::Acquire);

            if r == w {
                if r.raw() != original {
                    r.store(cursor_cell, Ordering::Release);
                }
                return None;
            }

            let was_lapped = lapped(r, w);
            if was_lapped || st.conflate {
                // Jump straight to the newest complete frame. After a lap
                // the only boundary still known valid is the start of the
                // writer's current cycle.
                let from = if was_lapped {
                    PackedCursor::new(w.cycle(), 0)
                } else {
                    r
                };
                let newest = if from == w {
                    None
                } else {
                    unsafe { newest_frame_start(data, seg, from, w) }
                };
                match newest {
                    Some(start) => {
                        if was_lapped {
                            st.overruns += 1;
                        }
                        r = start;
                    }
                    None => {
                        // Unrecoverable position (frame boundaries lost or
                        // corrupt header): resynchronize to the writer.
                        st.overruns += 1;
                        w.store(cursor_cell, Ordering::Release);
                        return None;
                    }
                }
            }

            if r.offset() == seg {
                // End-of-cycle position left by a frame that exactly filled
                // the ring.
                r = r.wrap_add(0, seg);
                continue;
            }

            let fh = unsafe { read_frame_header(data, r.offset()) };
            if fh.flags & FRAME_FLAG_WRAP != 0 {
                r = r.wrap_add(seg - r.offset(), seg);
                continue;
            }

            if fh.size > seg - FRAME_HEADER_SIZE
                || r.offset() as u64 + framed_len(fh.size) as u64 > seg as u64
            {
                // Corrupt header: treated exactly like a lap.
                st.overruns += 1;
                w.store(cursor_cell, Ordering::Release);
                return None;
            }

            let size = fh.size as usize;
            let mut payload = Vec::with_capacity(size);
            unsafe {
                ptr::copy_nonoverlapping(
                    data.add((r.offset() + FRAME_HEADER_SIZE) as usize),
                    payload.as_mut_ptr(),
                    size,
                );
                payload.set_len(size);
            }

            // The copy raced the publisher: it only counts if our frame is
            // still inside the valid window now.
            let w2 = PackedCursor::load(&header.write_cursor, Ordering::Acquire);
            if lapped(r, w2) {
                st.overruns += 1;
                continue;
            }

            let next = PackedCursor::new(r.cycle(), r.offset() + framed_len(fh.size));
            next.store(cursor_cell, Ordering::Release);
            return Some(Message::new(payload));
        }

        None
    }

    /// A cheap readiness handle for this subscriber, usable by a poller
    /// without borrowing the channel.
    pub fn probe(&self) -> Result<ReadyProbe> {
        match self.role {
            Role::Subscriber(ref st) => Ok(ReadyProbe {
                segment: Arc::clone(&self.segment),
                slot: st.slot,
            }),
            _ => Err(ChannelError::NotInitialized),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Role::Subscriber(ref st) = self.role {
            // Orderly release; a failed exchange means the slot was already
            // reclaimed from a presumed-dead owner.
            let _ = self.segment.header().reader_uids[st.slot].compare_exchange(
                st.uid,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }
}

/// Readiness view onto one subscriber slot.
pub struct ReadyProbe {
    segment: Arc<SharedSegment>,
    slot: usize,
}

impl ReadyProbe {
    pub fn msg_ready(&self) -> bool {
        let header = self.segment.header();
        header.reader_cursors[self.slot].load(Ordering::Relaxed)
            != header.write_cursor.load(Ordering::Acquire)
    }
}

/// True when the writer has moved more than one ring ahead of `r`, i.e.
/// bytes at the reader's position have been overwritten.
#[inline(always)]
fn lapped(r: PackedCursor, w: PackedCursor) -> bool {
    let lag = w.cycle().wrapping_sub(r.cycle());
    lag > 1 || (lag == 1 && w.offset() > r.offset())
}

/// Walk frame headers from the known-valid boundary `from` toward `w` and
/// return the start of the last complete frame. Sentinels and end-of-cycle
/// positions are stepped over. Returns `None` when a header is implausible
/// or the walk fails to land exactly on `w`.
///
/// # Safety
/// `data` must point at a mapped region of `seg` bytes; `from` must be a
/// frame boundary within the window still owned by cycles `w.cycle() - 1`
/// and `w.cycle()`. The result is validated against `w` again by the caller
/// after copying.
unsafe fn newest_frame_start(
    data: *const u8,
    seg: u32,
    from: PackedCursor,
    w: PackedCursor,
) -> Option<PackedCursor> {
    let mut cur = from;
    let max_steps = (seg / FRAME_HEADER_SIZE) as usize + 2;

    for _ in 0..max_steps {
        if cur == w {
            return None;
        }
        if cur.offset() == seg {
            cur = cur.wrap_add(0, seg);
            continue;
        }

        let fh = read_frame_header(data, cur.offset());
        if fh.flags & FRAME_FLAG_WRAP != 0 {
            cur = cur.wrap_add(seg - cur.offset(), seg);
            continue;
        }
        if fh.size > seg - FRAME_HEADER_SIZE
            || cur.offset() as u64 + framed_len(fh.size) as u64 > seg as u64
        {
            return None;
        }

        let next = PackedCursor::new(cur.cycle(), cur.offset() + framed_len(fh.size));
        if next == w {
            return Some(cur);
        }
        if next.cycle() == w.cycle() && next.offset() > w.offset() {
            return None;
        }
        cur = next;
    }
    None
}

#[inline(always)]
unsafe fn read_frame_header(data: *const u8, offset: u32) -> FrameHeader {
    ptr::read_volatile(data.add(offset as usize) as *const FrameHeader)
}

#[inline(always)]
unsafe fn write_frame_header(data: *mut u8, offset: u32, fh: FrameHeader) {
    ptr::write(data.add(offset as usize) as *mut FrameHeader, fh);
}

fn next_reader_uid() -> u64 {
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    ((std::process::id() as u64) << 32) | generation as u64
}

#[inline]
fn uid_pid(uid: u64) -> u32 {
    (uid >> 32) as u32
}

/// Probe whether `pid` still exists, without sending a signal. EPERM means
/// the process exists but belongs to someone else, so it counts as alive.
fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}
