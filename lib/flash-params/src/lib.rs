// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wear-leveled parameter store over a pair of 4 KiB flash sectors.
//!
//! Small configuration values (up to 255 bytes, keyed by a one-byte id)
//! live in a checksummed sector image. Two physical sectors take turns
//! holding the authoritative copy: every commit writes the *backup* sector
//! and only then rotates the roles, so power loss at any instant leaves at
//! least one valid image behind. On boot, [`ParamStore::setup`] elects the
//! sector with a valid checksum and the higher sequence counter.
//!
//! Mutations run in one of two modes:
//!
//! - **instant** (the default): every [`ParamStore::save`] or
//!   [`ParamStore::remove`] reads the current sector, edits the RAM image,
//!   and commits it;
//! - **deferred**: mutations accumulate in a bounded queue and are applied
//!   in a single commit on [`ParamStore::flush`] (or when the queue fills,
//!   or when instant mode is re-enabled). Reads consult the queue first so
//!   callers always observe their own writes.
//!
//! The flash itself is reached through the [`FlashDevice`] trait; the
//! store never blocks and never retries on its own.

#![cfg_attr(not(test), no_std)]

mod sector;

use heapless::Vec;
use tracebuf::{trace, TraceBuf};

use sector::SectorBuf;
pub use sector::{SECTOR_BYTES, SECTOR_WORDS, SEGMENT_BYTES};

/// Default sector addresses, overridable at [`ParamStore::new`].
pub const DEFAULT_PRIMARY_ADDR: u32 = 0x0003_C000;
pub const DEFAULT_SECONDARY_ADDR: u32 = 0x0003_D000;

/// Default value of the opaque configuration flags word.
pub const DEFAULT_CONFIG_FLAGS: u32 = 0;

/// Longest payload a single parameter can hold.
pub const MAX_VALUE_LEN: usize = 255;

/// Deferred-mode queue depth; enqueueing onto a full queue flushes first.
pub const QUEUE_DEPTH: usize = 16;

/// An owned parameter value.
pub type Value = Vec<u8, MAX_VALUE_LEN>;

/// Error from the platform flash driver. The store treats all driver
/// failures alike: the operation is abandoned and the previous sector
/// image stays authoritative.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashIoError;

/// The platform flash interface this store consumes.
///
/// Addresses are byte addresses of 4 KiB-aligned sectors; `erase_sector`
/// takes the sector index (address >> 12). Transfers are whole words.
pub trait FlashDevice {
    fn erase_sector(&mut self, sector: u32) -> Result<(), FlashIoError>;
    fn read(&self, addr: u32, dst: &mut [u32]) -> Result<(), FlashIoError>;
    fn write(&mut self, addr: u32, src: &[u32]) -> Result<(), FlashIoError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamError {
    /// The flash driver reported a failure; nothing was committed.
    FlashIo,
    /// The value would overflow the sector's record segment.
    SegmentFull,
    /// Payload longer than [`MAX_VALUE_LEN`].
    ValueTooLarge,
    /// Id 0 is the segment terminator and cannot name a parameter.
    InvalidId,
}

impl From<FlashIoError> for ParamError {
    fn from(_: FlashIoError) -> Self {
        ParamError::FlashIo
    }
}

/// What [`ParamStore::setup`] found in flash.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SetupStatus {
    /// Both sectors verified; the higher sequence was elected.
    Intact,
    /// One sector was invalid or unreadable; the surviving copy was
    /// elected and the other will be refreshed by the next commit.
    Recovered,
    /// Neither sector verified; the primary was initialized fresh.
    Initialized,
}

/// Store events, for the owner's debugger.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    None,
    Setup(SetupStatus),
    Commit { seq: u16 },
    CommitFailed,
    Flush { ops: u8 },
    SaveDropped { id: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PendingOp {
    Save { id: u8, data: Value },
    Remove { id: u8 },
}

impl PendingOp {
    fn id(&self) -> u8 {
        match self {
            PendingOp::Save { id, .. } | PendingOp::Remove { id } => *id,
        }
    }
}

/// The parameter store context. One per sector pair; owns the flash
/// handle, the current/backup role toggle, and the deferred-write queue.
pub struct ParamStore<F: FlashDevice> {
    flash: F,
    current: u32,
    backup: u32,
    instant: bool,
    queue: Vec<PendingOp, QUEUE_DEPTH>,
    trace: TraceBuf<Trace, 16>,
}

impl<F: FlashDevice> ParamStore<F> {
    /// Creates a store over the sector pair at `primary`/`secondary`.
    /// No flash is touched until [`Self::setup`] runs; the store starts in
    /// instant mode.
    pub fn new(flash: F, primary: u32, secondary: u32) -> Self {
        Self {
            flash,
            current: primary,
            backup: secondary,
            instant: true,
            queue: Vec::new(),
            trace: TraceBuf::new(Trace::None),
        }
    }

    /// Validates both sectors and elects the current one. If neither
    /// verifies (first boot, or double corruption), the primary is
    /// initialized with sequence 1 and an empty segment.
    ///
    /// Safe to call again at any time; re-running the election on intact
    /// flash is a no-op.
    pub fn setup(&mut self) -> Result<SetupStatus, ParamError> {
        let (a, b) = (self.current, self.backup);
        let a_seq = self.read_if_valid(a);
        let b_seq = self.read_if_valid(b);

        let status = match (a_seq, b_seq) {
            (Some(a_seq), Some(b_seq)) => {
                if b_seq > a_seq {
                    (self.current, self.backup) = (b, a);
                }
                SetupStatus::Intact
            }
            (Some(_), None) => SetupStatus::Recovered,
            (None, Some(_)) => {
                (self.current, self.backup) = (b, a);
                SetupStatus::Recovered
            }
            (None, None) => {
                let fresh = SectorBuf::fresh(1, DEFAULT_CONFIG_FLAGS);
                self.flash.erase_sector(sector_index(a))?;
                self.flash.write(a, fresh.as_words())?;
                SetupStatus::Initialized
            }
        };
        trace!(self.trace, Trace::Setup(status));
        Ok(status)
    }

    /// Reads the sector at `addr` and returns its sequence counter if the
    /// image verifies. Driver failures count as invalid, like corruption.
    fn read_if_valid(&self, addr: u32) -> Option<u16> {
        let mut buf = SectorBuf::zeroed();
        self.flash.read(addr, buf.as_words_mut()).ok()?;
        if buf.checksum_is_valid() && buf.sequence_is_valid() {
            Some(buf.sequence())
        } else {
            None
        }
    }

    fn read_current(&self) -> Result<SectorBuf, ParamError> {
        let mut buf = SectorBuf::zeroed();
        self.flash.read(self.current, buf.as_words_mut())?;
        Ok(buf)
    }

    /// Looks up `id`, preferring the deferred queue (most recent op wins)
    /// over the flash image.
    pub fn read(&self, id: u8) -> Result<Option<Value>, ParamError> {
        if id == 0 {
            return Ok(None);
        }
        if !self.instant {
            if let Some(op) = self.queue.iter().rev().find(|op| op.id() == id)
            {
                return Ok(match op {
                    PendingOp::Remove { .. } => None,
                    PendingOp::Save { data, .. } => Some(data.clone()),
                });
            }
        }
        let buf = self.read_current()?;
        Ok(buf.get(id).map(copy_value))
    }

    /// Stores `data` under `id`, replacing any previous value. In deferred
    /// mode this only enqueues; a full queue flushes first.
    pub fn save(&mut self, id: u8, data: &[u8]) -> Result<(), ParamError> {
        if id == 0 {
            return Err(ParamError::InvalidId);
        }
        if data.len() > MAX_VALUE_LEN {
            return Err(ParamError::ValueTooLarge);
        }
        if self.instant {
            let mut buf = self.read_current()?;
            buf.save(id, data)?;
            self.commit(&mut buf)
        } else {
            self.make_queue_room()?;
            let _ = self.queue.push(PendingOp::Save {
                id,
                data: copy_value(data),
            });
            Ok(())
        }
    }

    /// Deletes the value for `id`. Removing an absent id is a no-op (but
    /// in instant mode still commits, like the original hardware store).
    pub fn remove(&mut self, id: u8) -> Result<(), ParamError> {
        if id == 0 {
            return Err(ParamError::InvalidId);
        }
        if self.instant {
            let mut buf = self.read_current()?;
            buf.remove(id);
            self.commit(&mut buf)
        } else {
            self.make_queue_room()?;
            let _ = self.queue.push(PendingOp::Remove { id });
            Ok(())
        }
    }

    /// Re-enables instant mode, flushing anything queued.
    pub fn enable_instant_update(&mut self) -> Result<(), ParamError> {
        self.instant = true;
        self.flush()
    }

    /// Starts deferring mutations into the queue.
    pub fn disable_instant_update(&mut self) {
        self.instant = false;
    }

    pub fn is_instant(&self) -> bool {
        self.instant
    }

    /// Applies every queued op, in enqueue order, in a single commit. The
    /// queue is empty afterwards even on failure: a driver error drops the
    /// pending ops rather than replaying them against unknown state.
    pub fn flush(&mut self) -> Result<(), ParamError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let mut buf = match self.read_current() {
            Ok(buf) => buf,
            Err(e) => {
                self.queue.clear();
                return Err(e);
            }
        };
        trace!(self.trace, Trace::Flush { ops: self.queue.len() as u8 });
        for op in &self.queue {
            match op {
                PendingOp::Save { id, data } => {
                    if buf.save(*id, data).is_err() {
                        // Segment overflow; the op was accepted at enqueue
                        // time, so all we can do is drop it and move on.
                        trace!(self.trace, Trace::SaveDropped { id: *id });
                    }
                }
                PendingOp::Remove { id } => buf.remove(*id),
            }
        }
        self.queue.clear();
        self.commit(&mut buf)
    }

    /// Bumps the sequence, seals the checksum, and writes the image to the
    /// backup sector. Roles rotate only after the write succeeds, so a
    /// failed or interrupted commit leaves the previous current intact.
    fn commit(&mut self, buf: &mut SectorBuf) -> Result<(), ParamError> {
        let seq = match buf.sequence() {
            // 0xFFFF and 0 are reserved as erased markers; wrap past them.
            seq if seq >= 0xFFFE => 1,
            seq => seq + 1,
        };
        buf.set_sequence(seq);
        buf.seal();

        let target = self.backup;
        let result = self
            .flash
            .erase_sector(sector_index(target))
            .and_then(|()| self.flash.write(target, buf.as_words()));
        match result {
            Ok(()) => {
                core::mem::swap(&mut self.current, &mut self.backup);
                trace!(self.trace, Trace::Commit { seq });
                Ok(())
            }
            Err(e) => {
                trace!(self.trace, Trace::CommitFailed);
                Err(e.into())
            }
        }
    }

    /// Guarantees a free queue slot, flushing if necessary.
    fn make_queue_room(&mut self) -> Result<(), ParamError> {
        if self.queue.is_full() {
            // The flush consumes the queue even when it fails, so a slot
            // is free either way; an error still aborts the caller's op.
            self.flush()?;
        }
        Ok(())
    }

    /// The opaque configuration flags word of the current sector.
    pub fn config_flags(&self) -> Result<u32, ParamError> {
        Ok(self.read_current()?.config_flags())
    }

    /// Rewrites the configuration flags word through the normal commit
    /// path.
    pub fn set_config_flags(&mut self, flags: u32) -> Result<(), ParamError> {
        let mut buf = self.read_current()?;
        buf.set_config_flags(flags);
        self.commit(&mut buf)
    }

    /// Byte address of the sector currently holding the authoritative
    /// image.
    pub fn current_address(&self) -> u32 {
        self.current
    }

    /// Recent store events.
    pub fn trace(&self) -> &TraceBuf<Trace, 16> {
        &self.trace
    }

    /// Hands the flash device back, discarding the store.
    pub fn release(self) -> F {
        self.flash
    }
}

fn sector_index(addr: u32) -> u32 {
    addr >> 12
}

/// Copies `bytes` into an owned [`Value`]. Callers guarantee the length
/// fits; anything longer would have been rejected at the API boundary.
fn copy_value(bytes: &[u8]) -> Value {
    let mut value = Value::new();
    let _ = value.extend_from_slice(bytes);
    value
}
