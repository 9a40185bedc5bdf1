// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded trace buffer for instrumenting driver and store contexts.
//!
//! This is a ring of `Copy` trace records that a context object owns as a
//! plain value. Each entry remembers the source line that recorded it, a
//! wrap generation, and a repeat count; recording the same payload from the
//! same line twice in a row bumps the count instead of burning a slot, so a
//! chatty steady state doesn't push interesting history out of the ring.
//!
//! Use the [`trace!`] macro rather than calling [`TraceBuf::record`]
//! directly; the macro captures `line!()` for you:
//!
//! ```
//! use tracebuf::{trace, TraceBuf};
//!
//! #[derive(Copy, Clone, PartialEq, Eq, Debug)]
//! enum Event {
//!     None,
//!     Commit(u16),
//! }
//!
//! let mut buf: TraceBuf<Event, 8> = TraceBuf::new(Event::None);
//! trace!(buf, Event::Commit(3));
//! assert_eq!(buf.last().unwrap().payload, Event::Commit(3));
//! ```

#![cfg_attr(not(test), no_std)]

/// One recorded trace entry.
///
/// `count` is the number of consecutive times this (line, payload) pair was
/// recorded; `generation` counts how many times the slot has been
/// overwritten since the buffer was created, which lets a debugger order
/// entries across ring wraps.
#[derive(Copy, Clone, Debug)]
pub struct TraceEntry<T: Copy> {
    pub line: u16,
    pub generation: u16,
    pub count: u16,
    pub payload: T,
}

/// A ring of the `N` most recent trace records.
#[derive(Debug)]
pub struct TraceBuf<T: Copy + PartialEq, const N: usize> {
    last: Option<usize>,
    buffer: [TraceEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> TraceBuf<T, N> {
    /// Creates an empty buffer. `fill` is only used to initialize unwritten
    /// slots (a quiet `None`-style variant is the usual choice); it is
    /// never reported by [`Self::entries`].
    pub const fn new(fill: T) -> Self {
        Self {
            last: None,
            buffer: [TraceEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: fill,
            }; N],
        }
    }

    /// Records an entry. Prefer the [`trace!`] macro, which captures the
    /// source line.
    pub fn record(&mut self, line: u16, payload: T) {
        if let Some(last) = self.last {
            let ent = &mut self.buffer[last];
            if ent.line == line && ent.payload == payload {
                if let Some(count) = ent.count.checked_add(1) {
                    ent.count = count;
                    return;
                }
            }
        }

        let ndx = match self.last {
            // Avoiding a remainder operation here matters on targets
            // without hardware divide.
            Some(last) if last + 1 < N => last + 1,
            Some(_) => 0,
            None => 0,
        };
        let ent = &mut self.buffer[ndx];
        *ent = TraceEntry {
            line,
            generation: ent.generation.wrapping_add(1),
            count: 1,
            payload,
        };
        self.last = Some(ndx);
    }

    /// The most recently recorded entry, if anything has been recorded.
    pub fn last(&self) -> Option<&TraceEntry<T>> {
        self.last.map(|ndx| &self.buffer[ndx])
    }

    /// Iterates over recorded entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry<T>> {
        let split = match self.last {
            // Everything after `last` (when written) predates everything up
            // to and including it.
            Some(last) if last + 1 < N => last + 1,
            _ => 0,
        };
        let (newer, older) = self.buffer.split_at(split);
        older
            .iter()
            .chain(newer.iter())
            .filter(|ent| ent.count != 0)
    }

    /// Total number of records observed, counting de-duplicated repeats.
    pub fn recorded(&self) -> u32 {
        self.entries().map(|ent| u32::from(ent.count)).sum()
    }
}

/// Records `$payload` in `$buf`, stamping the current source line.
#[macro_export]
macro_rules! trace {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before taking the buffer reference so the
        // payload expression may read from the same context.
        let p = $payload;
        $buf.record(line!() as u16, p);
    }};
}
