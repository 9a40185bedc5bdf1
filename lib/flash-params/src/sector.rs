// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-RAM image of one parameter sector.
//!
//! A sector is 1024 little words:
//!
//! - word 0, low half: sequence counter (1-based; 0 and 0xFFFF are the
//!   erased/invalid markers), high half reserved as zero;
//! - word 1: configuration flags, opaque to this crate;
//! - words 2..1022: the record segment;
//! - word 1023: checksum, the XOR of every preceding word.
//!
//! The segment is byte-addressed: each record is `id, len, payload...`
//! padded with zeros out to a 4-byte boundary, records are sorted by
//! ascending id, and a zero id byte terminates the list. All edits happen
//! on this RAM image; committing it to a flash device is the store's job.

use crate::{ParamError, MAX_VALUE_LEN};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Sector size, in 32-bit words.
pub const SECTOR_WORDS: usize = 1024;
/// Sector size, in bytes.
pub const SECTOR_BYTES: usize = SECTOR_WORDS * 4;

/// Byte offset of the record segment within the sector.
const SEGMENT_START: usize = 8;
/// Byte offset one past the record segment (the checksum word follows).
const SEGMENT_END: usize = SECTOR_BYTES - 4;
/// Capacity of the record segment, in bytes.
pub const SEGMENT_BYTES: usize = SEGMENT_END - SEGMENT_START;

#[derive(Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub(crate) struct SectorBuf {
    words: [u32; SECTOR_WORDS],
}

static_assertions::const_assert_eq!(
    core::mem::size_of::<SectorBuf>(),
    SECTOR_BYTES
);

/// Bytes a record with an `len`-byte payload occupies in the segment.
fn record_span(len: usize) -> usize {
    (2 + len + 3) & !3
}

impl SectorBuf {
    /// An all-zero image, for use as a read target.
    pub fn zeroed() -> Self {
        Self::new_zeroed()
    }

    /// A freshly initialized sector: empty segment, sealed checksum.
    pub fn fresh(sequence: u16, config_flags: u32) -> Self {
        let mut buf = Self::new_zeroed();
        buf.set_sequence(sequence);
        buf.set_config_flags(config_flags);
        buf.seal();
        buf
    }

    pub fn from_words(words: [u32; SECTOR_WORDS]) -> Self {
        Self { words }
    }

    pub fn as_words(&self) -> &[u32] {
        &self.words
    }

    pub fn as_words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    pub fn sequence(&self) -> u16 {
        self.words[0] as u16
    }

    pub fn set_sequence(&mut self, sequence: u16) {
        // High half of word 0 is reserved as zero.
        self.words[0] = u32::from(sequence);
    }

    /// Whether the sequence counter holds a real generation number rather
    /// than one of the erased/invalid markers.
    pub fn sequence_is_valid(&self) -> bool {
        let seq = self.sequence();
        seq != 0x0000 && seq != 0xFFFF
    }

    pub fn config_flags(&self) -> u32 {
        self.words[1]
    }

    pub fn set_config_flags(&mut self, flags: u32) {
        self.words[1] = flags;
    }

    fn compute_checksum(&self) -> u32 {
        self.words[..SECTOR_WORDS - 1]
            .iter()
            .fold(0, |acc, &word| acc ^ word)
    }

    /// Stamps the checksum word so the sector verifies.
    pub fn seal(&mut self) {
        self.words[SECTOR_WORDS - 1] = self.compute_checksum();
    }

    pub fn checksum_is_valid(&self) -> bool {
        self.words[SECTOR_WORDS - 1] == self.compute_checksum()
    }

    fn segment(&self) -> &[u8] {
        &self.as_bytes()[SEGMENT_START..SEGMENT_END]
    }

    fn segment_mut(&mut self) -> &mut [u8] {
        &mut self.as_mut_bytes()[SEGMENT_START..SEGMENT_END]
    }

    #[cfg(test)]
    pub fn segment_bytes(&self) -> &[u8] {
        self.segment()
    }

    /// Locates the record for `id`, returning its segment offset and
    /// payload length. Records are sorted, so the scan stops early at the
    /// sentinel or the first larger id.
    fn find(&self, id: u8) -> Option<(usize, usize)> {
        let seg = self.segment();
        let mut off = 0;
        while off + 2 <= seg.len() {
            let rid = seg[off];
            if rid == 0 || rid > id {
                return None;
            }
            let len = usize::from(seg[off + 1]);
            if rid == id {
                if off + 2 + len > seg.len() {
                    // Corrupt length byte; treat the record as absent.
                    return None;
                }
                return Some((off, len));
            }
            off += record_span(len);
        }
        None
    }

    /// Byte offset just past the last record (the sentinel position).
    fn end_offset(&self) -> usize {
        let seg = self.segment();
        let mut off = 0;
        while off + 2 <= seg.len() && seg[off] != 0 {
            off += record_span(usize::from(seg[off + 1]));
        }
        off.min(seg.len())
    }

    /// Where a record for `id` should land to keep the segment sorted.
    fn insert_offset(&self, id: u8) -> usize {
        let seg = self.segment();
        let mut off = 0;
        while off + 2 <= seg.len() {
            let rid = seg[off];
            if rid == 0 || rid > id {
                break;
            }
            off += record_span(usize::from(seg[off + 1]));
        }
        off.min(seg.len())
    }

    /// Payload of the record for `id`, if present.
    pub fn get(&self, id: u8) -> Option<&[u8]> {
        let (off, len) = self.find(id)?;
        Some(&self.segment()[off + 2..off + 2 + len])
    }

    /// Inserts a record, shifting the tail right. The caller must have
    /// removed any existing record for `id` first.
    fn insert(&mut self, id: u8, data: &[u8]) -> Result<(), ParamError> {
        debug_assert!(id != 0);
        debug_assert!(data.len() <= MAX_VALUE_LEN);
        let span = record_span(data.len());
        let end = self.end_offset();
        if end + span > SEGMENT_BYTES {
            return Err(ParamError::SegmentFull);
        }
        let at = self.insert_offset(id);
        let seg = self.segment_mut();
        // Tail moves highest-byte-first; copy_within handles the overlap.
        seg.copy_within(at..end, at + span);
        seg[at] = id;
        seg[at + 1] = data.len() as u8;
        seg[at + 2..at + 2 + data.len()].copy_from_slice(data);
        for byte in &mut seg[at + 2 + data.len()..at + span] {
            *byte = 0;
        }
        Ok(())
    }

    /// Removes the record for `id`, if any, closing the gap and
    /// zero-filling the vacated tail bytes.
    pub fn remove(&mut self, id: u8) {
        let Some((off, len)) = self.find(id) else {
            return;
        };
        let end = self.end_offset();
        let span = record_span(len).min(end - off);
        let seg = self.segment_mut();
        seg.copy_within(off + span..end, off);
        for byte in &mut seg[end - span..end] {
            *byte = 0;
        }
    }

    /// Replaces (or creates) the record for `id`.
    ///
    /// The capacity check accounts for the record being replaced, and runs
    /// before any mutation, so a failed save leaves the image untouched.
    pub fn save(&mut self, id: u8, data: &[u8]) -> Result<(), ParamError> {
        let end = self.end_offset();
        let old_span = self.find(id).map(|(_, len)| record_span(len));
        let new_end = end - old_span.unwrap_or(0) + record_span(data.len());
        if new_end > SEGMENT_BYTES {
            return Err(ParamError::SegmentFull);
        }
        if old_span.is_some() {
            self.remove(id);
        }
        self.insert(id, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_sector_verifies() {
        let buf = SectorBuf::fresh(1, 0);
        assert!(buf.checksum_is_valid());
        assert!(buf.sequence_is_valid());
        assert_eq!(buf.sequence(), 1);
        assert_eq!(buf.get(1), None);
    }

    #[test]
    fn erased_markers_are_invalid_sequences() {
        let mut buf = SectorBuf::fresh(1, 0);
        buf.set_sequence(0);
        assert!(!buf.sequence_is_valid());
        buf.set_sequence(0xFFFF);
        assert!(!buf.sequence_is_valid());
    }

    #[test]
    fn records_sort_and_pad() {
        let mut buf = SectorBuf::fresh(1, 0);
        buf.save(2, b"xy").unwrap();
        buf.save(1, b"abcd").unwrap();

        // id 1 first (2 + 4 payload, padded to 8), then id 2 (2 + 2,
        // exactly one word), then the sentinel.
        let expect = [
            0x01, 0x04, b'a', b'b', b'c', b'd', 0x00, 0x00, //
            0x02, 0x02, b'x', b'y', 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(&buf.segment_bytes()[..16], &expect);
    }

    #[test]
    fn save_replaces_in_place() {
        let mut buf = SectorBuf::fresh(1, 0);
        buf.save(5, b"first").unwrap();
        buf.save(9, b"other").unwrap();
        buf.save(5, b"second!").unwrap();
        assert_eq!(buf.get(5).unwrap(), b"second!");
        assert_eq!(buf.get(9).unwrap(), b"other");
    }

    #[test]
    fn remove_shifts_tail_and_zero_fills() {
        let mut buf = SectorBuf::fresh(1, 0);
        buf.save(1, b"aa").unwrap();
        buf.save(2, b"bb").unwrap();
        buf.save(3, b"cc").unwrap();
        buf.remove(2);

        assert_eq!(buf.get(1).unwrap(), b"aa");
        assert_eq!(buf.get(2), None);
        assert_eq!(buf.get(3).unwrap(), b"cc");
        // Two records remain (4 bytes each); the rest of the segment is
        // zeroed out.
        assert!(buf.segment_bytes()[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn remove_of_absent_id_is_a_no_op() {
        let mut buf = SectorBuf::fresh(1, 0);
        buf.save(7, b"x").unwrap();
        let before = buf.segment_bytes().to_vec();
        buf.remove(8);
        assert_eq!(buf.segment_bytes(), &before[..]);
    }

    #[test]
    fn zero_length_payloads_are_records_too() {
        let mut buf = SectorBuf::fresh(1, 0);
        buf.save(3, b"").unwrap();
        assert_eq!(buf.get(3).unwrap(), b"");
        buf.save(1, b"q").unwrap();
        assert_eq!(buf.get(3).unwrap(), b"");
    }

    #[test]
    fn segment_full_leaves_image_untouched() {
        let mut buf = SectorBuf::fresh(1, 0);
        // 15 max-size records span 15 * 260 = 3900 of 4084 bytes.
        for id in 1..=15 {
            buf.save(id, &[id; MAX_VALUE_LEN]).unwrap();
        }
        let before = buf.segment_bytes().to_vec();
        assert_eq!(
            buf.save(16, &[16; MAX_VALUE_LEN]),
            Err(ParamError::SegmentFull)
        );
        assert_eq!(buf.segment_bytes(), &before[..]);

        // Replacing an existing record at the same size still fits.
        buf.save(15, &[0xAB; MAX_VALUE_LEN]).unwrap();
        assert_eq!(buf.get(15).unwrap(), &[0xAB; MAX_VALUE_LEN]);
    }

    #[test]
    fn checksum_is_order_independent_xor() {
        let mut a = SectorBuf::fresh(3, 0x1234_5678);
        a.save(1, b"hello").unwrap();
        a.seal();
        assert!(a.checksum_is_valid());
        // Flipping any word breaks it.
        a.as_words_mut()[100] ^= 1;
        assert!(!a.checksum_is_valid());
    }
}
