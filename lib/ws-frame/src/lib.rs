// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RFC 6455 WebSocket frame codec for byte-at-a-time delivery.
//!
//! The encoder writes a complete single-fragment frame into a caller
//! buffer. The decoder is a small state machine designed to be fed one
//! byte per call -- cheap enough to run from a receive interrupt -- and
//! hands each completed frame to a caller-supplied sink, in arrival
//! order, synchronously with the frame's last byte.
//!
//! The decoder writes payloads into borrowed backing memory, so the frame
//! size the peer can make us buffer is capped by the caller, not by the
//! protocol's 64-bit length field. A frame announcing a payload larger
//! than the buffer is dropped with [`DecodeError::FrameTooLarge`].
//!
//! Fragmented messages are not reassembled here; each frame is delivered
//! as-is.

#![cfg_attr(not(test), no_std)]

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

const FIN_BIT: u8 = 0b1000_0000;
const MASK_BIT: u8 = 0b1000_0000;
const RSV_BITS: u8 = 0b0111_0000;
const OPCODE_BITS: u8 = 0b0000_1111;
const LENGTH_BITS: u8 = 0b0111_1111;

/// Frame opcodes, numbered per RFC 6455 §5.2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// Source of masking keys for the encoder. Implementations must not
/// block; a hardware RNG front-end is the usual production choice.
pub trait MaskSource {
    fn next_mask(&mut self) -> u32;
}

/// Seedable xorshift mask generator, for hosts without a hardware RNG.
/// Mask keys need to be unpredictable enough to foil cache poisoning, not
/// cryptographically strong.
#[derive(Clone, Debug)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub const fn new(seed: u32) -> Self {
        // Xorshift has a fixed point at zero; nudge it off.
        Self {
            state: if seed == 0 { 0x2545_F491 } else { seed },
        }
    }
}

impl MaskSource for XorShift32 {
    fn next_mask(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// Destination too small for header plus payload.
    BufferTooSmall,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The announced payload exceeds the decode buffer; the frame was
    /// dropped and the decoder returned to idle.
    FrameTooLarge,
}

/// Encodes `payload` as a single FIN-terminated frame into `dst`,
/// returning the total number of bytes written.
///
/// With a `mask` source, a fresh 4-byte key is drawn, appended to the
/// header, and the payload is XOR-masked on the way out (the client side
/// of the protocol); with `None` the payload is copied verbatim.
pub fn encode(
    dst: &mut [u8],
    payload: &[u8],
    opcode: Opcode,
    mask: Option<&mut dyn MaskSource>,
) -> Result<usize, EncodeError> {
    let len = payload.len();
    let ext_len: usize = if len < 126 {
        0
    } else if len <= 0xFFFF {
        2
    } else {
        8
    };
    let mask_len = if mask.is_some() { 4 } else { 0 };
    let total = 2 + ext_len + mask_len + len;
    if dst.len() < total {
        return Err(EncodeError::BufferTooSmall);
    }

    dst[0] = FIN_BIT | (opcode as u8 & OPCODE_BITS);
    let mut at = 2;
    match ext_len {
        0 => dst[1] = len as u8,
        2 => {
            dst[1] = 126;
            dst[2..4].copy_from_slice(&(len as u16).to_be_bytes());
            at = 4;
        }
        _ => {
            dst[1] = 127;
            // Upper half is always zero: payloads are addressed in RAM.
            dst[2..10].copy_from_slice(&(len as u64).to_be_bytes());
            at = 10;
        }
    }

    match mask {
        Some(source) => {
            dst[1] |= MASK_BIT;
            let key = source.next_mask().to_be_bytes();
            dst[at..at + 4].copy_from_slice(&key);
            at += 4;
            for (i, &byte) in payload.iter().enumerate() {
                dst[at + i] = byte ^ key[i % 4];
            }
        }
        None => dst[at..at + len].copy_from_slice(payload),
    }
    Ok(total)
}

/// Receiver of completed frames. `payload` is only valid for the duration
/// of the call; the decoder reuses the buffer for the next frame.
pub trait FrameSink {
    fn on_frame(&mut self, opcode: Opcode, payload: &[u8]);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    /// Waiting for a plausible frame-start byte; anything else is noise
    /// and is dropped silently.
    Idle,
    /// Consuming the length byte and any extended length bytes.
    Header,
    /// Consuming the 4-byte masking key.
    Mask,
    /// Accumulating payload bytes.
    Data,
}

/// Streaming frame decoder over borrowed payload memory.
pub struct Decoder<'b> {
    state: State,
    opcode: Opcode,
    masked: bool,
    /// Bytes left in the current multi-byte field (extended length or
    /// masking key); 0 in Header means the length byte itself is next.
    field_left: u8,
    len: u64,
    mask: [u8; 4],
    filled: usize,
    buf: &'b mut [u8],
}

impl<'b> Decoder<'b> {
    /// Creates an idle decoder that assembles payloads into `buf`. The
    /// buffer length is the largest frame the peer may send.
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self {
            state: State::Idle,
            opcode: Opcode::Close,
            masked: false,
            field_left: 0,
            len: 0,
            mask: [0; 4],
            filled: 0,
            buf,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Feeds one received byte through the state machine, invoking `sink`
    /// if this byte completes a frame.
    pub fn feed(
        &mut self,
        byte: u8,
        sink: &mut dyn FrameSink,
    ) -> Result<(), DecodeError> {
        match self.state {
            State::Idle => {
                if let Some(opcode) = plausible_frame_start(byte) {
                    self.opcode = opcode;
                    self.state = State::Header;
                    self.field_left = 0;
                    self.len = 0;
                }
            }
            State::Header => {
                if self.field_left == 0 {
                    self.masked = byte & MASK_BIT != 0;
                    match byte & LENGTH_BITS {
                        126 => self.field_left = 2,
                        127 => self.field_left = 8,
                        short => {
                            self.len = u64::from(short);
                            return self.finish_header(sink);
                        }
                    }
                } else {
                    self.len = self.len << 8 | u64::from(byte);
                    self.field_left -= 1;
                    if self.field_left == 0 {
                        return self.finish_header(sink);
                    }
                }
            }
            State::Mask => {
                self.mask[4 - usize::from(self.field_left)] = byte;
                self.field_left -= 1;
                if self.field_left == 0 {
                    self.begin_data(sink);
                }
            }
            State::Data => {
                self.buf[self.filled] = byte;
                self.filled += 1;
                if self.filled as u64 == self.len {
                    self.deliver(sink);
                }
            }
        }
        Ok(())
    }

    /// Feeds a contiguous chunk, stopping at the first error (the decoder
    /// is idle again at that point and can simply be fed the rest).
    pub fn feed_all(
        &mut self,
        data: &[u8],
        sink: &mut dyn FrameSink,
    ) -> Result<(), DecodeError> {
        for &byte in data {
            self.feed(byte, sink)?;
        }
        Ok(())
    }

    fn finish_header(
        &mut self,
        sink: &mut dyn FrameSink,
    ) -> Result<(), DecodeError> {
        // The length is now fully known; reject before buffering anything.
        if self.len > self.buf.len() as u64 {
            self.state = State::Idle;
            return Err(DecodeError::FrameTooLarge);
        }
        if self.masked {
            self.state = State::Mask;
            self.field_left = 4;
        } else {
            self.begin_data(sink);
        }
        Ok(())
    }

    fn begin_data(&mut self, sink: &mut dyn FrameSink) {
        self.filled = 0;
        if self.len == 0 {
            // Bare control frames carry no payload; complete immediately.
            self.deliver(sink);
        } else {
            self.state = State::Data;
        }
    }

    fn deliver(&mut self, sink: &mut dyn FrameSink) {
        let payload = &mut self.buf[..self.filled];
        if self.masked {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= self.mask[i % 4];
            }
        }
        sink.on_frame(self.opcode, payload);
        self.state = State::Idle;
    }
}

/// Screens a candidate first byte: reserved bits must be clear and the
/// FIN/opcode combination must be one this decoder accepts (continuation
/// frames only without FIN, text/binary only with FIN, control frames
/// either way). Noise bytes that pass this check can still desynchronize
/// the stream; garbage in costs at most a few lost frames, never memory
/// safety.
fn plausible_frame_start(byte: u8) -> Option<Opcode> {
    if byte & RSV_BITS != 0 {
        return None;
    }
    let fin = byte & FIN_BIT != 0;
    let opcode = Opcode::from_u8(byte & OPCODE_BITS)?;
    let ok = match opcode {
        Opcode::Continuation => !fin,
        Opcode::Text | Opcode::Binary => fin,
        _ => true,
    };
    ok.then_some(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out a fixed key, for byte-exact encoder checks.
    struct FixedMask(u32);

    impl MaskSource for FixedMask {
        fn next_mask(&mut self) -> u32 {
            self.0
        }
    }

    /// Sink that copies every delivered frame out.
    #[derive(Default)]
    struct Recorder {
        frames: Vec<(Opcode, Vec<u8>)>,
    }

    impl FrameSink for Recorder {
        fn on_frame(&mut self, opcode: Opcode, payload: &[u8]) {
            self.frames.push((opcode, payload.to_vec()));
        }
    }

    #[test]
    fn encode_short_text_unmasked() {
        let mut dst = [0u8; 16];
        let n = encode(&mut dst, b"Hi", Opcode::Text, None).unwrap();
        assert_eq!(&dst[..n], &[0x81, 0x02, 0x48, 0x69]);
    }

    #[test]
    fn encode_short_text_masked() {
        let mut dst = [0u8; 16];
        let mut mask = FixedMask(0xDEAD_BEEF);
        let n =
            encode(&mut dst, b"Hi", Opcode::Text, Some(&mut mask)).unwrap();
        assert_eq!(
            &dst[..n],
            &[0x81, 0x82, 0xDE, 0xAD, 0xBE, 0xEF, 0x96, 0xC4]
        );
    }

    #[test]
    fn encode_length_field_boundaries() {
        let mut dst = vec![0u8; 80_000];

        let n = encode(&mut dst, &[0; 125], Opcode::Binary, None).unwrap();
        assert_eq!(n, 2 + 125);
        assert_eq!(dst[1], 125);

        let n = encode(&mut dst, &[0; 126], Opcode::Binary, None).unwrap();
        assert_eq!(n, 4 + 126);
        assert_eq!(dst[1], 126);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 126);

        let n = encode(&mut dst, &[0; 0xFFFF], Opcode::Binary, None).unwrap();
        assert_eq!(n, 4 + 0xFFFF);
        assert_eq!(dst[1], 126);

        let n = encode(&mut dst, &[0; 0x10000], Opcode::Binary, None).unwrap();
        assert_eq!(n, 10 + 0x10000);
        assert_eq!(dst[1], 127);
        assert_eq!(&dst[2..6], &[0, 0, 0, 0]);
        assert_eq!(
            u32::from_be_bytes([dst[6], dst[7], dst[8], dst[9]]),
            0x10000
        );
    }

    #[test]
    fn encode_rejects_small_buffers() {
        let mut dst = [0u8; 3];
        assert_eq!(
            encode(&mut dst, b"Hi", Opcode::Text, None),
            Err(EncodeError::BufferTooSmall)
        );
        // Exactly-sized is fine.
        let mut dst = [0u8; 4];
        assert!(encode(&mut dst, b"Hi", Opcode::Text, None).is_ok());
    }

    #[test]
    fn decode_hello_byte_at_a_time() {
        let mut buf = [0u8; 32];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        for byte in [0x81, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F] {
            dec.feed(byte, &mut rec).unwrap();
        }
        assert_eq!(rec.frames.len(), 1);
        assert_eq!(rec.frames[0].0, Opcode::Text);
        assert_eq!(rec.frames[0].1, b"Hello");
    }

    #[test]
    fn decode_unmasks_payload() {
        let mut wire = [0u8; 64];
        let mut mask = FixedMask(0x0102_0304);
        let n = encode(&mut wire, b"masked!", Opcode::Binary, Some(&mut mask))
            .unwrap();

        let mut buf = [0u8; 32];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        dec.feed_all(&wire[..n], &mut rec).unwrap();
        assert_eq!(rec.frames[0].0, Opcode::Binary);
        assert_eq!(rec.frames[0].1, b"masked!");
    }

    #[test]
    fn zero_length_frames_complete() {
        let mut buf = [0u8; 8];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        dec.feed_all(&[0x89, 0x00], &mut rec).unwrap();
        assert_eq!(rec.frames.len(), 1);
        assert_eq!(rec.frames[0].0, Opcode::Ping);
        assert!(rec.frames[0].1.is_empty());
    }

    #[test]
    fn idle_ignores_implausible_bytes() {
        let mut buf = [0u8; 32];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        // Reserved bits set, reserved opcode, text without FIN,
        // continuation with FIN: all rejected in idle.
        dec.feed_all(&[0xF1, 0x83, 0x01, 0x80], &mut rec).unwrap();
        assert!(rec.frames.is_empty());
        // A real frame still decodes afterwards.
        dec.feed_all(&[0x81, 0x01, 0x21], &mut rec).unwrap();
        assert_eq!(rec.frames[0].1, b"!");
    }

    #[test]
    fn continuation_without_fin_is_accepted() {
        let mut buf = [0u8; 8];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        dec.feed_all(&[0x00, 0x02, 0xAA, 0xBB], &mut rec).unwrap();
        assert_eq!(rec.frames[0].0, Opcode::Continuation);
        assert_eq!(rec.frames[0].1, [0xAA, 0xBB]);
    }

    #[test]
    fn oversized_frame_is_dropped() {
        let mut buf = [0u8; 4];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        assert_eq!(
            dec.feed_all(&[0x82, 0x05], &mut rec),
            Err(DecodeError::FrameTooLarge)
        );
        assert!(rec.frames.is_empty());
        // Decoder is idle again; a fitting frame goes through.
        dec.feed_all(&[0x82, 0x03, 1, 2, 3], &mut rec).unwrap();
        assert_eq!(rec.frames[0].1, [1, 2, 3]);
    }

    #[test]
    fn extended_length_decodes() {
        let payload: Vec<u8> = (0..300u16).map(|i| i as u8).collect();
        let mut wire = vec![0u8; 400];
        let n = encode(&mut wire, &payload, Opcode::Binary, None).unwrap();

        let mut buf = [0u8; 512];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        dec.feed_all(&wire[..n], &mut rec).unwrap();
        assert_eq!(rec.frames[0].1, payload);
    }

    #[test]
    fn sixty_four_kib_frame_round_trips() {
        let payload: Vec<u8> = (0..0x10000u32).map(|i| (i * 7) as u8).collect();
        let mut wire = vec![0u8; payload.len() + 14];
        let mut mask = FixedMask(0xA5A5_5A5A);
        let n =
            encode(&mut wire, &payload, Opcode::Binary, Some(&mut mask)).unwrap();

        let mut buf = vec![0u8; payload.len()];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        dec.feed_all(&wire[..n], &mut rec).unwrap();
        assert_eq!(rec.frames.len(), 1);
        assert_eq!(rec.frames[0].1, payload);
    }

    #[test]
    fn frames_arrive_in_order() {
        let mut wire = Vec::new();
        for (op, body) in [
            (Opcode::Text, &b"one"[..]),
            (Opcode::Ping, &b""[..]),
            (Opcode::Binary, &b"two"[..]),
        ] {
            let mut frame = [0u8; 16];
            let n = encode(&mut frame, body, op, None).unwrap();
            wire.extend_from_slice(&frame[..n]);
        }

        let mut buf = [0u8; 16];
        let mut dec = Decoder::new(&mut buf);
        let mut rec = Recorder::default();
        dec.feed_all(&wire, &mut rec).unwrap();
        let got: Vec<_> =
            rec.frames.iter().map(|(op, b)| (*op, b.len())).collect();
        assert_eq!(
            got,
            [(Opcode::Text, 3), (Opcode::Ping, 0), (Opcode::Binary, 3)]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn opcode_strategy() -> impl Strategy<Value = Opcode> {
            prop_oneof![
                Just(Opcode::Text),
                Just(Opcode::Binary),
                Just(Opcode::Close),
                Just(Opcode::Ping),
                Just(Opcode::Pong),
            ]
        }

        proptest! {
            /// decode(encode(p)) == p, masked or not, and a stream fed
            /// byte-by-byte agrees with a bulk feed.
            #[test]
            fn round_trip(
                payload in proptest::collection::vec(any::<u8>(), 0..2048),
                opcode in opcode_strategy(),
                mask_seed in any::<Option<u32>>(),
            ) {
                let mut wire = vec![0u8; payload.len() + 14];
                let mut source = mask_seed.map(XorShift32::new);
                let n = encode(
                    &mut wire,
                    &payload,
                    opcode,
                    source.as_mut().map(|s| s as &mut dyn MaskSource),
                ).unwrap();

                let mut buf = vec![0u8; 2048];
                let mut dec = Decoder::new(&mut buf);
                let mut bulk = Recorder::default();
                dec.feed_all(&wire[..n], &mut bulk).unwrap();

                let mut buf2 = vec![0u8; 2048];
                let mut dec2 = Decoder::new(&mut buf2);
                let mut single = Recorder::default();
                for &byte in &wire[..n] {
                    dec2.feed(byte, &mut single).unwrap();
                }

                prop_assert_eq!(&bulk.frames, &single.frames);
                prop_assert_eq!(bulk.frames.len(), 1);
                prop_assert_eq!(bulk.frames[0].0, opcode);
                prop_assert_eq!(&bulk.frames[0].1, &payload);
            }

            /// Split points in the byte stream never change the decoded
            /// frame sequence.
            #[test]
            fn arbitrary_chunking(
                payloads in proptest::collection::vec(
                    proptest::collection::vec(any::<u8>(), 0..64), 1..5),
                split in any::<prop::sample::Index>(),
            ) {
                let mut wire = Vec::new();
                for p in &payloads {
                    let mut frame = vec![0u8; p.len() + 14];
                    let n = encode(&mut frame, p, Opcode::Binary, None)
                        .unwrap();
                    wire.extend_from_slice(&frame[..n]);
                }

                let mut buf = [0u8; 64];
                let mut dec = Decoder::new(&mut buf);
                let mut rec = Recorder::default();
                let cut = split.index(wire.len().max(1));
                dec.feed_all(&wire[..cut], &mut rec).unwrap();
                dec.feed_all(&wire[cut..], &mut rec).unwrap();

                let got: Vec<_> =
                    rec.frames.iter().map(|(_, b)| b.clone()).collect();
                prop_assert_eq!(got, payloads);
            }
        }
    }
}
