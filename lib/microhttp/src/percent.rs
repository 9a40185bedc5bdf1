// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Percent-coding for query strings.
//!
//! Unreserved bytes (`A-Z a-z 0-9 _ - . ~`) pass through, space becomes
//! `+`, everything else becomes `%HH` with uppercase hex. Decoding
//! accepts hex in either case and works on arbitrary byte strings; it is
//! an exact inverse of encoding for any input without NUL restrictions.

use crate::Error;
use core::fmt;
use heapless::Vec;

pub fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(byte, b'_' | b'-' | b'.' | b'~')
}

/// Number of characters [`encode`] will emit for `bytes`.
pub fn encoded_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .map(|&b| if is_unreserved(b) || b == b' ' { 1 } else { 3 })
        .sum()
}

pub fn encode(bytes: &[u8], out: &mut dyn fmt::Write) -> fmt::Result {
    for &byte in bytes {
        if is_unreserved(byte) {
            out.write_char(byte as char)?;
        } else if byte == b' ' {
            out.write_char('+')?;
        } else {
            write!(out, "%{byte:02X}")?;
        }
    }
    Ok(())
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Appends the decoded form of `input` to `out`.
pub fn decode<const N: usize>(
    input: &[u8],
    out: &mut Vec<u8, N>,
) -> Result<(), Error> {
    let mut at = 0;
    while at < input.len() {
        let byte = match input[at] {
            b'+' => b' ',
            b'%' => {
                let hi = *input.get(at + 1).ok_or(Error::Truncated)?;
                let lo = *input.get(at + 2).ok_or(Error::Truncated)?;
                at += 2;
                hex_value(hi).ok_or(Error::Malformed)? << 4
                    | hex_value(lo).ok_or(Error::Malformed)?
            }
            plain => plain,
        };
        out.push(byte).map_err(|_| Error::Truncated)?;
        at += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_string(bytes: &[u8]) -> String {
        let mut s = String::new();
        encode(bytes, &mut s).unwrap();
        s
    }

    fn decode_to_vec(input: &[u8]) -> Result<std::vec::Vec<u8>, Error> {
        let mut out: Vec<u8, 512> = Vec::new();
        decode(input, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn unreserved_passes_through() {
        assert_eq!(encode_to_string(b"AZaz09_-.~"), "AZaz09_-.~");
    }

    #[test]
    fn space_and_reserved_encode() {
        assert_eq!(encode_to_string(b"a b&c=d"), "a+b%26c%3Dd");
        assert_eq!(encode_to_string(&[0x00, 0xFF]), "%00%FF");
    }

    #[test]
    fn decode_accepts_plus_and_both_hex_cases() {
        assert_eq!(decode_to_vec(b"a+b%26c").unwrap(), b"a b&c");
        assert_eq!(decode_to_vec(b"%2f%2F").unwrap(), b"//");
    }

    #[test]
    fn incomplete_escape_is_truncated() {
        assert_eq!(decode_to_vec(b"abc%"), Err(Error::Truncated));
        assert_eq!(decode_to_vec(b"abc%4"), Err(Error::Truncated));
    }

    #[test]
    fn bad_hex_is_malformed() {
        assert_eq!(decode_to_vec(b"%zz"), Err(Error::Malformed));
        assert_eq!(decode_to_vec(b"%4g"), Err(Error::Malformed));
    }

    #[test]
    fn capacity_overflow_is_truncated() {
        let mut out: Vec<u8, 4> = Vec::new();
        assert_eq!(decode(b"hello", &mut out), Err(Error::Truncated));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// decode is the exact inverse of encode for arbitrary bytes.
            #[test]
            fn round_trip(data in proptest::collection::vec(any::<u8>(), 0..128)) {
                let encoded = encode_to_string(&data);
                prop_assert_eq!(encoded.len(), encoded_len(&data));
                let decoded = decode_to_vec(encoded.as_bytes()).unwrap();
                prop_assert_eq!(decoded, data);
            }
        }
    }
}
