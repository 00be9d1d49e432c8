//! Zero-width steganographic codec
//!
//! Bytes are expanded MSB-first into bits and each bit is written as one of
//! two invisible code points. Decoding scans arbitrary carrier text, keeps
//! only those two code points and regroups complete octets, so the encoded
//! run survives being appended to or interleaved with visible content.

use crate::fingerprint::{Fingerprint, FINGERPRINT_LEN};

/// Marker for a 0 bit (ZERO WIDTH SPACE).
pub const ZERO_MARKER: char = '\u{200B}';
/// Marker for a 1 bit (ZERO WIDTH NON-JOINER).
pub const ONE_MARKER: char = '\u{200C}';

/// True for either of the two channel code points.
pub fn is_marker(c: char) -> bool {
    c == ZERO_MARKER || c == ONE_MARKER
}

/// Encode `data` as a run of invisible marker characters (8 per byte).
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 8 * ZERO_MARKER.len_utf8());
    for byte in data {
        for shift in (0..8).rev() {
            out.push(if (byte >> shift) & 1 == 1 { ONE_MARKER } else { ZERO_MARKER });
        }
    }
    out
}

/// Decode every complete octet carried by `text`. Trailing bits that do not
/// form a full byte are dropped.
pub fn decode(text: &str) -> Vec<u8> {
    OctetReader::new(text).collect()
}

/// Number of marker characters that carry one fingerprint literal.
pub const FINGERPRINT_MARKERS: usize = FINGERPRINT_LEN * 8;

/// Recover a fingerprint literal from the marker run in `text`.
///
/// The channel is appended after the body, so 512-marker windows are tried
/// from the end backwards and the first one that decodes to a valid literal
/// wins. Stray markers already present in the body (a ZWNJ in Persian text,
/// a ZWSP in pasted web copy) therefore never shift the channel.
///
/// Returns `None` when fewer markers than one literal needs are present,
/// and `Some(Err(raw))` carrying the trailing window when no window decodes
/// to a valid literal.
pub fn decode_fingerprint(text: &str) -> Option<Result<Fingerprint, String>> {
    let markers: Vec<char> = text.chars().filter(|&c| is_marker(c)).collect();
    if markers.len() < FINGERPRINT_MARKERS {
        return None;
    }

    let mut trailing = None;
    for start in (0..=markers.len() - FINGERPRINT_MARKERS).rev() {
        let bytes = pack(&markers[start..start + FINGERPRINT_MARKERS]);
        let literal = String::from_utf8_lossy(&bytes);
        if let Ok(fingerprint) = Fingerprint::parse(&literal) {
            return Some(Ok(fingerprint));
        }
        if trailing.is_none() {
            trailing = Some(literal.into_owned());
        }
    }
    trailing.map(Err)
}

/// Regroup a slice of markers (a multiple of 8 long) into bytes.
fn pack(markers: &[char]) -> Vec<u8> {
    markers
        .chunks_exact(8)
        .map(|bits| {
            bits.iter()
                .fold(0u8, |byte, &c| (byte << 1) | u8::from(c == ONE_MARKER))
        })
        .collect()
}

/// Count marker characters in `text`.
pub fn marker_count(text: &str) -> usize {
    text.chars().filter(|&c| is_marker(c)).count()
}

/// Remove every marker character from `text`.
pub fn strip(text: &str) -> String {
    text.chars().filter(|&c| !is_marker(c)).collect()
}

/// Lazily regroups marker bits into bytes.
struct OctetReader<'a> {
    chars: std::str::Chars<'a>,
}

impl<'a> OctetReader<'a> {
    fn new(text: &'a str) -> Self {
        Self { chars: text.chars() }
    }
}

impl Iterator for OctetReader<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let mut byte = 0u8;
        let mut bits = 0;
        while bits < 8 {
            match self.chars.next()? {
                ZERO_MARKER => byte <<= 1,
                ONE_MARKER => byte = (byte << 1) | 1,
                _ => continue,
            }
            bits += 1;
        }
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_bit_layout() {
        // 'A' = 0b0100_0001
        let encoded = encode(b"A");
        let expected: String = [0, 1, 0, 0, 0, 0, 0, 1]
            .iter()
            .map(|&b| if b == 1 { ONE_MARKER } else { ZERO_MARKER })
            .collect();
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_decode_ignores_carrier_text() {
        let encoded: Vec<char> = encode(b"hi").chars().collect();
        let mut carrier = String::from("<p>Privacy policy</p>");
        for (i, c) in encoded.iter().enumerate() {
            carrier.push(*c);
            if i % 3 == 0 {
                carrier.push_str(" visible ");
            }
        }
        carrier.push('\u{200D}');
        assert_eq!(decode(&carrier), b"hi");
    }

    #[test]
    fn test_partial_trailing_bits_dropped() {
        let mut encoded = encode(b"ok");
        encoded.push(ONE_MARKER);
        encoded.push(ZERO_MARKER);
        assert_eq!(decode(&encoded), b"ok");
    }

    #[test]
    fn test_decode_fingerprint_skips_trailing_markers() {
        let fp = "ab".repeat(32);
        let mut text = encode(fp.as_bytes());
        text.push_str(&encode(b"trailing garbage"));
        let decoded = decode_fingerprint(&text).unwrap().unwrap();
        assert_eq!(decoded.as_str(), fp);
    }

    #[test]
    fn test_decode_fingerprint_absent_and_malformed() {
        assert!(decode_fingerprint("plain text").is_none());
        // Too few markers to carry a literal is absence, not corruption
        let short = encode(b"deadbeef");
        assert!(decode_fingerprint(&short).is_none());
        let junk = encode(&[b'Z'; 64]);
        assert!(matches!(decode_fingerprint(&junk), Some(Err(_))));
    }

    #[test]
    fn test_decode_fingerprint_ignores_stray_markers_in_body() {
        let fp = "0123456789abcdef".repeat(4);
        // Persian text with a ZWNJ, plus a ZWSP from pasted web copy
        let mut text = String::from("<p>\u{645}\u{6cc}\u{200C}\u{62e}\u{648}\u{627}\u{647}\u{645} personal data\u{200B}</p>");
        text.push_str(&encode(fp.as_bytes()));
        let decoded = decode_fingerprint(&text).unwrap().unwrap();
        assert_eq!(decoded.as_str(), fp);
    }

    #[test]
    fn test_decode_fingerprint_with_many_stray_markers_only() {
        // Unwatermarked text full of joiners is not a malformed channel
        let text = "a\u{200C}b\u{200B}".repeat(40);
        assert!(decode_fingerprint(&text).is_none());
    }

    #[test]
    fn test_strip_and_count() {
        let text = format!("abc{}def", encode(b"x"));
        assert_eq!(marker_count(&text), 8);
        assert_eq!(strip(&text), "abcdef");
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(decode(&encode(&data)), data);
        }
    }
}
