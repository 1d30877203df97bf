//! Save state system for `RustyNES`.
//!
//! A save state is an opaque binary blob produced at CPU-instruction
//! boundaries. The host owns file I/O (and any compression) entirely;
//! this module only frames and validates the blob `Console` hands it.
//!
//! # Format
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │ Magic: b"RNES"            (4 bytes)    │
//! │ Version: u32                           │
//! │ ROM hash (MD5): [u8; 16]               │
//! │ Frame count: u64                       │
//! │ Checksum (CRC32 of body): u32          │
//! │ Body length: u32                       │
//! ├───────────────────────────────────────┤
//! │ Body: bincode-encoded `ConsoleSnapshot` │
//! └───────────────────────────────────────┘
//! ```
//!
//! Every component snapshot (CPU, PPU, APU, bus, mapper) is a primitive
//! field list in a fixed order, matching the save-state contract the
//! rest of the engine is specified against. The version field exists so
//! a future layout change can refuse to load an incompatible blob rather
//! than silently misinterpreting it.

pub mod error;

pub use error::SaveStateError;

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crc::{Crc, CRC_32_ISO_HDLC};

/// Save state format version.
pub const SAVE_STATE_VERSION: u32 = 1;

/// Magic bytes identifying a `RustyNES` save state.
pub const SAVE_STATE_MAGIC: &[u8; 4] = b"RNES";

const HEADER_LEN: usize = 4 + 4 + 16 + 8 + 4 + 4;

/// CRC-32 (IEEE 802.3), used only for save-state corruption checks.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Wrap a bincode-encoded component snapshot in the versioned save-state header.
#[must_use]
pub fn encode(rom_hash: [u8; 16], frame_count: u64, body: &[u8]) -> Vec<u8> {
    let checksum = CRC32.checksum(body);
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(SAVE_STATE_MAGIC);
    out.extend_from_slice(&SAVE_STATE_VERSION.to_le_bytes());
    out.extend_from_slice(&rom_hash);
    out.extend_from_slice(&frame_count.to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Header fields recovered by [`decode`], plus the remaining body slice.
pub struct DecodedHeader<'a> {
    /// ROM hash (MD5) recorded at save time.
    pub rom_hash: [u8; 16],
    /// Frame count at save time.
    pub frame_count: u64,
    /// The bincode-encoded component snapshot body.
    pub body: &'a [u8],
}

/// Validate and strip the save-state header, returning the body slice.
///
/// # Errors
///
/// Returns [`SaveStateError`] if the magic, version, length, or checksum
/// don't match what a blob produced by [`encode`] would contain.
pub fn decode(data: &[u8]) -> Result<DecodedHeader<'_>, SaveStateError> {
    if data.len() < HEADER_LEN {
        return Err(SaveStateError::InsufficientData {
            needed: HEADER_LEN,
            available: data.len(),
        });
    }
    let (magic, rest) = data.split_at(4);
    if magic != SAVE_STATE_MAGIC {
        return Err(SaveStateError::InvalidMagic);
    }
    let (version_bytes, rest) = rest.split_at(4);
    let version = u32::from_le_bytes(version_bytes.try_into().unwrap());
    if version != SAVE_STATE_VERSION {
        return Err(SaveStateError::UnsupportedVersion(version));
    }
    let (rom_hash_bytes, rest) = rest.split_at(16);
    let rom_hash: [u8; 16] = rom_hash_bytes.try_into().unwrap();
    let (frame_count_bytes, rest) = rest.split_at(8);
    let frame_count = u64::from_le_bytes(frame_count_bytes.try_into().unwrap());
    let (checksum_bytes, rest) = rest.split_at(4);
    let expected_checksum = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
    let (body_len_bytes, rest) = rest.split_at(4);
    let body_len = u32::from_le_bytes(body_len_bytes.try_into().unwrap()) as usize;

    if rest.len() < body_len {
        return Err(SaveStateError::InsufficientData {
            needed: body_len,
            available: rest.len(),
        });
    }
    let body = &rest[..body_len];
    let actual_checksum = CRC32.checksum(body);
    if actual_checksum != expected_checksum {
        return Err(SaveStateError::ChecksumMismatch {
            expected: expected_checksum,
            actual: actual_checksum,
        });
    }

    Ok(DecodedHeader {
        rom_hash,
        frame_count,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let body = b"pretend-bincode-body".to_vec();
        let blob = encode([0x42; 16], 1234, &body);
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.rom_hash, [0x42; 16]);
        assert_eq!(decoded.frame_count, 1234);
        assert_eq!(decoded.body, body.as_slice());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = encode([0; 16], 0, b"x");
        blob[0] = b'X';
        assert!(matches!(decode(&blob), Err(SaveStateError::InvalidMagic)));
    }

    #[test]
    fn rejects_corrupted_body() {
        let mut blob = encode([0; 16], 0, b"hello");
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(
            decode(&blob),
            Err(SaveStateError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_truncated_data() {
        let blob = encode([0; 16], 0, b"hello");
        assert!(matches!(
            decode(&blob[..HEADER_LEN - 1]),
            Err(SaveStateError::InsufficientData { .. })
        ));
    }
}
