//! Save state error types.

use thiserror::Error;

/// Save state operation error
#[derive(Debug, Error)]
pub enum SaveStateError {
    /// Invalid magic bytes (expected 'RNES')
    #[error("Invalid magic bytes (expected 'RNES')")]
    InvalidMagic,

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {CURRENT_VERSION})")]
    UnsupportedVersion(u32),

    /// ROM mismatch (save state doesn't match current ROM)
    #[error("ROM mismatch: expected {expected:x?}, got {actual:x?}")]
    RomMismatch {
        /// Expected ROM hash (MD5 of the loaded ROM image)
        expected: [u8; 16],
        /// Actual ROM hash
        actual: [u8; 16],
    },

    /// Mapper number recorded in the save state doesn't match the running cartridge.
    #[error("mapper mismatch: save state is for mapper {expected}, loaded cartridge is mapper {actual}")]
    MapperMismatch {
        /// Mapper number recorded in the save state.
        expected: u16,
        /// Mapper number of the currently loaded cartridge.
        actual: u16,
    },

    /// Mapper-specific banking state failed to decode.
    #[error("mapper state decode failed")]
    MapperState,

    /// The bincode-encoded state body failed to decode.
    #[error("state body decode failed: {0}")]
    Decode(String),

    /// The component snapshot failed to encode to bincode.
    #[error("state body encode failed: {0}")]
    Encode(String),

    /// Checksum mismatch (data corruption)
    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum
        expected: u32,
        /// Actual checksum
        actual: u32,
    },

    /// Insufficient data
    #[error("Insufficient data: need {needed} bytes, got {available}")]
    InsufficientData {
        /// Bytes needed
        needed: usize,
        /// Bytes available
        available: usize,
    },
}

const CURRENT_VERSION: u32 = super::SAVE_STATE_VERSION;
