// QSA (Queue-based Security Accelerator) Rust Driver Core
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types and hardware status translation.

use thiserror::Error;

/// Errors that can occur during QSA operations.
#[derive(Debug, Error)]
pub enum QsaError {
    /// Key material size is invalid for the selected algorithm.
    #[error("bad key length: {got} bytes")]
    BadKeyLength { got: usize },

    /// Declared buffer length is shorter than the logical span of the job.
    #[error("short buffer: need {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },

    /// Scatter/gather table would exceed the hardware ceiling.
    #[error("too many S/G entries: {needed} > {max}")]
    TooManySegments { needed: usize, max: usize },

    /// Bus mapping or pool allocation failed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// Flow program does not fit the instruction buffer.
    #[error("flow descriptor too large: {words} words > {max}")]
    DescriptorTooLarge { words: usize, max: usize },

    /// Hardware reports congestion; the request was dropped, not queued.
    #[error("hardware congested")]
    Busy,

    /// Queue enqueue kept reporting full past the retry budget.
    #[error("enqueue failed: queue full after retries")]
    EnqueueFailed,

    /// Authentication tag mismatch reported by hardware on decrypt.
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error from system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hardware reported a completion error other than an integrity failure.
    #[error("hardware error: status={status:#010x}")]
    HardwareError { status: u32 },
}

/// Result type alias for QSA operations.
pub type QsaResult<T> = Result<T, QsaError>;

/// Status-word source class (bits 31:28).
pub const STATUS_SRC_MASK: u32 = 0xF000_0000;
/// Source class: cipher/authentication block.
pub const STATUS_SRC_CCB: u32 = 0x2000_0000;
/// CCB error id (bits 3:0).
pub const CCB_ERRID_MASK: u32 = 0x0000_000F;
/// CCB error id for an authentication-tag (ICV) mismatch.
pub const CCB_ERRID_ICV_CHECK: u32 = 0x0000_000A;

/// Translate a raw hardware completion status into the crate taxonomy.
///
/// This is the single point where raw status words are interpreted; no raw
/// code crosses the completion boundary.
pub fn decode_status(status: u32) -> QsaResult<()> {
    if status == 0 {
        return Ok(());
    }
    if (status & STATUS_SRC_MASK) == STATUS_SRC_CCB
        && (status & CCB_ERRID_MASK) == CCB_ERRID_ICV_CHECK
    {
        return Err(QsaError::IntegrityCheckFailed);
    }
    Err(QsaError::HardwareError { status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ok() {
        assert!(decode_status(0).is_ok());
    }

    #[test]
    fn test_decode_icv_failure() {
        let status = STATUS_SRC_CCB | CCB_ERRID_ICV_CHECK;
        assert!(matches!(
            decode_status(status),
            Err(QsaError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_decode_other_hw_error() {
        assert!(matches!(
            decode_status(STATUS_SRC_CCB | 0x3),
            Err(QsaError::HardwareError { .. })
        ));
        assert!(matches!(
            decode_status(0x4000_000A),
            Err(QsaError::HardwareError { .. })
        ));
    }
}
