//! Transfer status parsing.
//!
//! GET_STATUS returns 8 bytes; only byte 0 carries meaning for the
//! header/body load handshake.

use std::fmt;

use super::constants::{STATUS_BODY_ACCEPTED, STATUS_HEADER_ACCEPTED};

/// Parsed GET_STATUS response.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    raw: [u8; 8],
}

impl TransferStatus {
    /// Parse a status response. Returns `None` for an empty response;
    /// missing trailing bytes read as zero.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let mut raw = [0u8; 8];
        let n = bytes.len().min(8);
        raw[..n].copy_from_slice(&bytes[..n]);
        Some(Self { raw })
    }

    /// Status code (byte 0).
    pub fn code(&self) -> u8 {
        self.raw[0]
    }

    pub fn raw(&self) -> &[u8; 8] {
        &self.raw
    }

    pub fn is_header_accepted(&self) -> bool {
        self.code() == STATUS_HEADER_ACCEPTED
    }

    pub fn is_body_accepted(&self) -> bool {
        self.code() == STATUS_BODY_ACCEPTED
    }
}

impl fmt::Debug for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferStatus({:02X?})", self.raw)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.code())
    }
}
