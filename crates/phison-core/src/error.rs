//! Error type for device and orchestration operations.

use thiserror::Error;

use crate::mode::DeviceMode;
use crate::protocol::CodecError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum PhisonError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Header not accepted (status 0x{status:02X})")]
    HeaderRejected { status: u8 },

    #[error("Body not accepted at block 0x{block:04X} (status 0x{status:02X})")]
    BodyRejected { status: u8, block: u16 },

    #[error("Burner image required (device is in {mode} mode)")]
    BurnerImageRequired { mode: DeviceMode },

    #[error("{command} returned {actual} bytes, expected at least {expected}")]
    ResponseTooShort {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Image too small: {actual} bytes, minimum {minimum}")]
    ImageTooSmall { actual: usize, minimum: usize },

    #[error("Block address 0x{block:X} does not fit a 16-bit field")]
    BlockOverflow { block: usize },

    #[error("Password too long: {len} bytes, maximum {max}")]
    PasswordTooLong { len: usize, max: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PhisonError>;
