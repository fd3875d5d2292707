//! SCSI transport layer abstraction.
//!
//! Defines the `ScsiTransport` trait for issuing command blocks,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Invalid command block length: {0}")]
    InvalidCommandLength(usize),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Invalid status wrapper: {0}")]
    InvalidStatus(String),

    #[error("Command failed with status {status}")]
    CommandFailed { status: u8 },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device disconnected")]
    Disconnected,

    #[error("No response queued for {0}")]
    NoResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract SCSI command transport.
///
/// One call is one command: the command block goes out, then either
/// `data_out` is sent or up to `response_len` bytes are read back.
pub trait ScsiTransport: Send + Sync {
    fn execute(
        &self,
        command: &[u8],
        data_out: Option<&[u8]>,
        response_len: usize,
    ) -> Result<Vec<u8>, TransportError>;
}

impl<T: ScsiTransport + ?Sized> ScsiTransport for &T {
    fn execute(
        &self,
        command: &[u8],
        data_out: Option<&[u8]>,
        response_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).execute(command, data_out, response_len)
    }
}

impl<T: ScsiTransport + ?Sized> ScsiTransport for Box<T> {
    fn execute(
        &self,
        command: &[u8],
        data_out: Option<&[u8]>,
        response_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).execute(command, data_out, response_len)
    }
}
