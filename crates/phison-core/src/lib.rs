//! Phison-Core: vendor command protocol for Phison USB flash controllers.
//!
//! This crate talks to Phison controllers through vendor SCSI commands:
//! identity and mode queries, XRAM/IRAM access, NAND block reads, and
//! loading/flashing firmware through the chunked header/body protocol.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command templates, field codec, status codes
//! - **Transport**: SCSI command abstraction (nusb Bulk-Only, mock)
//! - **Mode**: Vendor info parsing and run-mode detection
//! - **Device**: One method per vendor command
//! - **Transfer / Dump**: Chunked image load and firmware dump
//! - **Update**: Burner execution and the firmware update sequence
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use phison_core::{FirmwareUpdater, PhisonDevice, ToolConfig};
//!
//! let transport = ToolConfig::default().open().expect("no device");
//! let mut device = PhisonDevice::new(transport);
//! println!("{}", device.get_info().expect("info failed"));
//!
//! let mut updater = FirmwareUpdater::new(&mut device);
//! updater
//!     .send_firmware_files("fw.bin", Some("burner.bin"))
//!     .expect("update failed");
//! ```

pub mod config;
pub mod device;
pub mod dump;
pub mod error;
pub mod events;
pub mod mode;
pub mod protocol;
pub mod transfer;
pub mod transport;
pub mod update;

// Re-exports for convenience
pub use config::ToolConfig;
pub use device::PhisonDevice;
pub use dump::FIRMWARE_DUMP_SIZE;
pub use error::PhisonError;
pub use events::{LogLevel, NullObserver, PhisonEvent, PhisonObserver, TracingObserver, UpdatePhase};
pub use mode::{DeviceInfo, DeviceMode, VendorInfo};
pub use protocol::{Command, CommandDescriptor, TransferStatus};
pub use transfer::{BodyChunk, ChunkPlan};
pub use transport::{MockTransport, NusbTransport, ScsiTransport, TransportError};
pub use update::{Clock, FirmwareUpdater, ThreadClock};
