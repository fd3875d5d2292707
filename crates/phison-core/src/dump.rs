//! Firmware dump in the layout consumed by the Phison MP tools.
//!
//! The layout matches one known firmware revision (base + 11 sections) and
//! is not queried from the device:
//!
//! ```text
//! 0x00000  header block   (magic "BtPramCd" ...)
//! 0x00200  base           0x6000
//! 0x06200  11 sections    11 * 0x4000
//! 0x32200  footer block   (magic "this is mp mark" ...)
//! 0x32400  end
//! ```

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::device::PhisonDevice;
use crate::error::Result;
use crate::protocol::codec::insert;
use crate::protocol::constants::{BLOCK_SHIFT, BLOCK_SIZE, MAX_CHUNK_SIZE};
use crate::transport::ScsiTransport;

pub const DUMP_HEADER_SIZE: usize = 0x200;
pub const DUMP_BASE_SIZE: usize = 0x6000;
pub const DUMP_SECTION_SIZE: usize = 0x4000;
pub const DUMP_SECTION_COUNT: usize = 11;
pub const DUMP_FOOTER_SIZE: usize = 0x200;

/// Body bytes read from the device.
pub const DUMP_BODY_SIZE: usize = DUMP_BASE_SIZE + DUMP_SECTION_COUNT * DUMP_SECTION_SIZE;

pub const FIRMWARE_DUMP_SIZE: usize = DUMP_HEADER_SIZE + DUMP_BODY_SIZE + DUMP_FOOTER_SIZE;
const _: () = assert!(FIRMWARE_DUMP_SIZE == 0x32400);

/// Offset of the footer block.
pub const DUMP_FOOTER_OFFSET: usize = FIRMWARE_DUMP_SIZE - DUMP_FOOTER_SIZE;

pub const DUMP_HEADER_MAGIC: [u8; 20] = [
    0x42, 0x74, 0x50, 0x72, 0x61, 0x6D, 0x43, 0x64, // "BtPramCd"
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x14, 0x10, 0x0B, 0x18,
];

pub const DUMP_FOOTER_MAGIC: [u8; 24] = [
    0x74, 0x68, 0x69, 0x73, 0x20, 0x69, 0x73, 0x20, // "this is "
    0x6D, 0x70, 0x20, 0x6D, 0x61, 0x72, 0x6B, 0x00, // "mp mark\0"
    0x03, 0x01, 0x00, 0x10, 0x01, 0x04, 0x10, 0x42,
];

/// Blocks per READ_BODY in the dump loop.
const DUMP_STRIDE_BLOCKS: usize = MAX_CHUNK_SIZE >> BLOCK_SHIFT;

impl<T: ScsiTransport> PhisonDevice<T> {
    /// Read the firmware body and wrap it in the dump header and footer.
    #[instrument(skip(self))]
    pub fn dump_firmware(&mut self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; FIRMWARE_DUMP_SIZE];
        insert(&mut data, 0, &DUMP_HEADER_MAGIC)?;

        let mut block = 0usize;
        while (block << BLOCK_SHIFT) < DUMP_BODY_SIZE {
            let len = MAX_CHUNK_SIZE.min(DUMP_BODY_SIZE - (block << BLOCK_SHIFT));
            let count = len >> BLOCK_SHIFT;
            debug!(
                block = %format!("{:04X}", block),
                count,
                "Reading firmware body"
            );
            // Both fit: the body is far below 0x10000 blocks
            let chunk = self.read_nand(block as u16, count as u16)?;
            insert(&mut data, DUMP_HEADER_SIZE + block * BLOCK_SIZE, &chunk)?;
            block += DUMP_STRIDE_BLOCKS;
        }

        insert(&mut data, DUMP_FOOTER_OFFSET, &DUMP_FOOTER_MAGIC)?;
        Ok(data)
    }

    /// Dump the firmware into a file.
    pub fn dump_firmware_to<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let data = self.dump_firmware()?;
        std::fs::write(path.as_ref(), &data)?;
        info!(path = %path.as_ref().display(), bytes = data.len(), "Firmware dump written");
        Ok(())
    }
}
