//! Protocol constants for the Phison vendor command set.
//!
//! Collected from observed traffic of the Phison recovery tools. Most
//! vendor commands use opcode 0x06 followed by a sub-command byte.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Phison Electronics Vendor ID
pub const PHISON_VENDOR_ID: u16 = 0x13FE;

// ============================================================================
// Size Constants
// ============================================================================

/// Block size used for NAND/firmware addresses and counts.
pub const BLOCK_SIZE: usize = 0x200;

/// log2(BLOCK_SIZE), for byte <-> block conversion.
pub const BLOCK_SHIFT: u32 = 9;

/// Size of the vendor info response (512 bytes + 16 bytes of trailer).
pub const VENDOR_INFO_SIZE: usize = 512 + 16;

/// Size of a transfer status response.
pub const STATUS_SIZE: usize = 8;

/// Size of the firmware-update control response.
pub const FIRMWARE_UPDATE_RESPONSE_SIZE: usize = 64 + 8;

/// Largest body chunk sent in one LOAD_BODY command (64 blocks).
pub const MAX_CHUNK_SIZE: usize = 0x8000;

/// Bytes excluded from the body length of a transferred image
/// (512 byte header + 512 byte footer).
pub const TRANSFER_RESERVED: usize = 0x400;

/// Image offset of the first body byte.
pub const BODY_OFFSET: usize = BLOCK_SIZE;

/// Number of XRAM cells covered by `dump_xram` (0xF000 and up are function registers).
pub const XRAM_DUMP_SIZE: usize = 0xF000;

/// Offset of the password inside the 512-byte password buffer.
pub const PASSWORD_OFFSET: usize = 0x10;

// ============================================================================
// Transfer Status Codes (Device -> Host)
// ============================================================================

/// Status byte after an accepted header stage.
pub const STATUS_HEADER_ACCEPTED: u8 = 0x55;

/// Status byte after an accepted body stage.
pub const STATUS_BODY_ACCEPTED: u8 = 0xA5;

// ============================================================================
// Transfer Selectors
// ============================================================================

/// Header selector used when loading an executable image into PRAM.
pub const DEFAULT_HEADER_SELECTOR: u8 = 0x03;

/// Body selector used when loading an executable image into PRAM.
pub const DEFAULT_BODY_SELECTOR: u8 = 0x02;

/// Header selector of the first firmware install stage.
pub const FIRMWARE_HEADER_SELECTOR: u8 = 0x01;

/// Body selector of the first firmware install stage.
pub const FIRMWARE_BODY_SELECTOR: u8 = 0x00;

// ============================================================================
// Vendor Info Layout
// ============================================================================

/// Firmware version triplet (major, minor, patch).
pub const VI_FIRMWARE_VERSION: usize = 0x94;

/// 8-byte mode tag.
pub const VI_MODE_TAG: usize = 0xA0;
pub const VI_MODE_TAG_LEN: usize = 8;

/// "VR" marker gating the chip type and mode fields.
pub const VI_VR_MARKER: usize = 0x17A;

/// Chip type word (big-endian).
pub const VI_CHIP_TYPE: usize = 0x17E;

/// Number of chip id bytes reported.
pub const CHIP_ID_LEN: usize = 6;

// ============================================================================
// Timing
// ============================================================================

/// Wait after any command that resets or re-initializes the controller.
pub const SETTLE_DELAY: Duration = Duration::from_millis(2000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_shift_matches_block_size() {
        assert_eq!(1usize << BLOCK_SHIFT, BLOCK_SIZE);
        assert_eq!(MAX_CHUNK_SIZE >> BLOCK_SHIFT, 0x40);
    }
}
