//! Vendor command descriptors.
//!
//! Every descriptor is an immutable byte template plus the number of bytes
//! the device returns. Parameterized commands are produced with
//! [`CommandDescriptor::build`], which patches a fresh copy of the template;
//! the registry entries themselves are `const` and never change.

use std::fmt;

use super::codec::{self, CodecError};
use super::constants::{BLOCK_SIZE, FIRMWARE_UPDATE_RESPONSE_SIZE, STATUS_SIZE, VENDOR_INFO_SIZE};

/// A positional field overwritten in a template before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Big-endian 16-bit value.
    Word { offset: usize, value: u16 },
    /// Single byte.
    Byte { offset: usize, value: u8 },
}

/// Immutable command template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub template: &'static [u8],
    /// Expected inbound length (0 if the command returns no data).
    pub response_len: usize,
}

impl CommandDescriptor {
    pub const fn new(name: &'static str, template: &'static [u8], response_len: usize) -> Self {
        Self {
            name,
            template,
            response_len,
        }
    }

    /// Copy the template and patch `fields` into the copy.
    pub fn build(&self, fields: &[Field]) -> Result<Command, CodecError> {
        let mut bytes = self.template.to_vec();
        for field in fields {
            match *field {
                Field::Word { offset, value } => codec::write_be16(&mut bytes, offset, value)?,
                Field::Byte { offset, value } => codec::write_u8(&mut bytes, offset, value)?,
            }
        }
        Ok(Command {
            name: self.name,
            bytes,
            response_len: self.response_len,
        })
    }

    /// The template as-is, for commands without fields.
    pub fn command(&self) -> Command {
        Command {
            name: self.name,
            bytes: self.template.to_vec(),
            response_len: self.response_len,
        }
    }
}

/// A concrete command ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub bytes: Vec<u8>,
    pub response_len: usize,
}

impl Command {
    pub fn with_response_len(mut self, response_len: usize) -> Self {
        self.response_len = response_len;
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, "] -> {}", self.response_len)
    }
}

// ============================================================================
// Field Offsets
// ============================================================================

/// Selector byte of LOAD_HEADER / LOAD_BODY.
pub const SELECTOR_OFFSET: usize = 2;
/// Block address word of LOAD_BODY / READ_BODY.
pub const BLOCK_ADDRESS_OFFSET: usize = 3;
/// Block count word of LOAD_BODY / READ_BODY.
pub const BLOCK_COUNT_OFFSET: usize = 7;
/// Address of READ_XRAM / WRITE_XRAM / READ_IRAM / WRITE_IRAM.
pub const RAM_ADDRESS_OFFSET: usize = 2;
/// Value byte of WRITE_XRAM.
pub const XRAM_VALUE_OFFSET: usize = 4;
/// Value byte of WRITE_IRAM.
pub const IRAM_VALUE_OFFSET: usize = 3;
/// Address word of READ_MEMORY.
pub const MEMORY_READ_ADDRESS_OFFSET: usize = 4;
/// Address word of WRITE_MEMORY.
pub const MEMORY_WRITE_ADDRESS_OFFSET: usize = 6;
/// Value byte of WRITE_MEMORY.
pub const MEMORY_WRITE_VALUE_OFFSET: usize = 8;
/// Selector pair of FIRMWARE_UPDATE.
pub const FW_UPDATE_FIRST_OFFSET: usize = 2;
pub const FW_UPDATE_SECOND_OFFSET: usize = 3;

// ============================================================================
// Registry
// ============================================================================

pub const GET_VENDOR_INFO: CommandDescriptor = CommandDescriptor::new(
    "GET_VENDOR_INFO",
    &[0x06, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01],
    VENDOR_INFO_SIZE,
);

pub const GET_CHIP_ID: CommandDescriptor = CommandDescriptor::new(
    "GET_CHIP_ID",
    &[
        0x06, 0x56, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
    BLOCK_SIZE,
);

/// Standard SCSI READ CAPACITY, reports the last LBA.
pub const GET_NUM_LBAS: CommandDescriptor = CommandDescriptor::new(
    "GET_NUM_LBAS",
    &[
        0x25, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
    8,
);

pub const JUMP_TO_PRAM: CommandDescriptor = CommandDescriptor::new(
    "JUMP_TO_PRAM",
    &[
        0x06, 0xB3, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

pub const JUMP_TO_BOOTMODE: CommandDescriptor = CommandDescriptor::new(
    "JUMP_TO_BOOTMODE",
    &[
        0x06, 0xBF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

/// CBWCB: 06 B1 sel 00 00 00 00 00 01, DATA OUT: header[512]
pub const LOAD_HEADER: CommandDescriptor = CommandDescriptor::new(
    "LOAD_HEADER",
    &[
        0x06, 0xB1, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

/// CBWCB: 06 B1 sel block_h block_l 00 00 count_h count_l, DATA OUT: data[count*512]
pub const LOAD_BODY: CommandDescriptor = CommandDescriptor::new(
    "LOAD_BODY",
    &[
        0x06, 0xB1, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

/// Status[0] is 0x55 after a header load, 0xA5 after a body load.
pub const GET_STATUS: CommandDescriptor = CommandDescriptor::new(
    "GET_STATUS",
    &[
        0x06, 0xB0, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    STATUS_SIZE,
);

/// CBWCB: 06 05 'R' 'A' addr_h addr_l, DATA IN: xdata[512], junk[16]
pub const READ_MEMORY: CommandDescriptor = CommandDescriptor::new(
    "READ_MEMORY",
    &[
        0x06, 0x05, 0x52, 0x41, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    VENDOR_INFO_SIZE,
);

/// CBWCB: 06 0C 00 'P' 'h' 'I' addr_h addr_l data
pub const WRITE_MEMORY: CommandDescriptor = CommandDescriptor::new(
    "WRITE_MEMORY",
    &[
        0x06, 0x0C, 0x00, 0x50, 0x68, 0x49, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

/// CBWCB: 06 B2 10 block_h block_l 00 00 count_h count_l, DATA IN: data[count*512]
///
/// The response length depends on the count and is set per call.
pub const READ_BODY: CommandDescriptor = CommandDescriptor::new(
    "READ_BODY",
    &[
        0x06, 0xB2, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

pub const SEND_PASSWORD: CommandDescriptor = CommandDescriptor::new(
    "SEND_PASSWORD",
    &[
        0x0E, 0x00, 0x01, 0x55, 0xAA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    0,
);

pub const FIRMWARE_UPDATE: CommandDescriptor = CommandDescriptor::new(
    "FIRMWARE_UPDATE",
    &[0x06, 0xEE, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    FIRMWARE_UPDATE_RESPONSE_SIZE,
);

pub const READ_XRAM: CommandDescriptor = CommandDescriptor::new(
    "READ_XRAM",
    &[
        0x06, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ],
    1,
);

pub const WRITE_XRAM: CommandDescriptor = CommandDescriptor::new(
    "WRITE_XRAM",
    &[0x06, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00],
    1,
);

pub const READ_IRAM: CommandDescriptor =
    CommandDescriptor::new("READ_IRAM", &[0x06, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00], 1);

pub const WRITE_IRAM: CommandDescriptor =
    CommandDescriptor::new("WRITE_IRAM", &[0x06, 0x09, 0x00, 0x00, 0x00, 0x00], 1);

// ============================================================================
// Typed Builders
// ============================================================================

pub fn load_header(selector: u8) -> Result<Command, CodecError> {
    LOAD_HEADER.build(&[Field::Byte {
        offset: SELECTOR_OFFSET,
        value: selector,
    }])
}

pub fn load_body(selector: u8, block: u16, count: u16) -> Result<Command, CodecError> {
    LOAD_BODY.build(&[
        Field::Byte {
            offset: SELECTOR_OFFSET,
            value: selector,
        },
        Field::Word {
            offset: BLOCK_ADDRESS_OFFSET,
            value: block,
        },
        Field::Word {
            offset: BLOCK_COUNT_OFFSET,
            value: count,
        },
    ])
}

pub fn read_body(block: u16, count: u16) -> Result<Command, CodecError> {
    let cmd = READ_BODY.build(&[
        Field::Word {
            offset: BLOCK_ADDRESS_OFFSET,
            value: block,
        },
        Field::Word {
            offset: BLOCK_COUNT_OFFSET,
            value: count,
        },
    ])?;
    Ok(cmd.with_response_len(count as usize * BLOCK_SIZE))
}

pub fn read_xram(address: u16) -> Result<Command, CodecError> {
    READ_XRAM.build(&[Field::Word {
        offset: RAM_ADDRESS_OFFSET,
        value: address,
    }])
}

pub fn write_xram(address: u16, value: u8) -> Result<Command, CodecError> {
    WRITE_XRAM.build(&[
        Field::Word {
            offset: RAM_ADDRESS_OFFSET,
            value: address,
        },
        Field::Byte {
            offset: XRAM_VALUE_OFFSET,
            value,
        },
    ])
}

pub fn read_iram(address: u8) -> Result<Command, CodecError> {
    READ_IRAM.build(&[Field::Byte {
        offset: RAM_ADDRESS_OFFSET,
        value: address,
    }])
}

pub fn write_iram(address: u8, value: u8) -> Result<Command, CodecError> {
    WRITE_IRAM.build(&[
        Field::Byte {
            offset: RAM_ADDRESS_OFFSET,
            value: address,
        },
        Field::Byte {
            offset: IRAM_VALUE_OFFSET,
            value,
        },
    ])
}

pub fn read_memory(address: u16) -> Result<Command, CodecError> {
    READ_MEMORY.build(&[Field::Word {
        offset: MEMORY_READ_ADDRESS_OFFSET,
        value: address,
    }])
}

pub fn write_memory(address: u16, value: u8) -> Result<Command, CodecError> {
    WRITE_MEMORY.build(&[
        Field::Word {
            offset: MEMORY_WRITE_ADDRESS_OFFSET,
            value: address,
        },
        Field::Byte {
            offset: MEMORY_WRITE_VALUE_OFFSET,
            value,
        },
    ])
}

pub fn firmware_update(first: u8, second: u8) -> Result<Command, CodecError> {
    FIRMWARE_UPDATE.build(&[
        Field::Byte {
            offset: FW_UPDATE_FIRST_OFFSET,
            value: first,
        },
        Field::Byte {
            offset: FW_UPDATE_SECOND_OFFSET,
            value: second,
        },
    ])
}
