//! Big-endian field helpers for command templates and responses.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("Field at offset {offset} (width {width}) exceeds buffer of {len} bytes")]
    OffsetOutOfRange {
        offset: usize,
        width: usize,
        len: usize,
    },
}

fn check(buf_len: usize, offset: usize, width: usize) -> Result<(), CodecError> {
    match offset.checked_add(width) {
        Some(end) if end <= buf_len => Ok(()),
        _ => Err(CodecError::OffsetOutOfRange {
            offset,
            width,
            len: buf_len,
        }),
    }
}

/// Read a big-endian 16-bit word.
pub fn read_be16(buf: &[u8], offset: usize) -> Option<u16> {
    check(buf.len(), offset, 2).ok()?;
    Some(BigEndian::read_u16(&buf[offset..]))
}

/// Read a big-endian 32-bit word.
pub fn read_be32(buf: &[u8], offset: usize) -> Option<u32> {
    check(buf.len(), offset, 4).ok()?;
    Some(BigEndian::read_u32(&buf[offset..]))
}

/// Write `value` as high byte at `offset`, low byte at `offset + 1`.
pub fn write_be16(buf: &mut [u8], offset: usize, value: u16) -> Result<(), CodecError> {
    check(buf.len(), offset, 2)?;
    BigEndian::write_u16(&mut buf[offset..], value);
    Ok(())
}

pub fn write_u8(buf: &mut [u8], offset: usize, value: u8) -> Result<(), CodecError> {
    check(buf.len(), offset, 1)?;
    buf[offset] = value;
    Ok(())
}

/// Copy `data` into `buf` starting at `offset`.
pub fn insert(buf: &mut [u8], offset: usize, data: &[u8]) -> Result<(), CodecError> {
    check(buf.len(), offset, data.len())?;
    buf[offset..offset + data.len()].copy_from_slice(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be16_layout() {
        let mut buf = [0u8; 4];
        write_be16(&mut buf, 1, 0xABCD).unwrap();
        assert_eq!(buf, [0x00, 0xAB, 0xCD, 0x00]);
    }

    #[test]
    fn test_be16_all_values() {
        let mut buf = [0u8; 16];
        for value in 0..=u16::MAX {
            write_be16(&mut buf, 7, value).unwrap();
            assert_eq!(read_be16(&buf, 7), Some(value));
        }
    }

    #[test]
    fn test_be32() {
        let buf = [0x00, 0x01, 0xE8, 0x47, 0x00];
        assert_eq!(read_be32(&buf, 0), Some(0x0001_E847));
        assert_eq!(read_be32(&buf, 2), None);
    }

    #[test]
    fn test_out_of_range_fails() {
        let mut buf = [0u8; 4];
        assert_eq!(
            write_be16(&mut buf, 3, 1),
            Err(CodecError::OffsetOutOfRange {
                offset: 3,
                width: 2,
                len: 4
            })
        );
        assert!(write_u8(&mut buf, 4, 1).is_err());
        assert!(write_be16(&mut buf, usize::MAX, 1).is_err());
        assert_eq!(read_be16(&buf, 3), None);
        assert_eq!(buf, [0u8; 4]);
    }

    #[test]
    fn test_insert() {
        let mut buf = [0u8; 6];
        insert(&mut buf, 2, b"ab").unwrap();
        assert_eq!(&buf, b"\0\0ab\0\0");
        assert!(insert(&mut buf, 5, b"ab").is_err());
    }
}
