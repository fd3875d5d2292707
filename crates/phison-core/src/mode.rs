//! Device mode model derived from the vendor info block.
//!
//! The controller does not report its run mode directly. It is guessed from
//! an 8-byte tag in the vendor info, which is only meaningful when the "VR"
//! marker is present.

use std::fmt;

use crate::error::{PhisonError, Result};
use crate::protocol::codec::read_be16;
use crate::protocol::command::GET_VENDOR_INFO;
use crate::protocol::constants::{
    VENDOR_INFO_SIZE, VI_CHIP_TYPE, VI_FIRMWARE_VERSION, VI_MODE_TAG, VI_MODE_TAG_LEN,
    VI_VR_MARKER,
};

/// Controller run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceMode {
    /// Boot ROM, waiting for code in PRAM.
    BootMode = 0,
    /// Burner image running.
    Burner = 1,
    /// Hardware verification image running.
    HardwareVerify = 2,
    /// Regular firmware.
    Firmware = 3,
}

/// Tag -> mode table. Anything not listed is regular firmware.
const MODE_TAGS: [(&[u8; VI_MODE_TAG_LEN], DeviceMode); 3] = [
    (b" PRAM   ", DeviceMode::BootMode),
    (b" FW BURN", DeviceMode::Burner),
    (b" HV TEST", DeviceMode::HardwareVerify),
];

impl DeviceMode {
    pub fn from_tag(tag: &[u8; VI_MODE_TAG_LEN]) -> Self {
        MODE_TAGS
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|&(_, mode)| mode)
            .unwrap_or(DeviceMode::Firmware)
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(DeviceMode::BootMode),
            1 => Some(DeviceMode::Burner),
            2 => Some(DeviceMode::HardwareVerify),
            3 => Some(DeviceMode::Firmware),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::BootMode => write!(f, "BootMode"),
            DeviceMode::Burner => write!(f, "Burner"),
            DeviceMode::HardwareVerify => write!(f, "HardwareVerify"),
            DeviceMode::Firmware => write!(f, "Firmware"),
        }
    }
}

/// Raw 528-byte vendor info block.
#[derive(Clone, PartialEq, Eq)]
pub struct VendorInfo {
    data: Vec<u8>,
}

impl VendorInfo {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < VENDOR_INFO_SIZE {
            return Err(PhisonError::ResponseTooShort {
                command: GET_VENDOR_INFO.name,
                expected: VENDOR_INFO_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn has_vr_marker(&self) -> bool {
        self.data[VI_VR_MARKER] == b'V' && self.data[VI_VR_MARKER + 1] == b'R'
    }

    /// Chip type, only valid when the VR marker is present.
    pub fn chip_type(&self) -> Option<u16> {
        if self.has_vr_marker() {
            read_be16(&self.data, VI_CHIP_TYPE)
        } else {
            None
        }
    }

    pub fn firmware_version(&self) -> String {
        let v = &self.data[VI_FIRMWARE_VERSION..VI_FIRMWARE_VERSION + 3];
        format!("{:X}.{:02X}.{:02X}", v[0], v[1], v[2])
    }

    pub fn mode_tag(&self) -> [u8; VI_MODE_TAG_LEN] {
        let mut tag = [0u8; VI_MODE_TAG_LEN];
        tag.copy_from_slice(&self.data[VI_MODE_TAG..VI_MODE_TAG + VI_MODE_TAG_LEN]);
        tag
    }

    /// Run mode, `None` without the VR marker.
    pub fn mode(&self) -> Option<DeviceMode> {
        if self.has_vr_marker() {
            Some(DeviceMode::from_tag(&self.mode_tag()))
        } else {
            None
        }
    }
}

impl fmt::Debug for VendorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorInfo")
            .field("firmware_version", &self.firmware_version())
            .field("mode_tag", &String::from_utf8_lossy(&self.mode_tag()))
            .field("vr_marker", &self.has_vr_marker())
            .field("chip_type", &self.chip_type())
            .finish()
    }
}

/// Identity snapshot, built fresh on every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub chip_type: Option<u16>,
    pub chip_id: String,
    pub firmware_version: String,
    pub mode: Option<DeviceMode>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chip_type {
            Some(t) => writeln!(f, "Chip type:        {:04X}", t)?,
            None => writeln!(f, "Chip type:        unknown")?,
        }
        writeln!(f, "Chip ID:          {}", self.chip_id)?;
        writeln!(f, "Firmware version: {}", self.firmware_version)?;
        match self.mode {
            Some(m) => write!(f, "Mode:             {}", m),
            None => write!(f, "Mode:             unknown"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a vendor info block with the given tag and version.
    pub(crate) fn vendor_info_bytes(vr: bool, tag: &[u8; 8], version: [u8; 3]) -> Vec<u8> {
        let mut data = vec![0u8; VENDOR_INFO_SIZE];
        data[VI_FIRMWARE_VERSION..VI_FIRMWARE_VERSION + 3].copy_from_slice(&version);
        data[VI_MODE_TAG..VI_MODE_TAG + 8].copy_from_slice(tag);
        if vr {
            data[VI_VR_MARKER] = b'V';
            data[VI_VR_MARKER + 1] = b'R';
        }
        data[VI_CHIP_TYPE] = 0x23;
        data[VI_CHIP_TYPE + 1] = 0x07;
        data
    }

    #[test]
    fn test_mode_table() {
        let cases: [(&[u8; 8], DeviceMode); 5] = [
            (b" PRAM   ", DeviceMode::BootMode),
            (b" FW BURN", DeviceMode::Burner),
            (b" HV TEST", DeviceMode::HardwareVerify),
            (b"1.03.10 ", DeviceMode::Firmware),
            (b"        ", DeviceMode::Firmware),
        ];
        for (tag, expected) in cases {
            let vi = VendorInfo::from_bytes(vendor_info_bytes(true, tag, [1, 2, 3])).unwrap();
            assert_eq!(vi.mode(), Some(expected), "tag {:?}", tag);
        }
    }

    #[test]
    fn test_no_vr_marker() {
        let vi = VendorInfo::from_bytes(vendor_info_bytes(false, b" FW BURN", [1, 2, 3])).unwrap();
        assert_eq!(vi.mode(), None);
        assert_eq!(vi.chip_type(), None);
        // Version does not depend on the marker
        assert_eq!(vi.firmware_version(), "1.02.03");
    }

    #[test]
    fn test_chip_type_and_version() {
        let vi = VendorInfo::from_bytes(vendor_info_bytes(true, b" PRAM   ", [0x1A, 0x0B, 0xFF]))
            .unwrap();
        assert_eq!(vi.chip_type(), Some(0x2307));
        assert_eq!(vi.firmware_version(), "1A.0B.FF");
    }

    #[test]
    fn test_short_vendor_info() {
        let err = VendorInfo::from_bytes(vec![0u8; 100]).unwrap_err();
        assert!(matches!(
            err,
            PhisonError::ResponseTooShort {
                expected: 528,
                actual: 100,
                ..
            }
        ));
    }

    #[test]
    fn test_mode_numbering() {
        for v in 0..4u8 {
            assert_eq!(DeviceMode::from_u8(v).map(DeviceMode::as_u8), Some(v));
        }
        assert_eq!(DeviceMode::from_u8(4), None);
        assert_eq!(DeviceMode::HardwareVerify.to_string(), "HardwareVerify");
    }
}
