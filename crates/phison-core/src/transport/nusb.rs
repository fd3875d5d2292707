//! nusb-based USB Mass Storage (Bulk-Only Transport) backend.
//!
//! Each command block is wrapped in a 31-byte CBW, followed by the optional
//! data phase and a 13-byte CSW. A device may end the data-in phase early
//! with a short packet; the CSW residue then reports the missing bytes.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{ScsiTransport, TransportError};

const CBW_SIGNATURE: u32 = 0x43425355; // 'USBC'
const CSW_SIGNATURE: u32 = 0x53425355; // 'USBS'
const CBW_LEN: usize = 31;
const CSW_LEN: usize = 13;
const CBW_FLAG_DATA_IN: u8 = 0x80;
const MAX_CB_LEN: usize = 16;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// nusb-based SCSI transport.
pub struct NusbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    lun: u8,
    tag: AtomicU32,
    timeout: Duration,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open a device with a specific VID and, optionally, PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid)))]
    pub fn open_matching(vid: u16, pid: Option<u16>) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && pid.is_none_or(|p| d.product_id() == p))
            .ok_or(TransportError::DeviceNotFound {
                vid,
                pid: pid.unwrap_or(0),
            })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface =
            device
                .claim_interface(0)
                .wait()
                .map_err(|e| TransportError::ClaimInterfaceFailed {
                    interface: 0,
                    message: e.to_string(),
                })?;

        // Find BULK endpoints
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == 0 {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            });
        }

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            lun: 0,
            tag: AtomicU32::new(1),
            timeout: DEFAULT_TIMEOUT,
            vid,
            pid,
        })
    }

    /// Address a different logical unit.
    pub fn with_lun(mut self, lun: u8) -> Self {
        self.lun = lun;
        self
    }

    /// Per-transfer timeout for every phase of a command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn io_error(&self, e: std::io::Error, wrap: fn(String) -> TransportError) -> TransportError {
        if e.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            wrap(e.to_string())
        }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vid
    }

    pub fn product_id(&self) -> u16 {
        self.pid
    }
}

/// Build a Command Block Wrapper.
fn encode_cbw(
    tag: u32,
    transfer_len: u32,
    data_in: bool,
    lun: u8,
    command: &[u8],
) -> Result<Vec<u8>, TransportError> {
    if command.is_empty() || command.len() > MAX_CB_LEN {
        return Err(TransportError::InvalidCommandLength(command.len()));
    }
    let mut cbw = Vec::with_capacity(CBW_LEN);
    cbw.write_u32::<LittleEndian>(CBW_SIGNATURE)?;
    cbw.write_u32::<LittleEndian>(tag)?;
    cbw.write_u32::<LittleEndian>(transfer_len)?;
    cbw.push(if data_in { CBW_FLAG_DATA_IN } else { 0 });
    cbw.push(lun & 0x0F);
    cbw.push(command.len() as u8);
    cbw.extend_from_slice(command);
    cbw.resize(CBW_LEN, 0);
    Ok(cbw)
}

/// Fields of a validated Command Status Wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandStatus {
    residue: u32,
    status: u8,
}

/// Validate a Command Status Wrapper.
fn decode_csw(csw: &[u8], expected_tag: u32) -> Result<CommandStatus, TransportError> {
    if csw.len() < CSW_LEN {
        return Err(TransportError::InvalidStatus(format!(
            "short CSW ({} bytes)",
            csw.len()
        )));
    }
    let signature = LittleEndian::read_u32(&csw[0..4]);
    if signature != CSW_SIGNATURE {
        return Err(TransportError::InvalidStatus(format!(
            "bad signature 0x{:08X}",
            signature
        )));
    }
    let tag = LittleEndian::read_u32(&csw[4..8]);
    if tag != expected_tag {
        return Err(TransportError::InvalidStatus(format!(
            "tag mismatch: sent {}, got {}",
            expected_tag, tag
        )));
    }
    Ok(CommandStatus {
        residue: LittleEndian::read_u32(&csw[8..12]),
        status: csw[12],
    })
}

impl ScsiTransport for NusbTransport {
    #[instrument(skip(self, command, data_out), fields(opcode = command.first().copied().unwrap_or(0)))]
    fn execute(
        &self,
        command: &[u8],
        data_out: Option<&[u8]>,
        response_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let tag = self.tag.fetch_add(1, Ordering::Relaxed);
        let transfer_len = data_out.map_or(response_len, <[u8]>::len);
        let data_in = data_out.is_none() && response_len > 0;
        let cbw = encode_cbw(tag, transfer_len as u32, data_in, self.lun, command)?;

        let out_ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        let mut writer = out_ep.writer(4096).with_write_timeout(self.timeout);
        let write_err = |e: std::io::Error| self.io_error(e, TransportError::WriteFailed);
        // The CBW must go out as its own transfer
        writer.write_all(&cbw).map_err(write_err)?;
        writer.flush().map_err(write_err)?;
        if let Some(data) = data_out {
            writer.write_all(data).map_err(write_err)?;
        }
        writer.flush().map_err(write_err)?;
        drop(writer);

        let in_ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        let mut reader = in_ep.reader(4096).with_read_timeout(self.timeout);
        let read_err = |e: std::io::Error| self.io_error(e, TransportError::ReadFailed);

        let mut buf = vec![0u8; if data_in { response_len } else { 0 }];
        let mut filled = 0;
        if data_in {
            let mut data = reader.until_short_packet();
            while filled < buf.len() {
                let n = data.read(&mut buf[filled..]).map_err(read_err)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            // The CSW starts after the short packet
            if data.is_end() {
                let _ = data.consume_end();
            }
        }
        buf.truncate(filled);

        let mut csw = [0u8; CSW_LEN];
        reader.read_exact(&mut csw).map_err(read_err)?;
        let csw = decode_csw(&csw, tag)?;
        if csw.status != 0 {
            return Err(TransportError::CommandFailed { status: csw.status });
        }
        if data_in && filled + csw.residue as usize != response_len {
            warn!(
                expected = response_len,
                received = filled,
                residue = csw.residue,
                "Data phase length disagrees with CSW residue"
            );
        }

        debug!(bytes_read = filled, "Command complete");
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csw_bytes(tag: u32, residue: u32, status: u8) -> [u8; CSW_LEN] {
        let mut csw = [0u8; CSW_LEN];
        csw[0..4].copy_from_slice(b"USBS");
        csw[4..8].copy_from_slice(&tag.to_le_bytes());
        csw[8..12].copy_from_slice(&residue.to_le_bytes());
        csw[12] = status;
        csw
    }

    #[test]
    fn test_csw_residue() {
        // Device answered 0x2000 of 0x8000 requested bytes
        let csw = decode_csw(&csw_bytes(3, 0x6000, 0), 3).unwrap();
        assert_eq!(
            csw,
            CommandStatus {
                residue: 0x6000,
                status: 0
            }
        );
        assert!(decode_csw(&csw_bytes(3, 0, 0)[..12], 3).is_err());
    }

    #[test]
    fn test_cbw_layout() {
        let cbw = encode_cbw(7, 528, true, 0, &[0x06, 0x05, 0x00]).unwrap();
        assert_eq!(cbw.len(), CBW_LEN);
        assert_eq!(&cbw[0..4], b"USBC");
        assert_eq!(&cbw[4..8], &7u32.to_le_bytes());
        assert_eq!(&cbw[8..12], &528u32.to_le_bytes());
        assert_eq!(cbw[12], CBW_FLAG_DATA_IN);
        assert_eq!(cbw[14], 3);
        assert_eq!(&cbw[15..18], &[0x06, 0x05, 0x00]);
        assert!(cbw[18..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cbw_rejects_long_command() {
        assert!(encode_cbw(1, 0, false, 0, &[0u8; 17]).is_err());
        assert!(encode_cbw(1, 0, false, 0, &[]).is_err());
    }

    #[test]
    fn test_csw_checks() {
        let mut csw = [0u8; CSW_LEN];
        csw[0..4].copy_from_slice(b"USBS");
        csw[4..8].copy_from_slice(&9u32.to_le_bytes());
        csw[12] = 1;
        assert_eq!(decode_csw(&csw, 9).unwrap().status, 1);
        assert!(decode_csw(&csw, 10).is_err());
        csw[0] = b'X';
        assert!(decode_csw(&csw, 9).is_err());
    }
}
