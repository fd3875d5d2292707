//! Phison controller command layer.
//!
//! `PhisonDevice` owns a transport and exposes one method per vendor
//! command. Every method takes `&mut self`, so a device handle can only be
//! driven by one sequence of calls at a time.

use tracing::{debug, instrument, trace};

use crate::error::{PhisonError, Result};
use crate::mode::{DeviceInfo, DeviceMode, VendorInfo};
use crate::protocol::codec::{insert, read_be32};
use crate::protocol::command::{self, Command};
use crate::protocol::constants::{BLOCK_SIZE, CHIP_ID_LEN, PASSWORD_OFFSET, XRAM_DUMP_SIZE};
use crate::transport::ScsiTransport;

pub struct PhisonDevice<T: ScsiTransport> {
    transport: T,
}

impl<T: ScsiTransport> PhisonDevice<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Dispatch a built command.
    pub fn execute(&mut self, cmd: &Command, data_out: Option<&[u8]>) -> Result<Vec<u8>> {
        trace!(command = %cmd, data_out = data_out.map_or(0, <[u8]>::len), "Dispatch");
        let response = self
            .transport
            .execute(&cmd.bytes, data_out, cmd.response_len)?;
        Ok(response)
    }

    /// Dispatch and require at least `min` response bytes.
    pub(crate) fn execute_expect(
        &mut self,
        cmd: &Command,
        data_out: Option<&[u8]>,
        min: usize,
    ) -> Result<Vec<u8>> {
        let response = self.execute(cmd, data_out)?;
        if response.len() < min {
            return Err(PhisonError::ResponseTooShort {
                command: cmd.name,
                expected: min,
                actual: response.len(),
            });
        }
        Ok(response)
    }

    // ------------------------------------------------------------------
    // Identity & mode
    // ------------------------------------------------------------------

    pub fn get_vendor_info(&mut self) -> Result<VendorInfo> {
        let response = self.execute(&command::GET_VENDOR_INFO.command(), None)?;
        VendorInfo::from_bytes(response)
    }

    #[instrument(skip(self))]
    pub fn get_info(&mut self) -> Result<DeviceInfo> {
        let vendor_info = self.get_vendor_info()?;
        let chip = self.execute_expect(&command::GET_CHIP_ID.command(), None, CHIP_ID_LEN)?;
        let chip_id = chip[..CHIP_ID_LEN]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();

        Ok(DeviceInfo {
            chip_type: vendor_info.chip_type(),
            chip_id,
            firmware_version: vendor_info.firmware_version(),
            mode: vendor_info.mode(),
        })
    }

    /// Current run mode. A vendor info block without the VR marker is
    /// reported as `Firmware`.
    pub fn get_run_mode(&mut self) -> Result<DeviceMode> {
        let mode = self.get_vendor_info()?.mode();
        if mode.is_none() {
            debug!("No VR marker in vendor info, assuming firmware mode");
        }
        Ok(mode.unwrap_or(DeviceMode::Firmware))
    }

    /// Number of LBAs (READ CAPACITY reports the last LBA, hence the +1).
    pub fn get_num_lbas(&mut self) -> Result<u64> {
        let cmd = command::GET_NUM_LBAS.command();
        let response = self.execute_expect(&cmd, None, 4)?;
        let last = read_be32(&response, 0).ok_or(PhisonError::ResponseTooShort {
            command: cmd.name,
            expected: 4,
            actual: response.len(),
        })?;
        Ok(u64::from(last) + 1)
    }

    pub fn jump_to_pram(&mut self) -> Result<()> {
        self.execute(&command::JUMP_TO_PRAM.command(), None)?;
        Ok(())
    }

    pub fn jump_to_bootmode(&mut self) -> Result<()> {
        self.execute(&command::JUMP_TO_BOOTMODE.command(), None)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Memory access
    // ------------------------------------------------------------------

    pub fn read_xram(&mut self, address: u16) -> Result<u8> {
        let response = self.execute_expect(&command::read_xram(address)?, None, 1)?;
        Ok(response[0])
    }

    pub fn write_xram(&mut self, address: u16, value: u8) -> Result<()> {
        self.execute(&command::write_xram(address, value)?, None)?;
        Ok(())
    }

    pub fn read_iram(&mut self, address: u8) -> Result<u8> {
        let response = self.execute_expect(&command::read_iram(address)?, None, 1)?;
        Ok(response[0])
    }

    pub fn write_iram(&mut self, address: u8, value: u8) -> Result<()> {
        self.execute(&command::write_iram(address, value)?, None)?;
        Ok(())
    }

    /// Read 512 bytes of XDATA starting at `address`.
    pub fn read_memory_block(&mut self, address: u16) -> Result<Vec<u8>> {
        let mut response = self.execute_expect(&command::read_memory(address)?, None, BLOCK_SIZE)?;
        // Drop the 16 trailing junk bytes
        response.truncate(BLOCK_SIZE);
        Ok(response)
    }

    pub fn write_memory(&mut self, address: u16, value: u8) -> Result<()> {
        self.execute(&command::write_memory(address, value)?, None)?;
        Ok(())
    }

    /// Read `count` blocks of NAND starting at block `address`.
    pub fn read_nand(&mut self, address: u16, count: u16) -> Result<Vec<u8>> {
        let cmd = command::read_body(address, count)?;
        debug!(command = %cmd, "Read NAND");
        let len = cmd.response_len;
        let mut data = self.execute_expect(&cmd, None, len)?;
        data.truncate(len);
        Ok(data)
    }

    /// Read XRAM 0x0000..0xF000 one byte at a time.
    #[instrument(skip(self))]
    pub fn dump_xram(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(XRAM_DUMP_SIZE);
        for address in 0..XRAM_DUMP_SIZE as u16 {
            if address % 0x1000 == 0 {
                debug!(address = %format!("{:04X}", address), "Reading XRAM");
            }
            data.push(self.read_xram(address)?);
        }
        Ok(data)
    }

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------

    /// Submit a password; it is placed at offset 0x10 of a 512-byte block.
    pub fn send_password(&mut self, password: &[u8]) -> Result<()> {
        let max = BLOCK_SIZE - PASSWORD_OFFSET;
        if password.len() > max {
            return Err(PhisonError::PasswordTooLong {
                len: password.len(),
                max,
            });
        }
        let mut data = vec![0u8; BLOCK_SIZE];
        insert(&mut data, PASSWORD_OFFSET, password)?;
        self.execute(&command::SEND_PASSWORD.command(), Some(&data))?;
        Ok(())
    }

    /// Issue a firmware-update control command with the given selector pair.
    pub fn firmware_update_control(&mut self, first: u8, second: u8) -> Result<Vec<u8>> {
        let cmd = command::firmware_update(first, second)?;
        debug!(command = %cmd, "Firmware update control");
        self.execute(&cmd, None)
    }
}
