//! Chunked image transfer (header stage + body stages).
//!
//! Image layout as seen by the loader:
//!
//! ```text
//! 0x000           0x200                         len-0x200      len
//! | header (512)  | body (len - 0x400 bytes)   | footer (512)  |
//! ```
//!
//! The header goes out in one LOAD_HEADER command, the body in LOAD_BODY
//! commands of at most 64 blocks. Each stage is acknowledged through
//! GET_STATUS.

use tracing::{debug, info, instrument, warn};

use crate::device::PhisonDevice;
use crate::error::{PhisonError, Result};
use crate::protocol::TransferStatus;
use crate::protocol::command::{self, GET_STATUS};
use crate::protocol::constants::{
    BLOCK_SHIFT, BLOCK_SIZE, BODY_OFFSET, MAX_CHUNK_SIZE, STATUS_SIZE, TRANSFER_RESERVED,
};
use crate::transport::ScsiTransport;

/// One LOAD_BODY round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyChunk {
    /// Offset into the image.
    pub offset: usize,
    /// Body-relative block address.
    pub block: u16,
    /// Block count (`len >> 9`).
    pub blocks: u16,
    /// Chunk length in bytes.
    pub len: usize,
}

/// Iterator over the body chunks of an image.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    /// Body bytes not yet planned.
    remaining: usize,
    /// Body-relative byte address of the next chunk.
    address: usize,
}

impl ChunkPlan {
    pub fn new(image_len: usize) -> Self {
        Self {
            remaining: image_len.saturating_sub(TRANSFER_RESERVED),
            address: 0,
        }
    }

    pub fn body_size(image_len: usize) -> usize {
        image_len.saturating_sub(TRANSFER_RESERVED)
    }

    pub fn chunk_count(image_len: usize) -> usize {
        Self::body_size(image_len).div_ceil(MAX_CHUNK_SIZE)
    }
}

impl Iterator for ChunkPlan {
    type Item = Result<BodyChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(MAX_CHUNK_SIZE);
        let block = self.address >> BLOCK_SHIFT;
        let chunk = match u16::try_from(block) {
            Ok(b) => BodyChunk {
                offset: BODY_OFFSET + self.address,
                block: b,
                blocks: (len >> BLOCK_SHIFT) as u16,
                len,
            },
            Err(_) => {
                self.remaining = 0;
                return Some(Err(PhisonError::BlockOverflow { block }));
            }
        };
        self.address += len;
        self.remaining -= len;
        Some(Ok(chunk))
    }
}

impl<T: ScsiTransport> PhisonDevice<T> {
    fn read_status(&mut self) -> Result<TransferStatus> {
        let cmd = GET_STATUS.command();
        let response = self.execute_expect(&cmd, None, 1)?;
        TransferStatus::from_bytes(&response).ok_or(PhisonError::ResponseTooShort {
            command: cmd.name,
            expected: STATUS_SIZE,
            actual: 0,
        })
    }

    /// Load an image through the header/body protocol.
    pub fn transfer_data(&mut self, image: &[u8], header: u8, body: u8) -> Result<()> {
        self.transfer_data_with_progress(image, header, body, |_, _| {})
    }

    /// Same as [`transfer_data`](Self::transfer_data), calling
    /// `progress(sent, total)` after every accepted body chunk.
    #[instrument(skip(self, image, progress), fields(len = image.len(), header = %format!("{:02X}", header), body = %format!("{:02X}", body)))]
    pub fn transfer_data_with_progress<F>(
        &mut self,
        image: &[u8],
        header: u8,
        body: u8,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        if image.len() < BLOCK_SIZE {
            return Err(PhisonError::ImageTooSmall {
                actual: image.len(),
                minimum: BLOCK_SIZE,
            });
        }
        let total = ChunkPlan::body_size(image.len());

        self.execute(&command::load_header(header)?, Some(&image[..BLOCK_SIZE]))?;
        let status = self.read_status()?;
        if !status.is_header_accepted() {
            warn!(status = %status, "Header not accepted");
            return Err(PhisonError::HeaderRejected {
                status: status.code(),
            });
        }
        debug!("Header accepted");

        let mut sent = 0;
        for chunk in ChunkPlan::new(image.len()) {
            let chunk = chunk?;
            let cmd = command::load_body(body, chunk.block, chunk.blocks)?;
            debug!(
                block = %format!("{:04X}", chunk.block),
                blocks = chunk.blocks,
                "Sending body chunk"
            );
            self.execute(&cmd, Some(&image[chunk.offset..chunk.offset + chunk.len]))?;

            let status = self.read_status()?;
            if !status.is_body_accepted() {
                warn!(status = %status, block = chunk.block, "Body not accepted");
                return Err(PhisonError::BodyRejected {
                    status: status.code(),
                    block: chunk.block,
                });
            }
            sent += chunk.len;
            progress(sent, total);
        }

        info!(bytes = sent, "Transfer complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::read_be16;
    use crate::protocol::command::{BLOCK_ADDRESS_OFFSET, BLOCK_COUNT_OFFSET};
    use crate::transport::MockTransport;

    const LOAD_PREFIX: &[u8] = &[0x06, 0xB1];
    const STATUS_PREFIX: &[u8] = &[0x06, 0xB0];

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i / BLOCK_SIZE) as u8).collect()
    }

    fn accepting_mock() -> MockTransport {
        let mock = MockTransport::strict();
        // Header status first, then body statuses
        mock.respond_seq(STATUS_PREFIX, vec![vec![0x55; 8], vec![0xA5; 8]]);
        mock
    }

    #[test]
    fn test_plan_single_chunk() {
        let chunks: Vec<_> = ChunkPlan::new(1024 + 0x1000).map(|c| c.unwrap()).collect();
        assert_eq!(
            chunks,
            vec![BodyChunk {
                offset: 0x200,
                block: 0,
                blocks: 8,
                len: 0x1000
            }]
        );
    }

    #[test]
    fn test_plan_multiple_chunks() {
        let body = 0x8000 * 2 + 0x600;
        let chunks: Vec<_> = ChunkPlan::new(1024 + body).map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), ChunkPlan::chunk_count(1024 + body));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].block, 0x00);
        assert_eq!(chunks[1].block, 0x40);
        assert_eq!(chunks[2].block, 0x80);
        assert_eq!(chunks[2].blocks, 3);
        assert_eq!(chunks.iter().map(|c| c.len).sum::<usize>(), body);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].offset + pair[0].len, pair[1].offset);
        }
    }

    #[test]
    fn test_plan_small_images() {
        assert_eq!(ChunkPlan::new(1024).count(), 0);
        assert_eq!(ChunkPlan::new(600).count(), 0);
    }

    #[test]
    fn test_plan_block_overflow() {
        // Body larger than 0x10000 blocks
        let len = TRANSFER_RESERVED + (0x10000 << BLOCK_SHIFT) + MAX_CHUNK_SIZE;
        let last = ChunkPlan::new(len).last().unwrap();
        assert!(matches!(last, Err(PhisonError::BlockOverflow { block: 0x10000 })));
    }

    #[test]
    fn test_transfer_one_body_call() {
        let mock = accepting_mock();
        let img = image(1024 + 0x2000);
        let mut dev = PhisonDevice::new(&mock);
        dev.transfer_data(&img, 0x03, 0x02).unwrap();

        let loads = mock.calls_matching(LOAD_PREFIX);
        assert_eq!(loads.len(), 2);
        // Header
        assert_eq!(loads[0].command[2], 0x03);
        assert_eq!(loads[0].data_out.as_deref(), Some(&img[..0x200]));
        // Body
        assert_eq!(loads[1].command[2], 0x02);
        assert_eq!(read_be16(&loads[1].command, BLOCK_ADDRESS_OFFSET), Some(0));
        assert_eq!(read_be16(&loads[1].command, BLOCK_COUNT_OFFSET), Some(0x10));
        assert_eq!(loads[1].data_out.as_deref(), Some(&img[0x200..0x2200]));

        assert_eq!(mock.calls_matching(STATUS_PREFIX).len(), 2);
        assert_eq!(mock.call_count(), 4);
    }

    #[test]
    fn test_transfer_header_rejected() {
        let mock = MockTransport::strict();
        mock.respond_to(STATUS_PREFIX, &[0x00; 8]);
        let mut dev = PhisonDevice::new(&mock);

        let err = dev.transfer_data(&image(2048), 0x03, 0x02).unwrap_err();
        assert!(matches!(err, PhisonError::HeaderRejected { status: 0x00 }));
        // No body sent
        assert_eq!(mock.calls_matching(LOAD_PREFIX).len(), 1);
    }

    #[test]
    fn test_transfer_body_rejected_aborts() {
        let mock = MockTransport::strict();
        mock.respond_seq(
            STATUS_PREFIX,
            vec![vec![0x55; 8], vec![0xA5; 8], vec![0x13; 8]],
        );
        let mut dev = PhisonDevice::new(&mock);

        let err = dev
            .transfer_data(&image(1024 + 0x8000 * 3), 0x01, 0x00)
            .unwrap_err();
        assert!(matches!(
            err,
            PhisonError::BodyRejected {
                status: 0x13,
                block: 0x40
            }
        ));
        // Header + two body chunks, the third never sent
        assert_eq!(mock.calls_matching(LOAD_PREFIX).len(), 3);
    }

    #[test]
    fn test_transfer_chunks_cover_body() {
        let mock = accepting_mock();
        let body = 0x8000 * 4 + 0x200;
        let img = image(1024 + body);
        let mut dev = PhisonDevice::new(&mock);

        let mut last = (0, 0);
        dev.transfer_data_with_progress(&img, 0x03, 0x02, |sent, total| last = (sent, total))
            .unwrap();
        assert_eq!(last, (body, body));

        let bodies: Vec<_> = mock.calls_matching(LOAD_PREFIX).into_iter().skip(1).collect();
        assert_eq!(bodies.len(), 5);

        let mut expected_block = 0u16;
        let mut total = 0;
        for call in &bodies {
            let block = read_be16(&call.command, BLOCK_ADDRESS_OFFSET).unwrap();
            let count = read_be16(&call.command, BLOCK_COUNT_OFFSET).unwrap();
            assert_eq!(block, expected_block);
            let data = call.data_out.as_ref().unwrap();
            assert_eq!(data.len(), count as usize * BLOCK_SIZE);
            let start = 0x200 + block as usize * BLOCK_SIZE;
            assert_eq!(data.as_slice(), &img[start..start + data.len()]);
            expected_block += count;
            total += data.len();
        }
        assert_eq!(total, body);
    }

    #[test]
    fn test_transfer_header_only_image() {
        let mock = accepting_mock();
        let mut dev = PhisonDevice::new(&mock);
        dev.transfer_data(&image(1024), 0x03, 0x02).unwrap();
        assert_eq!(mock.calls_matching(LOAD_PREFIX).len(), 1);
    }

    #[test]
    fn test_transfer_rejects_tiny_image() {
        let mock = accepting_mock();
        let mut dev = PhisonDevice::new(&mock);
        assert!(matches!(
            dev.transfer_data(&image(100), 0x03, 0x02),
            Err(PhisonError::ImageTooSmall { actual: 100, .. })
        ));
        assert_eq!(mock.call_count(), 0);
    }
}
