//! Block transfer between host and instrument.
//!
//! ## Upload (instrument to host)
//!
//! ```text
//! host                          instrument
//!  | ESC /U;                        |
//!  |------------------------------->|
//!  |            ESC / B ;           |  status header, 'Z' = done
//!  |<-------------------------------|
//!  |      256 bytes + checksum      |
//!  |<-------------------------------|
//!  | ACK                            |
//!  |------------------------------->|
//!  |            ESC / Z ;           |
//!  |<-------------------------------|
//! ```
//!
//! ## Download (host to instrument)
//!
//! ```text
//! host                          instrument
//!  | ESC /R;                        |
//!  |------------------------------->|
//!  |                            ACK |
//!  |<-------------------------------|
//!  | ESC /A; 256 bytes + checksum   |  once per block
//!  |------------------------------->|
//!  |                            ACK |
//!  |<-------------------------------|
//!  | ESC /z;                        |
//!  |------------------------------->|
//! ```
//!
//! The instrument clears its whole program store when it receives block 0,
//! so a download that stops part-way leaves a partially written store.

use {
    crate::{
        cancel::CancelToken,
        clock::Clock,
        error::{Error, Result},
        port::Port,
        protocol::frame::{ACK, Command, UPLOAD_END, checksum, send_command, verify_checksum},
        record::{BLOCK_SIZE, Block},
        transport::Transport,
    },
    log::{debug, info, trace, warn},
    std::time::Duration,
};

/// Most blocks an upload may return (info block plus 99 programs).
pub const MAX_BLOCKS: usize = 100;

/// Length of the status header preceding each uploaded block.
pub const HEADER_LEN: usize = 4;

/// What to do when an uploaded block fails its checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Log the mismatch, keep and acknowledge the block.
    #[default]
    Warn,
    /// Fail with [`Error::ChecksumMismatch`] without acknowledging.
    Strict,
}

/// What to do when the instrument does not acknowledge within the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckTimeoutPolicy {
    /// Stop the download. No further blocks and no end marker are sent.
    #[default]
    Abort,
    /// Log the missing ACK and keep sending.
    Continue,
}

/// Transfer tuning.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Total time to wait for one ACK.
    pub ack_timeout: Duration,
    /// Delay between two ACK polls.
    pub poll_interval: Duration,
    /// Upload checksum handling.
    pub checksum_policy: ChecksumPolicy,
    /// Download ACK timeout handling.
    pub ack_timeout_policy: AckTimeoutPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(100),
            checksum_policy: ChecksumPolicy::default(),
            ack_timeout_policy: AckTimeoutPolicy::default(),
        }
    }
}

/// A block whose checksum byte did not match its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumMismatch {
    /// Block index in upload order.
    pub block: usize,
    /// Checksum computed over the payload.
    pub expected: u8,
    /// Checksum byte sent by the instrument.
    pub actual: u8,
}

/// Result of an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Raw blocks in the order received. Block 0 is the info block.
    pub blocks: Vec<Block>,
    /// Blocks accepted despite a bad checksum ([`ChecksumPolicy::Warn`]).
    pub checksum_mismatches: Vec<ChecksumMismatch>,
}

/// Result of a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Number of blocks sent.
    pub blocks_written: usize,
    /// Whether the reset was acknowledged.
    pub reset_acknowledged: bool,
    /// Indices of blocks sent without an ACK ([`AckTimeoutPolicy::Continue`]).
    pub unacknowledged: Vec<usize>,
}

impl DownloadReport {
    /// Returns `true` if every step was acknowledged.
    pub fn is_clean(&self) -> bool {
        self.reset_acknowledged
            && self
                .unacknowledged
                .is_empty()
    }
}

/// Block transfer handler bound to an open transport.
pub struct BlockTransfer<'a, P: Port, C: Clock> {
    transport: &'a mut Transport<P>,
    clock: C,
    options: TransferOptions,
    cancel: CancelToken,
}

impl<'a, P: Port, C: Clock> BlockTransfer<'a, P, C> {
    /// Create a handler with default options.
    pub fn new(transport: &'a mut Transport<P>, clock: C) -> Self {
        Self {
            transport,
            clock,
            options: TransferOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Use custom transfer options.
    #[must_use]
    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    /// Check `cancel` between blocks.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Upload every stored block from the instrument.
    ///
    /// `progress` receives `(blocks_done, 0)`: the instrument does not
    /// announce how many blocks follow.
    pub fn upload(&mut self, progress: &mut dyn FnMut(usize, usize)) -> Result<UploadReport> {
        self.transport
            .clear_buffers()?;
        send_command(self.transport, Command::Upload)?;

        let mut report = UploadReport::default();
        let mut header = self.read_header()?;

        while header[2] != UPLOAD_END {
            let index = report
                .blocks
                .len();
            if index >= MAX_BLOCKS {
                return Err(Error::Protocol(format!(
                    "instrument sent more than {MAX_BLOCKS} blocks"
                )));
            }
            if self
                .cancel
                .is_cancelled()
            {
                return Err(Error::Cancelled { completed: index });
            }

            let data = self
                .transport
                .read_exact(BLOCK_SIZE)?;
            let check = self
                .transport
                .read_exact(1)?[0];

            if !verify_checksum(&data, check) {
                let mismatch = ChecksumMismatch {
                    block: index,
                    expected: checksum(&data),
                    actual: check,
                };
                match self
                    .options
                    .checksum_policy
                {
                    ChecksumPolicy::Strict => {
                        return Err(Error::ChecksumMismatch {
                            block: mismatch.block,
                            expected: mismatch.expected,
                            actual: mismatch.actual,
                        });
                    },
                    ChecksumPolicy::Warn => {
                        warn!(
                            "Checksum mismatch in block {index}: expected 0x{:02X}, got 0x{check:02X}",
                            mismatch.expected
                        );
                        report
                            .checksum_mismatches
                            .push(mismatch);
                    },
                }
            }

            self.transport
                .write(&[ACK])?;

            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&data);
            report
                .blocks
                .push(block);
            trace!("Block {index} received (slot {})", block[0]);
            progress(index + 1, 0);

            header = self.read_header()?;
        }

        info!(
            "Upload complete: {} blocks",
            report
                .blocks
                .len()
        );
        Ok(report)
    }

    /// Write `blocks` to the instrument, replacing its program store.
    pub fn download(
        &mut self,
        blocks: &[Block],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<DownloadReport> {
        let total = blocks.len();
        let mut report = DownloadReport::default();

        // A stray ACK left in the input would pass for the reset ACK.
        self.transport
            .clear_buffers()?;
        send_command(self.transport, Command::Reset)?;
        report.reset_acknowledged = self.wait_for_ack()?;
        if !report.reset_acknowledged {
            match self
                .options
                .ack_timeout_policy
            {
                AckTimeoutPolicy::Abort => return Err(Error::ResetAckTimeout),
                AckTimeoutPolicy::Continue => warn!("Reset not acknowledged, continuing"),
            }
        }

        for (index, block) in blocks
            .iter()
            .enumerate()
        {
            if self
                .cancel
                .is_cancelled()
            {
                return Err(Error::Cancelled { completed: index });
            }

            send_command(self.transport, Command::WriteBlock)?;
            let mut payload = Vec::with_capacity(BLOCK_SIZE + 1);
            payload.extend_from_slice(block);
            payload.push(checksum(block));
            self.transport
                .write(&payload)?;
            report.blocks_written += 1;

            if !self.wait_for_ack()? {
                match self
                    .options
                    .ack_timeout_policy
                {
                    AckTimeoutPolicy::Abort => {
                        return Err(Error::BlockAckTimeout {
                            block: index,
                            written: index,
                        });
                    },
                    AckTimeoutPolicy::Continue => {
                        warn!("Block {index} not acknowledged, continuing");
                        report
                            .unacknowledged
                            .push(index);
                    },
                }
            }

            progress(index + 1, total);
        }

        send_command(self.transport, Command::EndTransmission)?;
        info!("Download complete: {total} blocks");
        Ok(report)
    }

    /// Poll for an ACK until the budget runs out. Returns `false` on timeout.
    ///
    /// Bytes other than ACK are skipped.
    pub fn wait_for_ack(&mut self) -> Result<bool> {
        let start = self
            .clock
            .now();

        loop {
            let data = self
                .transport
                .try_read(1)?;
            match data.first() {
                Some(&ACK) => {
                    trace!("ACK received");
                    return Ok(true);
                },
                Some(b) => trace!("Ignoring 0x{b:02X} while waiting for ACK"),
                None => {},
            }

            let waited = self
                .clock
                .now()
                .saturating_duration_since(start);
            if waited >= self
                .options
                .ack_timeout
            {
                debug!("No ACK after {} ms", waited.as_millis());
                return Ok(false);
            }
            self.clock
                .sleep(
                    self.options
                        .poll_interval,
                );
        }
    }

    fn read_header(&mut self) -> Result<[u8; HEADER_LEN]> {
        let data = self
            .transport
            .read_exact(HEADER_LEN)?;
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&data);
        trace!("Upload header {header:02X?}");
        Ok(header)
    }
}

/// Upload all blocks using the system clock.
pub fn upload<P: Port>(
    transport: &mut Transport<P>,
    options: &TransferOptions,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<UploadReport> {
    BlockTransfer::new(transport, crate::clock::SystemClock)
        .with_options(options.clone())
        .with_cancel(cancel.clone())
        .upload(progress)
}

/// Download `blocks`, measuring ACK budgets on `clock`.
pub fn download<P: Port, C: Clock>(
    transport: &mut Transport<P>,
    blocks: &[Block],
    options: &TransferOptions,
    clock: C,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<DownloadReport> {
    BlockTransfer::new(transport, clock)
        .with_options(options.clone())
        .with_cancel(cancel.clone())
        .download(blocks, progress)
}
