//! SDIO block driver
//!
//! This module provides a block driver for SD/SDHC/SDXC cards connected to
//! an SDIO peripheral whose data phase is serviced by two DMA streams (one
//! per direction).
//!
//! Every transfer is confirmed by two interrupts: the DMA stream reports
//! that it moved the buffer, and the SDIO engine reports the end of the
//! data phase. They fire at different times with independent status. The
//! task arms both monitors before issuing the command, waits on them in a
//! direction-specific order, lets the engine drain, and folds both results
//! (plus a buffer-error check on writes) into one outcome.
//!
//! The interrupt-side state lives in [`Sdio`], which the board places in a
//! `static` and calls from its vector table. [`SdioBlockDevice`] is the
//! task-side handle implementing [`BlockDevice`].

pub mod card_monitor;
pub mod completion;
pub mod config;
pub mod dma_monitor;
pub mod engine;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use crate::block::BlockDevice;
use crate::drivers::dma::{DmaStatus, DmaStream};
use crate::time::{Clock, Timeout};
use card_monitor::CardMonitor;
use completion::Waiter;
use core::fmt;
use dma_monitor::DmaMonitor;
use engine::{CardEngine, CardInfo, CardOperation, CardStatus};
use state::ControllerState;

pub use config::{Config, IrqPriorities};

/// Bytes per DMA item (the SDIO FIFO is word-wide)
const DMA_ITEM_SIZE: usize = 4;

/// Largest transfer in DMA items; the item counter is 16 bits wide
pub const MAX_TRANSFER_ITEMS: usize = 0xFFFF;

/// SDIO block driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdError {
    /// The engine refused the data command before any interrupt could fire
    IssueRejected(CardStatus),
    /// DMA stream reported a transfer error
    Dma(DmaStatus),
    /// Data phase failed on the card side
    Card(CardStatus),
    /// DMA FIFO error together with a short item count on a write
    BufferIncomplete { transferred: u32, expected: u32 },
    /// STOP_TRANSMISSION after a multiple-block read failed
    StopFailed(CardStatus),
    /// The engine kept reporting TX/RX activity after both completions
    DrainTimeout,
    /// Card geometry could not be obtained
    DeviceUnavailable,
    /// Buffer is empty, not a whole number of blocks, or longer than
    /// [`MAX_TRANSFER_ITEMS`] words
    InvalidBuffer,
    /// Transfer extends past the end of the card
    OutOfRange,
    /// Inconsistent driver configuration
    InvalidConfig,
}

impl fmt::Display for SdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdError::IssueRejected(status) => write!(f, "data command rejected ({:?})", status),
            SdError::Dma(status) => write!(f, "DMA transfer failed ({:?})", status),
            SdError::Card(status) => write!(f, "card data phase failed ({:?})", status),
            SdError::BufferIncomplete {
                transferred,
                expected,
            } => write!(
                f,
                "DMA buffer incomplete ({} of {} words)",
                transferred, expected
            ),
            SdError::StopFailed(status) => write!(f, "stop transmission failed ({:?})", status),
            SdError::DrainTimeout => write!(f, "data path did not drain"),
            SdError::DeviceUnavailable => write!(f, "card geometry unavailable"),
            SdError::InvalidBuffer => write!(f, "buffer is not a whole number of blocks"),
            SdError::OutOfRange => write!(f, "transfer beyond end of card"),
            SdError::InvalidConfig => write!(f, "invalid configuration"),
        }
    }
}

/// Board services the driver needs besides the SDIO and DMA hardware
pub trait Board: Clock {
    /// Card-detect pin reads "card present"
    fn card_detect(&self) -> bool;

    /// Busy or sleeping delay
    fn delay_ms(&self, ms: u32);

    /// Write back and discard cached copies of a DMA source buffer
    fn flush_dcache(&self, addr: usize, len: usize);

    /// Discard cached copies of a DMA destination buffer
    fn invalidate_dcache(&self, addr: usize, len: usize);

    /// Program the DMA stream and SDIO interrupt priorities into the
    /// interrupt controller
    fn set_irq_priorities(&self, priorities: IrqPriorities);
}

/// Hardware handles of one SDIO controller
pub struct SdioHardware<'a, E, S> {
    pub engine: &'a E,
    /// Peripheral-to-memory stream
    pub rx_stream: &'a S,
    /// Memory-to-peripheral stream
    pub tx_stream: &'a S,
}

impl<E, S> Clone for SdioHardware<'_, E, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, S> Copy for SdioHardware<'_, E, S> {}

/// State shared between the transfer task and the interrupt handlers
pub struct Sdio<'a, E, S, W> {
    hw: SdioHardware<'a, E, S>,
    waiter: W,
    dma: DmaMonitor,
    card: CardMonitor<'a, E>,
}

impl<'a, E: CardEngine, S: DmaStream, W: Waiter> Sdio<'a, E, S, W> {
    pub const fn new(hw: SdioHardware<'a, E, S>, waiter: W) -> Self {
        Self {
            hw,
            waiter,
            dma: DmaMonitor::new(),
            card: CardMonitor::new(),
        }
    }

    /// Receive stream interrupt entry point
    pub fn on_dma_rx_interrupt(&self) {
        self.dma.on_interrupt(self.hw.rx_stream, &self.waiter);
    }

    /// Transmit stream interrupt entry point
    pub fn on_dma_tx_interrupt(&self) {
        self.dma.on_interrupt(self.hw.tx_stream, &self.waiter);
    }

    /// SDIO interrupt entry point
    pub fn on_card_interrupt(&self) {
        self.card.on_interrupt(&self.waiter);
    }

    fn arm(&self) {
        self.dma.arm();
        self.card.arm(self.hw.engine);
    }

    fn abort(&self, stream: &S) {
        self.dma.clear_on_abort();
        self.card.clear_on_abort();
        stream.abort();
    }
}

/// Task-side SDIO block device
pub struct SdioBlockDevice<'a, E, S, W, B> {
    sdio: &'a Sdio<'a, E, S, W>,
    board: B,
    config: Config,
    state: ControllerState,
}

impl<'a, E, S, W, B> SdioBlockDevice<'a, E, S, W, B>
where
    E: CardEngine,
    S: DmaStream,
    W: Waiter,
    B: Board,
{
    pub fn new(sdio: &'a Sdio<'a, E, S, W>, board: B, config: Config) -> Self {
        Self {
            sdio,
            board,
            config,
            state: ControllerState::new(),
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    /// Cached card geometry, if any
    pub fn card_info(&self) -> Option<CardInfo> {
        self.state.info()
    }

    /// Card geometry, querying the card (with one retry) if needed
    pub fn get_card_info(&mut self) -> Result<CardInfo, SdError> {
        self.state.get_card_info(self.sdio.hw.engine)
    }

    /// Number of blocks on the card
    pub fn num_blocks(&mut self) -> Result<u64, SdError> {
        self.get_card_info().map(|info| info.num_blocks())
    }

    /// Reset the controller to idle: validate the configuration, forget the
    /// card, and silence both DMA streams and the SDIO data interrupts
    pub fn init(&mut self) -> Result<(), SdError> {
        self.config.validate()?;
        self.state.invalidate();
        self.board.set_irq_priorities(self.config.priorities);

        let hw = self.sdio.hw;
        for stream in [hw.rx_stream, hw.tx_stream] {
            stream.disable();
            stream.disable_interrupts(crate::drivers::dma::DmaFlags::all());
            stream.clear_all_status();
        }
        hw.engine
            .disable_interrupts(engine::CardFlags::DATA_INTERRUPTS);
        hw.engine.clear_static_flags();

        log::info!(
            "SDIO: Initialized (DMA irq priority {:#x}, SDIO irq priority {:#x})",
            self.config.priorities.dma,
            self.config.priorities.card
        );
        Ok(())
    }

    /// Sample the card-detect pin (debounced on insertion)
    pub fn is_card_present(&mut self) -> bool {
        self.state
            .card_present(&self.board, self.config.debounce_ms)
    }

    /// Check a transfer request against the card geometry and return the
    /// byte offset of its first block
    fn prepare(&mut self, block_number: u64, len: usize) -> Result<u64, SdError> {
        if !self.state.ensure_card_info(self.sdio.hw.engine) {
            return Err(SdError::DeviceUnavailable);
        }
        let info = self.state.info().ok_or(SdError::DeviceUnavailable)?;

        let block_size = info.block_size as usize;
        if len == 0 || block_size == 0 || len % block_size != 0 || len % DMA_ITEM_SIZE != 0 {
            return Err(SdError::InvalidBuffer);
        }
        if len / DMA_ITEM_SIZE > MAX_TRANSFER_ITEMS {
            log::error!(
                "SDIO: {} byte transfer exceeds the DMA limit of {} words",
                len,
                MAX_TRANSFER_ITEMS
            );
            return Err(SdError::InvalidBuffer);
        }

        let count = (len / block_size) as u64;
        if info.capacity != 0 {
            let end = block_number.checked_add(count).ok_or(SdError::OutOfRange)?;
            if end > info.num_blocks() {
                return Err(SdError::OutOfRange);
            }
        }

        block_number
            .checked_mul(info.block_size as u64)
            .ok_or(SdError::OutOfRange)
    }

    /// Spin until `active` drops, bounded by the drain timeout
    fn drain(&self, active: impl Fn() -> bool) -> Result<(), SdError> {
        let timeout = Timeout::from_ms(&self.board, self.config.drain_timeout_ms);
        while active() {
            if timeout.is_expired() {
                log::error!(
                    "SDIO: Data path still active after {} ms",
                    self.config.drain_timeout_ms
                );
                return Err(SdError::DrainTimeout);
            }
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Write whole blocks starting at `block_number`
    ///
    /// One call is one DMA transfer, so `data` holds at most
    /// [`MAX_TRANSFER_ITEMS`] words.
    pub fn try_write_block(&mut self, block_number: u64, data: &[u8]) -> Result<(), SdError> {
        let byte_offset = self.prepare(block_number, data.len())?;
        let sdio = self.sdio;
        let engine = sdio.hw.engine;
        let tx = sdio.hw.tx_stream;

        log::debug!(
            "SDIO: Write {} bytes at block {} (offset {:#x})",
            data.len(),
            block_number,
            byte_offset
        );

        // The DMA reads memory directly; push the caller's bytes out of the cache
        self.board
            .flush_dcache(data.as_ptr() as usize, data.len());

        sdio.arm();
        tx.clear_all_status();

        if let Err(status) = engine.issue_write(byte_offset, tx, data) {
            log::error!("SDIO: Write command rejected: {:?}", status);
            sdio.abort(tx);
            return Err(SdError::IssueRejected(status));
        }

        // Transmit completion shows up on the DMA stream first
        let dma_status = sdio.dma.wait(&sdio.waiter);
        let card_status = sdio.card.wait(&sdio.waiter);

        let drained = self.drain(|| engine.tx_active());

        tx.clear_all_status();
        if drained.is_err() {
            tx.abort();
            engine.disable_data_path();
        } else {
            tx.disable();
        }

        let expected = (data.len() / DMA_ITEM_SIZE) as u32;
        let transferred = tx.items_transferred();
        let incomplete = sdio.dma.buffer_error_flag() && transferred != expected;
        if incomplete {
            log::warn!(
                "SDIO: FIFO error with {} of {} words sent, treating write as incomplete",
                transferred,
                expected
            );
        }

        if card_status != CardStatus::Ok {
            Err(SdError::Card(card_status))
        } else if dma_status != DmaStatus::NoError {
            Err(SdError::Dma(dma_status))
        } else if incomplete {
            Err(SdError::BufferIncomplete {
                transferred,
                expected,
            })
        } else {
            drained
        }
    }

    /// Read whole blocks starting at `block_number`
    ///
    /// `data` holds at most [`MAX_TRANSFER_ITEMS`] words.
    pub fn try_read_block(&mut self, block_number: u64, data: &mut [u8]) -> Result<(), SdError> {
        let byte_offset = self.prepare(block_number, data.len())?;
        let sdio = self.sdio;
        let engine = sdio.hw.engine;
        let rx = sdio.hw.rx_stream;

        log::debug!(
            "SDIO: Read {} bytes at block {} (offset {:#x})",
            data.len(),
            block_number,
            byte_offset
        );

        sdio.arm();
        rx.clear_all_status();

        if let Err(status) = engine.issue_read(byte_offset, rx, data) {
            log::error!("SDIO: Read command rejected: {:?}", status);
            sdio.abort(rx);
            return Err(SdError::IssueRejected(status));
        }

        // Receive completion shows up on the engine first
        let card_status = sdio.card.wait(&sdio.waiter);
        let dma_status = sdio.dma.wait(&sdio.waiter);

        let drained = self.drain(|| engine.rx_active());

        let mut result = if card_status != CardStatus::Ok {
            Err(SdError::Card(card_status))
        } else if dma_status != DmaStatus::NoError {
            Err(SdError::Dma(dma_status))
        } else {
            drained
        };

        // Multiple-block reads do not terminate themselves
        if engine.last_operation() == CardOperation::ReadMultipleBlock {
            if let Err(status) = engine.stop_transfer() {
                log::error!("SDIO: Stop transmission failed: {:?}", status);
                result = result.and(Err(SdError::StopFailed(status)));
            }
        }

        rx.clear_all_status();
        if drained.is_err() {
            rx.abort();
        } else {
            rx.disable();
        }
        engine.disable_data_path();
        engine.clear_static_flags();

        // The DMA wrote memory behind the cache's back
        self.board
            .invalidate_dcache(data.as_ptr() as usize, data.len());

        result
    }
}

impl<'a, E, S, W, B> BlockDevice for SdioBlockDevice<'a, E, S, W, B>
where
    E: CardEngine,
    S: DmaStream,
    W: Waiter,
    B: Board,
{
    type Error = SdError;

    fn initialize(&mut self) -> Result<(), SdError> {
        self.init()
    }

    fn card_present(&mut self) -> bool {
        self.is_card_present()
    }

    fn block_size(&mut self) -> Result<u32, SdError> {
        self.state.block_size(self.sdio.hw.engine)
    }

    fn read_block(&mut self, block_number: u64, data: &mut [u8]) -> bool {
        match self.try_read_block(block_number, data) {
            Ok(()) => true,
            Err(e) => {
                log::error!("SDIO: Read at block {} failed: {}", block_number, e);
                false
            }
        }
    }

    fn write_block(&mut self, block_number: u64, data: &[u8]) -> bool {
        match self.try_write_block(block_number, data) {
            Ok(()) => true,
            Err(e) => {
                log::error!("SDIO: Write at block {} failed: {}", block_number, e);
                false
            }
        }
    }
}
