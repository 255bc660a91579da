//! Card-protocol engine interface
//!
//! The SDIO peripheral together with the card-protocol library that drives
//! it (command encoding, card identification, CSD parsing). The block
//! driver treats it as a black box: it asks for the card geometry, issues
//! DMA data commands, and inspects and masks the data-phase status flags.

use crate::drivers::dma::DmaStream;

bitflags::bitflags! {
    /// SDIO status flags (bit positions of the STM32 `SDIO_STA` register)
    ///
    /// The same bit layout is used for the interrupt mask register, so a
    /// set of flags also names the interrupt sources that report them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CardFlags: u32 {
        /// Command response received, CRC check failed
        const CMD_CRC_FAIL = 1 << 0;
        /// Data block sent/received, CRC check failed
        const DATA_CRC_FAIL = 1 << 1;
        /// Command response timeout
        const CMD_TIMEOUT = 1 << 2;
        /// Data timeout
        const DATA_TIMEOUT = 1 << 3;
        /// Transmit FIFO underrun
        const TX_UNDERRUN = 1 << 4;
        /// Receive FIFO overrun
        const RX_OVERRUN = 1 << 5;
        /// Command response received, CRC check passed
        const CMD_RESPONSE_END = 1 << 6;
        /// Command sent (no response required)
        const CMD_SENT = 1 << 7;
        /// Data end (data counter reached zero)
        const DATA_END = 1 << 8;
        /// Start bit not detected on all data lines in wide bus mode
        const START_BIT_ERROR = 1 << 9;
        /// Data block sent/received, CRC check passed
        const DATA_BLOCK_END = 1 << 10;
        /// Command transfer in progress
        const CMD_ACTIVE = 1 << 11;
        /// Data transmit in progress
        const TX_ACTIVE = 1 << 12;
        /// Data receive in progress
        const RX_ACTIVE = 1 << 13;
    }
}

impl CardFlags {
    /// Interrupt sources of the data phase
    pub const DATA_INTERRUPTS: CardFlags = CardFlags::DATA_CRC_FAIL
        .union(CardFlags::DATA_TIMEOUT)
        .union(CardFlags::TX_UNDERRUN)
        .union(CardFlags::RX_OVERRUN)
        .union(CardFlags::DATA_END)
        .union(CardFlags::START_BIT_ERROR);

    /// Latched flags cleared through the interrupt clear register
    pub const STATIC_FLAGS: CardFlags = CardFlags::CMD_CRC_FAIL
        .union(CardFlags::DATA_CRC_FAIL)
        .union(CardFlags::CMD_TIMEOUT)
        .union(CardFlags::DATA_TIMEOUT)
        .union(CardFlags::TX_UNDERRUN)
        .union(CardFlags::RX_OVERRUN)
        .union(CardFlags::CMD_RESPONSE_END)
        .union(CardFlags::CMD_SENT)
        .union(CardFlags::DATA_END)
        .union(CardFlags::START_BIT_ERROR)
        .union(CardFlags::DATA_BLOCK_END);
}

/// Outcome of a card-engine operation or data phase
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardStatus {
    Ok = 0,
    CrcFail = 1,
    Timeout = 2,
    RxOverrun = 3,
    TxUnderrun = 4,
    /// Forced by the driver when it gave up on a transfer, as opposed to a
    /// code reported by the hardware
    Error = 5,
}

impl CardStatus {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => CardStatus::Ok,
            1 => CardStatus::CrcFail,
            2 => CardStatus::Timeout,
            3 => CardStatus::RxOverrun,
            4 => CardStatus::TxUnderrun,
            _ => CardStatus::Error,
        }
    }
}

/// The data command most recently issued by the card engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardOperation {
    None,
    ReadSingleBlock,
    ReadMultipleBlock,
    WriteSingleBlock,
    WriteMultipleBlock,
    Other,
}

/// How the card interprets data command arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Standard capacity: byte addresses
    Byte,
    /// SDHC/SDXC: block addresses
    Block,
}

/// Card geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardInfo {
    /// Bytes per block
    pub block_size: u32,
    /// Capacity in bytes
    pub capacity: u64,
    pub addressing: Addressing,
}

impl CardInfo {
    /// Number of blocks on the card
    pub fn num_blocks(&self) -> u64 {
        if self.block_size == 0 {
            0
        } else {
            self.capacity / self.block_size as u64
        }
    }

    /// SDHC/SDXC card
    pub fn is_high_capacity(&self) -> bool {
        self.addressing == Addressing::Block
    }
}

/// SDIO peripheral plus card-protocol library
///
/// Methods take `&self` because the data-phase interrupt handler inspects
/// and masks the same registers while the task is blocked in a transfer.
pub trait CardEngine {
    /// Query the card geometry (identification and CSD read)
    fn initialize(&self) -> Result<CardInfo, CardStatus>;

    /// Configure `stream` and start reading into `data` from `byte_offset`
    ///
    /// Issues a single- or multiple-block read depending on the buffer
    /// length. Returns once the command is accepted; completion is
    /// reported through the DMA and SDIO interrupts.
    fn issue_read<S: DmaStream>(
        &self,
        byte_offset: u64,
        stream: &S,
        data: &mut [u8],
    ) -> Result<(), CardStatus>;

    /// Configure `stream` and start writing `data` at `byte_offset`
    fn issue_write<S: DmaStream>(
        &self,
        byte_offset: u64,
        stream: &S,
        data: &[u8],
    ) -> Result<(), CardStatus>;

    /// Send STOP_TRANSMISSION
    fn stop_transfer(&self) -> Result<(), CardStatus>;

    /// The data command issued last
    fn last_operation(&self) -> CardOperation;

    /// Current status flags
    fn flags(&self) -> CardFlags;

    /// Clear latched status flags
    fn clear_flags(&self, flags: CardFlags);

    /// Mask interrupt sources
    fn disable_interrupts(&self, flags: CardFlags);

    /// Disable the data state machine
    fn disable_data_path(&self);

    /// Clear every latched static flag
    fn clear_static_flags(&self) {
        self.clear_flags(CardFlags::STATIC_FLAGS);
    }

    /// Data transmit still in progress
    fn tx_active(&self) -> bool {
        self.flags().contains(CardFlags::TX_ACTIVE)
    }

    /// Data receive still in progress
    fn rx_active(&self) -> bool {
        self.flags().contains(CardFlags::RX_ACTIVE)
    }
}
