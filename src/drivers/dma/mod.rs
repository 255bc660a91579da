//! DMA engine interface
//!
//! The SDIO driver only needs a narrow view of a DMA stream: its event
//! flags, its interrupt enables, teardown, and how many items it moved.
//! [`stm32::Stm32DmaStream`] implements that view for the STM32F4/F7 DMA
//! controllers; tests provide their own.

pub mod regs;
pub mod stm32;

bitflags::bitflags! {
    /// Per-stream DMA event flags
    ///
    /// Bit positions match one stream's group in the STM32 `LISR`/`HISR`
    /// registers, so the raw group can be converted directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaFlags: u8 {
        /// FIFO overrun/underrun
        const FIFO_ERROR = 1 << 0;
        /// Direct mode error
        const DIRECT_MODE_ERROR = 1 << 2;
        /// Bus error during a transfer
        const TRANSFER_ERROR = 1 << 3;
        /// Half of the items transferred
        const HALF_TRANSFER = 1 << 4;
        /// All items transferred
        const TRANSFER_COMPLETE = 1 << 5;
    }
}

/// Outcome of one DMA stream transfer
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaStatus {
    NoError = 0,
    TransferError = 1,
}

impl DmaStatus {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => DmaStatus::NoError,
            _ => DmaStatus::TransferError,
        }
    }
}

/// One DMA stream as seen by the SDIO driver
///
/// All methods take `&self`: the stream is register state shared between
/// the task that starts a transfer and the interrupt that completes it.
pub trait DmaStream {
    /// Pending event flags
    fn status(&self) -> DmaFlags;

    /// Clear the given event flags
    fn clear_status(&self, flags: DmaFlags);

    /// Clear every event flag of the stream
    fn clear_all_status(&self) {
        self.clear_status(DmaFlags::all());
    }

    /// Event sources currently allowed to raise the stream interrupt
    fn enabled_interrupts(&self) -> DmaFlags;

    /// Allow the given event sources to raise the stream interrupt
    fn enable_interrupts(&self, flags: DmaFlags);

    /// Stop the given event sources from raising the stream interrupt
    fn disable_interrupts(&self, flags: DmaFlags);

    /// Whether the stream is enabled
    fn is_enabled(&self) -> bool;

    /// Disable the stream
    fn disable(&self);

    /// Disable the stream and wait for the hardware to release it
    fn abort(&self);

    /// Number of items (words for SDIO) moved by the current transfer
    fn items_transferred(&self) -> u32;
}

impl<S: DmaStream + ?Sized> DmaStream for &S {
    fn status(&self) -> DmaFlags {
        (**self).status()
    }

    fn clear_status(&self, flags: DmaFlags) {
        (**self).clear_status(flags)
    }

    fn clear_all_status(&self) {
        (**self).clear_all_status()
    }

    fn enabled_interrupts(&self) -> DmaFlags {
        (**self).enabled_interrupts()
    }

    fn enable_interrupts(&self, flags: DmaFlags) {
        (**self).enable_interrupts(flags)
    }

    fn disable_interrupts(&self, flags: DmaFlags) {
        (**self).disable_interrupts(flags)
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn disable(&self) {
        (**self).disable()
    }

    fn abort(&self) {
        (**self).abort()
    }

    fn items_transferred(&self) -> u32 {
        (**self).items_transferred()
    }
}
