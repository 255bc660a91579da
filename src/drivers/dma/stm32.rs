//! STM32F4/F7 DMA stream
//!
//! One stream of a DMA controller, configured the way the SDIO peripheral
//! needs it: word-sized items, 4-beat bursts on both sides, FIFO mode with
//! a full threshold, and the SDIO peripheral as flow controller.

use super::regs::{flag_shift, DmaRegisters, StreamRegisters, SxCR, SxFCR, SxNDTR};
use super::{DmaFlags, DmaStream};
use core::sync::atomic::{AtomicU32, Ordering};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

/// Polls of the `EN` bit before an abort gives up
const ABORT_SPIN_LIMIT: u32 = 100_000;

/// NDTR is forced to this value when the peripheral controls the flow
const PERIPHERAL_FLOW_ITEMS: u32 = 0xFFFF;

/// The DMA stream number. What other microcontrollers refer to as
/// "channel", STM32 refers to as "stream". A controller has eight.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamId {
    Stream0 = 0,
    Stream1 = 1,
    Stream2 = 2,
    Stream3 = 3,
    Stream4 = 4,
    Stream5 = 5,
    Stream6 = 6,
    Stream7 = 7,
}

/// Request channel routed to a stream (RM0090 Table 43)
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelId {
    Channel0 = 0,
    Channel1 = 1,
    Channel2 = 2,
    Channel3 = 3,
    Channel4 = 4,
    Channel5 = 5,
    Channel6 = 6,
    Channel7 = 7,
}

/// DMA transfer direction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    PeripheralToMemory,
    MemoryToPeripheral,
}

/// Addresses and size of one transfer
#[derive(Debug, Copy, Clone)]
pub struct Transfer {
    pub direction: Direction,
    /// Peripheral data register (SDIO FIFO)
    pub peripheral_addr: u32,
    pub memory_addr: u32,
    /// Item count; ignored by the hardware under peripheral flow control
    pub items: u16,
    /// Let the peripheral end the transfer (required for SDIO)
    pub peripheral_flow_control: bool,
}

/// A single stream of an STM32 DMA controller
pub struct Stm32DmaStream {
    regs: *const DmaRegisters,
    id: StreamId,
    channel: ChannelId,
    configured_items: AtomicU32,
}

// Safety: the register block is MMIO owned by this stream, and every
// access goes through volatile cells.
unsafe impl Send for Stm32DmaStream {}
unsafe impl Sync for Stm32DmaStream {}

impl Stm32DmaStream {
    /// Bind to stream `id` of the controller mapped at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the address of a DMA controller register block (or a
    /// `'static` memory block laid out like one), and nothing else may
    /// drive stream `id`.
    pub const unsafe fn new(base: usize, id: StreamId, channel: ChannelId) -> Self {
        Self {
            regs: base as *const DmaRegisters,
            id,
            channel,
            configured_items: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    fn regs(&self) -> &DmaRegisters {
        unsafe { &*self.regs }
    }

    fn stream(&self) -> &StreamRegisters {
        &self.regs().streams[self.id as usize]
    }

    fn is_high(&self) -> bool {
        (self.id as u8) >= 4
    }

    /// Program a transfer. The stream must be disabled.
    pub fn configure(&self, transfer: &Transfer) {
        let stream = self.stream();

        stream.par.set(transfer.peripheral_addr);
        stream.m0ar.set(transfer.memory_addr);
        stream.ndtr.write(SxNDTR::NDT.val(transfer.items as u32));

        let dir = match transfer.direction {
            Direction::PeripheralToMemory => SxCR::DIR::PeripheralToMemory,
            Direction::MemoryToPeripheral => SxCR::DIR::MemoryToPeripheral,
        };
        let flow = if transfer.peripheral_flow_control {
            SxCR::PFCTRL::SET
        } else {
            SxCR::PFCTRL::CLEAR
        };

        stream.cr.write(
            SxCR::CHSEL.val(self.channel as u32)
                + SxCR::MBURST::Incr4
                + SxCR::PBURST::Incr4
                + SxCR::PL::VeryHigh
                + SxCR::MSIZE::Word
                + SxCR::PSIZE::Word
                + SxCR::MINC::SET
                + SxCR::PINC::CLEAR
                + dir
                + flow,
        );
        stream
            .fcr
            .write(SxFCR::DMDIS::SET + SxFCR::FTH::Full);

        let items = if transfer.peripheral_flow_control {
            PERIPHERAL_FLOW_ITEMS
        } else {
            transfer.items as u32
        };
        self.configured_items.store(items, Ordering::Relaxed);
    }

    /// Start the configured transfer
    pub fn enable(&self) {
        self.stream().cr.modify(SxCR::EN::SET);
    }
}

impl DmaStream for Stm32DmaStream {
    fn status(&self) -> DmaFlags {
        let raw = if self.is_high() {
            self.regs().hisr.get()
        } else {
            self.regs().lisr.get()
        };
        DmaFlags::from_bits_truncate((raw >> flag_shift(self.id as usize)) as u8)
    }

    fn clear_status(&self, flags: DmaFlags) {
        let value = (flags.bits() as u32) << flag_shift(self.id as usize);
        if self.is_high() {
            self.regs().hifcr.set(value);
        } else {
            self.regs().lifcr.set(value);
        }
    }

    fn enabled_interrupts(&self) -> DmaFlags {
        let stream = self.stream();
        let mut flags = DmaFlags::empty();
        flags.set(DmaFlags::TRANSFER_COMPLETE, stream.cr.is_set(SxCR::TCIE));
        flags.set(DmaFlags::HALF_TRANSFER, stream.cr.is_set(SxCR::HTIE));
        flags.set(DmaFlags::TRANSFER_ERROR, stream.cr.is_set(SxCR::TEIE));
        flags.set(DmaFlags::DIRECT_MODE_ERROR, stream.cr.is_set(SxCR::DMEIE));
        flags.set(DmaFlags::FIFO_ERROR, stream.fcr.is_set(SxFCR::FEIE));
        flags
    }

    fn enable_interrupts(&self, flags: DmaFlags) {
        let stream = self.stream();
        if flags.contains(DmaFlags::TRANSFER_COMPLETE) {
            stream.cr.modify(SxCR::TCIE::SET);
        }
        if flags.contains(DmaFlags::HALF_TRANSFER) {
            stream.cr.modify(SxCR::HTIE::SET);
        }
        if flags.contains(DmaFlags::TRANSFER_ERROR) {
            stream.cr.modify(SxCR::TEIE::SET);
        }
        if flags.contains(DmaFlags::DIRECT_MODE_ERROR) {
            stream.cr.modify(SxCR::DMEIE::SET);
        }
        if flags.contains(DmaFlags::FIFO_ERROR) {
            stream.fcr.modify(SxFCR::FEIE::SET);
        }
    }

    fn disable_interrupts(&self, flags: DmaFlags) {
        let stream = self.stream();
        if flags.contains(DmaFlags::TRANSFER_COMPLETE) {
            stream.cr.modify(SxCR::TCIE::CLEAR);
        }
        if flags.contains(DmaFlags::HALF_TRANSFER) {
            stream.cr.modify(SxCR::HTIE::CLEAR);
        }
        if flags.contains(DmaFlags::TRANSFER_ERROR) {
            stream.cr.modify(SxCR::TEIE::CLEAR);
        }
        if flags.contains(DmaFlags::DIRECT_MODE_ERROR) {
            stream.cr.modify(SxCR::DMEIE::CLEAR);
        }
        if flags.contains(DmaFlags::FIFO_ERROR) {
            stream.fcr.modify(SxFCR::FEIE::CLEAR);
        }
    }

    fn is_enabled(&self) -> bool {
        self.stream().cr.is_set(SxCR::EN)
    }

    fn disable(&self) {
        self.stream().cr.modify(SxCR::EN::CLEAR);
    }

    fn abort(&self) {
        self.disable();

        // EN reads back 1 until the current AHB burst has completed
        for _ in 0..ABORT_SPIN_LIMIT {
            if !self.is_enabled() {
                return;
            }
            core::hint::spin_loop();
        }
        log::warn!("DMA: stream {:?} still enabled after abort", self.id);
    }

    fn items_transferred(&self) -> u32 {
        let remaining = self.stream().ndtr.read(SxNDTR::NDT);
        self.configured_items
            .load(Ordering::Relaxed)
            .saturating_sub(remaining)
    }
}
