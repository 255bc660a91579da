//! DMA completion monitor
//!
//! Tracks one DMA stream transfer at a time. The task arms the monitor
//! before the stream can raise an interrupt and later waits on it; the
//! stream interrupt handler concludes the transfer exactly once.
//!
//! A FIFO error does not conclude a transfer. On the transmit path the
//! FIFO error flag fires spuriously around a legitimate completion while
//! the item counter still lags behind, so the flag is only latched for the
//! buffer-error check the write path performs afterwards.

use super::completion::Waiter;
use crate::drivers::dma::{DmaFlags, DmaStatus, DmaStream};
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Completion state of one DMA stream transfer
pub struct DmaMonitor {
    finished: AtomicBool,
    status: AtomicU8,
    buffer_error: AtomicBool,
}

impl DmaMonitor {
    /// Idle monitor (finished, no error)
    pub const fn new() -> Self {
        Self {
            finished: AtomicBool::new(true),
            status: AtomicU8::new(DmaStatus::NoError as u8),
            buffer_error: AtomicBool::new(false),
        }
    }

    /// Open the window in which the interrupt handler may conclude a
    /// transfer. Must happen before the stream is enabled.
    pub fn arm(&self) {
        self.buffer_error.store(false, Ordering::Relaxed);
        self.status.store(DmaStatus::NoError as u8, Ordering::Relaxed);
        self.finished.store(false, Ordering::Release);
    }

    /// Block until the transfer concluded and return its status
    pub fn wait<W: Waiter + ?Sized>(&self, waiter: &W) -> DmaStatus {
        waiter.wait_until(&|| self.finished.load(Ordering::Acquire));
        DmaStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Conclude a transfer the hardware never started
    pub fn clear_on_abort(&self) {
        self.status
            .store(DmaStatus::TransferError as u8, Ordering::Relaxed);
        self.finished.store(true, Ordering::Release);
    }

    /// FIFO error seen during the transfer; meaningful after [`wait`](Self::wait)
    pub fn buffer_error_flag(&self) -> bool {
        self.buffer_error.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Stream interrupt handler body
    ///
    /// Shared by the receive and the transmit stream; each calls it with
    /// its own stream.
    pub fn on_interrupt<S: DmaStream + ?Sized, W: Waiter + ?Sized>(&self, stream: &S, waiter: &W) {
        let pending = stream.status() & stream.enabled_interrupts();

        if self.finished.load(Ordering::Acquire) {
            // Nothing is armed: silence the stream without touching state
            log::debug!("DMA: interrupt outside a transfer ({:?})", pending);
            stream.disable_interrupts(DmaFlags::all());
            stream.clear_status(pending);
            return;
        }

        let mut finished = false;

        if pending.contains(DmaFlags::TRANSFER_COMPLETE) {
            stream.disable_interrupts(DmaFlags::TRANSFER_COMPLETE);
            stream.clear_status(DmaFlags::TRANSFER_COMPLETE);
            self.status
                .store(DmaStatus::NoError as u8, Ordering::Relaxed);
            finished = true;
        }

        if pending.contains(DmaFlags::FIFO_ERROR) {
            stream.disable_interrupts(DmaFlags::FIFO_ERROR);
            stream.clear_status(DmaFlags::FIFO_ERROR);
            self.buffer_error.store(true, Ordering::Release);
        }

        if pending.contains(DmaFlags::TRANSFER_ERROR) {
            stream.disable_interrupts(DmaFlags::TRANSFER_ERROR);
            stream.clear_status(DmaFlags::TRANSFER_ERROR);
            self.status
                .store(DmaStatus::TransferError as u8, Ordering::Relaxed);
            finished = true;
        }

        // Sources this driver does not use
        let unused = pending & (DmaFlags::HALF_TRANSFER | DmaFlags::DIRECT_MODE_ERROR);
        if !unused.is_empty() {
            stream.disable_interrupts(unused);
            stream.clear_status(unused);
        }

        if finished {
            stream.disable_interrupts(DmaFlags::all());
            self.finished.store(true, Ordering::Release);
            waiter.notify();
        }
    }
}

impl Default for DmaMonitor {
    fn default() -> Self {
        Self::new()
    }
}
