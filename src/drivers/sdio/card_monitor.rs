//! Card completion monitor
//!
//! Tracks the data phase of the SDIO engine. One interrupt source serves
//! both directions; the handler classifies the first completion flag it
//! finds and masks the data-phase sources.

use super::completion::Waiter;
use super::engine::{CardEngine, CardFlags, CardStatus};
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

/// Completion flags in classification order
const CLASSIFICATION: [(CardFlags, CardStatus); 5] = [
    (CardFlags::DATA_END, CardStatus::Ok),
    (CardFlags::DATA_CRC_FAIL, CardStatus::CrcFail),
    (CardFlags::DATA_TIMEOUT, CardStatus::Timeout),
    (CardFlags::RX_OVERRUN, CardStatus::RxOverrun),
    (CardFlags::TX_UNDERRUN, CardStatus::TxUnderrun),
];

/// Completion state of one SDIO data phase
pub struct CardMonitor<'a, E> {
    finished: AtomicBool,
    status: AtomicU8,
    /// Engine captured at arm time; null until the first arm
    device: AtomicPtr<E>,
    _device: PhantomData<&'a E>,
}

impl<'a, E: CardEngine> CardMonitor<'a, E> {
    /// Idle monitor (finished, status OK)
    pub const fn new() -> Self {
        Self {
            finished: AtomicBool::new(true),
            status: AtomicU8::new(CardStatus::Ok as u8),
            device: AtomicPtr::new(ptr::null_mut()),
            _device: PhantomData,
        }
    }

    /// Open the window for one data phase on `device`
    pub fn arm(&self, device: &'a E) {
        self.device
            .store(device as *const E as *mut E, Ordering::Relaxed);
        self.status.store(CardStatus::Ok as u8, Ordering::Relaxed);
        self.finished.store(false, Ordering::Release);
    }

    /// Block until the data phase concluded and return its status
    pub fn wait<W: Waiter + ?Sized>(&self, waiter: &W) -> CardStatus {
        waiter.wait_until(&|| self.finished.load(Ordering::Acquire));
        CardStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Conclude a data phase the hardware never started
    pub fn clear_on_abort(&self) {
        self.status.store(CardStatus::Error as u8, Ordering::Relaxed);
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn device(&self) -> Option<&'a E> {
        let device = self.device.load(Ordering::Acquire);
        // Safety: only ever set from a `&'a E` in `arm`
        unsafe { device.as_ref() }
    }

    /// SDIO interrupt handler body
    pub fn on_interrupt<W: Waiter + ?Sized>(&self, waiter: &W) {
        let Some(device) = self.device() else {
            log::warn!("SDIO: data interrupt before any transfer was armed");
            return;
        };

        if self.finished.load(Ordering::Acquire) {
            log::debug!("SDIO: data interrupt outside a transfer");
            device.disable_interrupts(CardFlags::DATA_INTERRUPTS);
            return;
        }

        let flags = device.flags();
        match CLASSIFICATION
            .iter()
            .find(|(flag, _)| flags.contains(*flag))
        {
            Some(&(flag, status)) => {
                device.clear_flags(flag);
                self.status.store(status as u8, Ordering::Relaxed);
            }
            None => {
                // No completion flag: the previous status is kept as is
                log::warn!(
                    "SDIO: data interrupt without completion flag ({:?}), keeping {:?}",
                    flags,
                    CardStatus::from_u8(self.status.load(Ordering::Relaxed))
                );
            }
        }

        device.disable_interrupts(CardFlags::DATA_INTERRUPTS);
        self.finished.store(true, Ordering::Release);
        waiter.notify();
    }
}

impl<'a, E: CardEngine> Default for CardMonitor<'a, E> {
    fn default() -> Self {
        Self::new()
    }
}
