//! Controller configuration

use super::SdError;

/// Default DMA stream interrupt priority (Cortex-M: lower is more urgent)
pub const DEFAULT_DMA_PRIORITY: u8 = 0x40;

/// Default SDIO interrupt priority
pub const DEFAULT_CARD_PRIORITY: u8 = 0x50;

/// Default card-detect debounce delay (milliseconds)
pub const DEFAULT_DEBOUNCE_MS: u32 = 50;

/// Default bound on waiting for TXACT/RXACT to drop after both completion
/// interrupts (milliseconds)
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 100;

/// NVIC priorities of the two interrupt sources
///
/// Initialization hands these to [`Board::set_irq_priorities`](super::Board::set_irq_priorities)
/// to program the interrupt controller. The DMA stream interrupts must
/// preempt the SDIO interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqPriorities {
    pub dma: u8,
    pub card: u8,
}

impl Default for IrqPriorities {
    fn default() -> Self {
        Self {
            dma: DEFAULT_DMA_PRIORITY,
            card: DEFAULT_CARD_PRIORITY,
        }
    }
}

/// Block driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub priorities: IrqPriorities,
    pub debounce_ms: u32,
    pub drain_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            priorities: IrqPriorities::default(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<(), SdError> {
        if self.priorities.dma >= self.priorities.card {
            log::error!(
                "SDIO: DMA priority {:#x} must be more urgent than SDIO priority {:#x}",
                self.priorities.dma,
                self.priorities.card
            );
            return Err(SdError::InvalidConfig);
        }
        if self.drain_timeout_ms == 0 {
            log::error!("SDIO: drain timeout must be non-zero");
            return Err(SdError::InvalidConfig);
        }
        Ok(())
    }
}
