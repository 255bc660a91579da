//! sdio-block - DMA-driven SD card block driver
//!
//! This library connects a generic block-device abstraction to an
//! SD/SDHC/SDXC card attached through an SDIO peripheral and a paired DMA
//! engine. Two interrupt sources (the DMA stream and the SDIO data phase)
//! jointly confirm each transfer; the driver reduces their outcomes to a
//! single pass/fail result.
//!
//! The card-protocol library, pin setup and clock setup are supplied by the
//! board through the traits in [`drivers::sdio::engine`] and
//! [`drivers::dma`].

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod block;
pub mod drivers;
pub mod logger;
pub mod time;

pub use block::BlockDevice;
pub use drivers::dma::{DmaFlags, DmaStatus, DmaStream};
pub use drivers::sdio::engine::{Addressing, CardEngine, CardFlags, CardInfo, CardOperation, CardStatus};
pub use drivers::sdio::{Board, Config, IrqPriorities, Sdio, SdioBlockDevice, SdioHardware, SdError};
pub use drivers::sdio::completion::Waiter;
