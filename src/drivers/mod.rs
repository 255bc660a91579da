//! Hardware drivers
//!
//! The DMA stream interface and its STM32 implementation, and the SDIO
//! block driver built on top of it.

pub mod dma;
pub mod sdio;
