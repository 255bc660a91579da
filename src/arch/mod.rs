//! Architecture support
//!
//! CPU primitives the driver needs from the target core: the event
//! register used to sleep until an interrupt completes a transfer, memory
//! barriers, and data cache maintenance for DMA buffers.

pub mod cortex_m;
