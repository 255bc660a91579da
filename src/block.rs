//! Generic block-device capability set
//!
//! This is the interface a filesystem (or any other consumer such as a USB
//! mass storage class) uses to talk to a block device. Transfers report a
//! plain success flag; the device logs the reason for a failure.

/// Block storage device
pub trait BlockDevice {
    /// Error raised when a device precondition fails
    type Error;

    /// Bring the device into its idle state
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Whether a medium is present
    fn card_present(&mut self) -> bool;

    /// Bytes per block; buffers passed to the transfer methods must be a
    /// whole number of blocks of this size
    fn block_size(&mut self) -> Result<u32, Self::Error>;

    /// Read the blocks starting at `block_number` into `data`
    fn read_block(&mut self, block_number: u64, data: &mut [u8]) -> bool;

    /// Write `data` to the blocks starting at `block_number`
    fn write_block(&mut self, block_number: u64, data: &[u8]) -> bool;
}
