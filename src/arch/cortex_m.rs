//! Cortex-M event, barrier and cache primitives
//!
//! On ARM targets these are thin wrappers around the corresponding
//! instructions. On every other target (host builds, tests) they degrade to
//! compiler/CPU hints so the rest of the crate builds unchanged.

use tock_registers::interfaces::Writeable;
use tock_registers::register_structs;
use tock_registers::registers::WriteOnly;

/// Base address of the cache maintenance operations block in the SCB
pub const CACHE_MAINTENANCE_BASE: usize = 0xE000_EF50;

/// Cortex-M7 data cache line size in bytes
pub const DCACHE_LINE_SIZE: usize = 32;

/// Sleep until an event is signalled
///
/// Exception entry and return set the event register, so an interrupt that
/// fires between the caller's check and this instruction makes it return
/// immediately.
#[inline]
pub fn wait_for_event() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("wfe", options(nomem, nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "arm"))]
    core::hint::spin_loop();
}

/// Signal an event to every core (and to ourselves)
#[inline]
pub fn send_event() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("sev", options(nomem, nostack, preserves_flags));
    }
}

/// Data synchronization barrier
#[inline]
pub fn dsb() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "arm"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Instruction synchronization barrier
#[inline]
pub fn isb() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("isb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "arm"))]
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

register_structs! {
    /// SCB cache maintenance operations (ARMv7-M, 0xE000EF50)
    pub CacheMaintenanceRegisters {
        /// I-cache invalidate all to PoU
        (0x00 => iciallu: WriteOnly<u32>),
        (0x04 => _reserved0),
        /// I-cache invalidate by MVA to PoU
        (0x08 => icimvau: WriteOnly<u32>),
        /// D-cache invalidate by MVA to PoC
        (0x0C => dcimvac: WriteOnly<u32>),
        /// D-cache invalidate by set/way
        (0x10 => dcisw: WriteOnly<u32>),
        /// D-cache clean by MVA to PoU
        (0x14 => dccmvau: WriteOnly<u32>),
        /// D-cache clean by MVA to PoC
        (0x18 => dccmvac: WriteOnly<u32>),
        /// D-cache clean by set/way
        (0x1C => dccsw: WriteOnly<u32>),
        /// D-cache clean and invalidate by MVA to PoC
        (0x20 => dccimvac: WriteOnly<u32>),
        /// D-cache clean and invalidate by set/way
        (0x24 => dccisw: WriteOnly<u32>),
        (0x28 => @END),
    }
}

/// Addresses of every cache line touched by `[addr, addr + len)`
pub fn cache_lines(addr: usize, len: usize) -> impl Iterator<Item = usize> {
    let start = addr & !(DCACHE_LINE_SIZE - 1);
    let end = if len == 0 { start } else { addr + len };
    (start..end).step_by(DCACHE_LINE_SIZE)
}

/// Cortex-M7 L1 data cache maintenance by address
///
/// Maintenance works on whole lines. Buffers that are not aligned to
/// [`DCACHE_LINE_SIZE`] share their edge lines with neighbouring data,
/// which an invalidate discards.
pub struct CortexM7DataCache {
    regs: &'static CacheMaintenanceRegisters,
}

impl CortexM7DataCache {
    /// Map the core's cache maintenance block
    ///
    /// # Safety
    ///
    /// Must only be used on a core that implements the ARMv7-M cache
    /// maintenance block at [`CACHE_MAINTENANCE_BASE`].
    pub unsafe fn new() -> Self {
        Self::from_base(CACHE_MAINTENANCE_BASE)
    }

    /// Map a cache maintenance block at `base`
    ///
    /// # Safety
    ///
    /// `base` must point to a valid, suitably aligned
    /// [`CacheMaintenanceRegisters`] block that lives for `'static`.
    pub unsafe fn from_base(base: usize) -> Self {
        Self {
            regs: &*(base as *const CacheMaintenanceRegisters),
        }
    }

    /// Discard cached copies of `[addr, addr + len)`
    pub fn invalidate(&self, addr: usize, len: usize) {
        dsb();
        for line in cache_lines(addr, len) {
            self.regs.dcimvac.set(line as u32);
        }
        dsb();
        isb();
    }

    /// Write back and discard cached copies of `[addr, addr + len)`
    pub fn clean_invalidate(&self, addr: usize, len: usize) {
        dsb();
        for line in cache_lines(addr, len) {
            self.regs.dccimvac.set(line as u32);
        }
        dsb();
        isb();
    }
}
