//! STM32F4/F7 DMA controller register definitions using tock-registers
//!
//! # References
//! - RM0090 Section 10.5 (DMA registers)
//! - RM0410 Section 8.5

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

/// DMA1 controller base address (STM32F4/F7)
pub const DMA1_BASE: usize = 0x4002_6000;

/// DMA2 controller base address (STM32F4/F7); SDIO requests live on DMA2
pub const DMA2_BASE: usize = 0x4002_6400;

register_bitfields! [
    u32,
    /// Stream x configuration register (DMA_SxCR)
    pub SxCR [
        /// Channel selection
        CHSEL OFFSET(25) NUMBITS(3) [],
        /// Memory burst transfer configuration
        MBURST OFFSET(23) NUMBITS(2) [
            Single = 0,
            Incr4 = 1,
            Incr8 = 2,
            Incr16 = 3
        ],
        /// Peripheral burst transfer configuration
        PBURST OFFSET(21) NUMBITS(2) [
            Single = 0,
            Incr4 = 1,
            Incr8 = 2,
            Incr16 = 3
        ],
        /// Current target (only in double buffer mode)
        CT OFFSET(19) NUMBITS(1) [],
        /// Double buffer mode
        DBM OFFSET(18) NUMBITS(1) [],
        /// Priority level
        PL OFFSET(16) NUMBITS(2) [
            Low = 0,
            Medium = 1,
            High = 2,
            VeryHigh = 3
        ],
        /// Peripheral increment offset size
        PINCOS OFFSET(15) NUMBITS(1) [],
        /// Memory data size
        MSIZE OFFSET(13) NUMBITS(2) [
            Byte = 0,
            HalfWord = 1,
            Word = 2
        ],
        /// Peripheral data size
        PSIZE OFFSET(11) NUMBITS(2) [
            Byte = 0,
            HalfWord = 1,
            Word = 2
        ],
        /// Memory increment mode
        MINC OFFSET(10) NUMBITS(1) [],
        /// Peripheral increment mode
        PINC OFFSET(9) NUMBITS(1) [],
        /// Circular mode
        CIRC OFFSET(8) NUMBITS(1) [],
        /// Data transfer direction
        DIR OFFSET(6) NUMBITS(2) [
            PeripheralToMemory = 0,
            MemoryToPeripheral = 1,
            MemoryToMemory = 2
        ],
        /// Peripheral flow controller
        PFCTRL OFFSET(5) NUMBITS(1) [],
        /// Transfer complete interrupt enable
        TCIE OFFSET(4) NUMBITS(1) [],
        /// Half transfer interrupt enable
        HTIE OFFSET(3) NUMBITS(1) [],
        /// Transfer error interrupt enable
        TEIE OFFSET(2) NUMBITS(1) [],
        /// Direct mode error interrupt enable
        DMEIE OFFSET(1) NUMBITS(1) [],
        /// Stream enable / flag stream ready when read low
        EN OFFSET(0) NUMBITS(1) []
    ],

    /// Stream x number of data register (DMA_SxNDTR)
    pub SxNDTR [
        /// Number of data items left to transfer
        NDT OFFSET(0) NUMBITS(16) []
    ],

    /// Stream x FIFO control register (DMA_SxFCR)
    pub SxFCR [
        /// FIFO error interrupt enable
        FEIE OFFSET(7) NUMBITS(1) [],
        /// FIFO status
        FS OFFSET(3) NUMBITS(3) [],
        /// Direct mode disable
        DMDIS OFFSET(2) NUMBITS(1) [],
        /// FIFO threshold selection
        FTH OFFSET(0) NUMBITS(2) [
            Quarter = 0,
            Half = 1,
            ThreeQuarters = 2,
            Full = 3
        ]
    ]
];

register_structs! {
    /// Registers of one DMA stream
    pub StreamRegisters {
        (0x00 => pub cr: ReadWrite<u32, SxCR::Register>),
        (0x04 => pub ndtr: ReadWrite<u32, SxNDTR::Register>),
        (0x08 => pub par: ReadWrite<u32>),
        (0x0C => pub m0ar: ReadWrite<u32>),
        (0x10 => pub m1ar: ReadWrite<u32>),
        (0x14 => pub fcr: ReadWrite<u32, SxFCR::Register>),
        (0x18 => @END),
    },

    /// DMA controller
    pub DmaRegisters {
        /// Low interrupt status register (streams 0-3)
        (0x00 => pub lisr: ReadOnly<u32>),
        /// High interrupt status register (streams 4-7)
        (0x04 => pub hisr: ReadOnly<u32>),
        /// Low interrupt flag clear register
        (0x08 => pub lifcr: WriteOnly<u32>),
        /// High interrupt flag clear register
        (0x0C => pub hifcr: WriteOnly<u32>),
        (0x10 => pub streams: [StreamRegisters; 8]),
        (0xD0 => @END),
    }
}

/// Bit offset of a stream's flag group within `LISR`/`HISR`
pub const fn flag_shift(stream: usize) -> u32 {
    match stream & 0x3 {
        0 => 0,
        1 => 6,
        2 => 16,
        _ => 22,
    }
}
