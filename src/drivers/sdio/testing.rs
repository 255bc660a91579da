//! Fake hardware for unit tests
//!
//! [`FakeStream`] and [`FakeEngine`] model just enough of the DMA stream
//! and SDIO registers for the monitors and the block device. [`SimCpu`] is
//! a single-core interrupt model: while the task waits, it dispatches the
//! most urgent pending vector.

use super::completion::Waiter;
use super::engine::{Addressing, CardEngine, CardFlags, CardInfo, CardOperation, CardStatus};
use super::{Board, Config, IrqPriorities, Sdio, SdioBlockDevice, SdioHardware};
use crate::drivers::dma::{DmaFlags, DmaStream};
use crate::time::Clock;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

pub const BLOCK_SIZE: u32 = 512;
pub const CARD_BLOCKS: u64 = 64;

pub const CARD_INFO: CardInfo = CardInfo {
    block_size: BLOCK_SIZE,
    capacity: CARD_BLOCKS * BLOCK_SIZE as u64,
    addressing: Addressing::Block,
};

/// Waiter for handlers that have already run: never sleeps
pub struct ReadyWaiter;

impl Waiter for ReadyWaiter {
    fn wait_until(&self, ready: &dyn Fn() -> bool) {
        assert!(ready(), "wait would block");
    }

    fn notify(&self) {}
}

/// What the stream does once the engine enables its interrupts
#[derive(Debug, Clone, Copy)]
struct StreamScript {
    flags: DmaFlags,
    /// Words short of the programmed length
    shortfall: u32,
}

/// DMA stream with host-side event injection
#[derive(Default)]
pub struct FakeStream {
    status: AtomicU8,
    enabled: AtomicU8,
    running: AtomicBool,
    programmed: AtomicU32,
    items: AtomicU32,
    aborts: AtomicU32,
    script: Mutex<Option<StreamScript>>,
}

impl FakeStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch event flags
    pub fn raise(&self, flags: DmaFlags) {
        self.status.fetch_or(flags.bits(), Ordering::SeqCst);
    }

    /// Complete every transfer started on this stream with `flags`, having
    /// moved every programmed word
    pub fn script(&self, flags: DmaFlags) {
        self.script_short(flags, 0);
    }

    /// Like [`script`](Self::script), but stop `shortfall` words early
    pub fn script_short(&self, flags: DmaFlags, shortfall: u32) {
        *self.script.lock().unwrap() = Some(StreamScript { flags, shortfall });
    }

    /// Set the length of the next transfer in words
    pub fn program(&self, words: u32) {
        self.programmed.store(words, Ordering::SeqCst);
    }

    pub fn pending(&self) -> bool {
        !(self.status() & self.enabled_interrupts()).is_empty()
    }

    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl DmaStream for FakeStream {
    fn status(&self) -> DmaFlags {
        DmaFlags::from_bits_truncate(self.status.load(Ordering::SeqCst))
    }

    fn clear_status(&self, flags: DmaFlags) {
        self.status.fetch_and(!flags.bits(), Ordering::SeqCst);
    }

    fn enabled_interrupts(&self) -> DmaFlags {
        DmaFlags::from_bits_truncate(self.enabled.load(Ordering::SeqCst))
    }

    fn enable_interrupts(&self, flags: DmaFlags) {
        self.enabled.fetch_or(flags.bits(), Ordering::SeqCst);
        if let Some(script) = *self.script.lock().unwrap() {
            self.running.store(true, Ordering::SeqCst);
            let words = self.programmed.load(Ordering::SeqCst);
            self.items
                .store(words.saturating_sub(script.shortfall), Ordering::SeqCst);
            self.raise(script.flags);
        }
    }

    fn disable_interrupts(&self, flags: DmaFlags) {
        self.enabled.fetch_and(!flags.bits(), Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn disable(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn items_transferred(&self) -> u32 {
        self.items.load(Ordering::SeqCst)
    }
}

/// SDIO engine backed by an in-memory card
pub struct FakeEngine {
    flags: AtomicU32,
    mask: AtomicU32,
    infos: Mutex<VecDeque<Result<CardInfo, CardStatus>>>,
    info_queries: AtomicU32,
    issue_result: Mutex<Result<(), CardStatus>>,
    completion: Mutex<CardFlags>,
    stop_result: Mutex<Result<(), CardStatus>>,
    stops: AtomicU32,
    last_op: Mutex<CardOperation>,
    /// Number of activity polls that still report "active"
    active_polls: AtomicU32,
    data_path_disables: AtomicU32,
    storage: Mutex<Vec<u8>>,
    /// Receive and transmit streams the engine programs on issue
    streams: Mutex<Option<(&'static FakeStream, &'static FakeStream)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            flags: AtomicU32::new(0),
            mask: AtomicU32::new(0),
            infos: Mutex::new(VecDeque::new()),
            info_queries: AtomicU32::new(0),
            issue_result: Mutex::new(Ok(())),
            completion: Mutex::new(CardFlags::DATA_END),
            stop_result: Mutex::new(Ok(())),
            stops: AtomicU32::new(0),
            last_op: Mutex::new(CardOperation::None),
            active_polls: AtomicU32::new(0),
            data_path_disables: AtomicU32::new(0),
            storage: Mutex::new(vec![0; CARD_INFO.capacity as usize]),
            streams: Mutex::new(None),
        }
    }

    /// Program transfer lengths on `rx`/`tx` when issuing, as the card
    /// library configures the real streams
    pub fn attach_streams(&self, rx: &'static FakeStream, tx: &'static FakeStream) {
        *self.streams.lock().unwrap() = Some((rx, tx));
    }

    fn program(&self, receive: bool, len: usize) {
        if let Some((rx, tx)) = *self.streams.lock().unwrap() {
            let stream = if receive { rx } else { tx };
            stream.program((len / 4) as u32);
        }
    }

    /// Latch status flags
    pub fn raise(&self, flags: CardFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::SeqCst);
    }

    pub fn interrupt_mask(&self) -> CardFlags {
        CardFlags::from_bits_truncate(self.mask.load(Ordering::SeqCst))
    }

    /// Queue the result of the next geometry query; an empty queue times out
    pub fn push_info(&self, info: Result<CardInfo, CardStatus>) {
        self.infos.lock().unwrap().push_back(info);
    }

    /// Drop queued geometry results so every query times out
    pub fn remove_card(&self) {
        self.infos.lock().unwrap().clear();
    }

    pub fn info_queries(&self) -> u32 {
        self.info_queries.load(Ordering::SeqCst)
    }

    pub fn reject_issue(&self, status: CardStatus) {
        *self.issue_result.lock().unwrap() = Err(status);
    }

    /// Flags the data phase ends with
    pub fn complete_with(&self, flags: CardFlags) {
        *self.completion.lock().unwrap() = flags;
    }

    pub fn fail_stop(&self, status: CardStatus) {
        *self.stop_result.lock().unwrap() = Err(status);
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Report TX/RX activity for the next `polls` checks (`u32::MAX`: forever)
    pub fn stay_active(&self, polls: u32) {
        self.active_polls.store(polls, Ordering::SeqCst);
    }

    pub fn data_path_disables(&self) -> u32 {
        self.data_path_disables.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> bool {
        (self.flags() & self.interrupt_mask()).intersects(CardFlags::DATA_INTERRUPTS)
    }

    fn start(&self, operation: CardOperation, stream: &impl DmaStream) -> Result<(), CardStatus> {
        *self.last_op.lock().unwrap() = operation;
        (*self.issue_result.lock().unwrap())?;

        self.mask
            .fetch_or(CardFlags::DATA_INTERRUPTS.bits(), Ordering::SeqCst);
        self.raise(*self.completion.lock().unwrap());
        stream.enable_interrupts(
            DmaFlags::TRANSFER_COMPLETE | DmaFlags::TRANSFER_ERROR | DmaFlags::FIFO_ERROR,
        );
        Ok(())
    }

    fn active(&self) -> bool {
        let polls = self.active_polls.load(Ordering::SeqCst);
        match polls {
            0 => false,
            u32::MAX => true,
            _ => {
                self.active_polls.store(polls - 1, Ordering::SeqCst);
                true
            }
        }
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CardEngine for FakeEngine {
    fn initialize(&self) -> Result<CardInfo, CardStatus> {
        self.info_queries.fetch_add(1, Ordering::SeqCst);
        self.infos
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CardStatus::Timeout))
    }

    fn issue_read<S: DmaStream>(
        &self,
        byte_offset: u64,
        stream: &S,
        data: &mut [u8],
    ) -> Result<(), CardStatus> {
        let operation = if data.len() > BLOCK_SIZE as usize {
            CardOperation::ReadMultipleBlock
        } else {
            CardOperation::ReadSingleBlock
        };
        let start = byte_offset as usize;
        {
            let storage = self.storage.lock().unwrap();
            let source = storage
                .get(start..start + data.len())
                .ok_or(CardStatus::Error)?;
            data.copy_from_slice(source);
        }
        self.program(true, data.len());
        self.start(operation, stream)
    }

    fn issue_write<S: DmaStream>(
        &self,
        byte_offset: u64,
        stream: &S,
        data: &[u8],
    ) -> Result<(), CardStatus> {
        let operation = if data.len() > BLOCK_SIZE as usize {
            CardOperation::WriteMultipleBlock
        } else {
            CardOperation::WriteSingleBlock
        };
        let start = byte_offset as usize;
        if *self.issue_result.lock().unwrap() == Ok(()) {
            let mut storage = self.storage.lock().unwrap();
            storage
                .get_mut(start..start + data.len())
                .ok_or(CardStatus::Error)?
                .copy_from_slice(data);
        }
        self.program(false, data.len());
        self.start(operation, stream)
    }

    fn stop_transfer(&self) -> Result<(), CardStatus> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.stop_result.lock().unwrap()
    }

    fn last_operation(&self) -> CardOperation {
        *self.last_op.lock().unwrap()
    }

    fn flags(&self) -> CardFlags {
        CardFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    fn clear_flags(&self, flags: CardFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::SeqCst);
    }

    fn disable_interrupts(&self, flags: CardFlags) {
        self.mask.fetch_and(!flags.bits(), Ordering::SeqCst);
    }

    fn disable_data_path(&self) {
        self.data_path_disables.fetch_add(1, Ordering::SeqCst);
    }

    fn tx_active(&self) -> bool {
        self.active()
    }

    fn rx_active(&self) -> bool {
        self.active()
    }
}

/// Board with a settable card-detect pin and a clock that ticks on every read
#[derive(Default)]
pub struct SimBoard {
    pin: Cell<bool>,
    pin_after_delay: Cell<Option<bool>>,
    now: Cell<u64>,
    delays: RefCell<Vec<u32>>,
    flushes: RefCell<Vec<(usize, usize)>>,
    invalidates: RefCell<Vec<(usize, usize)>>,
    priorities: Cell<Option<IrqPriorities>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pin(&self, present: bool) {
        self.pin.set(present);
    }

    /// Flip the pin during the next delay
    pub fn set_pin_after_delay(&self, present: bool) {
        self.pin_after_delay.set(Some(present));
    }

    pub fn delays(&self) -> Vec<u32> {
        self.delays.borrow().clone()
    }

    pub fn flushes(&self) -> Vec<(usize, usize)> {
        self.flushes.borrow().clone()
    }

    pub fn invalidates(&self) -> Vec<(usize, usize)> {
        self.invalidates.borrow().clone()
    }

    /// Priorities last handed to the interrupt controller
    pub fn priorities(&self) -> Option<IrqPriorities> {
        self.priorities.get()
    }
}

impl Clock for SimBoard {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + 1);
        now
    }
}

impl Board for SimBoard {
    fn card_detect(&self) -> bool {
        self.pin.get()
    }

    fn delay_ms(&self, ms: u32) {
        self.delays.borrow_mut().push(ms);
        self.now.set(self.now.get() + ms as u64);
        if let Some(present) = self.pin_after_delay.take() {
            self.pin.set(present);
        }
    }

    fn flush_dcache(&self, addr: usize, len: usize) {
        self.flushes.borrow_mut().push((addr, len));
    }

    fn invalidate_dcache(&self, addr: usize, len: usize) {
        self.invalidates.borrow_mut().push((addr, len));
    }

    fn set_irq_priorities(&self, priorities: IrqPriorities) {
        self.priorities.set(Some(priorities));
    }
}

struct Vector {
    name: &'static str,
    priority: u8,
    pending: Box<dyn Fn() -> bool>,
    handler: Box<dyn Fn()>,
}

/// Single-core CPU with prioritized interrupt vectors
///
/// A waiting task never runs again until its predicate holds; the most
/// urgent pending vector (lowest priority number) is taken instead. Waiting
/// with nothing pending is a deadlock and panics.
#[derive(Default)]
pub struct SimCpu {
    vectors: RefCell<Vec<Vector>>,
    dispatched: RefCell<Vec<&'static str>>,
    notifications: Cell<u32>,
}

impl SimCpu {
    const DISPATCH_LIMIT: usize = 1000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &self,
        name: &'static str,
        priority: u8,
        pending: impl Fn() -> bool + 'static,
        handler: impl Fn() + 'static,
    ) {
        self.vectors.borrow_mut().push(Vector {
            name,
            priority,
            pending: Box::new(pending),
            handler: Box::new(handler),
        });
    }

    /// Vectors taken so far, in order
    pub fn dispatched(&self) -> Vec<&'static str> {
        self.dispatched.borrow().clone()
    }

    pub fn notifications(&self) -> u32 {
        self.notifications.get()
    }
}

impl Waiter for SimCpu {
    fn wait_until(&self, ready: &dyn Fn() -> bool) {
        let mut dispatches = 0;
        while !ready() {
            let vectors = self.vectors.borrow();
            let vector = vectors
                .iter()
                .filter(|vector| (vector.pending)())
                .min_by_key(|vector| vector.priority)
                .expect("deadlock: waiting with no interrupt pending");

            self.dispatched.borrow_mut().push(vector.name);
            (vector.handler)();

            dispatches += 1;
            assert!(dispatches < Self::DISPATCH_LIMIT, "interrupt storm on {}", vector.name);
        }
    }

    fn notify(&self) {
        self.notifications.set(self.notifications.get() + 1);
    }
}

pub type SimSdio = Sdio<'static, FakeEngine, FakeStream, &'static SimCpu>;
pub type SimDevice = SdioBlockDevice<'static, FakeEngine, FakeStream, &'static SimCpu, SimBoard>;

/// One controller wired to a [`SimCpu`] with the configured priorities
pub struct Rig {
    pub engine: &'static FakeEngine,
    pub rx: &'static FakeStream,
    pub tx: &'static FakeStream,
    pub cpu: &'static SimCpu,
    pub sdio: &'static SimSdio,
}

impl Rig {
    pub fn new(config: &Config) -> Self {
        let engine: &'static FakeEngine = Box::leak(Box::new(FakeEngine::new()));
        let rx: &'static FakeStream = Box::leak(Box::new(FakeStream::new()));
        let tx: &'static FakeStream = Box::leak(Box::new(FakeStream::new()));
        let cpu: &'static SimCpu = Box::leak(Box::new(SimCpu::new()));
        let sdio: &'static SimSdio = Box::leak(Box::new(Sdio::new(
            SdioHardware {
                engine,
                rx_stream: rx,
                tx_stream: tx,
            },
            cpu,
        )));

        cpu.attach(
            "dma_rx",
            config.priorities.dma,
            move || rx.pending(),
            move || sdio.on_dma_rx_interrupt(),
        );
        cpu.attach(
            "dma_tx",
            config.priorities.dma,
            move || tx.pending(),
            move || sdio.on_dma_tx_interrupt(),
        );
        cpu.attach(
            "sdio",
            config.priorities.card,
            move || engine.pending(),
            move || sdio.on_card_interrupt(),
        );

        engine.push_info(Ok(CARD_INFO));
        engine.attach_streams(rx, tx);
        rx.script(DmaFlags::TRANSFER_COMPLETE);
        tx.script(DmaFlags::TRANSFER_COMPLETE);

        Self {
            engine,
            rx,
            tx,
            cpu,
            sdio,
        }
    }

    pub fn device(&self, config: Config) -> SimDevice {
        SdioBlockDevice::new(self.sdio, SimBoard::new(), config)
    }
}
