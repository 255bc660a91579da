//! Controller state: presence latch and memoized card geometry

use super::engine::{CardEngine, CardInfo};
use super::{Board, SdError};

/// Per-controller foreground state
#[derive(Debug, Default)]
pub struct ControllerState {
    card_detected: bool,
    /// Card geometry; `Some` exactly when it has been queried successfully
    info: Option<CardInfo>,
}

impl ControllerState {
    pub const fn new() -> Self {
        Self {
            card_detected: false,
            info: None,
        }
    }

    /// Forget the presence latch and the cached geometry
    pub fn invalidate(&mut self) {
        self.card_detected = false;
        self.info = None;
    }

    pub fn card_detected(&self) -> bool {
        self.card_detected
    }

    pub fn has_info(&self) -> bool {
        self.info.is_some()
    }

    pub fn info(&self) -> Option<CardInfo> {
        self.info
    }

    /// Sample the card-detect pin
    ///
    /// A newly inserted card is only reported after the pin still reads
    /// "present" once the debounce delay has elapsed. Removal is reported
    /// immediately and drops the cached geometry.
    pub fn card_present<B: Board + ?Sized>(&mut self, board: &B, debounce_ms: u32) -> bool {
        if !board.card_detect() {
            if self.card_detected {
                log::info!("SDIO: Card removed");
            }
            self.invalidate();
            return false;
        }

        if !self.card_detected {
            board.delay_ms(debounce_ms);
            self.card_detected = board.card_detect();
            if self.card_detected {
                log::info!("SDIO: Card detected");
            } else {
                log::debug!("SDIO: Card detect bounced");
            }
        }

        self.card_detected
    }

    /// Query the card geometry unless it is cached. Returns whether
    /// geometry is available afterwards.
    pub fn ensure_card_info<E: CardEngine + ?Sized>(&mut self, engine: &E) -> bool {
        if self.info.is_some() {
            return true;
        }

        match engine.initialize() {
            Ok(info) => {
                log::info!(
                    "SDIO: Card geometry: {} blocks x {} bytes = {} MB ({:?} addressing)",
                    info.num_blocks(),
                    info.block_size,
                    info.capacity / (1024 * 1024),
                    info.addressing
                );
                self.info = Some(info);
                true
            }
            Err(status) => {
                log::debug!("SDIO: Card geometry query failed: {:?}", status);
                false
            }
        }
    }

    /// Card geometry, querying at most twice
    pub fn get_card_info<E: CardEngine + ?Sized>(&mut self, engine: &E) -> Result<CardInfo, SdError> {
        if !self.ensure_card_info(engine) {
            log::warn!("SDIO: Retrying card geometry query");
            self.ensure_card_info(engine);
        }

        self.info.ok_or_else(|| {
            log::error!("SDIO: Card geometry unavailable");
            SdError::DeviceUnavailable
        })
    }

    /// Cached block size, querying the card if needed
    pub fn block_size<E: CardEngine + ?Sized>(&mut self, engine: &E) -> Result<u32, SdError> {
        self.ensure_card_info(engine);
        self.info
            .map(|info| info.block_size)
            .ok_or(SdError::DeviceUnavailable)
    }
}
