//! Dooya RS-485 tubular motor driver.
//!
//! The motor reports its own position as a percentage, so there is no
//! estimation here at all: the driver polls the motor, mirrors what it
//! reports, and translates calls into command frames.
//!
//! Frame layout (both directions), truncated-sum checksum over every
//! preceding byte:
//!
//! ```text
//! 0x55 | address | command | data | checksum
//! ```
//!
//! Reports answer a query with `data = percent` plus a trailing motion
//! byte. The constants below are the per-device compatibility contract.

use crate::call::{CoverCall, CoverControl};
use crate::config::CoverConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::traits::{FrameLink, StateStore};
use crate::wire::{sum_checksum, FrameError, RxStats};

const START: u8 = 0x55;

const CMD_QUERY: u8 = 0x01;
const CMD_CONTROL: u8 = 0x03;
const CMD_SET_POSITION: u8 = 0x04;

const ACTION_OPEN: u8 = 0x01;
const ACTION_CLOSE: u8 = 0x02;
const ACTION_STOP: u8 = 0x03;

const STATUS_IDLE: u8 = 0x00;
const STATUS_OPENING: u8 = 0x01;
const STATUS_CLOSING: u8 = 0x02;

/// Command frames are 5 bytes, reports 6.
const REPORT_LEN: usize = 6;

/// One parsed motor report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DooyaReport {
    /// Responding motor address.
    pub address: u8,
    /// Reported position, percent open.
    pub percent: u8,
    /// Reported motion state.
    pub operation: CoverOperation,
}

/// Frame builder and receive state machine for the Dooya bus.
#[derive(Clone, Debug, Default)]
pub struct DooyaCodec {
    buf: heapless::Vec<u8, REPORT_LEN>,
    /// Receive diagnostics.
    pub stats: RxStats,
}

impl DooyaCodec {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a position query addressed to `address`.
    pub fn query_frame(address: u8) -> [u8; 5] {
        Self::frame(address, CMD_QUERY, 0x00)
    }

    /// Build an open/close/stop command.
    pub fn control_frame(address: u8, action: u8) -> [u8; 5] {
        Self::frame(address, CMD_CONTROL, action)
    }

    /// Build a move-to-percent command.
    pub fn position_frame(address: u8, percent: u8) -> [u8; 5] {
        Self::frame(address, CMD_SET_POSITION, percent.min(100))
    }

    fn frame(address: u8, command: u8, data: u8) -> [u8; 5] {
        let mut out = [START, address, command, data, 0];
        out[4] = sum_checksum(&out[..4]);
        out
    }

    /// Push one received byte; returns a report when a frame completes.
    ///
    /// Faulty frames are discarded and parsing resynchronizes on the
    /// next byte.
    pub fn feed(&mut self, byte: u8) -> Option<DooyaReport> {
        if self.buf.is_empty() && byte != START {
            self.stats.discard(FrameError::BadStart { got: byte });
            return None;
        }
        // Length is fixed; push cannot fail before the parse below.
        let _ = self.buf.push(byte);
        if self.buf.len() < REPORT_LEN {
            return None;
        }

        let mut frame = [0u8; REPORT_LEN];
        frame.copy_from_slice(&self.buf);
        self.buf.clear();
        match Self::parse(&frame) {
            Ok(report) => {
                self.stats.accept();
                Some(report)
            }
            Err(err) => {
                self.stats.discard(err);
                None
            }
        }
    }

    fn parse(frame: &[u8]) -> Result<DooyaReport, FrameError> {
        let expected = sum_checksum(&frame[..REPORT_LEN - 1]);
        let got = frame[REPORT_LEN - 1];
        if expected != got {
            return Err(FrameError::Checksum { expected, got });
        }
        let percent = frame[3];
        if percent > 100 {
            return Err(FrameError::BadField { got: percent });
        }
        let operation = match frame[4] {
            STATUS_IDLE => CoverOperation::Idle,
            STATUS_OPENING => CoverOperation::Opening,
            STATUS_CLOSING => CoverOperation::Closing,
            other => return Err(FrameError::BadField { got: other }),
        };
        Ok(DooyaReport {
            address: frame[1],
            percent,
            operation,
        })
    }
}

/// Configuration for a [`DooyaCover`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DooyaConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Bus address of the motor.
    pub address: u8,
}

impl DooyaConfig {
    /// Creates a config for the named motor at `address`.
    pub fn new(name: &str, address: u8) -> Self {
        Self {
            cover: CoverConfig::new(name),
            address,
        }
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.cover = self.cover.with_device_class(class);
        self
    }
}

/// Cover driver mirroring a Dooya motor's self-reported state.
pub struct DooyaCover<L: FrameLink, S: StateStore> {
    core: CoverCore,
    link: L,
    store: S,
    codec: DooyaCodec,
    address: u8,
    last_published: Option<CoverState>,
}

impl<L: FrameLink, S: StateStore> DooyaCover<L, S> {
    /// Creates a driver from its link, store, and config.
    pub fn new(link: L, store: S, config: DooyaConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            link,
            store,
            codec: DooyaCodec::new(),
            address: config.address,
            last_published: None,
        }
    }

    /// Restore persisted position until the first report arrives.
    pub fn setup(&mut self) {
        if !self.core.restore(&mut self.store) {
            log::debug!("'{}': no stored state, assuming half-open", self.core.name());
        }
    }

    /// Current position as last reported (or restored).
    pub fn position(&self) -> f32 {
        self.core.position()
    }

    /// Current motion state as last reported.
    pub fn current_operation(&self) -> CoverOperation {
        self.core.current_operation()
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> CoverState {
        self.core.state()
    }

    /// The embedded entity core, for listener registration.
    pub fn core_mut(&mut self) -> &mut CoverCore {
        &mut self.core
    }

    /// The wire link, for inspection in tests and integrations.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Receive diagnostics.
    pub fn rx_stats(&self) -> RxStats {
        self.codec.stats
    }

    /// Poll the motor for its position; call at the polling cadence.
    pub fn update(&mut self) -> Result<(), L::Error> {
        self.link.send(&DooyaCodec::query_frame(self.address))
    }

    /// Drain received bytes and mirror any report addressed to us.
    pub fn loop_tick(&mut self) -> Result<(), L::Error> {
        while let Some(byte) = self.link.poll_byte() {
            if let Some(report) = self.codec.feed(byte) {
                self.apply_report(report);
            }
        }
        Ok(())
    }

    fn apply_report(&mut self, report: DooyaReport) {
        if report.address != self.address {
            log::debug!(
                "'{}': ignoring report for address {:#04x}",
                self.core.name(),
                report.address
            );
            return;
        }
        self.core.position = report.percent as f32 / 100.0;
        self.core.operation = report.operation;

        let state = self.core.state();
        if self.last_published != Some(state) {
            let save = report.operation == CoverOperation::Idle;
            self.core.publish_state(save, &mut self.store);
            self.last_published = Some(state);
        }
    }
}

impl<L: FrameLink, S: StateStore> CoverControl for DooyaCover<L, S> {
    type Error = L::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new().with_position(true).with_stop(true)
    }

    fn control(&mut self, call: &CoverCall, _now_ms: u64) -> Result<(), L::Error> {
        if call.is_stop() {
            self.link
                .send(&DooyaCodec::control_frame(self.address, ACTION_STOP))?;
            return Ok(());
        }

        if let Some(pos) = call.position() {
            if pos == COVER_OPEN {
                self.link
                    .send(&DooyaCodec::control_frame(self.address, ACTION_OPEN))?;
            } else if pos == COVER_CLOSED {
                self.link
                    .send(&DooyaCodec::control_frame(self.address, ACTION_CLOSE))?;
            } else {
                // Round half-up; pos is already validated into [0, 1].
                let percent = (pos * 100.0 + 0.5) as u8;
                self.link
                    .send(&DooyaCodec::position_frame(self.address, percent))?;
            }
            // Optimistic; the next report corrects us if the motor
            // disagrees.
            self.core.operation = if pos < self.core.position() {
                CoverOperation::Closing
            } else {
                CoverOperation::Opening
            };
            self.core.publish_state(false, &mut self.store);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
