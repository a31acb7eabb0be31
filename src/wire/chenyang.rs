//! Chenyang curtain motor driver.
//!
//! XOR-checksum serial protocol. The motor volunteers state frames on
//! every change as well as answering queries, and distinguishes the
//! travel extremes from a plain stop in its state byte.
//!
//! ```text
//! command: 0x5A | address | command | checksum(xor)
//! report:  0x5A | address | state | percent | checksum(xor)
//! ```

use crate::call::{CoverCall, CoverControl};
use crate::config::CoverConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::traits::{FrameLink, StateStore};
use crate::wire::{xor_checksum, FrameError, RxStats};

const START: u8 = 0x5A;

const CMD_OPEN: u8 = 0x01;
const CMD_CLOSE: u8 = 0x02;
const CMD_STOP: u8 = 0x03;
const CMD_QUERY: u8 = 0x04;

const STATE_STOPPED: u8 = 0x00;
const STATE_OPENING: u8 = 0x01;
const STATE_CLOSING: u8 = 0x02;
const STATE_AT_OPEN: u8 = 0x03;
const STATE_AT_CLOSED: u8 = 0x04;

const COMMAND_LEN: usize = 4;
const REPORT_LEN: usize = 5;

/// One parsed motor report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChenyangReport {
    /// Responding motor address.
    pub address: u8,
    /// Position resolved from the state and percent bytes.
    pub position: f32,
    /// Motion state; the at-extreme states collapse to idle.
    pub operation: CoverOperation,
}

/// Frame builder and receive state machine for Chenyang motors.
#[derive(Clone, Debug, Default)]
pub struct ChenyangCodec {
    buf: heapless::Vec<u8, REPORT_LEN>,
    /// Receive diagnostics.
    pub stats: RxStats,
}

impl ChenyangCodec {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a command frame.
    pub fn command_frame(address: u8, command: u8) -> [u8; COMMAND_LEN] {
        let mut out = [START, address, command, 0];
        out[COMMAND_LEN - 1] = xor_checksum(&out[..COMMAND_LEN - 1]);
        out
    }

    /// Push one received byte; returns a report when a frame completes.
    pub fn feed(&mut self, byte: u8) -> Option<ChenyangReport> {
        if self.buf.is_empty() && byte != START {
            self.stats.discard(FrameError::BadStart { got: byte });
            return None;
        }
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

    fn parse(frame: &[u8; REPORT_LEN]) -> Result<ChenyangReport, FrameError> {
        let expected = xor_checksum(&frame[..REPORT_LEN - 1]);
        let got = frame[REPORT_LEN - 1];
        if expected != got {
            return Err(FrameError::Checksum { expected, got });
        }
        let percent = frame[3];
        // The extremes are authoritative regardless of the percent byte;
        // some firmware revisions pad it with 0xFF there.
        let (position, operation) = match frame[2] {
            STATE_AT_OPEN => (COVER_OPEN, CoverOperation::Idle),
            STATE_AT_CLOSED => (COVER_CLOSED, CoverOperation::Idle),
            state @ (STATE_STOPPED | STATE_OPENING | STATE_CLOSING) => {
                if percent > 100 {
                    return Err(FrameError::BadField { got: percent });
                }
                let operation = match state {
                    STATE_OPENING => CoverOperation::Opening,
                    STATE_CLOSING => CoverOperation::Closing,
                    _ => CoverOperation::Idle,
                };
                (percent as f32 / 100.0, operation)
            }
            other => return Err(FrameError::BadField { got: other }),
        };
        Ok(ChenyangReport {
            address: frame[1],
            position,
            operation,
        })
    }
}

/// Configuration for a [`ChenyangCover`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChenyangConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Bus address of the motor.
    pub address: u8,
}

impl ChenyangConfig {
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

/// Cover driver mirroring a Chenyang motor's self-reported state.
///
/// The motor accepts only open/close/stop, so arbitrary targets are not
/// advertised; binary requests still work everywhere.
pub struct ChenyangCover<L: FrameLink, S: StateStore> {
    core: CoverCore,
    link: L,
    store: S,
    codec: ChenyangCodec,
    address: u8,
    last_published: Option<CoverState>,
}

impl<L: FrameLink, S: StateStore> ChenyangCover<L, S> {
    /// Creates a driver from its link, store, and config.
    pub fn new(link: L, store: S, config: ChenyangConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            link,
            store,
            codec: ChenyangCodec::new(),
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
        self.link
            .send(&ChenyangCodec::command_frame(self.address, CMD_QUERY))
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

    fn apply_report(&mut self, report: ChenyangReport) {
        if report.address != self.address {
            return;
        }
        self.core.position = report.position;
        self.core.operation = report.operation;

        let state = self.core.state();
        if self.last_published != Some(state) {
            let save = report.operation == CoverOperation::Idle;
            self.core.publish_state(save, &mut self.store);
            self.last_published = Some(state);
        }
    }
}

impl<L: FrameLink, S: StateStore> CoverControl for ChenyangCover<L, S> {
    type Error = L::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new().with_stop(true)
    }

    fn control(&mut self, call: &CoverCall, _now_ms: u64) -> Result<(), L::Error> {
        if call.is_stop() {
            self.link
                .send(&ChenyangCodec::command_frame(self.address, CMD_STOP))?;
            return Ok(());
        }

        // Only binary positions survive validation without position
        // support.
        if let Some(pos) = call.position() {
            let command = if pos == COVER_OPEN { CMD_OPEN } else { CMD_CLOSE };
            self.link
                .send(&ChenyangCodec::command_frame(self.address, command))?;
            self.core.operation = if pos == COVER_OPEN {
                CoverOperation::Opening
            } else {
                CoverOperation::Closing
            };
            self.core.publish_state(false, &mut self.store);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
