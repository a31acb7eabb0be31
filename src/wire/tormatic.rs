//! Tormatic/Novoferm door operator driver.
//!
//! Command/report protocol with a sequence nibble: every command
//! carries a 4-bit sequence number the operator echoes in its report,
//! letting the driver pair answers with requests on a shared line.
//! XOR checksum.
//!
//! ```text
//! command: 0xD5 | seq<<4 | cmd | data | checksum(xor)
//! report:  0xD5 | seq<<4 | 0x8 | state | percent | checksum(xor)
//! ```
//!
//! Door states are categorical (opening, closing, open, closed, or a
//! mid-travel percent) and map directly onto the entity state.

use crate::call::{CoverCall, CoverControl};
use crate::config::CoverConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::traits::{FrameLink, StateStore};
use crate::wire::{xor_checksum, FrameError, RxStats};

const START: u8 = 0xD5;

const CMD_OPEN: u8 = 0x1;
const CMD_CLOSE: u8 = 0x2;
const CMD_STOP: u8 = 0x3;
const CMD_SET_POS: u8 = 0x4;
const CMD_QUERY: u8 = 0x5;
const CMD_REPORT: u8 = 0x8;

const STATE_OPENING: u8 = 0x01;
const STATE_CLOSING: u8 = 0x02;
const STATE_OPEN: u8 = 0x03;
const STATE_CLOSED: u8 = 0x04;
const STATE_POSITION: u8 = 0x05;

const COMMAND_LEN: usize = 4;
const REPORT_LEN: usize = 5;

/// One parsed operator report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TormaticReport {
    /// Echoed sequence number.
    pub seq: u8,
    /// Position resolved from the state and percent bytes.
    pub position: f32,
    /// Motion state.
    pub operation: CoverOperation,
}

/// Frame builder and receive state machine for Tormatic operators.
///
/// Owns the outgoing sequence counter; it lives here rather than in a
/// file-scope static so two doors on two links never share it.
#[derive(Clone, Debug, Default)]
pub struct TormaticCodec {
    buf: heapless::Vec<u8, REPORT_LEN>,
    seq: u8,
    /// Receive diagnostics.
    pub stats: RxStats,
}

impl TormaticCodec {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next command will carry.
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    /// Build a command frame, consuming one sequence number.
    pub fn command_frame(&mut self, cmd: u8, data: u8) -> [u8; COMMAND_LEN] {
        let seq = self.seq;
        self.seq = (self.seq + 1) & 0x0F;
        let mut out = [START, (seq << 4) | (cmd & 0x0F), data, 0];
        out[COMMAND_LEN - 1] = xor_checksum(&out[..COMMAND_LEN - 1]);
        out
    }

    /// Push one received byte; returns a report when a frame completes.
    pub fn feed(&mut self, byte: u8) -> Option<TormaticReport> {
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

    fn parse(frame: &[u8; REPORT_LEN]) -> Result<TormaticReport, FrameError> {
        let expected = xor_checksum(&frame[..REPORT_LEN - 1]);
        let got = frame[REPORT_LEN - 1];
        if expected != got {
            return Err(FrameError::Checksum { expected, got });
        }
        if frame[1] & 0x0F != CMD_REPORT {
            return Err(FrameError::BadField { got: frame[1] });
        }
        let percent = frame[3];
        let (position, operation) = match frame[2] {
            STATE_OPENING => (percent as f32 / 100.0, CoverOperation::Opening),
            STATE_CLOSING => (percent as f32 / 100.0, CoverOperation::Closing),
            STATE_OPEN => (COVER_OPEN, CoverOperation::Idle),
            STATE_CLOSED => (COVER_CLOSED, CoverOperation::Idle),
            STATE_POSITION => (percent as f32 / 100.0, CoverOperation::Idle),
            other => return Err(FrameError::BadField { got: other }),
        };
        if frame[2] != STATE_OPEN && frame[2] != STATE_CLOSED && percent > 100 {
            return Err(FrameError::BadField { got: percent });
        }
        Ok(TormaticReport {
            seq: frame[1] >> 4,
            position,
            operation,
        })
    }
}

/// Configuration for a [`TormaticCover`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TormaticConfig {
    /// Entity identity.
    pub cover: CoverConfig,
}

impl TormaticConfig {
    /// Creates a config for the named door.
    pub fn new(name: &str) -> Self {
        Self {
            cover: CoverConfig::new(name).with_device_class("garage"),
        }
    }
}

/// Cover driver mirroring a Tormatic operator's reports.
pub struct TormaticCover<L: FrameLink, S: StateStore> {
    core: CoverCore,
    link: L,
    store: S,
    codec: TormaticCodec,
    last_published: Option<CoverState>,
}

impl<L: FrameLink, S: StateStore> TormaticCover<L, S> {
    /// Creates a driver from its link, store, and config.
    pub fn new(link: L, store: S, config: TormaticConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            link,
            store,
            codec: TormaticCodec::new(),
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

    /// Poll the operator for its state; call at the polling cadence.
    pub fn update(&mut self) -> Result<(), L::Error> {
        let frame = self.codec.command_frame(CMD_QUERY, 0x00);
        self.link.send(&frame)
    }

    /// Drain received bytes and mirror any report.
    pub fn loop_tick(&mut self) -> Result<(), L::Error> {
        while let Some(byte) = self.link.poll_byte() {
            if let Some(report) = self.codec.feed(byte) {
                self.apply_report(report);
            }
        }
        Ok(())
    }

    fn apply_report(&mut self, report: TormaticReport) {
        self.core.position = report.position.clamp(COVER_CLOSED, COVER_OPEN);
        self.core.operation = report.operation;

        let state = self.core.state();
        if self.last_published != Some(state) {
            let save = report.operation == CoverOperation::Idle;
            self.core.publish_state(save, &mut self.store);
            self.last_published = Some(state);
        }
    }
}

impl<L: FrameLink, S: StateStore> CoverControl for TormaticCover<L, S> {
    type Error = L::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new().with_position(true).with_stop(true)
    }

    fn control(&mut self, call: &CoverCall, _now_ms: u64) -> Result<(), L::Error> {
        if call.is_stop() {
            let frame = self.codec.command_frame(CMD_STOP, 0x00);
            self.link.send(&frame)?;
            return Ok(());
        }

        if let Some(pos) = call.position() {
            let frame = if pos == COVER_OPEN {
                self.codec.command_frame(CMD_OPEN, 0x00)
            } else if pos == COVER_CLOSED {
                self.codec.command_frame(CMD_CLOSE, 0x00)
            } else {
                let percent = (pos * 100.0 + 0.5) as u8;
                self.codec.command_frame(CMD_SET_POS, percent)
            };
            self.link.send(&frame)?;
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
