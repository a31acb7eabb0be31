//! GM40 tubular motor driver.
//!
//! Like the Dooya family the motor reports percent position itself, but
//! over 16-bit addressing and with a distinct status vocabulary that
//! includes a stall report. Truncated-sum checksum.
//!
//! ```text
//! command: 0xA5 | addr_hi | addr_lo | command | data   | checksum
//! report:  0xA5 | addr_hi | addr_lo | 0xB1    | percent | status | checksum
//! ```

use crate::call::{CoverCall, CoverControl};
use crate::config::CoverConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::traits::{FrameLink, StateStore};
use crate::wire::{sum_checksum, FrameError, RxStats};

const START: u8 = 0xA5;

const CMD_UP: u8 = 0x11;
const CMD_DOWN: u8 = 0x22;
const CMD_STOP: u8 = 0x33;
const CMD_PERCENT: u8 = 0x44;
const CMD_QUERY: u8 = 0x55;

const REPORT_MARKER: u8 = 0xB1;

const STATUS_STOPPED: u8 = 0x00;
const STATUS_RISING: u8 = 0x01;
const STATUS_LOWERING: u8 = 0x02;
const STATUS_STALLED: u8 = 0x03;

const COMMAND_LEN: usize = 6;
const REPORT_LEN: usize = 7;

/// One parsed motor report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gm40Report {
    /// Responding motor address.
    pub address: u16,
    /// Reported position, percent open.
    pub percent: u8,
    /// Reported motion state; stalls collapse to idle.
    pub operation: CoverOperation,
    /// The motor reported a stall.
    pub stalled: bool,
}

/// Frame builder and receive state machine for GM40 motors.
#[derive(Clone, Debug, Default)]
pub struct Gm40Codec {
    buf: heapless::Vec<u8, REPORT_LEN>,
    /// Receive diagnostics.
    pub stats: RxStats,
}

impl Gm40Codec {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a command frame.
    pub fn command_frame(address: u16, command: u8, data: u8) -> [u8; COMMAND_LEN] {
        let [hi, lo] = address.to_be_bytes();
        let mut out = [START, hi, lo, command, data, 0];
        out[COMMAND_LEN - 1] = sum_checksum(&out[..COMMAND_LEN - 1]);
        out
    }

    /// Push one received byte; returns a report when a frame completes.
    pub fn feed(&mut self, byte: u8) -> Option<Gm40Report> {
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

    fn parse(frame: &[u8; REPORT_LEN]) -> Result<Gm40Report, FrameError> {
        let expected = sum_checksum(&frame[..REPORT_LEN - 1]);
        let got = frame[REPORT_LEN - 1];
        if expected != got {
            return Err(FrameError::Checksum { expected, got });
        }
        if frame[3] != REPORT_MARKER {
            return Err(FrameError::BadField { got: frame[3] });
        }
        let percent = frame[4];
        if percent > 100 {
            return Err(FrameError::BadField { got: percent });
        }
        let (operation, stalled) = match frame[5] {
            STATUS_STOPPED => (CoverOperation::Idle, false),
            STATUS_RISING => (CoverOperation::Opening, false),
            STATUS_LOWERING => (CoverOperation::Closing, false),
            STATUS_STALLED => (CoverOperation::Idle, true),
            other => return Err(FrameError::BadField { got: other }),
        };
        Ok(Gm40Report {
            address: u16::from_be_bytes([frame[1], frame[2]]),
            percent,
            operation,
            stalled,
        })
    }
}

/// Configuration for a [`Gm40Cover`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gm40Config {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Bus address of the motor.
    pub address: u16,
}

impl Gm40Config {
    /// Creates a config for the named motor at `address`.
    pub fn new(name: &str, address: u16) -> Self {
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

/// Cover driver mirroring a GM40 motor's self-reported state.
pub struct Gm40Cover<L: FrameLink, S: StateStore> {
    core: CoverCore,
    link: L,
    store: S,
    codec: Gm40Codec,
    address: u16,
    last_published: Option<CoverState>,
}

impl<L: FrameLink, S: StateStore> Gm40Cover<L, S> {
    /// Creates a driver from its link, store, and config.
    pub fn new(link: L, store: S, config: Gm40Config) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            link,
            store,
            codec: Gm40Codec::new(),
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
            .send(&Gm40Codec::command_frame(self.address, CMD_QUERY, 0x00))
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

    fn apply_report(&mut self, report: Gm40Report) {
        if report.address != self.address {
            return;
        }
        if report.stalled {
            log::warn!("'{}': motor reported a stall", self.core.name());
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

impl<L: FrameLink, S: StateStore> CoverControl for Gm40Cover<L, S> {
    type Error = L::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new().with_position(true).with_stop(true)
    }

    fn control(&mut self, call: &CoverCall, _now_ms: u64) -> Result<(), L::Error> {
        if call.is_stop() {
            self.link
                .send(&Gm40Codec::command_frame(self.address, CMD_STOP, 0x00))?;
            return Ok(());
        }

        if let Some(pos) = call.position() {
            if pos == COVER_OPEN {
                self.link
                    .send(&Gm40Codec::command_frame(self.address, CMD_UP, 0x00))?;
            } else if pos == COVER_CLOSED {
                self.link
                    .send(&Gm40Codec::command_frame(self.address, CMD_DOWN, 0x00))?;
            } else {
                let percent = (pos * 100.0 + 0.5) as u8;
                self.link
                    .send(&Gm40Codec::command_frame(self.address, CMD_PERCENT, percent))?;
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MemoryStore, MockLink};

    fn report_frame(address: u16, percent: u8, status: u8) -> [u8; REPORT_LEN] {
        let [hi, lo] = address.to_be_bytes();
        let mut f = [START, hi, lo, REPORT_MARKER, percent, status, 0];
        f[REPORT_LEN - 1] = sum_checksum(&f[..REPORT_LEN - 1]);
        f
    }

    fn cover(address: u16) -> Gm40Cover<MockLink, MemoryStore> {
        Gm40Cover::new(
            MockLink::new(),
            MemoryStore::new(),
            Gm40Config::new("awning", address),
        )
    }

    #[test]
    fn command_frame_addresses_sixteen_bits() {
        let frame = Gm40Codec::command_frame(0x1234, CMD_UP, 0);
        assert_eq!(frame[..5], [START, 0x12, 0x34, CMD_UP, 0x00]);
        assert_eq!(frame[5], sum_checksum(&frame[..5]));
    }

    #[test]
    fn report_parses() {
        let mut codec = Gm40Codec::new();
        let mut out = None;
        for b in report_frame(0x0102, 64, STATUS_RISING) {
            out = codec.feed(b);
        }
        let report = out.unwrap();
        assert_eq!(report.address, 0x0102);
        assert_eq!(report.percent, 64);
        assert_eq!(report.operation, CoverOperation::Opening);
        assert!(!report.stalled);
    }

    #[test]
    fn stall_collapses_to_idle() {
        let mut codec = Gm40Codec::new();
        let mut out = None;
        for b in report_frame(0x0102, 30, STATUS_STALLED) {
            out = codec.feed(b);
        }
        let report = out.unwrap();
        assert_eq!(report.operation, CoverOperation::Idle);
        assert!(report.stalled);
    }

    #[test]
    fn bad_marker_is_dropped() {
        let mut codec = Gm40Codec::new();
        let mut frame = report_frame(0x0102, 30, STATUS_STOPPED);
        frame[3] = 0x77;
        frame[REPORT_LEN - 1] = sum_checksum(&frame[..REPORT_LEN - 1]);
        let mut out = None;
        for b in frame {
            out = codec.feed(b);
        }
        assert_eq!(out, None);
        assert_eq!(codec.stats.frames_dropped, 1);
    }

    #[test]
    fn driver_mirrors_reports() {
        let mut c = cover(0x0102);
        c.link_mut().queue_rx(&report_frame(0x0102, 80, STATUS_LOWERING));
        c.loop_tick().unwrap();
        assert!((c.position() - 0.8).abs() < 1e-6);
        assert_eq!(c.current_operation(), CoverOperation::Closing);
    }

    #[test]
    fn commands_map_to_frames() {
        let mut c = cover(0x0102);
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.make_call().set_position(0.5).perform(0).unwrap();
        c.make_call().set_stop(true).perform(0).unwrap();

        assert_eq!(
            c.link_mut().sent,
            [
                Gm40Codec::command_frame(0x0102, CMD_UP, 0).to_vec(),
                Gm40Codec::command_frame(0x0102, CMD_PERCENT, 50).to_vec(),
                Gm40Codec::command_frame(0x0102, CMD_STOP, 0).to_vec(),
            ]
        );
    }
}
