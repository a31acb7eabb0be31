//! HE60R garage engine driver.
//!
//! The engine is chatty but primitive: it broadcasts status frames
//! carrying a travel count and motion flags, and accepts exactly one
//! movement command, a toggle that cycles open, stop, close, stop. The
//! driver turns the entity's open/close/stop vocabulary into however
//! many toggles it takes, one per poll so each can take effect before
//! the next is judged necessary.
//!
//! ```text
//! command: 0x68 | 0x80|cmd | 0x00     | 0x00     | checksum(xor)
//! status:  0x68 | flags    | count_hi | count_lo | checksum(xor)
//! ```
//!
//! Position is `count / full_travel_count`, zero at fully closed. After
//! the engine hits an endstop it recalibrates its count for a short
//! dwell during which commands are swallowed; the driver holds off and
//! reports `Idle` for that window.

use crate::call::{CoverCall, CoverControl};
use crate::config::CoverConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::traits::{FrameLink, StateStore};
use crate::wire::{xor_checksum, FrameError, RxStats};

const START: u8 = 0x68;

const CMD_TOGGLE: u8 = 0x81;
const CMD_QUERY: u8 = 0x82;

const FLAG_MOVING: u8 = 0x01;
const FLAG_CLOSING: u8 = 0x02;
const FLAG_AT_CLOSED: u8 = 0x04;
const FLAG_AT_OPEN: u8 = 0x08;
const FLAG_KNOWN: u8 = FLAG_MOVING | FLAG_CLOSING | FLAG_AT_CLOSED | FLAG_AT_OPEN;

const FRAME_LEN: usize = 5;

/// Post-endstop dwell while the engine recalibrates its travel count.
const CALIBRATE_DWELL_MS: u64 = 1500;

/// How many polls between periodic status queries once the engine has
/// been heard from.
const POLL_DIVIDER: u8 = 10;

/// One parsed engine status frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct He60rStatus {
    /// Travel count from fully closed.
    pub count: u16,
    /// Motion state.
    pub operation: CoverOperation,
    /// Closed endstop reached.
    pub at_closed: bool,
    /// Open endstop reached.
    pub at_open: bool,
}

/// Frame builder and receive state machine for the HE60R bus.
#[derive(Clone, Debug, Default)]
pub struct He60rCodec {
    buf: heapless::Vec<u8, FRAME_LEN>,
    /// Receive diagnostics.
    pub stats: RxStats,
}

impl He60rCodec {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the toggle command.
    pub fn toggle_frame() -> [u8; FRAME_LEN] {
        Self::command(CMD_TOGGLE)
    }

    /// Build the status query.
    pub fn query_frame() -> [u8; FRAME_LEN] {
        Self::command(CMD_QUERY)
    }

    fn command(cmd: u8) -> [u8; FRAME_LEN] {
        let mut out = [START, cmd, 0x00, 0x00, 0];
        out[FRAME_LEN - 1] = xor_checksum(&out[..FRAME_LEN - 1]);
        out
    }

    /// Push one received byte; returns a status when a frame completes.
    pub fn feed(&mut self, byte: u8) -> Option<He60rStatus> {
        if self.buf.is_empty() && byte != START {
            self.stats.discard(FrameError::BadStart { got: byte });
            return None;
        }
        let _ = self.buf.push(byte);
        if self.buf.len() < FRAME_LEN {
            return None;
        }

        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.buf);
        self.buf.clear();
        match Self::parse(&frame) {
            Ok(status) => {
                self.stats.accept();
                Some(status)
            }
            Err(err) => {
                self.stats.discard(err);
                None
            }
        }
    }

    fn parse(frame: &[u8; FRAME_LEN]) -> Result<He60rStatus, FrameError> {
        let expected = xor_checksum(&frame[..FRAME_LEN - 1]);
        let got = frame[FRAME_LEN - 1];
        if expected != got {
            return Err(FrameError::Checksum { expected, got });
        }
        let flags = frame[1];
        if flags & !FLAG_KNOWN != 0 {
            return Err(FrameError::BadField { got: flags });
        }
        let operation = if flags & FLAG_MOVING != 0 {
            if flags & FLAG_CLOSING != 0 {
                CoverOperation::Closing
            } else {
                CoverOperation::Opening
            }
        } else {
            CoverOperation::Idle
        };
        Ok(He60rStatus {
            count: u16::from_be_bytes([frame[2], frame[3]]),
            operation,
            at_closed: flags & FLAG_AT_CLOSED != 0,
            at_open: flags & FLAG_AT_OPEN != 0,
        })
    }
}

/// Configuration for a [`He60rCover`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct He60rConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Travel count the engine reports at fully open.
    pub full_travel_count: u16,
}

impl He60rConfig {
    /// Creates a config for the named door.
    pub fn new(name: &str) -> Self {
        Self {
            cover: CoverConfig::new(name).with_device_class("garage"),
            full_travel_count: 1000,
        }
    }

    /// Set the travel count reported at fully open.
    pub fn with_full_travel_count(mut self, count: u16) -> Self {
        self.full_travel_count = count.max(1);
        self
    }
}

/// Cover driver for the toggle-only HE60R garage engine.
///
/// Tracks a desired extreme and steps the engine toward it one toggle
/// per poll; the status stream is the only source of truth for motion
/// and position.
pub struct He60rCover<L: FrameLink, S: StateStore> {
    core: CoverCore,
    link: L,
    store: S,
    codec: He60rCodec,
    full_travel_count: u16,
    target: Option<f32>,
    query_seen: bool,
    poll_counter: u8,
    calibrate_until_ms: Option<u64>,
    last_published: Option<CoverState>,
}

impl<L: FrameLink, S: StateStore> He60rCover<L, S> {
    /// Creates a driver from its link, store, and config.
    pub fn new(link: L, store: S, config: He60rConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            link,
            store,
            codec: He60rCodec::new(),
            full_travel_count: config.full_travel_count,
            target: None,
            query_seen: false,
            poll_counter: 0,
            calibrate_until_ms: None,
            last_published: None,
        }
    }

    /// Restore persisted position until the first status arrives.
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
    ///
    /// The calibration dwell reports as `Idle`.
    pub fn current_operation(&self) -> CoverOperation {
        self.core.current_operation()
    }

    /// Whether the engine has answered the startup query yet.
    pub fn query_seen(&self) -> bool {
        self.query_seen
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

    /// Poll cadence work: startup query until the engine answers, then
    /// periodic re-queries and one pursuit toggle when off target.
    pub fn update(&mut self, now_ms: u64) -> Result<(), L::Error> {
        if !self.query_seen {
            self.link.send(&He60rCodec::query_frame())?;
            return Ok(());
        }

        self.poll_counter = self.poll_counter.wrapping_add(1);
        if self.poll_counter % POLL_DIVIDER == 0 {
            self.link.send(&He60rCodec::query_frame())?;
        }

        if let Some(until) = self.calibrate_until_ms {
            if now_ms < until {
                return Ok(());
            }
            self.calibrate_until_ms = None;
        }

        if let Some(target) = self.target {
            let op = self.core.current_operation();
            let desired = if target == COVER_OPEN {
                CoverOperation::Opening
            } else {
                CoverOperation::Closing
            };
            let arrived = (target == COVER_OPEN && self.core.is_fully_open())
                || (target == COVER_CLOSED && self.core.is_fully_closed());
            if arrived {
                self.target = None;
            } else if op != desired {
                // Wrong way or stopped: one toggle, then wait for the
                // status stream to show the effect.
                self.link.send(&He60rCodec::toggle_frame())?;
            }
        }
        Ok(())
    }

    /// Drain received bytes and mirror any status.
    pub fn loop_tick(&mut self, now_ms: u64) -> Result<(), L::Error> {
        while let Some(byte) = self.link.poll_byte() {
            if let Some(status) = self.codec.feed(byte) {
                self.apply_status(status, now_ms);
            }
        }
        Ok(())
    }

    fn apply_status(&mut self, status: He60rStatus, now_ms: u64) {
        self.query_seen = true;
        let was_moving = self.core.current_operation() != CoverOperation::Idle;

        if status.at_open {
            self.core.position = COVER_OPEN;
        } else if status.at_closed {
            self.core.position = COVER_CLOSED;
        } else {
            self.core.position =
                (status.count as f32 / self.full_travel_count as f32).clamp(COVER_CLOSED, COVER_OPEN);
        }
        self.core.operation = status.operation;

        if was_moving
            && status.operation == CoverOperation::Idle
            && (status.at_open || status.at_closed)
        {
            // The engine recalibrates after hitting an endstop and
            // swallows commands until it is done.
            self.calibrate_until_ms = Some(now_ms + CALIBRATE_DWELL_MS);
        }

        let state = self.core.state();
        if self.last_published != Some(state) {
            let save = status.operation == CoverOperation::Idle;
            self.core.publish_state(save, &mut self.store);
            self.last_published = Some(state);
        }
    }
}

impl<L: FrameLink, S: StateStore> CoverControl for He60rCover<L, S> {
    type Error = L::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new().with_stop(true).with_toggle(true)
    }

    fn control(&mut self, call: &CoverCall, _now_ms: u64) -> Result<(), L::Error> {
        if call.is_stop() {
            self.target = None;
            if self.core.current_operation() != CoverOperation::Idle {
                self.link.send(&He60rCodec::toggle_frame())?;
            }
            return Ok(());
        }

        if call.is_toggle() {
            self.target = None;
            self.link.send(&He60rCodec::toggle_frame())?;
            return Ok(());
        }

        // Only binary positions survive validation without position
        // support; pursuit toward the extreme happens in update().
        if let Some(pos) = call.position() {
            self.target = Some(pos);
            let desired = if pos == COVER_OPEN {
                CoverOperation::Opening
            } else {
                CoverOperation::Closing
            };
            let arrived = (pos == COVER_OPEN && self.core.is_fully_open())
                || (pos == COVER_CLOSED && self.core.is_fully_closed());
            if arrived {
                self.target = None;
            } else if self.calibrate_until_ms.is_none()
                && self.core.current_operation() != desired
            {
                self.link.send(&He60rCodec::toggle_frame())?;
            }
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

    fn status_frame(flags: u8, count: u16) -> [u8; FRAME_LEN] {
        let [hi, lo] = count.to_be_bytes();
        let mut f = [START, flags, hi, lo, 0];
        f[FRAME_LEN - 1] = xor_checksum(&f[..FRAME_LEN - 1]);
        f
    }

    fn cover() -> He60rCover<MockLink, MemoryStore> {
        He60rCover::new(
            MockLink::new(),
            MemoryStore::new(),
            He60rConfig::new("garage door").with_full_travel_count(1000),
        )
    }

    // === Codec ===

    #[test]
    fn status_parses_count_and_flags() {
        let mut codec = He60rCodec::new();
        let mut out = None;
        for b in status_frame(FLAG_MOVING | FLAG_CLOSING, 420) {
            out = codec.feed(b);
        }
        let status = out.unwrap();
        assert_eq!(status.count, 420);
        assert_eq!(status.operation, CoverOperation::Closing);
        assert!(!status.at_open);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let mut codec = He60rCodec::new();
        let mut out = None;
        for b in status_frame(0x40, 0) {
            out = codec.feed(b);
        }
        assert_eq!(out, None);
        assert_eq!(codec.stats.frames_dropped, 1);
    }

    // === Startup query ===

    #[test]
    fn queries_until_first_status() {
        let mut c = cover();
        c.update(0).unwrap();
        c.update(100).unwrap();
        assert_eq!(c.link_mut().sent.len(), 2);
        assert_eq!(c.link_mut().last_sent(), Some(&He60rCodec::query_frame()[..]));
        assert!(!c.query_seen());

        c.link_mut().queue_rx(&status_frame(FLAG_AT_CLOSED, 0));
        c.loop_tick(200).unwrap();
        assert!(c.query_seen());
    }

    // === Status mirroring ===

    #[test]
    fn count_maps_to_position() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_MOVING, 250));
        c.loop_tick(0).unwrap();
        assert!((c.position() - 0.25).abs() < 1e-6);
        assert_eq!(c.current_operation(), CoverOperation::Opening);
    }

    #[test]
    fn endstop_flags_pin_the_extremes() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_AT_OPEN, 987));
        c.loop_tick(0).unwrap();
        assert_eq!(c.position(), COVER_OPEN);
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    // === Toggle pursuit ===

    #[test]
    fn open_request_sends_a_toggle() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_AT_CLOSED, 0));
        c.loop_tick(0).unwrap();
        c.link_mut().sent.clear();

        c.make_call().set_position(1.0).perform(0).unwrap();
        assert_eq!(c.link_mut().sent, [He60rCodec::toggle_frame().to_vec()]);
    }

    #[test]
    fn pursuit_retries_when_the_engine_moves_the_wrong_way() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_AT_CLOSED, 0));
        c.loop_tick(0).unwrap();
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.link_mut().sent.clear();

        // Engine starts closing instead (alternation state mismatch).
        c.link_mut().queue_rx(&status_frame(FLAG_MOVING | FLAG_CLOSING, 10));
        c.loop_tick(100).unwrap();
        c.update(200).unwrap();
        assert!(c
            .link_mut()
            .sent
            .contains(&He60rCodec::toggle_frame().to_vec()));
    }

    #[test]
    fn pursuit_is_quiet_while_moving_the_right_way() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_AT_CLOSED, 0));
        c.loop_tick(0).unwrap();
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.link_mut().sent.clear();

        c.link_mut().queue_rx(&status_frame(FLAG_MOVING, 100));
        c.loop_tick(100).unwrap();
        c.update(200).unwrap();
        assert!(c.link_mut().sent.is_empty());
    }

    #[test]
    fn pursuit_ends_at_the_target() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_AT_CLOSED, 0));
        c.loop_tick(0).unwrap();
        c.make_call().set_position(1.0).perform(0).unwrap();

        c.link_mut().queue_rx(&status_frame(FLAG_AT_OPEN, 1000));
        c.loop_tick(5_000).unwrap();
        c.link_mut().sent.clear();

        // Target reached: nothing more to send.
        c.update(10_000).unwrap();
        c.update(10_500).unwrap();
        assert!(c.link_mut().sent.is_empty());
    }

    // === Calibration dwell ===

    #[test]
    fn dwell_swallows_pursuit_toggles() {
        let mut c = cover();
        // Door travels closed and arrives: the engine recalibrates.
        c.link_mut().queue_rx(&status_frame(FLAG_MOVING | FLAG_CLOSING, 100));
        c.loop_tick(900).unwrap();
        c.link_mut().queue_rx(&status_frame(FLAG_AT_CLOSED, 0));
        c.loop_tick(1_000).unwrap();
        c.link_mut().sent.clear();

        // Ask to open during the dwell; the pursuit must hold off.
        c.make_call().set_position(1.0).perform(1_100).unwrap();
        c.update(1_200).unwrap();
        assert!(c.link_mut().sent.is_empty());
        assert_eq!(c.current_operation(), CoverOperation::Idle);

        // Dwell over: the toggle goes out.
        c.update(1_000 + CALIBRATE_DWELL_MS).unwrap();
        assert_eq!(c.link_mut().sent, [He60rCodec::toggle_frame().to_vec()]);
    }

    #[test]
    fn stop_toggles_only_while_moving() {
        let mut c = cover();
        c.link_mut().queue_rx(&status_frame(FLAG_MOVING, 500));
        c.loop_tick(0).unwrap();
        c.link_mut().sent.clear();

        c.make_call().set_stop(true).perform(0).unwrap();
        assert_eq!(c.link_mut().sent, [He60rCodec::toggle_frame().to_vec()]);

        c.link_mut().queue_rx(&status_frame(0, 500));
        c.loop_tick(100).unwrap();
        c.link_mut().sent.clear();
        c.make_call().set_stop(true).perform(200).unwrap();
        assert!(c.link_mut().sent.is_empty());
    }
}
