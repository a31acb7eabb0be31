//! Combined travel and tilt estimation for one-motor venetian blinds.
//!
//! The motor drives both axes: at a direction start the slats rotate
//! first, consuming the tilt duration, and only then does the carrier
//! travel, consuming the position duration. The driver models that as
//! two estimators fed sequentially: the position estimator is re-marked
//! at the tick where the tilt axis saturates, so carrier time never
//! includes slat rotation.
//!
//! Tilt-only adjustments while the cover is at rest run the motor just
//! long enough to swing the slats, leaving the position untouched.

use crate::call::{CoverCall, CoverControl};
use crate::config::TimeBasedTiltConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::estimator::TravelEstimator;
use crate::timer::OneShot;
use crate::traits::{CoverActuator, StateStore};

const PUBLISH_INTERVAL_MS: u64 = 1000;

/// Cover driver estimating travel and slat tilt from one motor's time.
pub struct TimeBasedTiltCover<A: CoverActuator, S: StateStore> {
    core: CoverCore,
    actuator: A,
    store: S,
    travel: TravelEstimator,
    tilt_axis: TravelEstimator,
    target_position: Option<f32>,
    target_tilt: Option<f32>,
    start_dir_ms: u64,
    last_publish_ms: u64,
    last_operation: CoverOperation,
    pending_reversal: OneShot<CoverOperation>,
    interlock_wait_ms: u32,
    max_duration_ms: Option<u32>,
    assumed_state: bool,
}

impl<A: CoverActuator, S: StateStore> TimeBasedTiltCover<A, S> {
    /// Creates a driver from its hardware seam, store, and config.
    pub fn new(actuator: A, store: S, config: TimeBasedTiltConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            actuator,
            store,
            travel: TravelEstimator::new(config.open_duration_ms, config.close_duration_ms),
            tilt_axis: TravelEstimator::new(config.tilt_duration_ms, config.tilt_duration_ms),
            target_position: None,
            target_tilt: None,
            start_dir_ms: 0,
            last_publish_ms: 0,
            last_operation: CoverOperation::Opening,
            pending_reversal: OneShot::new(),
            interlock_wait_ms: config.interlock_wait_ms,
            max_duration_ms: config.max_duration_ms,
            assumed_state: config.assumed_state,
        }
    }

    /// Restore persisted position and tilt, keeping the half-open
    /// assumption when no record exists.
    pub fn setup(&mut self) {
        if !self.core.restore(&mut self.store) {
            log::debug!("'{}': no stored state, assuming half-open", self.core.name());
        }
    }

    /// Current estimated position.
    pub fn position(&self) -> f32 {
        self.core.position()
    }

    /// Current estimated tilt.
    pub fn tilt(&self) -> f32 {
        self.core.tilt()
    }

    /// Current motion state.
    pub fn current_operation(&self) -> CoverOperation {
        self.core.current_operation()
    }

    /// Position the driver is currently travelling toward, if any.
    pub fn target_position(&self) -> Option<f32> {
        self.target_position
    }

    /// Tilt the driver is currently swinging toward, if any.
    pub fn target_tilt(&self) -> Option<f32> {
        self.target_tilt
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> CoverState {
        self.core.state()
    }

    /// The embedded entity core, for listener registration.
    pub fn core_mut(&mut self) -> &mut CoverCore {
        &mut self.core
    }

    /// The hardware seam, for inspection in tests and integrations.
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Advance both axes and run target/safety checks.
    pub fn loop_tick(&mut self, now_ms: u64) -> Result<(), A::Error> {
        if let Some(dir) = self.pending_reversal.take_due(now_ms) {
            self.start_direction(dir, now_ms)?;
            self.publish(false, now_ms);
        }

        let op = self.core.current_operation();
        if op == CoverOperation::Idle {
            return Ok(());
        }

        self.recompute_axes(now_ms);

        if let Some(max) = self.max_duration_ms {
            if now_ms.saturating_sub(self.start_dir_ms) > max as u64 {
                log::warn!(
                    "'{}': still moving after {max} ms, forcing stop",
                    self.core.name()
                );
                self.target_position = None;
                self.target_tilt = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
                return Ok(());
            }
        }

        if let Some(target) = self.target_position {
            if TravelEstimator::is_at_target(op, self.core.position(), target) {
                self.target_position = None;
                // A differing tilt request finishes as a slat-only move.
                match self.target_tilt {
                    Some(tt) if tt != self.core.tilt() => {
                        let dir = if tt < self.core.tilt() {
                            CoverOperation::Closing
                        } else {
                            CoverOperation::Opening
                        };
                        self.start_direction(dir, now_ms)?;
                        self.publish(false, now_ms);
                    }
                    _ => {
                        self.target_tilt = None;
                        self.start_direction(CoverOperation::Idle, now_ms)?;
                        self.publish(true, now_ms);
                    }
                }
                return Ok(());
            }
        } else if let Some(target) = self.target_tilt {
            if TravelEstimator::is_at_target(op, self.core.tilt(), target) {
                self.target_tilt = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
                return Ok(());
            }
        }

        if now_ms.saturating_sub(self.last_publish_ms) > PUBLISH_INTERVAL_MS {
            self.publish(false, now_ms);
        }
        Ok(())
    }

    /// Slats first, carrier second.
    ///
    /// The tilt axis integrates until it saturates at the direction's
    /// extreme; the travel estimator is re-marked at that tick and takes
    /// over. During a tilt-only move the travel target is absent and
    /// only the tilt axis integrates.
    fn recompute_axes(&mut self, now_ms: u64) {
        let op = self.core.current_operation();
        let tilt_extreme = match op {
            CoverOperation::Opening => 1.0,
            CoverOperation::Closing => 0.0,
            CoverOperation::Idle => return,
        };

        if self.target_position.is_none() {
            // Slat-only adjustment.
            self.core.tilt = self
                .tilt_axis
                .advance(op, self.core.tilt(), now_ms, self.start_dir_ms, 0.0, 1.0);
            self.travel.mark(now_ms);
            return;
        }

        if self.core.tilt() != tilt_extreme {
            self.core.tilt = self
                .tilt_axis
                .advance(op, self.core.tilt(), now_ms, self.start_dir_ms, 0.0, 1.0);
            // Carrier time starts when the slats saturate.
            self.travel.mark(now_ms);
        } else {
            self.tilt_axis.mark(now_ms);
            self.core.position = self.travel.advance(
                op,
                self.core.position(),
                now_ms,
                self.start_dir_ms,
                COVER_CLOSED,
                COVER_OPEN,
            );
        }
    }

    fn start_or_defer(&mut self, dir: CoverOperation, now_ms: u64) -> Result<(), A::Error> {
        self.pending_reversal.cancel();
        if dir != CoverOperation::Idle
            && self.core.current_operation() == dir.reversed()
            && self.interlock_wait_ms > 0
        {
            log::debug!(
                "'{}': interlock, stopping {} ms before reversing",
                self.core.name(),
                self.interlock_wait_ms
            );
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(false, now_ms);
            self.pending_reversal
                .schedule(now_ms + self.interlock_wait_ms as u64, dir);
            return Ok(());
        }
        self.start_direction(dir, now_ms)?;
        self.publish(false, now_ms);
        Ok(())
    }

    fn start_direction(&mut self, dir: CoverOperation, now_ms: u64) -> Result<(), A::Error> {
        if dir == self.core.current_operation() && dir != CoverOperation::Idle {
            return Ok(());
        }
        self.recompute_axes(now_ms);
        self.actuator.drive(dir)?;
        self.core.operation = dir;
        if dir != CoverOperation::Idle {
            self.last_operation = dir;
        }
        self.start_dir_ms = now_ms;
        self.travel.mark(now_ms);
        self.tilt_axis.mark(now_ms);
        log::debug!("'{}': {}", self.core.name(), dir.as_str());
        Ok(())
    }

    fn publish(&mut self, save: bool, now_ms: u64) {
        self.last_publish_ms = now_ms;
        self.core.publish_state(save, &mut self.store);
    }
}

impl<A: CoverActuator, S: StateStore> CoverControl for TimeBasedTiltCover<A, S> {
    type Error = A::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new()
            .with_position(true)
            .with_tilt(true)
            .with_stop(true)
            .with_toggle(true)
            .with_assumed_state(self.assumed_state)
    }

    fn control(&mut self, call: &CoverCall, now_ms: u64) -> Result<(), A::Error> {
        if call.is_stop() {
            self.pending_reversal.cancel();
            self.target_position = None;
            self.target_tilt = None;
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(true, now_ms);
            return Ok(());
        }

        if call.is_toggle() {
            if self.core.current_operation() != CoverOperation::Idle
                || self.pending_reversal.is_pending()
            {
                self.pending_reversal.cancel();
                self.target_position = None;
                self.target_tilt = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
            } else if self.core.is_fully_closed() || self.last_operation == CoverOperation::Closing
            {
                self.target_position = Some(COVER_OPEN);
                self.target_tilt = Some(1.0);
                self.start_or_defer(CoverOperation::Opening, now_ms)?;
            } else {
                self.target_position = Some(COVER_CLOSED);
                self.target_tilt = Some(0.0);
                self.start_or_defer(CoverOperation::Closing, now_ms)?;
            }
            return Ok(());
        }

        if let Some(pos) = call.position() {
            if pos != self.core.position() {
                let dir = if pos < self.core.position() {
                    CoverOperation::Closing
                } else {
                    CoverOperation::Opening
                };
                self.target_position = Some(pos);
                if call.tilt().is_none() {
                    self.target_tilt = None;
                }
                self.start_or_defer(dir, now_ms)?;
            }
        }

        if let Some(tilt) = call.tilt() {
            if self.target_position.is_some() {
                // Remembered; applied after the travel completes.
                self.target_tilt = Some(tilt);
            } else if tilt != self.core.tilt() {
                let dir = if tilt < self.core.tilt() {
                    CoverOperation::Closing
                } else {
                    CoverOperation::Opening
                };
                self.target_tilt = Some(tilt);
                self.start_or_defer(dir, now_ms)?;
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
    use crate::hal::{MemoryStore, MockActuator};

    const EPS: f32 = 1e-4;

    fn cover() -> TimeBasedTiltCover<MockActuator, MemoryStore> {
        // 10 s travel each way, 2 s slat swing.
        let mut c = TimeBasedTiltCover::new(
            MockActuator::new(),
            MemoryStore::new(),
            TimeBasedTiltConfig::new("venetian", 10_000, 10_000, 2_000),
        );
        c.core_mut().position = COVER_CLOSED;
        c.core_mut().tilt = 0.0;
        c
    }

    #[test]
    fn slats_rotate_before_the_carrier_moves() {
        let mut c = cover();
        c.make_call().set_position(1.0).perform(0).unwrap();

        // Inside the slat swing: tilt moves, position does not.
        c.loop_tick(1_000).unwrap();
        assert!((c.tilt() - 0.5).abs() < EPS);
        assert_eq!(c.position(), 0.0);

        // Swing complete.
        c.loop_tick(2_000).unwrap();
        assert_eq!(c.tilt(), 1.0);
        assert_eq!(c.position(), 0.0);

        // Carrier time starts after the swing.
        c.loop_tick(7_000).unwrap();
        assert!((c.position() - 0.5).abs() < EPS);
        assert_eq!(c.current_operation(), CoverOperation::Opening);
    }

    #[test]
    fn full_open_takes_tilt_plus_travel_time() {
        let mut c = cover();
        c.make_call().set_position(1.0).perform(0).unwrap();

        for t in 1..=24 {
            c.loop_tick(t * 500).unwrap();
        }
        assert_eq!(c.position(), 1.0);
        assert_eq!(c.tilt(), 1.0);
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    #[test]
    fn tilt_only_move_leaves_position_alone() {
        let mut c = cover();
        c.core_mut().position = 0.5;
        c.make_call().set_tilt(1.0).perform(0).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Opening);

        c.loop_tick(2_000).unwrap();
        assert_eq!(c.tilt(), 1.0);
        assert_eq!(c.position(), 0.5);
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    #[test]
    fn tilt_request_after_travel_completes() {
        let mut c = cover();
        // Open fully, then leave the slats half-tilted.
        c.make_call().set_position(1.0).set_tilt(0.5).perform(0).unwrap();

        for t in 1..=24 {
            c.loop_tick(t * 500).unwrap();
        }
        assert_eq!(c.position(), 1.0);
        // Travel done; the slat move toward 0.5 is in progress.
        assert_eq!(c.current_operation(), CoverOperation::Closing);
        assert_eq!(c.target_tilt(), Some(0.5));

        c.loop_tick(13_000).unwrap();
        assert!((c.tilt() - 0.5).abs() < 0.26);
        c.loop_tick(14_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    #[test]
    fn stop_clears_both_targets() {
        let mut c = cover();
        c.make_call().set_position(1.0).set_tilt(0.5).perform(0).unwrap();
        c.loop_tick(1_000).unwrap();

        c.make_call().set_stop(true).perform(1_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert_eq!(c.target_position(), None);
        assert_eq!(c.target_tilt(), None);
    }

    #[test]
    fn interlocked_reversal_is_deferred() {
        let mut c = TimeBasedTiltCover::new(
            MockActuator::new(),
            MemoryStore::new(),
            TimeBasedTiltConfig::new("venetian", 10_000, 10_000, 2_000).with_interlock_wait(500),
        );
        c.core_mut().position = COVER_CLOSED;
        c.core_mut().tilt = 0.0;

        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(4_000).unwrap();

        c.make_call().set_position(0.0).perform(4_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);

        c.loop_tick(4_500).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Closing);
    }

    #[test]
    fn max_duration_stops_both_axes() {
        let mut c = TimeBasedTiltCover::new(
            MockActuator::new(),
            MemoryStore::new(),
            TimeBasedTiltConfig::new("venetian", 10_000, 10_000, 2_000).with_max_duration(5_000),
        );
        c.core_mut().position = COVER_CLOSED;
        c.core_mut().tilt = 0.0;

        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(5_001).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert_eq!(c.target_position(), None);
        assert_eq!(c.target_tilt(), None);
    }
}
