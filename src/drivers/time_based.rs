//! Time-based position estimation.
//!
//! The baseline estimator driver: no sensors at all. Position is pure
//! extrapolation from elapsed time and the configured traverse
//! durations, so the reported state is an assumption: accurate as long
//! as nothing slips, and recalibrated by every full traverse.
//!
//! Covers with a built-in endstop stop themselves at the extremes; for
//! those the driver suppresses its own stop command at full open/closed
//! and re-issues the direction command when asked for an extreme it
//! already believes it is at, correcting accumulated drift.
//!
//! # Example
//!
//! ```rust
//! use coverdrive::{CoverControl, CoverOperation, TimeBasedConfig, TimeBasedCover};
//! use coverdrive::hal::{MemoryStore, MockActuator};
//!
//! let config = TimeBasedConfig::new("shade", 10_000, 8_000);
//! let mut cover = TimeBasedCover::new(MockActuator::new(), MemoryStore::new(), config);
//! cover.setup();
//!
//! cover.make_call().set_position(1.0).perform(0).unwrap();
//! assert_eq!(cover.current_operation(), CoverOperation::Opening);
//!
//! // Half of the 10 second open traverse from the half-open default.
//! cover.loop_tick(5_000).unwrap();
//! assert_eq!(cover.current_operation(), CoverOperation::Idle);
//! assert_eq!(cover.position(), 1.0);
//! ```

use crate::call::{CoverCall, CoverControl};
use crate::config::TimeBasedConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::estimator::TravelEstimator;
use crate::timer::OneShot;
use crate::traits::{CoverActuator, StateStore};

/// Interval between unsaved position publishes while moving.
const PUBLISH_INTERVAL_MS: u64 = 1000;

/// Cover driver estimating position from elapsed time alone.
pub struct TimeBasedCover<A: CoverActuator, S: StateStore> {
    core: CoverCore,
    actuator: A,
    store: S,
    estimator: TravelEstimator,
    target_position: Option<f32>,
    start_dir_ms: u64,
    last_publish_ms: u64,
    pending_reversal: OneShot<CoverOperation>,
    last_operation: CoverOperation,
    interlock_wait_ms: u32,
    max_duration_ms: Option<u32>,
    has_built_in_endstop: bool,
    assumed_state: bool,
}

impl<A: CoverActuator, S: StateStore> TimeBasedCover<A, S> {
    /// Creates a driver from its hardware seam, store, and config.
    pub fn new(actuator: A, store: S, config: TimeBasedConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            actuator,
            store,
            estimator: TravelEstimator::new(config.open_duration_ms, config.close_duration_ms)
                .with_acceleration_wait(config.acceleration_wait_ms),
            target_position: None,
            start_dir_ms: 0,
            last_publish_ms: 0,
            pending_reversal: OneShot::new(),
            last_operation: CoverOperation::Opening,
            interlock_wait_ms: config.interlock_wait_ms,
            max_duration_ms: config.max_duration_ms,
            has_built_in_endstop: config.has_built_in_endstop,
            assumed_state: config.assumed_state,
        }
    }

    /// Restore persisted position, keeping the half-open assumption when
    /// no record exists. Call once before the first tick.
    pub fn setup(&mut self) {
        if !self.core.restore(&mut self.store) {
            log::debug!("'{}': no stored state, assuming half-open", self.core.name());
        }
    }

    /// Current estimated position.
    pub fn position(&self) -> f32 {
        self.core.position()
    }

    /// Current motion state.
    pub fn current_operation(&self) -> CoverOperation {
        self.core.current_operation()
    }

    /// Position the driver is currently travelling toward, if any.
    pub fn target_position(&self) -> Option<f32> {
        self.target_position
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

    /// Advance the estimate and run target/safety checks.
    ///
    /// Call once per scheduler tick with the monotonic time.
    pub fn loop_tick(&mut self, now_ms: u64) -> Result<(), A::Error> {
        if let Some(dir) = self.pending_reversal.take_due(now_ms) {
            self.start_direction(dir, now_ms)?;
            self.publish(false, now_ms);
        }

        if self.core.current_operation() == CoverOperation::Idle {
            return Ok(());
        }

        self.recompute_position(now_ms);

        if let Some(max) = self.max_duration_ms {
            if now_ms.saturating_sub(self.start_dir_ms) > max as u64 {
                log::warn!(
                    "'{}': still moving after {max} ms, forcing stop",
                    self.core.name()
                );
                self.target_position = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
                return Ok(());
            }
        }

        if let Some(target) = self.target_position {
            if TravelEstimator::is_at_target(self.core.current_operation(), self.core.position(), target)
            {
                if self.has_built_in_endstop && (target == COVER_OPEN || target == COVER_CLOSED) {
                    // The motor stops itself at the extreme.
                    self.core.operation = CoverOperation::Idle;
                } else {
                    self.start_direction(CoverOperation::Idle, now_ms)?;
                }
                self.target_position = None;
                self.publish(true, now_ms);
                return Ok(());
            }
        }

        if now_ms.saturating_sub(self.last_publish_ms) > PUBLISH_INTERVAL_MS {
            self.publish(false, now_ms);
        }
        Ok(())
    }

    fn recompute_position(&mut self, now_ms: u64) {
        self.core.position = self.estimator.advance(
            self.core.current_operation(),
            self.core.position(),
            now_ms,
            self.start_dir_ms,
            COVER_CLOSED,
            COVER_OPEN,
        );
    }

    /// Start a direction, honoring the interlock wait on reversals.
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

    /// Issue a drive command; idempotent for the active direction.
    fn start_direction(&mut self, dir: CoverOperation, now_ms: u64) -> Result<(), A::Error> {
        if dir == self.core.current_operation() && dir != CoverOperation::Idle {
            return Ok(());
        }
        self.recompute_position(now_ms);
        self.actuator.drive(dir)?;
        self.core.operation = dir;
        if dir != CoverOperation::Idle {
            self.last_operation = dir;
        }
        self.start_dir_ms = now_ms;
        self.estimator.mark(now_ms);
        log::debug!("'{}': {}", self.core.name(), dir.as_str());
        Ok(())
    }

    fn publish(&mut self, save: bool, now_ms: u64) {
        self.last_publish_ms = now_ms;
        self.core.publish_state(save, &mut self.store);
    }
}

impl<A: CoverActuator, S: StateStore> CoverControl for TimeBasedCover<A, S> {
    type Error = A::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new()
            .with_position(true)
            .with_stop(true)
            .with_toggle(true)
            .with_assumed_state(self.assumed_state)
    }

    fn control(&mut self, call: &CoverCall, now_ms: u64) -> Result<(), A::Error> {
        if call.is_stop() {
            self.pending_reversal.cancel();
            self.target_position = None;
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
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
            } else if self.core.is_fully_closed() || self.last_operation == CoverOperation::Closing
            {
                self.target_position = Some(COVER_OPEN);
                self.start_or_defer(CoverOperation::Opening, now_ms)?;
            } else {
                self.target_position = Some(COVER_CLOSED);
                self.start_or_defer(CoverOperation::Closing, now_ms)?;
            }
            return Ok(());
        }

        if let Some(pos) = call.position() {
            if pos == self.core.position() {
                // Already there; only endstop-equipped covers re-issue the
                // command to let the hardware correct drift.
                if self.has_built_in_endstop && (pos == COVER_OPEN || pos == COVER_CLOSED) {
                    let dir = if pos == COVER_OPEN {
                        CoverOperation::Opening
                    } else {
                        CoverOperation::Closing
                    };
                    self.target_position = Some(pos);
                    self.start_or_defer(dir, now_ms)?;
                }
            } else {
                let dir = if pos < self.core.position() {
                    CoverOperation::Closing
                } else {
                    CoverOperation::Opening
                };
                self.target_position = Some(pos);
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

    const EPS: f32 = 1e-5;

    fn cover(config: TimeBasedConfig) -> TimeBasedCover<MockActuator, MemoryStore> {
        TimeBasedCover::new(MockActuator::new(), MemoryStore::new(), config)
    }

    fn closed_cover(config: TimeBasedConfig) -> TimeBasedCover<MockActuator, MemoryStore> {
        let mut c = cover(config);
        c.core_mut().position = COVER_CLOSED;
        c
    }

    // === Basic movement ===

    #[test]
    fn open_command_starts_opening() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 8_000));
        c.make_call().set_position(1.0).perform(0).unwrap();

        assert_eq!(c.current_operation(), CoverOperation::Opening);
        assert_eq!(c.target_position(), Some(1.0));
        assert_eq!(c.actuator().last(), Some(CoverOperation::Opening));
    }

    #[test]
    fn position_advances_linearly_while_opening() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 8_000));
        c.make_call().set_position(1.0).perform(0).unwrap();

        c.loop_tick(5_000).unwrap();
        assert!((c.position() - 0.5).abs() < EPS);
        assert_eq!(c.current_operation(), CoverOperation::Opening);

        c.loop_tick(10_000).unwrap();
        assert_eq!(c.position(), 1.0);
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert_eq!(c.actuator().last(), Some(CoverOperation::Idle));
    }

    #[test]
    fn close_uses_its_own_duration() {
        let mut c = cover(TimeBasedConfig::new("c", 10_000, 8_000));
        c.core_mut().position = COVER_OPEN;
        c.make_call().set_position(0.0).perform(0).unwrap();

        c.loop_tick(4_000).unwrap();
        assert!((c.position() - 0.5).abs() < EPS);

        c.loop_tick(8_000).unwrap();
        assert_eq!(c.position(), 0.0);
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    #[test]
    fn mid_target_stops_at_target() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_position(0.3).perform(0).unwrap();

        c.loop_tick(2_999).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Opening);

        c.loop_tick(3_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert!((c.position() - 0.3).abs() < EPS);
    }

    // === Stop ===

    #[test]
    fn stop_forces_idle_and_keeps_estimate() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(4_000).unwrap();

        c.make_call().set_stop(true).perform(4_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert!((c.position() - 0.4).abs() < EPS);
        assert_eq!(c.target_position(), None);
    }

    #[test]
    fn stop_recomputes_up_to_now() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_position(1.0).perform(0).unwrap();

        // No tick between start and stop; the stop itself integrates.
        c.make_call().set_stop(true).perform(2_500).unwrap();
        assert!((c.position() - 0.25).abs() < EPS);
    }

    // === Toggle ===

    #[test]
    fn toggle_from_closed_opens() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_toggle(true).perform(0).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Opening);
        assert_eq!(c.target_position(), Some(COVER_OPEN));
    }

    #[test]
    fn toggle_while_moving_stops() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(2_000).unwrap();

        c.make_call().set_toggle(true).perform(2_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    #[test]
    fn toggle_alternates_direction() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 1_000, 1_000));

        c.make_call().set_toggle(true).perform(0).unwrap();
        c.loop_tick(1_000).unwrap();
        assert_eq!(c.position(), 1.0);

        // Last movement was opening, so the next toggle closes.
        c.make_call().set_toggle(true).perform(1_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Closing);
    }

    // === Idempotence ===

    #[test]
    fn repeated_direction_does_not_retrigger() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(2_000).unwrap();

        // Same direction again mid-travel: no new drive command.
        c.make_call().set_position(0.9).perform(2_000).unwrap();
        assert_eq!(c.actuator().count_of(CoverOperation::Opening), 1);

        // And the elapsed-time bookkeeping was not reset.
        c.loop_tick(4_000).unwrap();
        assert!((c.position() - 0.4).abs() < EPS);
    }

    // === Interlock ===

    #[test]
    fn reversal_waits_for_interlock() {
        let mut c =
            closed_cover(TimeBasedConfig::new("c", 10_000, 10_000).with_interlock_wait(500));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(4_000).unwrap();

        // Reverse while opening: immediate stop, deferred close.
        c.make_call().set_position(0.0).perform(4_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert_eq!(c.actuator().last(), Some(CoverOperation::Idle));

        c.loop_tick(4_400).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);

        c.loop_tick(4_500).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Closing);
        assert_eq!(c.actuator().last(), Some(CoverOperation::Closing));
    }

    #[test]
    fn new_command_cancels_pending_reversal() {
        let mut c =
            closed_cover(TimeBasedConfig::new("c", 10_000, 10_000).with_interlock_wait(500));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(4_000).unwrap();
        c.make_call().set_position(0.0).perform(4_000).unwrap();

        // Stop before the deferred close fires; it must never fire.
        c.make_call().set_stop(true).perform(4_200).unwrap();
        c.loop_tick(5_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert_eq!(c.actuator().count_of(CoverOperation::Closing), 0);
    }

    #[test]
    fn immediate_reversal_without_interlock() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(4_000).unwrap();

        c.make_call().set_position(0.0).perform(4_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Closing);
    }

    // === Max duration ===

    #[test]
    fn max_duration_forces_stop() {
        let mut c =
            closed_cover(TimeBasedConfig::new("c", 10_000, 10_000).with_max_duration(6_000));
        c.make_call().set_position(1.0).perform(0).unwrap();

        c.loop_tick(6_000).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Opening);

        c.loop_tick(6_001).unwrap();
        assert_eq!(c.current_operation(), CoverOperation::Idle);
        // Estimate is kept, acknowledged as possibly stale.
        assert!((c.position() - 0.6001).abs() < 1e-3);
    }

    // === Built-in endstop ===

    #[test]
    fn built_in_endstop_suppresses_stop_at_extreme() {
        let mut c =
            closed_cover(TimeBasedConfig::new("c", 1_000, 1_000).with_built_in_endstop(true));
        c.make_call().set_position(1.0).perform(0).unwrap();
        c.loop_tick(1_000).unwrap();

        assert_eq!(c.current_operation(), CoverOperation::Idle);
        assert_eq!(c.position(), 1.0);
        // Only the open command; the motor stopped itself.
        assert_eq!(c.actuator().commands, [CoverOperation::Opening]);
    }

    #[test]
    fn built_in_endstop_reissues_at_extreme() {
        let mut c =
            closed_cover(TimeBasedConfig::new("c", 1_000, 1_000).with_built_in_endstop(true));

        // Already fully closed; ask for fully closed again.
        c.make_call().set_position(0.0).perform(0).unwrap();
        assert_eq!(c.actuator().commands, [CoverOperation::Closing]);
        assert_eq!(c.current_operation(), CoverOperation::Closing);
    }

    #[test]
    fn plain_cover_ignores_request_for_current_position() {
        let mut c = closed_cover(TimeBasedConfig::new("c", 1_000, 1_000));
        c.make_call().set_position(0.0).perform(0).unwrap();
        assert!(c.actuator().commands.is_empty());
        assert_eq!(c.current_operation(), CoverOperation::Idle);
    }

    // === Publish cadence ===

    #[test]
    fn moving_cover_publishes_periodically() {
        use alloc::rc::Rc;
        use core::cell::RefCell;

        let mut c = closed_cover(TimeBasedConfig::new("c", 60_000, 60_000));
        let count = Rc::new(RefCell::new(0));
        let n = Rc::clone(&count);
        c.core_mut().add_on_state(move |_| *n.borrow_mut() += 1);

        c.make_call().set_position(1.0).perform(0).unwrap();
        let after_start = *count.borrow();

        for t in 1..=10 {
            c.loop_tick(t * 500).unwrap();
        }
        // 5 seconds of movement publishes at 1.5s, 3s, and 4.5s.
        assert_eq!(*count.borrow() - after_start, 3);
    }

    // === Persistence ===

    #[test]
    fn setup_restores_persisted_position() {
        let mut store = MemoryStore::new();
        {
            let mut c = TimeBasedCover::new(
                MockActuator::new(),
                store.clone(),
                TimeBasedConfig::new("c", 1_000, 1_000),
            );
            c.core_mut().position = COVER_CLOSED;
            c.make_call().set_position(1.0).perform(0).unwrap();
            c.loop_tick(1_000).unwrap();
            store = c.store.clone();
        }

        let mut fresh = TimeBasedCover::new(
            MockActuator::new(),
            store,
            TimeBasedConfig::new("c", 1_000, 1_000),
        );
        fresh.setup();
        assert_eq!(fresh.position(), 1.0);
    }

    #[test]
    fn setup_without_record_stays_half_open() {
        let mut c = cover(TimeBasedConfig::new("c", 1_000, 1_000));
        c.setup();
        assert_eq!(c.position(), 0.5);
    }

    // === Acceleration wait ===

    #[test]
    fn spin_up_window_is_excluded() {
        let mut c = closed_cover(
            TimeBasedConfig::new("c", 10_000, 10_000).with_acceleration_wait(1_000),
        );
        c.make_call().set_position(1.0).perform(0).unwrap();

        c.loop_tick(1_000).unwrap();
        assert_eq!(c.position(), 0.0);

        c.loop_tick(2_000).unwrap();
        assert!((c.position() - 0.1).abs() < EPS);
    }
}
