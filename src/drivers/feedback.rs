//! Feedback-sensor position estimation.
//!
//! Time extrapolation corrected by binary travel feedback: endstop
//! inputs pin the estimate to the exact extremes, and obstacle inputs
//! halt movement the moment something blocks the cover.
//!
//! While moving, the extrapolated position is clamped to an inset range
//! just short of the extremes: the real endstop claims the exact 0.0
//! or 1.0 boundary, and the estimator must never beat it there. Inputs
//! are polled levels; the driver does its own edge detection so a held
//! endstop does not retrigger every tick.

use crate::call::{CoverCall, CoverControl};
use crate::config::FeedbackConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::estimator::TravelEstimator;
use crate::timer::OneShot;
use crate::traits::{CoverActuator, StateStore, TravelSensors};

const PUBLISH_INTERVAL_MS: u64 = 1000;

/// Extrapolation bounds while an endstop sensor will claim the extreme.
const ENDSTOP_INSET_LO: f32 = 0.01;
const ENDSTOP_INSET_HI: f32 = 0.99;

/// Cover driver combining time extrapolation with binary feedback.
pub struct FeedbackCover<A: CoverActuator, T: TravelSensors, S: StateStore> {
    core: CoverCore,
    actuator: A,
    sensors: T,
    store: S,
    estimator: TravelEstimator,
    target_position: Option<f32>,
    start_dir_ms: u64,
    last_publish_ms: u64,
    last_operation: CoverOperation,
    pending_reversal: OneShot<CoverOperation>,
    prev_open_endstop: bool,
    prev_close_endstop: bool,
    prev_open_obstacle: bool,
    prev_close_obstacle: bool,
    obstacle_rollback: f32,
    has_built_in_endstop: bool,
    direction_change_wait_ms: u32,
    max_duration_ms: Option<u32>,
}

impl<A: CoverActuator, T: TravelSensors, S: StateStore> FeedbackCover<A, T, S> {
    /// Creates a driver from its hardware seams, store, and config.
    pub fn new(actuator: A, sensors: T, store: S, config: FeedbackConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            actuator,
            sensors,
            store,
            estimator: TravelEstimator::new(config.open_duration_ms, config.close_duration_ms)
                .with_acceleration_wait(config.acceleration_wait_ms),
            target_position: None,
            start_dir_ms: 0,
            last_publish_ms: 0,
            last_operation: CoverOperation::Opening,
            pending_reversal: OneShot::new(),
            prev_open_endstop: false,
            prev_close_endstop: false,
            prev_open_obstacle: false,
            prev_close_obstacle: false,
            obstacle_rollback: config.obstacle_rollback,
            has_built_in_endstop: config.has_built_in_endstop,
            direction_change_wait_ms: config.direction_change_wait_ms,
            max_duration_ms: config.max_duration_ms,
        }
    }

    /// Restore persisted position and latch the initial sensor levels so
    /// a pressed endstop at boot does not read as a fresh edge.
    pub fn setup(&mut self) {
        if !self.core.restore(&mut self.store) {
            log::debug!("'{}': no stored state, assuming half-open", self.core.name());
        }
        if self.sensors.open_endstop() {
            self.core.position = COVER_OPEN;
            self.prev_open_endstop = true;
        } else if self.sensors.close_endstop() {
            self.core.position = COVER_CLOSED;
            self.prev_close_endstop = true;
        }
        self.prev_open_obstacle = self.sensors.open_obstacle();
        self.prev_close_obstacle = self.sensors.close_obstacle();
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

    /// The feedback inputs, for injection in tests.
    pub fn sensors_mut(&mut self) -> &mut T {
        &mut self.sensors
    }

    /// Poll feedback edges, advance the estimate, run target/safety
    /// checks.
    pub fn loop_tick(&mut self, now_ms: u64) -> Result<(), A::Error> {
        if let Some(dir) = self.pending_reversal.take_due(now_ms) {
            self.start_direction(dir, now_ms)?;
            self.publish(false, now_ms);
        }

        // Endstop edges correct the estimate even when idle; a manual
        // release or service crank still ends at a known extreme.
        let open_edge = self.sensors.open_endstop() && !self.prev_open_endstop;
        let close_edge = self.sensors.close_endstop() && !self.prev_close_endstop;
        let open_obstacle_edge = self.sensors.open_obstacle() && !self.prev_open_obstacle;
        let close_obstacle_edge = self.sensors.close_obstacle() && !self.prev_close_obstacle;
        self.prev_open_endstop = self.sensors.open_endstop();
        self.prev_close_endstop = self.sensors.close_endstop();
        self.prev_open_obstacle = self.sensors.open_obstacle();
        self.prev_close_obstacle = self.sensors.close_obstacle();

        if open_edge {
            self.arrive_at_endstop(COVER_OPEN, CoverOperation::Opening, now_ms)?;
        }
        if close_edge {
            self.arrive_at_endstop(COVER_CLOSED, CoverOperation::Closing, now_ms)?;
        }

        let op = self.core.current_operation();
        if op == CoverOperation::Idle {
            return Ok(());
        }

        let blocked = (op == CoverOperation::Opening && open_obstacle_edge)
            || (op == CoverOperation::Closing && close_obstacle_edge);
        if blocked {
            log::warn!("'{}': obstacle detected, halting", self.core.name());
            self.recompute_position(now_ms);
            return self.rollback_or_stop(now_ms);
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
            // Extreme targets are claimed by the endstop edge, not the
            // estimate; only mid-travel targets resolve here.
            if target > COVER_CLOSED
                && target < COVER_OPEN
                && TravelEstimator::is_at_target(op, self.core.position(), target)
            {
                self.target_position = None;
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

    /// An endstop edge: pin the extreme and stop if travelling into it.
    fn arrive_at_endstop(
        &mut self,
        extreme: f32,
        travelling: CoverOperation,
        now_ms: u64,
    ) -> Result<(), A::Error> {
        log::debug!(
            "'{}': endstop at {}",
            self.core.name(),
            if extreme == COVER_OPEN { "open" } else { "closed" }
        );
        if self.core.current_operation() == travelling {
            self.target_position = None;
            if self.has_built_in_endstop {
                // The motor already cut itself off.
                self.core.operation = CoverOperation::Idle;
            } else {
                self.start_direction(CoverOperation::Idle, now_ms)?;
            }
            // The sensor outranks the inset-clamped estimate.
            self.core.position = extreme;
            self.publish(true, now_ms);
        } else {
            self.core.position = extreme;
            self.publish(false, now_ms);
        }
        Ok(())
    }

    fn rollback_or_stop(&mut self, now_ms: u64) -> Result<(), A::Error> {
        let blocked = self.core.current_operation();
        if self.obstacle_rollback > 0.0 {
            let target = (self.core.position() - blocked.sign() * self.obstacle_rollback)
                .clamp(COVER_CLOSED, COVER_OPEN);
            self.target_position = Some(target);
            self.start_or_defer(blocked.reversed(), now_ms)?;
        } else {
            self.target_position = None;
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(true, now_ms);
        }
        Ok(())
    }

    fn recompute_position(&mut self, now_ms: u64) {
        // The estimator stays just short of the extremes; the endstop
        // edge sets the exact boundary.
        self.core.position = self.estimator.advance(
            self.core.current_operation(),
            self.core.position(),
            now_ms,
            self.start_dir_ms,
            ENDSTOP_INSET_LO,
            ENDSTOP_INSET_HI,
        );
    }

    fn start_or_defer(&mut self, dir: CoverOperation, now_ms: u64) -> Result<(), A::Error> {
        self.pending_reversal.cancel();
        if dir != CoverOperation::Idle
            && self.core.current_operation() == dir.reversed()
            && self.direction_change_wait_ms > 0
        {
            log::debug!(
                "'{}': waiting {} ms before reversing",
                self.core.name(),
                self.direction_change_wait_ms
            );
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(false, now_ms);
            self.pending_reversal
                .schedule(now_ms + self.direction_change_wait_ms as u64, dir);
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

impl<A: CoverActuator, T: TravelSensors, S: StateStore> CoverControl for FeedbackCover<A, T, S> {
    type Error = A::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new()
            .with_position(true)
            .with_stop(true)
            .with_toggle(true)
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
            // The endstop sensors report the extremes, so "already
            // there" is a no-op.
            if pos != self.core.position() {
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
