//! Current-sensing position estimation.
//!
//! Position is still extrapolated from elapsed time, but the motor's
//! winding current adds three inferences the time-based driver cannot
//! make:
//!
//! - **Endstop**: the draw on the active winding collapsing below the
//!   moving threshold means the motor hit its limit switch and stopped
//!   itself; the estimate snaps to the exact extreme.
//! - **Obstacle**: draw spiking above the obstacle threshold means the
//!   cover is stalled against something; movement halts and optionally
//!   rolls back a configured fraction of travel.
//! - **Malfunction**: both windings drawing at once points at welded
//!   relay contacts; everything is shut off immediately.
//!
//! Readings are ignored for a configured delay after each direction
//! start, since inrush current during spin-up looks like an obstacle.

use crate::call::{CoverCall, CoverControl};
use crate::config::CurrentBasedConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_CLOSED, COVER_OPEN};
use crate::estimator::TravelEstimator;
use crate::traits::{CoverActuator, CurrentSensor, StateStore};

const PUBLISH_INTERVAL_MS: u64 = 1000;

/// Cover driver combining time extrapolation with current sensing.
pub struct CurrentBasedCover<A: CoverActuator, C: CurrentSensor, S: StateStore> {
    core: CoverCore,
    actuator: A,
    sensor: C,
    store: S,
    estimator: TravelEstimator,
    target_position: Option<f32>,
    start_dir_ms: u64,
    last_publish_ms: u64,
    last_operation: CoverOperation,
    open_moving_ma: u32,
    close_moving_ma: u32,
    open_obstacle_ma: Option<u32>,
    close_obstacle_ma: Option<u32>,
    start_sensing_delay_ms: u32,
    obstacle_rollback: f32,
    max_duration_ms: Option<u32>,
    malfunction_detection: bool,
}

impl<A: CoverActuator, C: CurrentSensor, S: StateStore> CurrentBasedCover<A, C, S> {
    /// Creates a driver from its hardware seams, store, and config.
    pub fn new(actuator: A, sensor: C, store: S, config: CurrentBasedConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            actuator,
            sensor,
            store,
            estimator: TravelEstimator::new(config.open_duration_ms, config.close_duration_ms),
            target_position: None,
            start_dir_ms: 0,
            last_publish_ms: 0,
            last_operation: CoverOperation::Opening,
            open_moving_ma: config.open_moving_current_ma,
            close_moving_ma: config.close_moving_current_ma,
            open_obstacle_ma: config.open_obstacle_current_ma,
            close_obstacle_ma: config.close_obstacle_current_ma,
            start_sensing_delay_ms: config.start_sensing_delay_ms,
            obstacle_rollback: config.obstacle_rollback,
            max_duration_ms: config.max_duration_ms,
            malfunction_detection: config.malfunction_detection,
        }
    }

    /// Restore persisted position, keeping the half-open assumption when
    /// no record exists.
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

    /// The current sensor, for injection in tests.
    pub fn sensor_mut(&mut self) -> &mut C {
        &mut self.sensor
    }

    /// Advance the estimate and run the current-draw inferences.
    pub fn loop_tick(&mut self, now_ms: u64) -> Result<(), A::Error> {
        let op = self.core.current_operation();
        if op == CoverOperation::Idle {
            return Ok(());
        }

        if self.malfunction_detection
            && self.sensor.open_current_ma() > self.open_moving_ma
            && self.sensor.close_current_ma() > self.close_moving_ma
        {
            log::error!(
                "'{}': both windings drawing current, relay malfunction suspected",
                self.core.name()
            );
            self.target_position = None;
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(true, now_ms);
            return Ok(());
        }

        let sensing = now_ms.saturating_sub(self.start_dir_ms) > self.start_sensing_delay_ms as u64;
        if sensing {
            if self.active_obstacle() {
                log::warn!("'{}': obstacle detected, halting", self.core.name());
                self.recompute_position(now_ms);
                return self.rollback_or_stop(now_ms);
            }
            if !self.motor_drawing() {
                // The motor stopped itself: it reached its limit switch.
                self.core.position = match op {
                    CoverOperation::Opening => COVER_OPEN,
                    _ => COVER_CLOSED,
                };
                log::debug!("'{}': current dropped, endstop reached", self.core.name());
                self.target_position = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
                return Ok(());
            }
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

    /// Draw on the winding matching the direction of travel.
    fn motor_drawing(&self) -> bool {
        match self.core.current_operation() {
            CoverOperation::Opening => self.sensor.open_current_ma() > self.open_moving_ma,
            CoverOperation::Closing => self.sensor.close_current_ma() > self.close_moving_ma,
            CoverOperation::Idle => false,
        }
    }

    /// Draw above the obstacle threshold for the direction of travel.
    fn active_obstacle(&self) -> bool {
        match self.core.current_operation() {
            CoverOperation::Opening => self
                .open_obstacle_ma
                .is_some_and(|ma| self.sensor.open_current_ma() > ma),
            CoverOperation::Closing => self
                .close_obstacle_ma
                .is_some_and(|ma| self.sensor.close_current_ma() > ma),
            CoverOperation::Idle => false,
        }
    }

    fn rollback_or_stop(&mut self, now_ms: u64) -> Result<(), A::Error> {
        let blocked = self.core.current_operation();
        if self.obstacle_rollback > 0.0 {
            let target = (self.core.position() - blocked.sign() * self.obstacle_rollback)
                .clamp(COVER_CLOSED, COVER_OPEN);
            self.target_position = Some(target);
            self.start_direction(blocked.reversed(), now_ms)?;
            self.publish(false, now_ms);
        } else {
            self.target_position = None;
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(true, now_ms);
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

impl<A: CoverActuator, C: CurrentSensor, S: StateStore> CoverControl
    for CurrentBasedCover<A, C, S>
{
    type Error = A::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new()
            .with_position(true)
            .with_stop(true)
            .with_toggle(true)
    }

    fn control(&mut self, call: &CoverCall, now_ms: u64) -> Result<(), A::Error> {
        if call.is_stop() {
            self.target_position = None;
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(true, now_ms);
            return Ok(());
        }

        if call.is_toggle() {
            if self.core.current_operation() != CoverOperation::Idle {
                self.target_position = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
            } else if self.core.is_fully_closed() || self.last_operation == CoverOperation::Closing
            {
                self.target_position = Some(COVER_OPEN);
                self.start_direction(CoverOperation::Opening, now_ms)?;
                self.publish(false, now_ms);
            } else {
                self.target_position = Some(COVER_CLOSED);
                self.start_direction(CoverOperation::Closing, now_ms)?;
                self.publish(false, now_ms);
            }
            return Ok(());
        }

        if let Some(pos) = call.position() {
            // The limit switches report the extremes through the current
            // drop, so "already there" is always a no-op here.
            if pos != self.core.position() {
                let dir = if pos < self.core.position() {
                    CoverOperation::Closing
                } else {
                    CoverOperation::Opening
                };
                self.target_position = Some(pos);
                self.start_direction(dir, now_ms)?;
                self.publish(false, now_ms);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
