//! Tilt-only estimation for venetian heads.
//!
//! Some hardware only rotates its slats; there is no travel axis at
//! all. The driver runs the usual time extrapolation over the tilt
//! value instead of position. Binary open/close requests (the only
//! position values that survive validation against tilt-only traits)
//! are folded into full tilt swings, so one-button dashboards still
//! work.

use crate::call::{CoverCall, CoverControl};
use crate::config::TiltOnlyConfig;
use crate::cover::{CoverCore, CoverOperation, CoverState, CoverTraits, COVER_OPEN};
use crate::estimator::TravelEstimator;
use crate::traits::{CoverActuator, StateStore};

const PUBLISH_INTERVAL_MS: u64 = 1000;

/// Cover driver with a single time-estimated tilt axis.
pub struct TiltOnlyCover<A: CoverActuator, S: StateStore> {
    core: CoverCore,
    actuator: A,
    store: S,
    estimator: TravelEstimator,
    target_tilt: Option<f32>,
    start_dir_ms: u64,
    last_publish_ms: u64,
    last_operation: CoverOperation,
}

impl<A: CoverActuator, S: StateStore> TiltOnlyCover<A, S> {
    /// Creates a driver from its hardware seam, store, and config.
    pub fn new(actuator: A, store: S, config: TiltOnlyConfig) -> Self {
        let mut core = CoverCore::new(config.cover.name.as_str());
        if !config.cover.device_class.is_empty() {
            core.set_device_class(config.cover.device_class.as_str());
        }
        Self {
            core,
            actuator,
            store,
            estimator: TravelEstimator::new(config.tilt_duration_ms, config.tilt_duration_ms),
            target_tilt: None,
            start_dir_ms: 0,
            last_publish_ms: 0,
            last_operation: CoverOperation::Opening,
        }
    }

    /// Restore persisted tilt, keeping the half-open assumption when no
    /// record exists.
    pub fn setup(&mut self) {
        if !self.core.restore(&mut self.store) {
            log::debug!("'{}': no stored state, assuming half tilt", self.core.name());
        }
    }

    /// Current estimated tilt.
    pub fn tilt(&self) -> f32 {
        self.core.tilt()
    }

    /// Current motion state.
    pub fn current_operation(&self) -> CoverOperation {
        self.core.current_operation()
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

    /// Advance the tilt estimate and run the arrival check.
    pub fn loop_tick(&mut self, now_ms: u64) -> Result<(), A::Error> {
        if self.core.current_operation() == CoverOperation::Idle {
            return Ok(());
        }

        self.recompute_tilt(now_ms);

        if let Some(target) = self.target_tilt {
            if TravelEstimator::is_at_target(self.core.current_operation(), self.core.tilt(), target)
            {
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

    fn recompute_tilt(&mut self, now_ms: u64) {
        self.core.tilt = self.estimator.advance(
            self.core.current_operation(),
            self.core.tilt(),
            now_ms,
            self.start_dir_ms,
            0.0,
            1.0,
        );
    }

    fn move_to_tilt(&mut self, tilt: f32, now_ms: u64) -> Result<(), A::Error> {
        if tilt == self.core.tilt() {
            return Ok(());
        }
        let dir = if tilt < self.core.tilt() {
            CoverOperation::Closing
        } else {
            CoverOperation::Opening
        };
        self.target_tilt = Some(tilt);
        self.start_direction(dir, now_ms)?;
        self.publish(false, now_ms);
        Ok(())
    }

    fn start_direction(&mut self, dir: CoverOperation, now_ms: u64) -> Result<(), A::Error> {
        if dir == self.core.current_operation() && dir != CoverOperation::Idle {
            return Ok(());
        }
        self.recompute_tilt(now_ms);
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

impl<A: CoverActuator, S: StateStore> CoverControl for TiltOnlyCover<A, S> {
    type Error = A::Error;

    fn traits(&self) -> CoverTraits {
        CoverTraits::new()
            .with_tilt(true)
            .with_stop(true)
            .with_toggle(true)
            .with_assumed_state(true)
    }

    fn control(&mut self, call: &CoverCall, now_ms: u64) -> Result<(), A::Error> {
        if call.is_stop() {
            self.target_tilt = None;
            self.start_direction(CoverOperation::Idle, now_ms)?;
            self.publish(true, now_ms);
            return Ok(());
        }

        if call.is_toggle() {
            if self.core.current_operation() != CoverOperation::Idle {
                self.target_tilt = None;
                self.start_direction(CoverOperation::Idle, now_ms)?;
                self.publish(true, now_ms);
            } else if self.core.tilt() == 0.0 || self.last_operation == CoverOperation::Closing {
                self.move_to_tilt(1.0, now_ms)?;
            } else {
                self.move_to_tilt(0.0, now_ms)?;
            }
            return Ok(());
        }

        // Binary open/close survives validation without position support
        // and maps onto a full tilt swing.
        if let Some(pos) = call.position() {
            let tilt = if pos == COVER_OPEN { 1.0 } else { 0.0 };
            self.move_to_tilt(tilt, now_ms)?;
        }

        if let Some(tilt) = call.tilt() {
            self.move_to_tilt(tilt, now_ms)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
