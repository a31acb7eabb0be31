//! Control requests: the builder, its validation policy, and the driver
//! contract that consumes them.
//!
//! Every user or automation action against a cover is one [`CoverCall`]:
//! an optional position target, an optional tilt target, a toggle, or a
//! stop. The call is validated against the driver's [`CoverTraits`]
//! before the driver sees it, so `control()` implementations never have
//! to re-check capabilities or ranges.
//!
//! Validation is policy, not failure: unsupported fields are dropped,
//! out-of-range values clamped, and the call always proceeds. Nothing in
//! this path returns an error except the driver's own hardware seam.
//!
//! # Example
//!
//! ```rust
//! use coverdrive::{CoverControl, TimeBasedCover, TimeBasedConfig, CoverOperation};
//! use coverdrive::hal::{MockActuator, MemoryStore};
//!
//! let config = TimeBasedConfig::new("shade", 10_000, 10_000);
//! let mut cover = TimeBasedCover::new(MockActuator::new(), MemoryStore::new(), config);
//!
//! cover.make_call().set_position(1.0).perform(0).unwrap();
//! assert_eq!(cover.current_operation(), CoverOperation::Opening);
//! ```

use crate::cover::{CoverTraits, COVER_CLOSED, COVER_OPEN};

/// One control request against a cover.
///
/// Built fluently, validated once, consumed once. A request carrying
/// both `stop` and movement fields resolves to stop alone.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoverCall {
    stop: bool,
    toggle: bool,
    position: Option<f32>,
    tilt: Option<f32>,
}

impl CoverCall {
    /// Creates an empty call.
    pub const fn new() -> Self {
        Self {
            stop: false,
            toggle: false,
            position: None,
            tilt: None,
        }
    }

    /// Shorthand for a full-open request.
    pub const fn open() -> Self {
        Self::new().set_position(COVER_OPEN)
    }

    /// Shorthand for a full-close request.
    pub const fn close() -> Self {
        Self::new().set_position(COVER_CLOSED)
    }

    /// Shorthand for a stop request.
    pub const fn stop() -> Self {
        Self::new().set_stop(true)
    }

    /// Request a stop.
    pub const fn set_stop(mut self, stop: bool) -> Self {
        self.stop = stop;
        self
    }

    /// Request a toggle (stop if moving, else move the "next" way).
    pub const fn set_toggle(mut self, toggle: bool) -> Self {
        self.toggle = toggle;
        self
    }

    /// Request a position target, `0.0` closed to `1.0` open.
    pub const fn set_position(mut self, position: f32) -> Self {
        self.position = Some(position);
        self
    }

    /// Request a tilt target.
    pub const fn set_tilt(mut self, tilt: f32) -> Self {
        self.tilt = Some(tilt);
        self
    }

    /// Whether a stop is requested.
    pub const fn is_stop(&self) -> bool {
        self.stop
    }

    /// Whether a toggle is requested.
    pub const fn is_toggle(&self) -> bool {
        self.toggle
    }

    /// Requested position target, if any survived validation.
    pub const fn position(&self) -> Option<f32> {
        self.position
    }

    /// Requested tilt target, if any survived validation.
    pub const fn tilt(&self) -> Option<f32> {
        self.tilt
    }

    /// Apply the validation policy for a driver with the given traits.
    ///
    /// - position requests are dropped when unsupported, unless the value
    ///   is exactly `0.0`/`1.0` (binary open/close works everywhere);
    /// - out-of-range position/tilt values are clamped;
    /// - tilt and toggle requests are dropped when unsupported;
    /// - stop wins: it clears every movement field.
    ///
    /// Never fails; corrections are logged as warnings.
    pub fn validate(&mut self, traits: &CoverTraits) {
        if let Some(pos) = self.position {
            if !traits.supports_position() && pos != COVER_OPEN && pos != COVER_CLOSED {
                log::warn!("cover does not support position control, dropping request");
                self.position = None;
            } else if !(COVER_CLOSED..=COVER_OPEN).contains(&pos) {
                let clamped = pos.clamp(COVER_CLOSED, COVER_OPEN);
                log::warn!("position {pos:.2} out of range, clamping to {clamped:.2}");
                self.position = Some(clamped);
            }
        }

        if let Some(tilt) = self.tilt {
            if !traits.supports_tilt() {
                log::warn!("cover does not support tilt control, dropping request");
                self.tilt = None;
            } else if !(0.0..=1.0).contains(&tilt) {
                let clamped = tilt.clamp(0.0, 1.0);
                log::warn!("tilt {tilt:.2} out of range, clamping to {clamped:.2}");
                self.tilt = Some(clamped);
            }
        }

        if self.toggle && !traits.supports_toggle() {
            log::warn!("cover does not support toggle, dropping request");
            self.toggle = false;
        }

        if self.stop && (self.toggle || self.position.is_some() || self.tilt.is_some()) {
            log::warn!("stop requested, dropping movement fields from the same call");
            self.toggle = false;
            self.position = None;
            self.tilt = None;
        }
    }
}

/// Contract every cover driver implements.
///
/// The driver set is closed: each concrete driver is an enumerated
/// struct, polymorphic only over this trait. `control` receives calls
/// that already passed [`CoverCall::validate`]; `perform` is the public
/// entry that runs the full call protocol.
pub trait CoverControl {
    /// Hardware-seam error type propagated out of control actions.
    type Error;

    /// Static capability report.
    fn traits(&self) -> CoverTraits;

    /// Apply a validated call to the hardware/estimator.
    fn control(&mut self, call: &CoverCall, now_ms: u64) -> Result<(), Self::Error>;

    /// Validate `call` against [`traits`](Self::traits), then hand it to
    /// [`control`](Self::control).
    fn perform(&mut self, mut call: CoverCall, now_ms: u64) -> Result<(), Self::Error> {
        call.validate(&self.traits());
        self.control(&call, now_ms)
    }

    /// Start a fluent call against this cover.
    ///
    /// `cover.make_call().set_position(0.5).perform(now)` is equivalent
    /// to building a [`CoverCall`] and passing it to
    /// [`perform`](Self::perform).
    fn make_call(&mut self) -> CoverCallBuilder<'_, Self>
    where
        Self: Sized,
    {
        CoverCallBuilder {
            call: CoverCall::new(),
            parent: self,
        }
    }
}

/// Fluent call builder bound to a driver.
///
/// Created by [`CoverControl::make_call`]; consumed by
/// [`perform`](Self::perform).
pub struct CoverCallBuilder<'a, C: CoverControl> {
    call: CoverCall,
    parent: &'a mut C,
}

impl<C: CoverControl> CoverCallBuilder<'_, C> {
    /// Request a stop.
    pub fn set_stop(mut self, stop: bool) -> Self {
        self.call = self.call.set_stop(stop);
        self
    }

    /// Request a toggle.
    pub fn set_toggle(mut self, toggle: bool) -> Self {
        self.call = self.call.set_toggle(toggle);
        self
    }

    /// Request a position target.
    pub fn set_position(mut self, position: f32) -> Self {
        self.call = self.call.set_position(position);
        self
    }

    /// Request a tilt target.
    pub fn set_tilt(mut self, tilt: f32) -> Self {
        self.call = self.call.set_tilt(tilt);
        self
    }

    /// Validate and execute the call.
    pub fn perform(self, now_ms: u64) -> Result<(), C::Error> {
        self.parent.perform(self.call, now_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
