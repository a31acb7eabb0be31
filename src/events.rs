//! Closure-backed actuator for template-style covers.
//!
//! Not every cover is wired to a relay the crate can drive directly;
//! template covers delegate each action to user automation hooks.
//! [`CallbackActuator`] adapts plain closures to the
//! [`CoverActuator`](crate::traits::CoverActuator) seam so the estimator
//! drivers can run on top of them unchanged, and carries the
//! arbitrary-target position/tilt hooks such covers expose.
//!
//! Hooks fire synchronously, in the driver's tick, once per direction
//! change. A missing hook is simply skipped.
//!
//! # Example
//!
//! ```rust
//! use coverdrive::events::CallbackActuator;
//! use coverdrive::traits::CoverActuator;
//!
//! let mut actuator = CallbackActuator::new()
//!     .on_open(|| println!("relay up"))
//!     .on_stop(|| println!("relay off"));
//!
//! actuator.drive_open().unwrap();
//! actuator.drive_stop().unwrap();
//! ```

extern crate alloc;

use alloc::boxed::Box;
use core::convert::Infallible;

use crate::traits::CoverActuator;

type Hook = Box<dyn FnMut()>;
type TargetHook = Box<dyn FnMut(f32)>;

/// Actuator that forwards drive commands to registered closures.
///
/// The open/close/stop hooks satisfy [`CoverActuator`]; the position and
/// tilt hooks serve template covers that accept an arbitrary target
/// (fire them via [`target_position`](Self::target_position) /
/// [`target_tilt`](Self::target_tilt) from the integration layer).
#[derive(Default)]
pub struct CallbackActuator {
    open: Option<Hook>,
    close: Option<Hook>,
    stop: Option<Hook>,
    position: Option<TargetHook>,
    tilt: Option<TargetHook>,
}

impl CallbackActuator {
    /// Creates an actuator with no hooks registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the hook fired when the open direction starts.
    pub fn on_open<F: FnMut() + 'static>(mut self, f: F) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    /// Register the hook fired when the close direction starts.
    pub fn on_close<F: FnMut() + 'static>(mut self, f: F) -> Self {
        self.close = Some(Box::new(f));
        self
    }

    /// Register the hook fired when the motor is stopped.
    pub fn on_stop<F: FnMut() + 'static>(mut self, f: F) -> Self {
        self.stop = Some(Box::new(f));
        self
    }

    /// Register the hook fired with an arbitrary position target.
    pub fn on_position<F: FnMut(f32) + 'static>(mut self, f: F) -> Self {
        self.position = Some(Box::new(f));
        self
    }

    /// Register the hook fired with an arbitrary tilt target.
    pub fn on_tilt<F: FnMut(f32) + 'static>(mut self, f: F) -> Self {
        self.tilt = Some(Box::new(f));
        self
    }

    /// Fire the position hook with `target`.
    pub fn target_position(&mut self, target: f32) {
        if let Some(hook) = &mut self.position {
            hook(target);
        }
    }

    /// Fire the tilt hook with `target`.
    pub fn target_tilt(&mut self, target: f32) {
        if let Some(hook) = &mut self.tilt {
            hook(target);
        }
    }
}

impl CoverActuator for CallbackActuator {
    type Error = Infallible;

    fn drive_open(&mut self) -> Result<(), Infallible> {
        if let Some(hook) = &mut self.open {
            hook();
        }
        Ok(())
    }

    fn drive_close(&mut self) -> Result<(), Infallible> {
        if let Some(hook) = &mut self.close {
            hook();
        }
        Ok(())
    }

    fn drive_stop(&mut self) -> Result<(), Infallible> {
        if let Some(hook) = &mut self.stop {
            hook();
        }
        Ok(())
    }
}

impl core::fmt::Debug for CallbackActuator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackActuator")
            .field("open", &self.open.is_some())
            .field("close", &self.close.is_some())
            .field("stop", &self.stop.is_some())
            .field("position", &self.position.is_some())
            .field("tilt", &self.tilt.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    #[test]
    fn hooks_fire_per_command() {
        let fired = Rc::new(RefCell::new(Vec::new()));

        let f1 = Rc::clone(&fired);
        let f2 = Rc::clone(&fired);
        let f3 = Rc::clone(&fired);
        let mut actuator = CallbackActuator::new()
            .on_open(move || f1.borrow_mut().push("open"))
            .on_close(move || f2.borrow_mut().push("close"))
            .on_stop(move || f3.borrow_mut().push("stop"));

        actuator.drive_open().unwrap();
        actuator.drive_close().unwrap();
        actuator.drive_stop().unwrap();
        assert_eq!(*fired.borrow(), ["open", "close", "stop"]);
    }

    #[test]
    fn missing_hooks_are_skipped() {
        let mut actuator = CallbackActuator::new();
        actuator.drive_open().unwrap();
        actuator.drive_close().unwrap();
        actuator.drive_stop().unwrap();
        actuator.target_position(0.5);
        actuator.target_tilt(0.5);
    }

    #[test]
    fn target_hooks_receive_the_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s1 = Rc::clone(&seen);
        let s2 = Rc::clone(&seen);
        let mut actuator = CallbackActuator::new()
            .on_position(move |p| s1.borrow_mut().push(("position", p)))
            .on_tilt(move |t| s2.borrow_mut().push(("tilt", t)));

        actuator.target_position(0.25);
        actuator.target_tilt(0.75);
        assert_eq!(*seen.borrow(), [("position", 0.25), ("tilt", 0.75)]);
    }
}
