//! Hardware abstraction traits for motor drive, current sensing, travel
//! feedback, and wire links.
//!
//! These interfaces are the only thing the cover drivers know about the
//! physical world. Everything else (relay boards, H-bridges, RS-485
//! transceivers, radio front-ends) lives behind them, so the whole crate
//! can be exercised on a desktop with the mocks from [`crate::hal`].
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`CoverActuator`] | Relay/H-bridge style open/close/stop drive |
//! | [`CurrentSensor`] | Motor winding current for endstop/obstacle inference |
//! | [`TravelSensors`] | Binary endstop and obstacle inputs |
//! | [`FrameLink`] | Byte-oriented wire transport (UART, RS-485, radio) |
//! | [`Clock`] | Monotonic millisecond time source |
//!
//! # Example
//!
//! ```rust
//! use coverdrive::traits::CoverActuator;
//! use coverdrive::hal::MockActuator;
//! use coverdrive::CoverOperation;
//!
//! let mut relay = MockActuator::new();
//! relay.drive(CoverOperation::Opening).unwrap();
//! assert_eq!(relay.commands, [CoverOperation::Opening]);
//! ```

use crate::cover::CoverOperation;

/// Motor drive trait for relay or H-bridge style cover motors.
///
/// One method per physical command. Drivers guarantee each command is
/// issued once per direction change (re-requesting the active direction
/// is a no-op at the driver layer), so implementations do not need their
/// own edge detection.
///
/// # Implementation Notes
///
/// - Commands must not block; latch the output and return.
/// - `drive_stop` may be called while already stopped.
/// - For template-style covers driven by automation hooks, use
///   [`CallbackActuator`](crate::events::CallbackActuator).
pub trait CoverActuator {
    /// Error type for drive operations.
    type Error;

    /// Energize the open direction.
    fn drive_open(&mut self) -> Result<(), Self::Error>;

    /// Energize the close direction.
    fn drive_close(&mut self) -> Result<(), Self::Error>;

    /// De-energize the motor.
    fn drive_stop(&mut self) -> Result<(), Self::Error>;

    /// Dispatch a drive command from an operation value.
    ///
    /// [`CoverOperation::Idle`] maps to [`drive_stop`](Self::drive_stop).
    fn drive(&mut self, op: CoverOperation) -> Result<(), Self::Error> {
        match op {
            CoverOperation::Opening => self.drive_open(),
            CoverOperation::Closing => self.drive_close(),
            CoverOperation::Idle => self.drive_stop(),
        }
    }
}

/// Motor current readings for drivers that infer travel state from draw.
///
/// Covers with separate open/close windings report both; single-winding
/// hardware returns the same reading for either direction. Readings are
/// polled every tick, so implementations should return the latest sample
/// rather than trigger a fresh conversion.
pub trait CurrentSensor {
    /// Current through the open winding in milliamps.
    fn open_current_ma(&self) -> u32;

    /// Current through the close winding in milliamps.
    fn close_current_ma(&self) -> u32;
}

/// Binary travel feedback inputs: endstops and obstacle detectors.
///
/// Levels are polled each tick; the drivers do their own edge detection,
/// so implementations just report the current debounced level.
///
/// Obstacle inputs default to "never active" for hardware without them.
pub trait TravelSensors {
    /// True while the fully-open endstop is pressed.
    fn open_endstop(&self) -> bool;

    /// True while the fully-closed endstop is pressed.
    fn close_endstop(&self) -> bool;

    /// True while an obstacle blocks opening travel.
    fn open_obstacle(&self) -> bool {
        false
    }

    /// True while an obstacle blocks closing travel.
    fn close_obstacle(&self) -> bool {
        false
    }
}

/// Byte-oriented wire transport for the protocol-framed drivers.
///
/// Covers UART, RS-485 (the driver does not model bus arbitration), and
/// transmit-only radio links. Receive is non-blocking and pull-based:
/// the driver drains [`poll_byte`](Self::poll_byte) every tick.
pub trait FrameLink {
    /// Error type for link operations.
    type Error;

    /// Queue a complete frame for transmission.
    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Fetch the next received byte, if any.
    ///
    /// Transmit-only links (e.g. an RTS radio) always return `None`.
    fn poll_byte(&mut self) -> Option<u8> {
        None
    }
}

/// Monotonic millisecond time source.
///
/// The drivers themselves take `now_ms` arguments and never read a clock;
/// this trait exists for the integration layer that feeds them. On
/// desktop use [`SystemClock`](crate::hal::SystemClock), in tests use
/// [`MockClock`](crate::hal::MockClock).
pub trait Clock {
    /// Current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Relay {
        last: Option<CoverOperation>,
    }

    impl CoverActuator for Relay {
        type Error = ();

        fn drive_open(&mut self) -> Result<(), ()> {
            self.last = Some(CoverOperation::Opening);
            Ok(())
        }

        fn drive_close(&mut self) -> Result<(), ()> {
            self.last = Some(CoverOperation::Closing);
            Ok(())
        }

        fn drive_stop(&mut self) -> Result<(), ()> {
            self.last = Some(CoverOperation::Idle);
            Ok(())
        }
    }

    #[test]
    fn drive_dispatches_by_operation() {
        let mut relay = Relay { last: None };

        relay.drive(CoverOperation::Opening).unwrap();
        assert_eq!(relay.last, Some(CoverOperation::Opening));

        relay.drive(CoverOperation::Closing).unwrap();
        assert_eq!(relay.last, Some(CoverOperation::Closing));

        relay.drive(CoverOperation::Idle).unwrap();
        assert_eq!(relay.last, Some(CoverOperation::Idle));
    }

    struct BareSensors;

    impl TravelSensors for BareSensors {
        fn open_endstop(&self) -> bool {
            false
        }

        fn close_endstop(&self) -> bool {
            false
        }
    }

    #[test]
    fn obstacle_inputs_default_inactive() {
        let sensors = BareSensors;
        assert!(!sensors.open_obstacle());
        assert!(!sensors.close_obstacle());
    }

    struct TxOnly;

    impl FrameLink for TxOnly {
        type Error = ();

        fn send(&mut self, _frame: &[u8]) -> Result<(), ()> {
            Ok(())
        }
    }

    #[test]
    fn frame_link_default_poll_is_empty() {
        let mut link = TxOnly;
        assert!(link.poll_byte().is_none());
    }
}
