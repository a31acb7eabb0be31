//! # coverdrive
//!
//! A motorized cover controller (shutters, gates, shades, garage doors)
//! with time, current, and feedback based position estimation.
//!
//! ## Features
//!
//! - **Hardware abstraction**: Traits for motor drive, current sensing,
//!   travel feedback, wire links, and persisted storage
//! - **Position estimation**: Continuous position inferred from elapsed
//!   time, winding current, or binary endstop/obstacle inputs; no
//!   continuous position sensor required
//! - **Call protocol**: One validated, atomic control request per
//!   action; unsupported fields are dropped, out-of-range values
//!   clamped, stop always wins
//! - **Safety machinery**: Direction-change interlock waits, maximum
//!   run-time cutoffs, obstacle rollback, relay-malfunction detection
//! - **Wire protocols**: Framed serial and radio drivers (Dooya, GM40,
//!   Chenyang, HE60R, Tormatic, Somfy RTS) over the same control model
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and storage abstractions
//! - `cover` - Entity core: capability traits, operation state, publish
//! - `call` - Control requests and the validation policy
//! - `estimator` - Elapsed-time position integration
//! - `drivers` - The estimator driver family
//! - `wire` - Protocol-framed hardware drivers and their codecs
//! - `hal` - Concrete implementations (mocks for testing)
//!
//! ## Example
//!
//! ```rust
//! use coverdrive::{CoverControl, CoverOperation, TimeBasedConfig, TimeBasedCover};
//! use coverdrive::hal::{MemoryStore, MockActuator};
//!
//! // A shade that takes 10 s to open and 8 s to close.
//! let config = TimeBasedConfig::new("porch shade", 10_000, 8_000)
//!     .with_max_duration(15_000);
//! let mut cover = TimeBasedCover::new(MockActuator::new(), MemoryStore::new(), config);
//! cover.setup(); // no stored state: assumed half-open
//!
//! // Ask for fully open.
//! cover.make_call().set_position(1.0).perform(0).unwrap();
//! assert_eq!(cover.current_operation(), CoverOperation::Opening);
//!
//! // Drive the scheduler; half of the traverse covers the other half
//! // of the travel.
//! cover.loop_tick(5_000).unwrap();
//! assert_eq!(cover.position(), 1.0);
//! assert_eq!(cover.current_operation(), CoverOperation::Idle);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Control requests, validation policy, and the driver contract.
pub mod call;
/// Configuration structs for cover entities and drivers.
pub mod config;
/// Cover entity core: capability traits, operation state, publish machinery.
pub mod cover;
/// Position-estimator cover drivers.
pub mod drivers;
/// Elapsed-time position extrapolation engine.
pub mod estimator;
/// Closure-backed actuator for template-style covers.
pub mod events;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Persisted restore record codec and storage keys.
pub mod restore;
/// Deferred one-shot actions checked each tick.
pub mod timer;
/// Core traits for hardware abstraction and persisted storage.
pub mod traits;
/// Protocol-framed hardware drivers and their codecs.
pub mod wire;

// Re-exports for convenience
pub use call::{CoverCall, CoverCallBuilder, CoverControl};
pub use cover::{
    CoverCore, CoverOperation, CoverState, CoverTraits, StateListener, COVER_CLOSED, COVER_OPEN,
};
pub use drivers::{
    CurrentBasedCover, FeedbackCover, TiltOnlyCover, TimeBasedCover, TimeBasedTiltCover,
};
pub use estimator::TravelEstimator;
pub use events::CallbackActuator;
pub use restore::CoverRestoreState;
pub use timer::OneShot;
pub use traits::{
    Clock, CoverActuator, CurrentSensor, FrameLink, NullStore, StateStore, TravelSensors,
};
pub use wire::{
    ChenyangCover, DooyaCover, FrameError, Gm40Cover, He60rCover, RxStats, SomfyRtsActuator,
    TormaticCover,
};

// Config re-exports
pub use config::{
    CoverConfig, CurrentBasedConfig, FeedbackConfig, TiltOnlyConfig, TimeBasedConfig,
    TimeBasedTiltConfig,
};
