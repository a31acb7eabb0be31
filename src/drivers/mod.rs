//! Position-estimator cover drivers.
//!
//! None of the hardware these drivers control reports continuous
//! position. Each driver runs the same small state machine (idle,
//! opening, closing) and estimates position from what it does have:
//!
//! - [`TimeBasedCover`]: elapsed time alone, the baseline strategy
//! - [`CurrentBasedCover`]: elapsed time plus winding-current sensing
//!   for endstop, obstacle, and malfunction inference
//! - [`FeedbackCover`]: elapsed time plus binary endstop and obstacle
//!   inputs
//! - [`TiltOnlyCover`]: a single tilt axis (venetian head rotation)
//! - [`TimeBasedTiltCover`]: combined travel and tilt axes sharing one
//!   motor
//!
//! Every driver embeds [`CoverCore`](crate::cover::CoverCore) for
//! publish/persist and implements
//! [`CoverControl`](crate::call::CoverControl); drive `loop_tick(now_ms)`
//! from the scheduler and commands through `make_call()`.

pub mod current_based;
pub mod feedback;
pub mod tilt;
pub mod time_based;
pub mod time_based_tilt;

pub use current_based::CurrentBasedCover;
pub use feedback::FeedbackCover;
pub use tilt::TiltOnlyCover;
pub use time_based::TimeBasedCover;
pub use time_based_tilt::TimeBasedTiltCover;
