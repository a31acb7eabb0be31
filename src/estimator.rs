//! Travel-time position extrapolation.
//!
//! None of the supported motors report continuous position, so the
//! drivers integrate it: while the motor runs, position advances by
//! `elapsed / full_traverse_duration` in the direction of travel. The
//! [`TravelEstimator`] owns that bookkeeping: per-direction durations,
//! the last-recompute timestamp, and the optional spin-up window that is
//! excluded from the extrapolation because the motor moves no load while
//! it accelerates.
//!
//! Arrival is detected with a direction-aware inequality rather than an
//! equality test: `position >= target` while opening, `<= target` while
//! closing. Elapsed time only grows, so the comparison always terminates;
//! near exact targets it can trip one tick late, which is accepted.
//!
//! # Example
//!
//! ```rust
//! use coverdrive::{CoverOperation, TravelEstimator};
//!
//! let mut est = TravelEstimator::new(10_000, 8_000);
//! est.mark(0);
//!
//! // Opening from closed for 5 seconds of a 10 second traverse.
//! let pos = est.advance(CoverOperation::Opening, 0.0, 5_000, 0, 0.0, 1.0);
//! assert!((pos - 0.5).abs() < 1e-6);
//! ```

use crate::cover::CoverOperation;

/// Elapsed-time position integrator with per-direction durations.
#[derive(Clone, Debug)]
pub struct TravelEstimator {
    open_duration_ms: u32,
    close_duration_ms: u32,
    accel_wait_ms: u32,
    last_recompute_ms: u64,
}

impl TravelEstimator {
    /// Creates an estimator from full-traverse durations in milliseconds.
    ///
    /// Durations of zero are treated as one millisecond; a zero-length
    /// traverse is a configuration mistake, not a division by zero.
    pub fn new(open_duration_ms: u32, close_duration_ms: u32) -> Self {
        Self {
            open_duration_ms: open_duration_ms.max(1),
            close_duration_ms: close_duration_ms.max(1),
            accel_wait_ms: 0,
            last_recompute_ms: 0,
        }
    }

    /// Exclude the first `ms` after each direction start from the
    /// extrapolation, modelling motor spin-up.
    pub fn with_acceleration_wait(mut self, ms: u32) -> Self {
        self.accel_wait_ms = ms;
        self
    }

    /// Full open traverse duration in milliseconds.
    pub fn open_duration_ms(&self) -> u32 {
        self.open_duration_ms
    }

    /// Full close traverse duration in milliseconds.
    pub fn close_duration_ms(&self) -> u32 {
        self.close_duration_ms
    }

    /// Traverse duration for a direction of travel; zero for idle.
    pub fn duration_for(&self, op: CoverOperation) -> u32 {
        match op {
            CoverOperation::Opening => self.open_duration_ms,
            CoverOperation::Closing => self.close_duration_ms,
            CoverOperation::Idle => 0,
        }
    }

    /// Reset the recompute timestamp at a direction start, so the next
    /// [`advance`](Self::advance) integrates from `now_ms`.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_recompute_ms = now_ms;
    }

    /// Integrate position up to `now_ms` and return the new value,
    /// clamped to `[lo, hi]`.
    ///
    /// `start_dir_ms` is when the current direction was started; time
    /// inside the acceleration window after it contributes nothing.
    /// Idle covers pass through unchanged. Calling twice with the same
    /// `now_ms` is a no-op for the second call.
    pub fn advance(
        &mut self,
        op: CoverOperation,
        position: f32,
        now_ms: u64,
        start_dir_ms: u64,
        lo: f32,
        hi: f32,
    ) -> f32 {
        if op == CoverOperation::Idle {
            self.last_recompute_ms = now_ms;
            return position;
        }

        let accel_end = start_dir_ms + self.accel_wait_ms as u64;
        let from = self.last_recompute_ms.max(accel_end);
        let elapsed = now_ms.saturating_sub(from);
        self.last_recompute_ms = now_ms;
        if elapsed == 0 {
            return position;
        }

        let duration = self.duration_for(op) as f32;
        let next = position + op.sign() * elapsed as f32 / duration;
        next.clamp(lo, hi)
    }

    /// Direction-aware arrival test.
    ///
    /// Opening arrives at `position >= target`, closing at
    /// `position <= target`; an idle cover is trivially at target.
    pub fn is_at_target(op: CoverOperation, position: f32, target: f32) -> bool {
        match op {
            CoverOperation::Opening => position >= target,
            CoverOperation::Closing => position <= target,
            CoverOperation::Idle => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn opening_advances_linearly() {
        let mut est = TravelEstimator::new(10_000, 8_000);
        est.mark(0);

        let pos = est.advance(CoverOperation::Opening, 0.2, 2_500, 0, 0.0, 1.0);
        assert!((pos - 0.45).abs() < EPS);

        let pos = est.advance(CoverOperation::Opening, pos, 5_000, 0, 0.0, 1.0);
        assert!((pos - 0.7).abs() < EPS);
    }

    #[test]
    fn closing_uses_its_own_duration() {
        let mut est = TravelEstimator::new(10_000, 8_000);
        est.mark(0);

        // 4 seconds of an 8 second close traverse.
        let pos = est.advance(CoverOperation::Closing, 1.0, 4_000, 0, 0.0, 1.0);
        assert!((pos - 0.5).abs() < EPS);
    }

    #[test]
    fn position_clamps_at_bounds() {
        let mut est = TravelEstimator::new(1_000, 1_000);
        est.mark(0);

        let pos = est.advance(CoverOperation::Opening, 0.9, 5_000, 0, 0.0, 1.0);
        assert_eq!(pos, 1.0);

        est.mark(5_000);
        let pos = est.advance(CoverOperation::Closing, 0.1, 10_000, 5_000, 0.0, 1.0);
        assert_eq!(pos, 0.0);
    }

    #[test]
    fn inset_bounds_hold_short_of_the_extremes() {
        let mut est = TravelEstimator::new(1_000, 1_000);
        est.mark(0);

        let pos = est.advance(CoverOperation::Opening, 0.5, 10_000, 0, 0.01, 0.99);
        assert_eq!(pos, 0.99);
    }

    #[test]
    fn acceleration_window_contributes_nothing() {
        let mut est = TravelEstimator::new(10_000, 10_000).with_acceleration_wait(1_000);
        est.mark(0);

        // Entirely inside the spin-up window.
        let pos = est.advance(CoverOperation::Opening, 0.0, 800, 0, 0.0, 1.0);
        assert_eq!(pos, 0.0);

        // 2 seconds past start, only the second after spin-up counts.
        let pos = est.advance(CoverOperation::Opening, pos, 2_000, 0, 0.0, 1.0);
        assert!((pos - 0.1).abs() < EPS);
    }

    #[test]
    fn same_timestamp_twice_is_a_no_op() {
        let mut est = TravelEstimator::new(10_000, 10_000);
        est.mark(0);

        let first = est.advance(CoverOperation::Opening, 0.0, 3_000, 0, 0.0, 1.0);
        let second = est.advance(CoverOperation::Opening, first, 3_000, 0, 0.0, 1.0);
        assert_eq!(first, second);
    }

    #[test]
    fn idle_passes_position_through() {
        let mut est = TravelEstimator::new(10_000, 10_000);
        est.mark(0);
        let pos = est.advance(CoverOperation::Idle, 0.37, 60_000, 0, 0.0, 1.0);
        assert_eq!(pos, 0.37);
    }

    #[test]
    fn arrival_is_direction_aware() {
        assert!(TravelEstimator::is_at_target(CoverOperation::Opening, 0.8, 0.8));
        assert!(TravelEstimator::is_at_target(CoverOperation::Opening, 0.9, 0.8));
        assert!(!TravelEstimator::is_at_target(CoverOperation::Opening, 0.7, 0.8));

        assert!(TravelEstimator::is_at_target(CoverOperation::Closing, 0.2, 0.2));
        assert!(TravelEstimator::is_at_target(CoverOperation::Closing, 0.1, 0.2));
        assert!(!TravelEstimator::is_at_target(CoverOperation::Closing, 0.3, 0.2));

        assert!(TravelEstimator::is_at_target(CoverOperation::Idle, 0.0, 1.0));
    }

    #[test]
    fn zero_duration_is_coerced() {
        let est = TravelEstimator::new(0, 0);
        assert_eq!(est.open_duration_ms(), 1);
        assert_eq!(est.close_duration_ms(), 1);
    }
}
