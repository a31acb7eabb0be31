//! Configuration for cover entities and drivers.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic on desktop with `std`. Every driver takes its config by
//! value at construction; nothing is reconfigurable at runtime.
//!
//! # Example
//!
//! ```rust
//! use coverdrive::config::TimeBasedConfig;
//!
//! let config = TimeBasedConfig::new("garage door", 15_000, 12_000)
//!     .with_max_duration(20_000)
//!     .with_built_in_endstop(true)
//!     .with_device_class("garage");
//! ```

use heapless::String as HString;

/// Maximum length for entity names and device class tags.
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings.
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Create a ShortString from a `&str`, truncating if too long.
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= MAX_SHORT_STRING)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Entity Config
// ============================================================================

/// Identity shared by every cover driver.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverConfig {
    /// Entity name; also the seed for the persistence key.
    pub name: ShortString,
    /// Optional device class tag (`"shutter"`, `"garage"`, `"blind"`).
    pub device_class: ShortString,
}

impl CoverConfig {
    /// Creates an identity config for the named entity.
    pub fn new(name: &str) -> Self {
        Self {
            name: short_string(name),
            device_class: ShortString::new(),
        }
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.device_class = short_string(class);
        self
    }
}

// ============================================================================
// Time-Based Driver Config
// ============================================================================

/// Configuration for [`TimeBasedCover`](crate::drivers::TimeBasedCover).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeBasedConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Full open traverse duration in milliseconds.
    pub open_duration_ms: u32,
    /// Full close traverse duration in milliseconds.
    pub close_duration_ms: u32,
    /// Safety cutoff: force a stop after this long in one direction.
    pub max_duration_ms: Option<u32>,
    /// Forced pause before reversing direction, 0 = reverse immediately.
    pub interlock_wait_ms: u32,
    /// Initial window after a direction start excluded from extrapolation.
    pub acceleration_wait_ms: u32,
    /// Motor stops itself at the travel extremes.
    pub has_built_in_endstop: bool,
    /// Report state as an estimate with no feedback.
    pub assumed_state: bool,
}

impl TimeBasedConfig {
    /// Creates a config from the entity name and traverse durations.
    pub fn new(name: &str, open_duration_ms: u32, close_duration_ms: u32) -> Self {
        Self {
            cover: CoverConfig::new(name),
            open_duration_ms,
            close_duration_ms,
            max_duration_ms: None,
            interlock_wait_ms: 0,
            acceleration_wait_ms: 0,
            has_built_in_endstop: false,
            assumed_state: true,
        }
    }

    /// Set the safety cutoff duration.
    pub fn with_max_duration(mut self, ms: u32) -> Self {
        self.max_duration_ms = Some(ms);
        self
    }

    /// Set the direction-change interlock wait.
    pub fn with_interlock_wait(mut self, ms: u32) -> Self {
        self.interlock_wait_ms = ms;
        self
    }

    /// Set the motor spin-up window.
    pub fn with_acceleration_wait(mut self, ms: u32) -> Self {
        self.acceleration_wait_ms = ms;
        self
    }

    /// Set whether the motor stops itself at the extremes.
    pub fn with_built_in_endstop(mut self, v: bool) -> Self {
        self.has_built_in_endstop = v;
        self
    }

    /// Set whether state is reported as assumed.
    pub fn with_assumed_state(mut self, v: bool) -> Self {
        self.assumed_state = v;
        self
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.cover = self.cover.with_device_class(class);
        self
    }
}

// ============================================================================
// Current-Based Driver Config
// ============================================================================

/// Configuration for [`CurrentBasedCover`](crate::drivers::CurrentBasedCover).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentBasedConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Full open traverse duration in milliseconds.
    pub open_duration_ms: u32,
    /// Full close traverse duration in milliseconds.
    pub close_duration_ms: u32,
    /// Open winding draws above this while the motor moves.
    pub open_moving_current_ma: u32,
    /// Close winding draws above this while the motor moves.
    pub close_moving_current_ma: u32,
    /// Open winding draw above this means an obstacle.
    pub open_obstacle_current_ma: Option<u32>,
    /// Close winding draw above this means an obstacle.
    pub close_obstacle_current_ma: Option<u32>,
    /// Ignore current readings for this long after a direction start.
    pub start_sensing_delay_ms: u32,
    /// Fraction of travel to reverse after an obstacle, 0 = just stop.
    pub obstacle_rollback: f32,
    /// Safety cutoff: force a stop after this long in one direction.
    pub max_duration_ms: Option<u32>,
    /// Treat both windings drawing at once as a malfunction.
    pub malfunction_detection: bool,
}

impl CurrentBasedConfig {
    /// Creates a config from the entity name and traverse durations.
    ///
    /// Moving-current thresholds default to zero, meaning "any draw counts
    /// as moving"; real hardware wants
    /// [`with_moving_currents`](Self::with_moving_currents).
    pub fn new(name: &str, open_duration_ms: u32, close_duration_ms: u32) -> Self {
        Self {
            cover: CoverConfig::new(name),
            open_duration_ms,
            close_duration_ms,
            open_moving_current_ma: 0,
            close_moving_current_ma: 0,
            open_obstacle_current_ma: None,
            close_obstacle_current_ma: None,
            start_sensing_delay_ms: 500,
            obstacle_rollback: 0.0,
            max_duration_ms: None,
            malfunction_detection: true,
        }
    }

    /// Set the per-direction moving-current thresholds.
    pub fn with_moving_currents(mut self, open_ma: u32, close_ma: u32) -> Self {
        self.open_moving_current_ma = open_ma;
        self.close_moving_current_ma = close_ma;
        self
    }

    /// Set the per-direction obstacle-current thresholds.
    pub fn with_obstacle_currents(mut self, open_ma: u32, close_ma: u32) -> Self {
        self.open_obstacle_current_ma = Some(open_ma);
        self.close_obstacle_current_ma = Some(close_ma);
        self
    }

    /// Set how long current readings are ignored after a direction start.
    pub fn with_start_sensing_delay(mut self, ms: u32) -> Self {
        self.start_sensing_delay_ms = ms;
        self
    }

    /// Set the obstacle rollback fraction.
    pub fn with_obstacle_rollback(mut self, fraction: f32) -> Self {
        self.obstacle_rollback = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set the safety cutoff duration.
    pub fn with_max_duration(mut self, ms: u32) -> Self {
        self.max_duration_ms = Some(ms);
        self
    }

    /// Enable or disable malfunction detection.
    pub fn with_malfunction_detection(mut self, v: bool) -> Self {
        self.malfunction_detection = v;
        self
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.cover = self.cover.with_device_class(class);
        self
    }
}

// ============================================================================
// Feedback Driver Config
// ============================================================================

/// Configuration for [`FeedbackCover`](crate::drivers::FeedbackCover).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedbackConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Full open traverse duration in milliseconds.
    pub open_duration_ms: u32,
    /// Full close traverse duration in milliseconds.
    pub close_duration_ms: u32,
    /// Fraction of travel to reverse after an obstacle, 0 = just stop.
    pub obstacle_rollback: f32,
    /// Motor stops itself at the travel extremes.
    pub has_built_in_endstop: bool,
    /// Forced pause before reversing direction, 0 = reverse immediately.
    pub direction_change_wait_ms: u32,
    /// Initial window after a direction start excluded from extrapolation.
    pub acceleration_wait_ms: u32,
    /// Safety cutoff: force a stop after this long in one direction.
    pub max_duration_ms: Option<u32>,
}

impl FeedbackConfig {
    /// Creates a config from the entity name and traverse durations.
    pub fn new(name: &str, open_duration_ms: u32, close_duration_ms: u32) -> Self {
        Self {
            cover: CoverConfig::new(name),
            open_duration_ms,
            close_duration_ms,
            obstacle_rollback: 0.0,
            has_built_in_endstop: false,
            direction_change_wait_ms: 0,
            acceleration_wait_ms: 0,
            max_duration_ms: None,
        }
    }

    /// Set the obstacle rollback fraction.
    pub fn with_obstacle_rollback(mut self, fraction: f32) -> Self {
        self.obstacle_rollback = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set whether the motor stops itself at the extremes.
    pub fn with_built_in_endstop(mut self, v: bool) -> Self {
        self.has_built_in_endstop = v;
        self
    }

    /// Set the direction-change wait.
    pub fn with_direction_change_wait(mut self, ms: u32) -> Self {
        self.direction_change_wait_ms = ms;
        self
    }

    /// Set the motor spin-up window.
    pub fn with_acceleration_wait(mut self, ms: u32) -> Self {
        self.acceleration_wait_ms = ms;
        self
    }

    /// Set the safety cutoff duration.
    pub fn with_max_duration(mut self, ms: u32) -> Self {
        self.max_duration_ms = Some(ms);
        self
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.cover = self.cover.with_device_class(class);
        self
    }
}

// ============================================================================
// Tilt-Only Driver Config
// ============================================================================

/// Configuration for [`TiltOnlyCover`](crate::drivers::TiltOnlyCover).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TiltOnlyConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Full tilt swing duration in milliseconds.
    pub tilt_duration_ms: u32,
}

impl TiltOnlyConfig {
    /// Creates a config from the entity name and the tilt swing duration.
    pub fn new(name: &str, tilt_duration_ms: u32) -> Self {
        Self {
            cover: CoverConfig::new(name),
            tilt_duration_ms,
        }
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.cover = self.cover.with_device_class(class);
        self
    }
}

// ============================================================================
// Time-Based Tilt Driver Config
// ============================================================================

/// Configuration for [`TimeBasedTiltCover`](crate::drivers::TimeBasedTiltCover).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeBasedTiltConfig {
    /// Entity identity.
    pub cover: CoverConfig,
    /// Full open traverse duration in milliseconds, after the slats rotate.
    pub open_duration_ms: u32,
    /// Full close traverse duration in milliseconds, after the slats rotate.
    pub close_duration_ms: u32,
    /// Full slat rotation duration in milliseconds.
    pub tilt_duration_ms: u32,
    /// Forced pause before reversing direction, 0 = reverse immediately.
    pub interlock_wait_ms: u32,
    /// Safety cutoff: force a stop after this long in one direction.
    pub max_duration_ms: Option<u32>,
    /// Report state as an estimate with no feedback.
    pub assumed_state: bool,
}

impl TimeBasedTiltConfig {
    /// Creates a config from the entity name and the three durations.
    pub fn new(
        name: &str,
        open_duration_ms: u32,
        close_duration_ms: u32,
        tilt_duration_ms: u32,
    ) -> Self {
        Self {
            cover: CoverConfig::new(name),
            open_duration_ms,
            close_duration_ms,
            tilt_duration_ms,
            interlock_wait_ms: 0,
            max_duration_ms: None,
            assumed_state: true,
        }
    }

    /// Set the direction-change interlock wait.
    pub fn with_interlock_wait(mut self, ms: u32) -> Self {
        self.interlock_wait_ms = ms;
        self
    }

    /// Set the safety cutoff duration.
    pub fn with_max_duration(mut self, ms: u32) -> Self {
        self.max_duration_ms = Some(ms);
        self
    }

    /// Set whether state is reported as assumed.
    pub fn with_assumed_state(mut self, v: bool) -> Self {
        self.assumed_state = v;
        self
    }

    /// Set the device class tag.
    pub fn with_device_class(mut self, class: &str) -> Self {
        self.cover = self.cover.with_device_class(class);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
