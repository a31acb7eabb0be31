//! Cover entity core: capability traits, operation state, and the shared
//! position/tilt/publish machinery every driver embeds.
//!
//! A cover is a motorized actuator with a continuous position between
//! fully closed (`0.0`) and fully open (`1.0`), an optional tilt axis
//! with the same convention, and a coarse operation state. None of the
//! supported hardware reports position continuously; the drivers in
//! [`crate::drivers`] and [`crate::wire`] estimate it and push their
//! estimates through [`CoverCore`], which owns clamping, listener
//! notification, and persistence.
//!
//! # State Machine
//!
//! Externally a cover is always in one of three operations:
//!
//! ```text
//! Idle ──open──▶ Opening ──target/stop──▶ Idle
//! Idle ──close─▶ Closing ──target/stop──▶ Idle
//! Opening ◀──reversal──▶ Closing   (some drivers, possibly interlocked)
//! ```
//!
//! Driver-internal superstates (a calibration dwell after an endstop,
//! a deferred reversal) collapse to one of these three before anything
//! is published.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::config::{short_string, ShortString};
use crate::restore::{restore_key, CoverRestoreState};
use crate::traits::StateStore;

/// Position value of a fully open cover.
pub const COVER_OPEN: f32 = 1.0;

/// Position value of a fully closed cover.
pub const COVER_CLOSED: f32 = 0.0;

/// Coarse motion state of a cover.
///
/// Defaults to [`Idle`](Self::Idle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CoverOperation {
    /// Motor stopped.
    #[default]
    Idle,
    /// Travelling toward fully open.
    Opening,
    /// Travelling toward fully closed.
    Closing,
}

impl CoverOperation {
    /// Returns the operation as a lowercase string.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CoverOperation::Idle => "idle",
            CoverOperation::Opening => "opening",
            CoverOperation::Closing => "closing",
        }
    }

    /// Signed unit direction of travel: +1 opening, -1 closing, 0 idle.
    #[inline]
    pub const fn sign(&self) -> f32 {
        match self {
            CoverOperation::Idle => 0.0,
            CoverOperation::Opening => 1.0,
            CoverOperation::Closing => -1.0,
        }
    }

    /// The opposite direction of travel. Idle has no opposite.
    #[inline]
    pub const fn reversed(&self) -> Self {
        match self {
            CoverOperation::Idle => CoverOperation::Idle,
            CoverOperation::Opening => CoverOperation::Closing,
            CoverOperation::Closing => CoverOperation::Opening,
        }
    }
}

/// Static capability descriptor for a cover driver.
///
/// Produced fresh by every driver's `traits()`; call validation reads it
/// to drop or clamp unsupported request fields. Immutable once built.
///
/// # Example
///
/// ```rust
/// use coverdrive::CoverTraits;
///
/// let traits = CoverTraits::new()
///     .with_position(true)
///     .with_stop(true)
///     .with_toggle(true);
///
/// assert!(traits.supports_position());
/// assert!(!traits.supports_tilt());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverTraits {
    supports_position: bool,
    supports_tilt: bool,
    supports_stop: bool,
    supports_toggle: bool,
    is_assumed_state: bool,
}

impl CoverTraits {
    /// Creates a descriptor with every capability off.
    pub const fn new() -> Self {
        Self {
            supports_position: false,
            supports_tilt: false,
            supports_stop: false,
            supports_toggle: false,
            is_assumed_state: false,
        }
    }

    /// Set whether arbitrary position targets are accepted.
    pub const fn with_position(mut self, v: bool) -> Self {
        self.supports_position = v;
        self
    }

    /// Set whether tilt targets are accepted.
    pub const fn with_tilt(mut self, v: bool) -> Self {
        self.supports_tilt = v;
        self
    }

    /// Set whether mid-travel stop is possible.
    pub const fn with_stop(mut self, v: bool) -> Self {
        self.supports_stop = v;
        self
    }

    /// Set whether toggle requests are accepted.
    pub const fn with_toggle(mut self, v: bool) -> Self {
        self.supports_toggle = v;
        self
    }

    /// Set whether the reported state is an estimate with no feedback.
    pub const fn with_assumed_state(mut self, v: bool) -> Self {
        self.is_assumed_state = v;
        self
    }

    /// Whether arbitrary position targets are accepted.
    pub const fn supports_position(&self) -> bool {
        self.supports_position
    }

    /// Whether tilt targets are accepted.
    pub const fn supports_tilt(&self) -> bool {
        self.supports_tilt
    }

    /// Whether mid-travel stop is possible.
    pub const fn supports_stop(&self) -> bool {
        self.supports_stop
    }

    /// Whether toggle requests are accepted.
    pub const fn supports_toggle(&self) -> bool {
        self.supports_toggle
    }

    /// Whether the reported state is an estimate with no feedback.
    pub const fn is_assumed_state(&self) -> bool {
        self.is_assumed_state
    }
}

/// Published state snapshot handed to listeners.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverState {
    /// Position, `0.0` closed to `1.0` open.
    pub position: f32,
    /// Tilt, `0.0` to `1.0`. Meaningful only when the driver supports tilt.
    pub tilt: f32,
    /// Current motion state.
    pub operation: CoverOperation,
}

/// Listener invoked synchronously on every publish.
pub type StateListener = Box<dyn FnMut(CoverState)>;

/// Shared entity state embedded by every cover driver.
///
/// Owns the position/tilt/operation triple, the listener list, and the
/// persistence key derived from the configured name. Drivers mutate the
/// fields directly (single-threaded tick model, no interior mutability)
/// and call [`publish_state`](Self::publish_state) whenever observers
/// should hear about it.
pub struct CoverCore {
    /// Estimated or reported position, clamped on publish.
    pub(crate) position: f32,
    /// Estimated or reported tilt, clamped on publish.
    pub(crate) tilt: f32,
    /// Current motion state.
    pub(crate) operation: CoverOperation,
    name: ShortString,
    device_class: Option<ShortString>,
    key: u32,
    listeners: Vec<StateListener>,
}

impl CoverCore {
    /// Creates a core for the named entity, assumed half-open until a
    /// restore or the first full traverse says otherwise.
    pub fn new(name: &str) -> Self {
        Self {
            position: 0.5,
            tilt: 0.5,
            operation: CoverOperation::Idle,
            name: short_string(name),
            device_class: None,
            key: restore_key(name),
            listeners: Vec::new(),
        }
    }

    /// Tag the entity with a device class (`"shutter"`, `"garage"`, ...).
    pub fn set_device_class(&mut self, class: &str) {
        self.device_class = Some(short_string(class));
    }

    /// Configured entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional device class tag.
    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    /// Persistence key for this entity's restore record.
    pub fn restore_key(&self) -> u32 {
        self.key
    }

    /// Current position, `0.0` closed to `1.0` open.
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Current tilt.
    pub fn tilt(&self) -> f32 {
        self.tilt
    }

    /// Current motion state.
    pub fn current_operation(&self) -> CoverOperation {
        self.operation
    }

    /// True when the position is exactly fully open.
    pub fn is_fully_open(&self) -> bool {
        self.position == COVER_OPEN
    }

    /// True when the position is exactly fully closed.
    pub fn is_fully_closed(&self) -> bool {
        self.position == COVER_CLOSED
    }

    /// Register a state listener, invoked synchronously inside
    /// [`publish_state`](Self::publish_state) in registration order.
    pub fn add_on_state<F: FnMut(CoverState) + 'static>(&mut self, f: F) {
        self.listeners.push(Box::new(f));
    }

    /// Snapshot of the current state without publishing.
    pub fn state(&self) -> CoverState {
        CoverState {
            position: self.position,
            tilt: self.tilt,
            operation: self.operation,
        }
    }

    /// Clamp, notify listeners, and optionally persist.
    ///
    /// Always notifies, even when nothing changed since the last call;
    /// callers are expected to publish only on change, but redundant
    /// publishes are harmless by contract. With `save`, a restore record
    /// is written through `store` keyed by the name hash.
    pub fn publish_state<S: StateStore>(&mut self, save: bool, store: &mut S) {
        self.position = self.position.clamp(COVER_CLOSED, COVER_OPEN);
        self.tilt = self.tilt.clamp(0.0, 1.0);

        let state = self.state();
        log::debug!(
            "'{}': publishing position {:.2}, tilt {:.2}, {}",
            self.name,
            state.position,
            state.tilt,
            state.operation.as_str()
        );
        for listener in &mut self.listeners {
            listener(state);
        }

        if save {
            let record = CoverRestoreState {
                position: self.position,
                tilt: self.tilt,
            };
            if !store.save(self.key, &record.encode()) {
                log::warn!("'{}': failed to persist restore record", self.name);
            }
        }
    }

    /// Load the persisted record, if one exists, into position/tilt.
    ///
    /// Returns `false` on first boot (no record); the constructor's
    /// half-open assumption then stands.
    pub fn restore<S: StateStore>(&mut self, store: &mut S) -> bool {
        match CoverRestoreState::load(store, self.key) {
            Some(record) => {
                self.position = record.position.clamp(COVER_CLOSED, COVER_OPEN);
                self.tilt = record.tilt.clamp(0.0, 1.0);
                log::debug!(
                    "'{}': restored position {:.2}, tilt {:.2}",
                    self.name,
                    self.position,
                    self.tilt
                );
                true
            }
            None => false,
        }
    }
}

impl core::fmt::Debug for CoverCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CoverCore")
            .field("name", &self.name.as_str())
            .field("position", &self.position)
            .field("tilt", &self.tilt)
            .field("operation", &self.operation)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
