//! Mock implementations for testing without hardware.
//!
//! Test doubles for every trait in [`crate::traits`], enabling
//! development and testing on desktop without physical covers.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockActuator`] | [`CoverActuator`] | Records drive commands |
//! | [`MockCurrent`] | [`CurrentSensor`] | Settable winding currents |
//! | [`MockSensors`] | [`TravelSensors`] | Settable endstop/obstacle levels |
//! | [`MockLink`] | [`FrameLink`] | Captures sent frames, queues rx bytes |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MemoryStore`] | [`StateStore`] | In-memory persisted records |
//!
//! All state is held in public fields so tests can inspect and inject
//! directly.
//!
//! # Example
//!
//! ```rust
//! use coverdrive::{CoverControl, CoverOperation, TimeBasedConfig, TimeBasedCover};
//! use coverdrive::hal::{MemoryStore, MockActuator};
//!
//! let config = TimeBasedConfig::new("shade", 10_000, 8_000);
//! let mut cover = TimeBasedCover::new(MockActuator::new(), MemoryStore::new(), config);
//!
//! cover.make_call().set_position(1.0).perform(0).unwrap();
//! assert_eq!(cover.actuator().commands, [CoverOperation::Opening]);
//! ```
//!
//! [`CoverActuator`]: crate::traits::CoverActuator
//! [`CurrentSensor`]: crate::traits::CurrentSensor
//! [`TravelSensors`]: crate::traits::TravelSensors
//! [`FrameLink`]: crate::traits::FrameLink
//! [`Clock`]: crate::traits::Clock
//! [`StateStore`]: crate::traits::StateStore

extern crate alloc;

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::cell::Cell;

use crate::cover::CoverOperation;
use crate::traits::{Clock, CoverActuator, CurrentSensor, FrameLink, StateStore, TravelSensors};

// ============================================================================
// Actuator Mock
// ============================================================================

/// Mock motor drive that records every command.
///
/// # Example
///
/// ```rust
/// use coverdrive::hal::MockActuator;
/// use coverdrive::traits::CoverActuator;
/// use coverdrive::CoverOperation;
///
/// let mut relay = MockActuator::new();
/// relay.drive_open().unwrap();
/// relay.drive_stop().unwrap();
///
/// assert_eq!(relay.commands, [CoverOperation::Opening, CoverOperation::Idle]);
/// assert_eq!(relay.last(), Some(CoverOperation::Idle));
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockActuator {
    /// Every drive command, in issue order. Stops record as `Idle`.
    pub commands: Vec<CoverOperation>,
}

impl MockActuator {
    /// Creates a mock with no recorded commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent command, if any.
    pub fn last(&self) -> Option<CoverOperation> {
        self.commands.last().copied()
    }

    /// Number of commands matching `op`.
    pub fn count_of(&self, op: CoverOperation) -> usize {
        self.commands.iter().filter(|&&c| c == op).count()
    }
}

impl CoverActuator for MockActuator {
    type Error = ();

    fn drive_open(&mut self) -> Result<(), ()> {
        self.commands.push(CoverOperation::Opening);
        Ok(())
    }

    fn drive_close(&mut self) -> Result<(), ()> {
        self.commands.push(CoverOperation::Closing);
        Ok(())
    }

    fn drive_stop(&mut self) -> Result<(), ()> {
        self.commands.push(CoverOperation::Idle);
        Ok(())
    }
}

// ============================================================================
// Sensor Mocks
// ============================================================================

/// Mock winding-current sensor with directly settable readings.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockCurrent {
    /// Reported open-winding current in milliamps.
    pub open_ma: u32,
    /// Reported close-winding current in milliamps.
    pub close_ma: u32,
}

impl MockCurrent {
    /// Creates a sensor reading zero on both windings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sensor with the given readings.
    pub fn with_readings(open_ma: u32, close_ma: u32) -> Self {
        Self { open_ma, close_ma }
    }
}

impl CurrentSensor for MockCurrent {
    fn open_current_ma(&self) -> u32 {
        self.open_ma
    }

    fn close_current_ma(&self) -> u32 {
        self.close_ma
    }
}

/// Mock endstop/obstacle inputs with directly settable levels.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockSensors {
    /// Fully-open endstop level.
    pub open_endstop: bool,
    /// Fully-closed endstop level.
    pub close_endstop: bool,
    /// Opening-obstacle level.
    pub open_obstacle: bool,
    /// Closing-obstacle level.
    pub close_obstacle: bool,
}

impl MockSensors {
    /// Creates sensors with every input inactive.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TravelSensors for MockSensors {
    fn open_endstop(&self) -> bool {
        self.open_endstop
    }

    fn close_endstop(&self) -> bool {
        self.close_endstop
    }

    fn open_obstacle(&self) -> bool {
        self.open_obstacle
    }

    fn close_obstacle(&self) -> bool {
        self.close_obstacle
    }
}

// ============================================================================
// Link Mock
// ============================================================================

/// Mock wire link that captures sent frames and replays queued bytes.
///
/// # Example
///
/// ```rust
/// use coverdrive::hal::MockLink;
/// use coverdrive::traits::FrameLink;
///
/// let mut link = MockLink::new();
/// link.send(&[0x55, 0x01]).unwrap();
/// assert_eq!(link.sent, [[0x55, 0x01]]);
///
/// link.queue_rx(&[0xAA, 0xBB]);
/// assert_eq!(link.poll_byte(), Some(0xAA));
/// assert_eq!(link.poll_byte(), Some(0xBB));
/// assert_eq!(link.poll_byte(), None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockLink {
    /// Every transmitted frame, in send order.
    pub sent: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
}

impl MockLink {
    /// Creates a link with nothing sent or queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by `poll_byte`, FIFO.
    pub fn queue_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// The most recently sent frame, if any.
    pub fn last_sent(&self) -> Option<&[u8]> {
        self.sent.last().map(|f| f.as_slice())
    }
}

impl FrameLink for MockLink {
    type Error = ();

    fn send(&mut self, frame: &[u8]) -> Result<(), ()> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn poll_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }
}

// ============================================================================
// Clock Mock
// ============================================================================

/// Controllable time source for tests.
///
/// Interior mutability lets a test advance time while drivers hold a
/// shared reference.
///
/// # Example
///
/// ```rust
/// use coverdrive::hal::MockClock;
/// use coverdrive::traits::Clock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
/// clock.advance(1_500);
/// assert_eq!(clock.now_ms(), 1_500);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<u64>,
}

impl MockClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock at the given time.
    pub fn at(now_ms: u64) -> Self {
        Self {
            now: Cell::new(now_ms),
        }
    }

    /// Move time forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

// ============================================================================
// Store Mock
// ============================================================================

/// In-memory [`StateStore`] keyed by record hash.
///
/// Behaves like the firmware preference layer: records are fixed-size
/// blobs and a size mismatch on load reads as "no record".
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<u32, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn load(&mut self, key: u32, buf: &mut [u8]) -> bool {
        match self.records.get(&key) {
            Some(data) if data.len() == buf.len() => {
                buf.copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    fn save(&mut self, key: u32, data: &[u8]) -> bool {
        self.records.insert(key, data.to_vec());
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
