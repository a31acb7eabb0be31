//! Edge case and boundary condition tests for the cover drivers

use std::cell::RefCell;
use std::rc::Rc;

use coverdrive::hal::{MemoryStore, MockActuator, MockLink};
use coverdrive::restore::restore_key;
use coverdrive::wire::dooya::DooyaConfig;
use coverdrive::wire::he60r::{He60rCodec, He60rConfig};
use coverdrive::wire::somfy_rts::{build_frame, deobfuscate};
use coverdrive::wire::tormatic::TormaticCodec;
use coverdrive::{
    CoverCall, CoverControl, CoverOperation, CoverRestoreState, CoverTraits, DooyaCover,
    He60rCover, StateStore, TiltOnlyConfig, TiltOnlyCover, TimeBasedConfig, TimeBasedCover,
    TimeBasedTiltConfig, TimeBasedTiltCover,
};

const EPS: f32 = 1e-5;

fn seeded(name: &str, position: f32) -> MemoryStore {
    let mut store = MemoryStore::new();
    let record = CoverRestoreState {
        position,
        tilt: 0.0,
    };
    store.save(restore_key(name), &record.encode());
    store
}

fn closed_cover(config: TimeBasedConfig) -> TimeBasedCover<MockActuator, MemoryStore> {
    let store = seeded(config.cover.name.as_str(), 0.0);
    let mut cover = TimeBasedCover::new(MockActuator::new(), store, config);
    cover.setup();
    cover
}

// ============================================================================
// Boundary Value Tests
// ============================================================================

#[test]
fn request_for_the_position_already_held_does_nothing() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 1_000, 1_000));

    // Already fully closed; no built-in endstop, so no drive command.
    cover.make_call().set_position(0.0).perform(0).unwrap();
    assert!(cover.actuator().commands.is_empty());
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
}

#[test]
fn overshoot_request_clamps_to_fully_open() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 1_000, 1_000));

    cover.make_call().set_position(2.5).perform(0).unwrap();
    assert_eq!(cover.target_position(), Some(1.0));
    assert_eq!(cover.current_operation(), CoverOperation::Opening);
}

#[test]
fn negative_request_clamps_to_fully_closed() {
    let store = seeded("c", 0.5);
    let mut cover = TimeBasedCover::new(
        MockActuator::new(),
        store,
        TimeBasedConfig::new("c", 1_000, 1_000),
    );
    cover.setup();

    cover.make_call().set_position(-3.0).perform(0).unwrap();
    assert_eq!(cover.target_position(), Some(0.0));
    assert_eq!(cover.current_operation(), CoverOperation::Closing);
}

#[test]
fn binary_position_works_on_a_toggle_only_door() {
    let mut door = He60rCover::new(
        MockLink::new(),
        MemoryStore::new(),
        He60rConfig::new("garage"),
    );

    // Mid-range positions are dropped by validation on a driver without
    // position support.
    door.make_call().set_position(0.4).perform(0).unwrap();
    assert!(door.link_mut().sent.is_empty());

    // Exactly open/closed still works as a binary command.
    door.make_call().set_position(1.0).perform(0).unwrap();
    assert_eq!(door.link_mut().sent, [He60rCodec::toggle_frame().to_vec()]);
}

// ============================================================================
// Validation Edge Cases
// ============================================================================

#[test]
fn stop_beats_everything_in_one_call() {
    let traits = CoverTraits::new()
        .with_position(true)
        .with_tilt(true)
        .with_stop(true)
        .with_toggle(true);

    let mut call = CoverCall::new()
        .set_stop(true)
        .set_toggle(true)
        .set_position(0.5)
        .set_tilt(0.5);
    call.validate(&traits);

    assert!(call.is_stop());
    assert!(!call.is_toggle());
    assert!(call.position().is_none());
    assert!(call.tilt().is_none());
}

#[test]
fn unsupported_toggle_is_dropped_before_the_driver() {
    // Dooya motors have no toggle on the wire.
    let mut cover = DooyaCover::new(
        MockLink::new(),
        MemoryStore::new(),
        DooyaConfig::new("dooya", 0x01),
    );
    assert!(!cover.traits().supports_toggle());

    cover.make_call().set_toggle(true).perform(0).unwrap();
    assert!(cover.link_mut().sent.is_empty());
}

#[test]
fn clamped_tilt_reaches_the_driver_in_range() {
    let mut cover = TimeBasedTiltCover::new(
        MockActuator::new(),
        MemoryStore::new(),
        TimeBasedTiltConfig::new("venetian", 10_000, 10_000, 2_000),
    );

    // Tilt defaults to half; 5.0 clamps to 1.0 and starts a slat move.
    cover.make_call().set_tilt(5.0).perform(0).unwrap();
    assert_eq!(cover.target_tilt(), Some(1.0));
    assert_eq!(cover.current_operation(), CoverOperation::Opening);
}

// ============================================================================
// Timing Edge Cases
// ============================================================================

#[test]
fn huge_timestamps_do_not_overflow() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));

    // A monotonic clock that has been running for a very long time.
    let base = u64::MAX - 100_000;
    cover.make_call().set_position(1.0).perform(base).unwrap();

    cover.loop_tick(base + 5_000).unwrap();
    assert!((cover.position() - 0.5).abs() < EPS);

    cover.loop_tick(base + 10_000).unwrap();
    assert_eq!(cover.position(), 1.0);
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
}

#[test]
fn zero_duration_config_is_coerced_not_divided() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 0, 0));

    cover.make_call().set_position(1.0).perform(0).unwrap();
    // One millisecond of a coerced one-millisecond traverse.
    cover.loop_tick(1).unwrap();
    assert_eq!(cover.position(), 1.0);
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
}

#[test]
fn estimate_stays_put_after_a_max_duration_stop() {
    let mut cover =
        closed_cover(TimeBasedConfig::new("c", 10_000, 10_000).with_max_duration(4_000));

    cover.make_call().set_position(1.0).perform(0).unwrap();
    cover.loop_tick(4_001).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
    assert_eq!(cover.target_position(), None);
    let stale = cover.position();

    // Nothing moves once the safety stop has fired.
    cover.loop_tick(8_000).unwrap();
    cover.loop_tick(12_000).unwrap();
    assert_eq!(cover.position().to_bits(), stale.to_bits());
}

// ============================================================================
// Rapid Command Sequences
// ============================================================================

#[test]
fn rapid_alternating_commands_stay_consistent() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));

    for i in 0..10u64 {
        let target = if i % 2 == 0 { 1.0 } else { 0.0 };
        cover.make_call().set_position(target).perform(i * 100).unwrap();
        cover.loop_tick(i * 100).unwrap();
    }

    // The last command (i = 9) closes.
    assert_eq!(cover.current_operation(), CoverOperation::Closing);
    assert!((0.0..=1.0).contains(&cover.position()));
}

#[test]
fn repeated_stops_are_harmless() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));

    for t in 0..3u64 {
        cover.make_call().set_stop(true).perform(t * 100).unwrap();
    }
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
    assert_eq!(cover.position(), 0.0);
    assert_eq!(cover.actuator().count_of(CoverOperation::Idle), 3);
}

// ============================================================================
// Toggle Behavior
// ============================================================================

#[test]
fn toggle_remembers_the_last_direction() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 1_000, 1_000));

    // Fully closed: the first toggle opens.
    cover.make_call().set_toggle(true).perform(0).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Opening);
    cover.loop_tick(1_000).unwrap();
    assert_eq!(cover.position(), 1.0);

    // Last movement was opening: the next toggle closes.
    cover.make_call().set_toggle(true).perform(1_000).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Closing);
    cover.loop_tick(2_000).unwrap();

    // And back again.
    cover.make_call().set_toggle(true).perform(2_000).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Opening);
}

#[test]
fn toggle_mid_travel_stops_first() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 10_000, 10_000));
    cover.make_call().set_position(1.0).perform(0).unwrap();
    cover.loop_tick(3_000).unwrap();

    cover.make_call().set_toggle(true).perform(3_000).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
    assert!((cover.position() - 0.3).abs() < EPS);
}

// ============================================================================
// Persistence Edge Cases
// ============================================================================

#[test]
fn restore_keeps_default_when_store_is_empty() {
    let mut cover = TimeBasedCover::new(
        MockActuator::new(),
        MemoryStore::new(),
        TimeBasedConfig::new("fresh", 1_000, 1_000),
    );
    cover.setup();
    assert_eq!(cover.position(), 0.5);
}

#[test]
fn size_mismatched_record_reads_as_missing() {
    let mut store = MemoryStore::new();
    store.save(restore_key("c"), &[1, 2, 3]);

    let mut cover = TimeBasedCover::new(
        MockActuator::new(),
        store,
        TimeBasedConfig::new("c", 1_000, 1_000),
    );
    cover.setup();
    assert_eq!(cover.position(), 0.5);
}

// ============================================================================
// Tilt Axis Edge Cases
// ============================================================================

#[test]
fn tilt_only_cover_drops_mid_positions() {
    let mut cover = TiltOnlyCover::new(
        MockActuator::new(),
        MemoryStore::new(),
        TiltOnlyConfig::new("blind", 2_000),
    );

    cover.make_call().set_position(0.4).perform(0).unwrap();
    assert!(cover.actuator().commands.is_empty());
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
}

#[test]
fn combined_cover_stop_clears_both_targets() {
    let mut cover = TimeBasedTiltCover::new(
        MockActuator::new(),
        MemoryStore::new(),
        TimeBasedTiltConfig::new("venetian", 10_000, 10_000, 2_000),
    );
    cover.make_call().set_position(1.0).set_tilt(0.25).perform(0).unwrap();
    cover.loop_tick(1_000).unwrap();

    cover.make_call().set_stop(true).perform(1_000).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Idle);
    assert_eq!(cover.target_position(), None);
    assert_eq!(cover.target_tilt(), None);
}

// ============================================================================
// Wire Edge Cases
// ============================================================================

#[test]
fn stray_bytes_between_frames_are_skipped() {
    let mut cover = DooyaCover::new(
        MockLink::new(),
        MemoryStore::new(),
        DooyaConfig::new("dooya", 0x01),
    );

    // Line noise, then a valid idle report at 50 percent.
    let mut frame = [0x55u8, 0x01, 0x01, 50, 0x00, 0];
    frame[5] = coverdrive::wire::sum_checksum(&frame[..5]);
    cover.link_mut().queue_rx(&[0x00, 0x13]);
    cover.link_mut().queue_rx(&frame);
    cover.loop_tick().unwrap();

    assert_eq!(cover.rx_stats().frames_dropped, 2);
    assert_eq!(cover.rx_stats().frames_ok, 1);
    assert!((cover.position() - 0.5).abs() < 1e-6);
}

#[test]
fn tormatic_sequence_nibble_wraps() {
    let mut codec = TormaticCodec::new();
    assert_eq!(codec.next_seq(), 0);

    for _ in 0..16 {
        let _ = codec.command_frame(0x1, 0);
    }
    assert_eq!(codec.next_seq(), 0);

    let frame = codec.command_frame(0x1, 0);
    assert_eq!(frame[1] >> 4, 0);
    assert_eq!(codec.next_seq(), 1);
}

#[test]
fn rts_frame_checksum_holds_after_deobfuscation() {
    let frame = build_frame(0x2, 0x0042, 0x0012_3456);
    let clear = deobfuscate(&frame);

    let mut cksum = 0u8;
    for b in clear {
        cksum ^= b ^ (b >> 4);
    }
    assert_eq!(cksum & 0x0F, 0);
}

// ============================================================================
// Listener Edge Cases
// ============================================================================

#[test]
fn redundant_publishes_still_notify() {
    let mut cover = closed_cover(TimeBasedConfig::new("c", 1_000, 1_000));
    let count = Rc::new(RefCell::new(0));
    let n = Rc::clone(&count);
    cover.core_mut().add_on_state(move |_| *n.borrow_mut() += 1);

    // Two stops while already idle both publish.
    cover.make_call().set_stop(true).perform(0).unwrap();
    cover.make_call().set_stop(true).perform(100).unwrap();
    assert_eq!(*count.borrow(), 2);
}

#[test]
fn shared_store_round_trips_through_a_listener_scenario() {
    #[derive(Clone, Default)]
    struct SharedStore(Rc<RefCell<MemoryStore>>);

    impl StateStore for SharedStore {
        fn load(&mut self, key: u32, buf: &mut [u8]) -> bool {
            self.0.borrow_mut().load(key, buf)
        }

        fn save(&mut self, key: u32, data: &[u8]) -> bool {
            self.0.borrow_mut().save(key, data)
        }
    }

    let store = SharedStore::default();
    let mut cover = TimeBasedCover::new(
        MockActuator::new(),
        store.clone(),
        TimeBasedConfig::new("porch", 1_000, 1_000),
    );
    cover.setup();
    cover.make_call().set_position(1.0).perform(0).unwrap();
    cover.loop_tick(500).unwrap();
    cover.loop_tick(1_000).unwrap();
    assert_eq!(cover.current_operation(), CoverOperation::Idle);

    let mut fresh = TimeBasedCover::new(
        MockActuator::new(),
        store,
        TimeBasedConfig::new("porch", 1_000, 1_000),
    );
    fresh.setup();
    assert_eq!(fresh.position(), 1.0);
}
