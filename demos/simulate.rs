//! Desktop simulation of the cover drivers.
//!
//! Runs entirely on mocks with simulated time, so the whole walk-through
//! finishes instantly regardless of the configured traverse durations:
//!
//! - Act 1: a time-based shade is opened, reversed mid-travel, and the
//!   direction-change interlock holds the motor off for half a second
//!   before the close winding energizes.
//! - Act 2: a feedback shutter hits an obstacle while closing and rolls
//!   back a fifth of its travel.
//!
//! # Usage
//!
//! ```sh
//! cargo run --example simulate
//! ```
//!
//! Pass a tick size in milliseconds to change the scheduler granularity
//! (default 250), and set `RUST_LOG=debug` to see the driver logs:
//!
//! ```sh
//! RUST_LOG=debug cargo run --example simulate -- 100
//! ```

use coverdrive::hal::{MemoryStore, MockActuator, MockSensors};
use coverdrive::{
    CallbackActuator, CoverControl, CoverOperation, CoverState, FeedbackConfig, FeedbackCover,
    TimeBasedConfig, TimeBasedCover,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let tick_ms: u64 = std::env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(250);

    println!("=================================");
    println!("  coverdrive simulation");
    println!("=================================");
    println!();

    interlocked_reversal(tick_ms);
    obstacle_rollback(tick_ms);

    println!("Done.");
    Ok(())
}

/// Render one published state as a position bar.
fn print_state(state: CoverState) {
    let filled = (state.position * 20.0).round() as usize;
    println!(
        "  [state] |{}{}| {:>5.1}% {}",
        "#".repeat(filled),
        "-".repeat(20 - filled),
        state.position * 100.0,
        state.operation.as_str()
    );
}

fn interlocked_reversal(tick_ms: u64) {
    println!("--- act 1: time-based shade, 6 s open / 5 s close, 500 ms interlock ---");
    println!();

    let relay = CallbackActuator::new()
        .on_open(|| println!("  [relay] open winding energized"))
        .on_close(|| println!("  [relay] close winding energized"))
        .on_stop(|| println!("  [relay] off"));

    let config = TimeBasedConfig::new("demo shade", 6_000, 5_000).with_interlock_wait(500);
    let mut shade = TimeBasedCover::new(relay, MemoryStore::new(), config);
    shade.setup();
    shade.core_mut().add_on_state(print_state);

    println!("  [user] open fully");
    shade.make_call().set_position(1.0).perform(0).unwrap();

    let mut now = 0;
    let mut reversed = false;
    while now < 60_000 {
        now += tick_ms;
        if !reversed && now >= 3_000 {
            println!("  [user] no, close it");
            shade.make_call().set_position(0.0).perform(now).unwrap();
            reversed = true;
        }
        shade.loop_tick(now).unwrap();
        if reversed
            && shade.current_operation() == CoverOperation::Idle
            && shade.target_position().is_none()
        {
            break;
        }
    }
    println!();
}

fn obstacle_rollback(tick_ms: u64) {
    println!("--- act 2: feedback shutter, obstacle during close, 20% rollback ---");
    println!();

    let config = FeedbackConfig::new("demo shutter", 8_000, 8_000).with_obstacle_rollback(0.2);
    let mut shutter = FeedbackCover::new(
        MockActuator::new(),
        MockSensors::new(),
        MemoryStore::new(),
        config,
    );
    shutter.setup(); // no stored state: assumed half-open
    shutter.core_mut().add_on_state(print_state);

    println!("  [user] close fully");
    shutter.make_call().set_position(0.0).perform(0).unwrap();

    let mut now = 0;
    let mut blocked = false;
    while now < 60_000 {
        now += tick_ms;
        if !blocked && now >= 2_000 {
            println!("  [world] something is in the way");
            shutter.sensors_mut().close_obstacle = true;
            blocked = true;
        }
        shutter.loop_tick(now).unwrap();
        if blocked
            && shutter.current_operation() == CoverOperation::Idle
            && shutter.target_position().is_none()
        {
            break;
        }
    }
    println!();
}
