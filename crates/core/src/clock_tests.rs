// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn system_clock_epoch_is_plausible() {
    // Anything after 2020 and not in the far future
    let ms = SystemClock.epoch_ms();
    assert!(ms > 1_577_836_800_000, "epoch_ms = {ms}");
}

#[test]
fn fake_clock_stands_still_until_advanced() {
    let clock = FakeClock::new();
    let a = clock.now();
    let epoch = clock.epoch_ms();
    assert_eq!(clock.now(), a);
    assert_eq!(clock.epoch_ms(), epoch);

    clock.advance(Duration::from_millis(250));
    assert_eq!(clock.now(), a + Duration::from_millis(250));
    assert_eq!(clock.epoch_ms(), epoch + 250);
}

#[test]
fn fake_clock_epoch_can_be_pinned() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);

    // Advancing moves on from the pinned value
    clock.advance(Duration::from_secs(1));
    assert_eq!(clock.epoch_ms(), 1_042);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let observer = clock.clone();
    clock.set_epoch_ms(500);
    clock.advance(Duration::from_millis(10));
    assert_eq!(observer.epoch_ms(), 510);
    assert_eq!(observer.now(), clock.now());
}
