use std::thread::sleep;
use std::time::Duration;

use rsplayback::{
    strip_ass_formatting, strip_srt_formatting, CircularBuffer, MediaType, RealTimeClock,
    StreamSpecifier, Ticks,
};

#[test]
fn clock_position_is_monotonic_across_operations() {
    let clock = RealTimeClock::new();
    clock.play();

    let mut last = clock.position();
    for step in 0..20 {
        if step % 5 == 0 {
            // Speed changes must never move the observable position backwards.
            clock.set_speed_ratio(if step % 10 == 0 { 2.0 } else { 0.5 });
        }
        sleep(Duration::from_millis(2));
        let now = clock.position();
        assert!(now >= last, "position went backwards at step {step}");
        last = now;
    }
}

#[test]
fn clock_speed_change_keeps_position_within_tolerance() {
    let clock = RealTimeClock::new();
    clock.set_position(Ticks::from_millis(2_000));
    clock.play();
    sleep(Duration::from_millis(50));

    let before = clock.position();
    clock.set_speed_ratio(0.5);
    let after = clock.position();
    assert!((after - before).value().abs() < Ticks::from_millis(5).value());

    // Position advances at roughly half wall speed afterwards.
    sleep(Duration::from_millis(100));
    let progressed = clock.position() - after;
    assert!(progressed >= Ticks::from_millis(30));
    assert!(progressed <= Ticks::from_millis(90));
}

#[test]
fn circular_buffer_wrap_scenario() {
    // Length 16; write 12 x A, read 8, write 12 x B; reading 16 yields the
    // last 4 A bytes followed by all 12 B bytes.
    let mut ring = CircularBuffer::new(16);
    assert!(ring.write(&[b'A'; 12]));

    let mut first = [0u8; 8];
    assert_eq!(ring.read(&mut first), 8);

    assert!(ring.write(&[b'B'; 12]));

    let mut rest = [0u8; 16];
    assert_eq!(ring.read(&mut rest), 16);
    assert_eq!(&rest[..4], b"AAAA");
    assert_eq!(&rest[4..], &[b'B'; 12][..]);
}

#[test]
fn circular_buffer_counts_invariant() {
    let mut ring = CircularBuffer::new(32);
    let mut out = [0u8; 7];
    for round in 0..50 {
        let wrote = ring.write(&[round as u8; 5]);
        let _ = ring.read(&mut out[..(round % 7)]);
        assert_eq!(
            ring.readable_count() + ring.writable_count(),
            32,
            "round {round} (wrote={wrote})"
        );
        // The restorable history can never exceed the free space.
        assert!(
            ring.rewindable_count() <= ring.writable_count(),
            "round {round}"
        );
    }
}

#[test]
fn circular_buffer_rewind_is_bounded_by_written_history() {
    let mut ring = CircularBuffer::new(16);
    assert!(ring.write(&[b'A'; 4]));

    let mut out = [0u8; 4];
    assert_eq!(ring.read(&mut out), 4);

    // Only genuinely written bytes can be un-read, not the untouched fill.
    assert_eq!(ring.rewindable_count(), 4);
    assert!(!ring.rewind(16));
    assert!(!ring.rewind(5));
    assert!(ring.rewind(4));

    let mut replay = [0u8; 4];
    assert_eq!(ring.read(&mut replay), 4);
    assert_eq!(replay, [b'A'; 4]);

    // A later write claims the oldest history; what survives is exactly the
    // still-intact span and nothing more.
    assert!(ring.write(&[b'B'; 14]));
    assert_eq!(ring.rewindable_count(), 2);
    assert!(!ring.rewind(3));
    assert!(ring.rewind(2));

    let mut restored = [0u8; 2];
    assert_eq!(ring.read(&mut restored), 2);
    assert_eq!(restored, [b'A'; 2]);
}

#[test]
fn srt_stripping_scenario() {
    assert_eq!(
        strip_srt_formatting("<i>hello</i> <b>world</b>"),
        "hello world"
    );
}

#[test]
fn ass_stripping_scenario() {
    let line = "Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,{\\an8}Greetings\\Nworld";
    assert_eq!(
        strip_ass_formatting(line).as_deref(),
        Some("Greetings\nworld")
    );
}

#[test]
fn stream_specifier_forms() {
    assert!(StreamSpecifier::parse("").unwrap().matches(MediaType::Video, 7));
    assert!(StreamSpecifier::parse("7").unwrap().matches(MediaType::Audio, 7));
    assert!(StreamSpecifier::parse("s").unwrap().matches(MediaType::Subtitle, 0));
    assert!(!StreamSpecifier::parse("v:1").unwrap().matches(MediaType::Video, 0));
}

#[test]
fn ticks_conversions_are_stable() {
    let tb = rsplayback::Rational::new(1, 48_000);
    let one_second = Ticks::from_stream_units(48_000, tb);
    assert_eq!(one_second.as_millis(), 1_000);
    assert_eq!(one_second.to_stream_units(tb), 48_000);
}
