use std::time::Instant;

use parking_lot::RwLock;

use crate::time::{Ticks, TICKS_PER_SECOND};

/// Largest speed ratio the clock accepts.
pub const MAX_SPEED_RATIO: f64 = 8.0;

#[derive(Debug)]
struct ClockState {
    offset: Ticks,
    speed_ratio: f64,
    /// `Some` while running; elapsed wall time since this instant is scaled
    /// by the speed ratio and added to the offset.
    started_at: Option<Instant>,
}

impl ClockState {
    fn position(&self) -> Ticks {
        match self.started_at {
            None => self.offset,
            Some(started_at) => {
                let elapsed = started_at.elapsed().as_secs_f64();
                let scaled = elapsed * self.speed_ratio * TICKS_PER_SECOND as f64;
                self.offset + Ticks::from_raw(scaled as i64)
            }
        }
    }
}

/// A pausable, speed-scalable stream clock on the 100-ns tick scale.
///
/// `position = offset + elapsed × speed_ratio`. Changing the speed captures
/// the current position first, so the observable position never jumps.
#[derive(Debug)]
pub struct RealTimeClock {
    state: RwLock<ClockState>,
}

impl RealTimeClock {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClockState {
                offset: Ticks::ZERO,
                speed_ratio: 1.0,
                started_at: None,
            }),
        }
    }

    pub fn position(&self) -> Ticks {
        self.state.read().position()
    }

    pub fn is_running(&self) -> bool {
        self.state.read().started_at.is_some()
    }

    pub fn speed_ratio(&self) -> f64 {
        self.state.read().speed_ratio
    }

    pub fn play(&self) {
        let mut state = self.state.write();
        if state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
    }

    pub fn pause(&self) {
        let mut state = self.state.write();
        if state.started_at.is_some() {
            state.offset = state.position();
            state.started_at = None;
        }
    }

    /// Stop the clock and move it back to zero. The speed ratio is unchanged.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.offset = Ticks::ZERO;
        state.started_at = None;
    }

    /// Jump to an absolute position, preserving the running state.
    pub fn set_position(&self, position: Ticks) {
        let mut state = self.state.write();
        state.offset = position;
        if state.started_at.is_some() {
            state.started_at = Some(Instant::now());
        }
    }

    /// Change the speed ratio without moving the observable position.
    pub fn set_speed_ratio(&self, ratio: f64) {
        let ratio = ratio.clamp(0.0, MAX_SPEED_RATIO);
        let mut state = self.state.write();
        state.offset = state.position();
        if state.started_at.is_some() {
            state.started_at = Some(Instant::now());
        }
        state.speed_ratio = ratio;
    }
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn paused_clock_holds_position() {
        let clock = RealTimeClock::new();
        clock.set_position(Ticks::from_millis(2_000));
        sleep(Duration::from_millis(20));
        assert_eq!(clock.position(), Ticks::from_millis(2_000));
    }

    #[test]
    fn running_clock_advances() {
        let clock = RealTimeClock::new();
        clock.play();
        sleep(Duration::from_millis(30));
        assert!(clock.position() > Ticks::ZERO);
    }

    #[test]
    fn position_is_monotonic_while_running() {
        let clock = RealTimeClock::new();
        clock.play();
        let mut last = clock.position();
        for _ in 0..50 {
            let now = clock.position();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn speed_change_preserves_position() {
        let clock = RealTimeClock::new();
        clock.set_position(Ticks::from_millis(2_000));
        clock.play();
        sleep(Duration::from_millis(10));

        let before = clock.position();
        clock.set_speed_ratio(0.5);
        let after = clock.position();

        // Within a millisecond of wall time around the switch.
        assert!((after - before).value().abs() < Ticks::from_millis(2).value());
        assert_eq!(clock.speed_ratio(), 0.5);
    }

    #[test]
    fn half_speed_roughly_halves_progress() {
        let clock = RealTimeClock::new();
        clock.set_speed_ratio(0.5);
        clock.play();
        sleep(Duration::from_millis(100));
        clock.pause();

        let position = clock.position().as_seconds_f64();
        assert!(position > 0.030 && position < 0.080, "position {position}");
    }

    #[test]
    fn reset_keeps_speed() {
        let clock = RealTimeClock::new();
        clock.set_speed_ratio(2.0);
        clock.play();
        clock.reset();
        assert_eq!(clock.position(), Ticks::ZERO);
        assert!(!clock.is_running());
        assert_eq!(clock.speed_ratio(), 2.0);
    }

    #[test]
    fn speed_ratio_is_clamped() {
        let clock = RealTimeClock::new();
        clock.set_speed_ratio(-1.0);
        assert_eq!(clock.speed_ratio(), 0.0);
        clock.set_speed_ratio(100.0);
        assert_eq!(clock.speed_ratio(), MAX_SPEED_RATIO);
    }
}
