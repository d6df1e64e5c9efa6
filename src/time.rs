use crate::rational::Rational;
use rsmpeg::ffi;

/// Number of 100-ns ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Number of 100-ns ticks in one millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// The global ffmpeg time base (`1 / AV_TIME_BASE` seconds per unit).
pub const AV_TIME_BASE: Rational = Rational::new(1, ffi::AV_TIME_BASE as i32);

/// A point or span on the engine's monotonic 100-ns timeline.
///
/// Every timestamp handed across component boundaries is normalised to this
/// scale; stream-unit values only live inside the wrappers that talk to the
/// native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(i64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);
    pub const MIN: Ticks = Ticks(i64::MIN);
    pub const MAX: Ticks = Ticks(i64::MAX);

    #[inline]
    pub const fn from_raw(value: i64) -> Self {
        Ticks(value)
    }

    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Convert a stream-unit timestamp into ticks using the stream time base.
    ///
    /// `AV_NOPTS_VALUE` maps to zero; intermediate math runs in 128 bits so
    /// large `num`/timestamp combinations cannot overflow.
    pub fn from_stream_units(units: i64, time_base: Rational) -> Self {
        if units == ffi::AV_NOPTS_VALUE || time_base.is_zero() {
            return Ticks::ZERO;
        }
        let value = units as i128 * time_base.numerator() as i128 * TICKS_PER_SECOND as i128
            / time_base.denominator() as i128;
        Ticks(value as i64)
    }

    /// Convert ticks back into stream units for the given time base.
    pub fn to_stream_units(self, time_base: Rational) -> i64 {
        if time_base.is_zero() || time_base.numerator() == 0 {
            return 0;
        }
        let value = self.0 as i128 * time_base.denominator() as i128
            / (time_base.numerator() as i128 * TICKS_PER_SECOND as i128);
        value as i64
    }

    /// Convert a value in `AV_TIME_BASE` units (microseconds).
    pub fn from_av_time(units: i64) -> Self {
        Self::from_stream_units(units, AV_TIME_BASE)
    }

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Ticks(millis * TICKS_PER_MILLISECOND)
    }

    #[inline]
    pub const fn as_millis(self) -> i64 {
        self.0 / TICKS_PER_MILLISECOND
    }

    #[inline]
    pub const fn from_seconds(seconds: i64) -> Self {
        Ticks(seconds * TICKS_PER_SECOND)
    }

    pub fn from_seconds_f64(seconds: f64) -> Self {
        Ticks((seconds * TICKS_PER_SECOND as f64).round() as i64)
    }

    pub fn as_seconds_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    #[inline]
    pub fn clamp(self, min: Ticks, max: Ticks) -> Ticks {
        Ticks(self.0.clamp(min.0, max.0))
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl std::ops::Add for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Ticks {
    type Output = Ticks;

    fn sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Ticks {
    fn add_assign(&mut self, rhs: Ticks) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Ticks {
    fn sub_assign(&mut self, rhs: Ticks) {
        *self = *self - rhs;
    }
}

impl std::fmt::Display for Ticks {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:.3}s", self.as_seconds_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_units_round_trip() {
        let tb = Rational::new(1, 90_000);
        let ticks = Ticks::from_stream_units(90_000, tb);
        assert_eq!(ticks, Ticks::from_seconds(1));
        assert_eq!(ticks.to_stream_units(tb), 90_000);
    }

    #[test]
    fn odd_time_base() {
        let tb = Rational::new(1001, 30_000);
        let ticks = Ticks::from_stream_units(30, tb);
        // 30 frames at 29.97 fps is a hair over one second.
        assert_eq!(ticks.value(), 10_010_000);
    }

    #[test]
    fn nopts_maps_to_zero() {
        let tb = Rational::new(1, 1000);
        assert_eq!(Ticks::from_stream_units(ffi::AV_NOPTS_VALUE, tb), Ticks::ZERO);
    }

    #[test]
    fn millis_and_seconds() {
        assert_eq!(Ticks::from_millis(1500).as_seconds_f64(), 1.5);
        assert_eq!(Ticks::from_seconds_f64(0.25).as_millis(), 250);
    }

    #[test]
    fn saturating_arithmetic() {
        assert_eq!(Ticks::MAX + Ticks::from_seconds(1), Ticks::MAX);
        assert_eq!(Ticks::from_seconds(2) - Ticks::from_seconds(5), Ticks::from_seconds(-3));
    }
}
