use std::time::{Duration, SystemTime};

pub mod clock;
pub use clock::{Clock, MockClock, SystemClock};

/// Returns the current UNIX timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is set before the UNIX epoch.
#[inline]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Converts a duration to whole microseconds, saturating at `u64::MAX`.
#[inline]
pub fn as_micros_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

pub mod constants {
    /// Meters per degree of latitude, flat-Earth approximation.
    pub const METERS_PER_DEGREE: f64 = 111_000.0;
}
