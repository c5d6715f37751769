//! OSC timetag handling
//!
//! OSC timetags are 64-bit NTP timestamps: 32 bits of seconds since
//! 1900-01-01 and 32 bits of fractional seconds. The raw values `0` and `1`
//! are reserved and mean "execute immediately".

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rosc::OscTime;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// The immediate timetag (raw value 1)
pub const IMMEDIATE: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// Get the raw 64-bit value of a timetag
pub fn raw(tag: OscTime) -> u64 {
    ((tag.seconds as u64) << 32) | tag.fractional as u64
}

/// Build a timetag from its raw 64-bit value
pub fn from_raw(value: u64) -> OscTime {
    OscTime {
        seconds: (value >> 32) as u32,
        fractional: value as u32,
    }
}

/// Check whether a timetag means "execute immediately"
pub fn is_immediate(tag: OscTime) -> bool {
    raw(tag) <= 1
}

/// Convert a timetag to a wall-clock time
///
/// Timetags before the Unix epoch clamp to the epoch; they are in the past
/// either way.
pub fn to_system_time(tag: OscTime) -> SystemTime {
    let secs = tag.seconds as i64 - NTP_UNIX_OFFSET as i64;
    if secs < 0 {
        return UNIX_EPOCH;
    }
    let nanos = ((tag.fractional as u64 * 1_000_000_000) >> 32) as u32;
    UNIX_EPOCH + Duration::new(secs as u64, nanos)
}

/// Convert a wall-clock time to a timetag
pub fn from_system_time(time: SystemTime) -> OscTime {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    OscTime {
        seconds: (since_epoch.as_secs() + NTP_UNIX_OFFSET) as u32,
        fractional: ((since_epoch.subsec_nanos() as u64) << 32).div_euclid(1_000_000_000) as u32,
    }
}

/// Build a timetag `delay` from now
pub fn timetag_in(delay: Duration) -> OscTime {
    from_system_time(SystemTime::now() + delay)
}

/// Time remaining until a timetag fires; zero when it is already due
pub fn until(tag: OscTime) -> Duration {
    to_system_time(tag)
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}
