//! OSC timetag handling
//!
//! Timetags are 64-bit NTP timestamps. The raw values 0 and 1 mean
//! "execute immediately"; anything else is an absolute UTC time. Deferred
//! bundles are compared on the monotonic clock, so a timetag is converted
//! to an [`Instant`] deadline exactly once, when it is scheduled. Firing
//! then stays correct across wall-clock adjustments.

use std::time::{Duration, Instant, SystemTime};

use rosc::OscTime;

use crate::{Error, Result};

/// Whether a timetag denotes "execute immediately" (raw value 0 or 1).
pub fn is_immediate(timetag: OscTime) -> bool {
    timetag.seconds == 0 && timetag.fractional <= 1
}

/// Wall-clock fire time of a timetag.
pub fn wall_clock(timetag: OscTime) -> SystemTime {
    SystemTime::from(timetag)
}

/// Convert a timetag to a monotonic deadline.
///
/// Returns `None` when the fire time is now or in the past; such bundles
/// are dispatched without going through the scheduler.
pub fn monotonic_deadline(timetag: OscTime) -> Option<Instant> {
    let remaining = wall_clock(timetag)
        .duration_since(SystemTime::now())
        .ok()?;
    if remaining.is_zero() {
        return None;
    }
    Some(Instant::now() + remaining)
}

/// Timetag for `delta` from now. Used by senders scheduling bundles ahead.
pub fn timetag_after(delta: Duration) -> Result<OscTime> {
    OscTime::try_from(SystemTime::now() + delta)
        .map_err(|e| Error::InvalidTimetag(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_values() {
        assert!(is_immediate(OscTime {
            seconds: 0,
            fractional: 0
        }));
        assert!(is_immediate(OscTime {
            seconds: 0,
            fractional: 1
        }));
        assert!(!is_immediate(OscTime {
            seconds: 0,
            fractional: 2
        }));
        assert!(!is_immediate(OscTime {
            seconds: 1,
            fractional: 0
        }));
    }

    #[test]
    fn future_timetag_yields_deadline() {
        let timetag = timetag_after(Duration::from_millis(500)).unwrap();
        let deadline = monotonic_deadline(timetag).expect("future timetag");
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(remaining <= Duration::from_millis(500));
        assert!(remaining > Duration::from_millis(300));
    }

    #[test]
    fn past_timetag_has_no_deadline() {
        let timetag = OscTime::try_from(SystemTime::now() - Duration::from_secs(5)).unwrap();
        assert!(monotonic_deadline(timetag).is_none());
    }

    #[test]
    fn wall_clock_round_trip() {
        let now = SystemTime::now();
        let timetag = OscTime::try_from(now).unwrap();
        let back = wall_clock(timetag);
        let skew = match back.duration_since(now) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        // NTP fractional seconds resolve to well under a microsecond
        assert!(skew < Duration::from_micros(1));
    }
}
