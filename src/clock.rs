use chrono::{DateTime, SubsecRound, Utc};

/// Source of "now" for feed timestamps and `Last-Modified`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// Always reports the same instant. The server freezes one at startup; tests pin a date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        // HTTP dates have second precision; keep feeds and headers in agreement.
        Self(instant.trunc_subsecs(0))
    }

    pub fn startup() -> Self {
        Self::at(Utc::now())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_drops_subseconds() {
        let t = Utc.with_ymd_and_hms(2020, 5, 25, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(750);
        let clock = FixedClock::at(t);
        assert_eq!(clock.now().to_rfc3339(), "2020-05-25T00:00:00+00:00");
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn system_clock_has_whole_seconds() {
        let before = Utc::now().trunc_subsecs(0);
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos(), 0);
        assert!(now >= before);
    }
}
