use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;

/// Single monotonic "now" source. Every scheduler component takes a
/// `Arc<dyn Clock>` instead of calling `Utc::now()` directly, so tests can
/// advance time deterministically without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock holding an atomically-swappable instant (epoch millis).
/// Never used outside tests/dev-dependencies.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .expect("manual clock millis always in range")
    }
}

pub fn shared_system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// A parsed timeout: either a bounded duration or the "never" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Never,
    After(chrono::Duration),
}

impl Timeout {
    pub fn elapsed_exceeds(&self, elapsed: chrono::Duration) -> bool {
        match self {
            Timeout::Never => false,
            Timeout::After(limit) => elapsed >= *limit,
        }
    }
}

/// Parses `"<number> <unit>"` (unit one of seconds/minutes/hours/days,
/// case-insensitive, whitespace-tolerant) or the literal `"never"`.
pub fn parse_time_string(raw: &str) -> Result<Timeout, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("never") {
        return Ok(Timeout::Never);
    }

    let mut parts = trimmed.split_whitespace();
    let number = parts
        .next()
        .ok_or_else(|| ConfigError::BadTimeString(raw.to_string()))?;
    let unit = parts
        .next()
        .ok_or_else(|| ConfigError::BadTimeString(raw.to_string()))?;
    if parts.next().is_some() {
        return Err(ConfigError::BadTimeString(raw.to_string()));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::BadTimeString(raw.to_string()))?;
    if value < 0.0 {
        return Err(ConfigError::BadTimeString(raw.to_string()));
    }

    let millis = match unit.to_ascii_lowercase().as_str() {
        "second" | "seconds" | "sec" | "secs" => value * 1_000.0,
        "minute" | "minutes" | "min" | "mins" => value * 60_000.0,
        "hour" | "hours" => value * 3_600_000.0,
        "day" | "days" => value * 86_400_000.0,
        _ => return Err(ConfigError::BadTimeString(raw.to_string())),
    };

    Ok(Timeout::After(chrono::Duration::milliseconds(millis.round() as i64)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_never() {
        assert_eq!(parse_time_string("never").unwrap(), Timeout::Never);
        assert_eq!(parse_time_string("NEVER").unwrap(), Timeout::Never);
    }

    #[test]
    fn parses_fractional_seconds() {
        let t = parse_time_string("0.1 seconds").unwrap();
        assert_eq!(t, Timeout::After(chrono::Duration::milliseconds(100)));
    }

    #[test]
    fn parses_case_insensitive_unit_and_whitespace() {
        let t = parse_time_string("  2   Minutes  ").unwrap();
        assert_eq!(t, Timeout::After(chrono::Duration::seconds(120)));
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_time_string("soon").is_err());
        assert!(parse_time_string("5 fortnights").is_err());
        assert!(parse_time_string("-1 seconds").is_err());
    }

    #[test]
    fn manual_clock_advances() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(5));
    }
}
