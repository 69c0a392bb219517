use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration string: {0:?}")]
pub struct DurationParseError(pub String);

/// Parses a compact duration string such as `"30s"`, `"5m"`, `"12h"`,
/// `"7d"`, `"2w"`, or `"1y"`.
pub fn parse_duration_str(value: &str) -> Result<Duration, DurationParseError> {
    let value = value.trim();
    let split = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);

    let amount: i64 = amount
        .parse()
        .map_err(|_| DurationParseError(value.to_string()))?;

    match unit {
        "s" => Ok(Duration::seconds(amount)),
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        "w" => Ok(Duration::weeks(amount)),
        "y" => Ok(Duration::days(amount * 365)),
        _ => Err(DurationParseError(value.to_string())),
    }
}

/// A duration measured backward from "now". Records whose creation or
/// update timestamp falls inside the window are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    duration: Duration,
}

impl TimeWindow {
    pub fn parse(value: &str) -> Result<Self, DurationParseError> {
        Ok(Self {
            duration: parse_duration_str(value)?,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start of the window: now minus the configured duration.
    pub fn start(&self) -> DateTime<Utc> {
        Utc::now() - self.duration
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_duration_str("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration_str("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration_str("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_duration_str("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_duration_str("2w").unwrap(), Duration::weeks(2));
        assert_eq!(parse_duration_str("1y").unwrap(), Duration::days(365));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration_str("").is_err());
        assert!(parse_duration_str("d7").is_err());
        assert!(parse_duration_str("7 parsecs").is_err());
        assert!(parse_duration_str("7").is_err());
    }

    #[test]
    fn window_membership() {
        let window = TimeWindow::parse("1h").unwrap();
        assert!(window.contains(Utc::now()));
        assert!(!window.contains(Utc::now() - Duration::hours(2)));
    }
}
