//! Time value parsing utilities.
//!
//! FlowMonitor writes its time attributes as a magnitude followed by a unit
//! suffix (e.g., "+2.0e+09ns", "25ms"). This module normalizes those strings
//! to seconds.

/// Time unit suffixes understood by [`parse_time_to_seconds`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    /// Number of units in one second
    pub fn per_second(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1e9,
            TimeUnit::Microseconds => 1e6,
            TimeUnit::Milliseconds => 1e3,
            TimeUnit::Seconds => 1.0,
        }
    }
}

/// Split a time string into its numeric part and unit suffix.
///
/// Longer suffixes are checked before "s" so that "25ms" is not read as
/// "25m" seconds. A string without a suffix is returned with `None`.
fn split_unit(value: &str) -> (&str, Option<TimeUnit>) {
    const SUFFIXES: [(&str, TimeUnit); 4] = [
        ("ns", TimeUnit::Nanoseconds),
        ("us", TimeUnit::Microseconds),
        ("ms", TimeUnit::Milliseconds),
        ("s", TimeUnit::Seconds),
    ];

    for (suffix, unit) in SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return (number, Some(unit));
        }
    }
    (value, None)
}

/// Parse a time string (e.g., "+2.0e+09ns", "25ms", "1.2s", "3") to seconds
///
/// Supported formats:
/// - Nanoseconds: "2000000000ns", "+2.0e+09ns"
/// - Microseconds: "1500us"
/// - Milliseconds: "25ms"
/// - Seconds: "1.2s"
/// - Bare numbers are taken as seconds: "3", "0.5"
///
/// # Returns
/// * `Some(f64)` - The time in seconds if parsing succeeds
/// * `None` - If the magnitude is not a finite number
///
/// # Examples
/// ```
/// use flowtrace::utils::duration::parse_time_to_seconds;
///
/// assert_eq!(parse_time_to_seconds("25ms"), Some(0.025));
/// assert_eq!(parse_time_to_seconds("+2.0e+09ns"), Some(2.0));
/// assert!(parse_time_to_seconds("soon").is_none());
/// ```
pub fn parse_time_to_seconds(value: &str) -> Option<f64> {
    let value = value.trim();
    let (number, unit) = split_unit(value);
    let number = number.trim().trim_start_matches('+');

    let magnitude: f64 = number.parse().ok()?;
    if !magnitude.is_finite() {
        return None;
    }

    // Divide rather than multiply by the reciprocal so that whole values
    // such as 2e9 ns come out exact.
    Some(magnitude / unit.unwrap_or(TimeUnit::Seconds).per_second())
}

/// Parse a time string to seconds, treating anything unparseable as zero
pub fn time_or_zero(value: Option<&str>) -> f64 {
    value.and_then(parse_time_to_seconds).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_units() {
        assert_eq!(parse_time_to_seconds("25ms"), Some(0.025));
        assert_eq!(parse_time_to_seconds("+2.0e+09ns"), Some(2.0));
        assert_eq!(parse_time_to_seconds("1500us"), Some(0.0015));
        assert_eq!(parse_time_to_seconds("1.2s"), Some(1.2));
        assert_eq!(parse_time_to_seconds("+0ns"), Some(0.0));
        assert_eq!(parse_time_to_seconds("0"), Some(0.0));
        assert_eq!(parse_time_to_seconds("3"), Some(3.0));
        assert_eq!(parse_time_to_seconds("  10ms "), Some(0.01));
    }

    #[test]
    fn test_parse_time_invalid() {
        assert!(parse_time_to_seconds("").is_none());
        assert!(parse_time_to_seconds("ns").is_none());
        assert!(parse_time_to_seconds("fast").is_none());
        assert!(parse_time_to_seconds("12parsecs").is_none());
        assert!(parse_time_to_seconds("NaNs").is_none());
        assert!(parse_time_to_seconds("infs").is_none());
    }

    #[test]
    fn test_time_or_zero() {
        assert_eq!(time_or_zero(Some("5ms")), 0.005);
        assert_eq!(time_or_zero(Some("garbage")), 0.0);
        assert_eq!(time_or_zero(None), 0.0);
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("25ms"), ("25", Some(TimeUnit::Milliseconds)));
        assert_eq!(split_unit("7us"), ("7", Some(TimeUnit::Microseconds)));
        assert_eq!(split_unit("7"), ("7", None));
    }
}
