use hifitime::Epoch;
use std::str::FromStr;

use crate::xover_errors::XoverError;

/// Parse a time field of the crossover database into seconds since 1970-01-01 UTC.
///
/// Argument
/// --------
/// * `text`: either a plain number (already in seconds), `NaN` for a missing time, or an
///   ISO 8601 calendar date such as `2003-05-17T12:30:00` (UTC unless a time scale is appended)
///
/// Return
/// ------
/// * the time in seconds, `NaN` when missing, or [`XoverError::InvalidTime`]
pub fn parse_time(text: &str) -> Result<f64, XoverError> {
    if let Ok(value) = text.parse::<f64>() {
        return Ok(value);
    }
    Epoch::from_str(text)
        .map(|epoch| epoch.to_unix_seconds())
        .map_err(|e| XoverError::InvalidTime(format!("{text}: {e}")))
}

/// Render seconds since 1970-01-01 UTC as an ISO 8601 calendar date.
///
/// Argument
/// --------
/// * `seconds`: time in seconds, `NaN` for a missing time
///
/// Return
/// ------
/// * `"NaN"` or the UTC date, e.g. `2000-01-01T00:00:00 UTC`
pub fn format_time(seconds: f64) -> String {
    if seconds.is_nan() {
        "NaN".to_string()
    } else {
        Epoch::from_unix_seconds(seconds).to_string()
    }
}

#[cfg(test)]
mod time_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_numeric_and_missing() {
        assert_eq!(parse_time("12.5").unwrap(), 12.5);
        assert!(parse_time("NaN").unwrap().is_nan());
    }

    #[test]
    fn test_parse_iso_date() {
        let t = parse_time("2000-01-01T00:00:00").unwrap();
        assert_relative_eq!(t, 946_684_800.0, epsilon = 1e-3);

        let later = parse_time("2000-01-02T00:00:00 UTC").unwrap();
        assert_relative_eq!(later - t, 86_400.0, epsilon = 1e-3);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_time("yesterday"), Err(XoverError::InvalidTime(_))));
    }

    #[test]
    fn test_format_round_trip() {
        let t = 946_684_800.0;
        assert_relative_eq!(parse_time(&format_time(t)).unwrap(), t, epsilon = 1e-3);
        assert_eq!(format_time(f64::NAN), "NaN");
    }
}
