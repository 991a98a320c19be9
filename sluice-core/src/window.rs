//! Stats window parsing
//!
//! Reporting commands accept a window like `1h`, `24h`, `2d`, or `30m`;
//! omitting it means lifetime.

use chrono::Duration;
use thiserror::Error;

/// Errors from parsing a stats window
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid window '{0}': expected <number><m|h|d>, e.g. 30m, 1h, 2d")]
    Invalid(String),
}

/// Parses a window spec into a duration. `None` input means lifetime.
pub fn parse_window(spec: Option<&str>) -> Result<Option<Duration>, WindowError> {
    let Some(spec) = spec else {
        return Ok(None);
    };

    let spec = spec.trim();
    let Some(unit) = spec.chars().last() else {
        return Err(WindowError::Invalid(spec.to_string()));
    };

    let amount: i64 = spec[..spec.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| WindowError::Invalid(spec.to_string()))?;
    if amount <= 0 {
        return Err(WindowError::Invalid(spec.to_string()));
    }

    let duration = match unit {
        'm' => Duration::minutes(amount),
        'h' => Duration::hours(amount),
        'd' => Duration::days(amount),
        _ => return Err(WindowError::Invalid(spec.to_string())),
    };

    Ok(Some(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_days_minutes() {
        assert_eq!(parse_window(Some("1h")).unwrap(), Some(Duration::hours(1)));
        assert_eq!(
            parse_window(Some("24h")).unwrap(),
            Some(Duration::hours(24))
        );
        assert_eq!(parse_window(Some("2d")).unwrap(), Some(Duration::days(2)));
        assert_eq!(
            parse_window(Some("30m")).unwrap(),
            Some(Duration::minutes(30))
        );
    }

    #[test]
    fn none_means_lifetime() {
        assert_eq!(parse_window(None).unwrap(), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_window(Some("h")).is_err());
        assert!(parse_window(Some("10")).is_err());
        assert!(parse_window(Some("-5m")).is_err());
        assert!(parse_window(Some("3w")).is_err());
        assert!(parse_window(Some("")).is_err());
    }
}
