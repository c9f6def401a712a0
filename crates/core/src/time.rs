use std::time::Duration;

use crate::error::{ProbeError, Result};

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| ProbeError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration() {
        assert_eq!(parse_duration_str("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration_str("5s").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_invalid() {
        assert!(parse_duration_str("nope").is_err());
    }

    #[test]
    fn converts_to_fractional_millis() {
        assert_eq!(duration_ms(Duration::from_micros(1500)), 1.5);
        assert_eq!(duration_ms(Duration::ZERO), 0.0);
    }
}
