//! Outcome classification
//!
//! Maps a finished runner invocation (exit code plus captured output) to the
//! three outcomes the supervisor acts on. Rate limits are recognized either
//! by a dedicated exit code or by known marker strings in the output.

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Classification of one completed runner attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    RateLimited,
    Failed,
}

/// True when the attempt tripped the backend's rate limiting.
///
/// Marker matching is a case-sensitive substring check over both streams.
pub fn detect_rate_limit(
    config: &GatewayConfig,
    exit_code: i64,
    stdout: &str,
    stderr: &str,
) -> bool {
    if exit_code == config.rate_limit_exit_code {
        return true;
    }
    config
        .rate_limit_markers
        .iter()
        .any(|marker| stdout.contains(marker.as_str()) || stderr.contains(marker.as_str()))
}

/// Classifies a completed attempt. Rate-limit detection runs first so a
/// rate-limited non-zero exit is retried instead of failed.
pub fn classify(
    config: &GatewayConfig,
    exit_code: i64,
    stdout: &str,
    stderr: &str,
) -> Outcome {
    if detect_rate_limit(config, exit_code, stdout, stderr) {
        Outcome::RateLimited
    } else if exit_code == 0 {
        Outcome::Success
    } else {
        Outcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_by_exit_code() {
        let config = GatewayConfig::default();
        assert!(detect_rate_limit(&config, 130, "", ""));
        assert!(!detect_rate_limit(&config, 0, "", ""));
    }

    #[test]
    fn rate_limit_by_output_marker() {
        let config = GatewayConfig::default();
        assert!(detect_rate_limit(&config, 1, "RESOURCE_EXHAUSTED", ""));
        assert!(detect_rate_limit(&config, 1, "", "429 Too Many Requests"));
        assert!(!detect_rate_limit(&config, 1, "normal output", "normal error"));
    }

    #[test]
    fn markers_are_case_sensitive() {
        let config = GatewayConfig::default();
        assert!(!detect_rate_limit(&config, 1, "resource_exhausted", ""));
    }

    #[test]
    fn classification_order() {
        let config = GatewayConfig::default();
        assert_eq!(classify(&config, 0, "", ""), Outcome::Success);
        assert_eq!(classify(&config, 1, "", ""), Outcome::Failed);
        assert_eq!(classify(&config, 130, "", ""), Outcome::RateLimited);
        // Exit 0 with a marker still counts as a rate limit
        assert_eq!(
            classify(&config, 0, "Quota exceeded", ""),
            Outcome::RateLimited
        );
    }
}
