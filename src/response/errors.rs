//! Error normalization
//!
//! Raw agent failures are full of exception names, selectors and stack frames.
//! None of that is read aloud: every failure collapses to one of a handful of
//! short phrases.

use serde::Serialize;

/// User-safe category of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedError {
    Timeout,
    ElementNotFound,
    Network,
    AssertionFailed,
    Permission,
    Syntax,
    RateLimited,
    OutOfMemory,
    Unexpected,
}

impl NormalizedError {
    /// Phrase spoken to the user
    pub fn phrase(&self) -> &'static str {
        match self {
            NormalizedError::Timeout => "timeout issue",
            NormalizedError::ElementNotFound => "element not found",
            NormalizedError::Network => "network connection issue",
            NormalizedError::AssertionFailed => "test assertion failed",
            NormalizedError::Permission => "permission problem",
            NormalizedError::Syntax => "syntax error in the code",
            NormalizedError::RateLimited => "rate limit was reached",
            NormalizedError::OutOfMemory => "ran out of memory",
            NormalizedError::Unexpected => "an unexpected error occurred",
        }
    }
}

impl std::fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.phrase())
    }
}

/// Ordered keyword table; first match wins
const PATTERNS: &[(&[&str], NormalizedError)] = &[
    (&["timeout", "timed out", "time out", "deadline exceeded"], NormalizedError::Timeout),
    (
        &["selector", "element", "locator", "no node found", "not visible", "not attached"],
        NormalizedError::ElementNotFound,
    ),
    (
        &[
            "network",
            "econnrefused",
            "econnreset",
            "enotfound",
            "fetch failed",
            "connection refused",
            "connection reset",
            "socket hang up",
            "dns",
        ],
        NormalizedError::Network,
    ),
    (
        &["assert", "toequal", "to equal", "tobe(", "tohave", "tomatch"],
        NormalizedError::AssertionFailed,
    ),
    (&["permission", "eacces", "eperm", "forbidden", "unauthorized"], NormalizedError::Permission),
    (&["syntaxerror", "syntax error", "unexpected token", "parse error"], NormalizedError::Syntax),
    // 429 only as an HTTP status, never inside other numbers
    (
        &[
            "rate limit",
            "too many requests",
            "status 429",
            "status code 429",
            "http 429",
            "http/1.1 429",
            "429 too many",
        ],
        NormalizedError::RateLimited,
    ),
    (&["out of memory", "heap limit", "enomem"], NormalizedError::OutOfMemory),
];

/// Classify raw failure text
pub fn classify_error(raw: &str) -> NormalizedError {
    let haystack = raw.to_lowercase();
    PATTERNS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(_, category)| *category)
        .unwrap_or(NormalizedError::Unexpected)
}

/// Map raw failure text to its user-safe phrase
pub fn normalize_error(raw: &str) -> &'static str {
    classify_error(raw).phrase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_patterns() {
        assert_eq!(normalize_error("Navigation timeout of 5000 ms exceeded"), "timeout issue");
        assert_eq!(
            normalize_error("waiting for locator('#submit') failed"),
            "element not found"
        );
        assert_eq!(
            normalize_error("connect ECONNREFUSED 127.0.0.1:3000"),
            "network connection issue"
        );
        assert_eq!(
            normalize_error("AssertionError: expected 3 to equal 4"),
            "test assertion failed"
        );
    }

    #[test]
    fn test_first_match_wins() {
        // Mentions both a timeout and a selector
        let raw = "TimeoutError: selector '.btn' not found after 30000ms";
        assert_eq!(classify_error(raw), NormalizedError::Timeout);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_error("NETWORK UNREACHABLE"), NormalizedError::Network);
        assert_eq!(classify_error("Timed Out"), NormalizedError::Timeout);
    }

    #[test]
    fn test_extended_patterns() {
        assert_eq!(classify_error("EACCES: open '/etc/x'"), NormalizedError::Permission);
        assert_eq!(classify_error("SyntaxError: Unexpected token }"), NormalizedError::Syntax);
        assert_eq!(classify_error("HTTP 429 Too Many Requests"), NormalizedError::RateLimited);
        assert_eq!(
            classify_error("FATAL ERROR: Reached heap limit"),
            NormalizedError::OutOfMemory
        );
    }

    #[test]
    fn test_primary_patterns_beat_extended() {
        assert_eq!(
            classify_error("AssertionError: expected parse error message to equal 'ok'"),
            NormalizedError::AssertionFailed
        );
        assert_eq!(
            classify_error("expect(received).toEqual(expected): Unexpected token in response"),
            NormalizedError::AssertionFailed
        );
        assert_eq!(
            classify_error("Request timed out: 429 Too Many Requests"),
            NormalizedError::Timeout
        );
        assert_eq!(
            classify_error("locator('#save') detached: permission denied"),
            NormalizedError::ElementNotFound
        );
        assert_eq!(
            classify_error("network worker ran out of memory"),
            NormalizedError::Network
        );
    }

    #[test]
    fn test_bare_429_is_not_rate_limit() {
        assert_eq!(
            classify_error("Error: process exited at step 14290"),
            NormalizedError::Unexpected
        );
        assert_eq!(classify_error("failed at line 429"), NormalizedError::Unexpected);
        assert_eq!(
            classify_error("Request failed with status code 429"),
            NormalizedError::RateLimited
        );
    }

    #[test]
    fn test_fallback() {
        assert_eq!(normalize_error("segfault in worker 3"), "an unexpected error occurred");
        assert_eq!(normalize_error(""), "an unexpected error occurred");
    }
}
