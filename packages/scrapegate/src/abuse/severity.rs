//! Keyword-driven incident severity.
//!
//! Advisory only; nothing security-critical branches on the result.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered rules; the first rule with a matching keyword wins.
const SEVERITY_RULES: &[(&[&str], Severity)] = &[
    (&["blacklist", "ban", "attack", "flood"], Severity::High),
    (&["rate limit", "rate-limit", "suspicious", "failure", "failed"], Severity::Medium),
];

/// Classify a free-text incident reason.
pub fn classify_severity(reason: &str) -> Severity {
    let reason = reason.to_lowercase();
    SEVERITY_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| reason.contains(k)))
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_keywords() {
        assert_eq!(classify_severity("Blacklisted domain access"), Severity::High);
        assert_eq!(classify_severity("caller banned by admin"), Severity::High);
        assert_eq!(classify_severity("request flood detected"), Severity::High);
    }

    #[test]
    fn test_medium_keywords() {
        assert_eq!(classify_severity("rate limit exceeded"), Severity::Medium);
        assert_eq!(classify_severity("caller marked suspicious"), Severity::Medium);
        assert_eq!(classify_severity("extraction failed"), Severity::Medium);
    }

    #[test]
    fn test_high_wins_over_medium() {
        assert_eq!(
            classify_severity("rate limit failure escalated to ban"),
            Severity::High
        );
    }

    #[test]
    fn test_default_low() {
        assert_eq!(classify_severity("unusual user agent"), Severity::Low);
        assert_eq!(classify_severity(""), Severity::Low);
    }
}
