use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Id;

/// How an override decides whether it applies to a description.
///
/// Stored as a single string: `/.../` is a regex, anything else a
/// case-insensitive substring. Parsed once when the rule is loaded.
#[derive(Debug, Clone)]
pub enum OverrideMatcher {
    /// Lowercased needle.
    Substring(String),
    Regex(Regex),
}

impl OverrideMatcher {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            anyhow::bail!("Override pattern must not be empty");
        }
        if let Some(inner) = trimmed
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .filter(|inner| !inner.is_empty())
        {
            let regex = Regex::new(inner)
                .with_context(|| format!("Invalid override regex: {inner}"))?;
            return Ok(OverrideMatcher::Regex(regex));
        }
        Ok(OverrideMatcher::Substring(trimmed.to_lowercase()))
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            OverrideMatcher::Substring(needle) => text.to_lowercase().contains(needle),
            OverrideMatcher::Regex(regex) => regex.is_match(text),
        }
    }

    /// The stored string form.
    pub fn pattern(&self) -> String {
        match self {
            OverrideMatcher::Substring(needle) => needle.clone(),
            OverrideMatcher::Regex(regex) => format!("/{}/", regex.as_str()),
        }
    }
}

impl PartialEq for OverrideMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern()
    }
}

impl Eq for OverrideMatcher {}

impl fmt::Display for OverrideMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern())
    }
}

impl Serialize for OverrideMatcher {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern())
    }
}

impl<'de> Deserialize<'de> for OverrideMatcher {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OverrideMatcher::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A user-authored rule reassigning category/subcategory by description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOverride {
    pub id: Id,
    pub user_id: Id,
    #[serde(rename = "pattern")]
    pub matcher: OverrideMatcher,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_wrapped_patterns_are_regexes() {
        let matcher = OverrideMatcher::parse("/^AMZN\\s+MKTP/").unwrap();
        assert!(matches!(matcher, OverrideMatcher::Regex(_)));
        assert!(matcher.is_match("AMZN MKTP IN"));
        assert!(!matcher.is_match("PAID AMZN MKTP"));
        assert_eq!(matcher.pattern(), "/^AMZN\\s+MKTP/");
    }

    #[test]
    fn plain_patterns_match_substrings_case_insensitively() {
        let matcher = OverrideMatcher::parse("  Netflix ").unwrap();
        assert!(matcher.is_match("NETFLIX.COM SUBSCRIPTION"));
        assert!(!matcher.is_match("SPOTIFY"));
        // A lone slash is not a regex delimiter pair.
        assert!(matches!(
            OverrideMatcher::parse("/").unwrap(),
            OverrideMatcher::Substring(_)
        ));
    }

    #[test]
    fn invalid_regex_and_empty_pattern_are_rejected() {
        assert!(OverrideMatcher::parse("/([a-z/").is_err());
        assert!(OverrideMatcher::parse("   ").is_err());
    }

    #[test]
    fn matcher_round_trips_through_json() {
        let rule = CategoryOverride {
            id: Id::from_string("o-1"),
            user_id: Id::from_string("u-1"),
            matcher: OverrideMatcher::parse("/rent|landlord/").unwrap(),
            category: "Housing".to_string(),
            subcategory: Some("Rent".to_string()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["pattern"], "/rent|landlord/");
        let back: CategoryOverride = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
