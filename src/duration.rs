//! Human-readable durations for config values: "30d", "20s", "500ms".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const UNITS: [(&str, u64); 5] = [
    ("ms", 1),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
];

/// Parse a duration string made of an unsigned integer and a unit.
///
/// Units: `d`, `h`, `m`, `s`, `ms`. Case-insensitive, surrounding whitespace
/// ignored.
///
/// ```
/// use bankfeed::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30d").unwrap(), Duration::from_secs(30 * 24 * 60 * 60));
/// assert_eq!(parse_duration("20s").unwrap(), Duration::from_secs(20));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    // "ms" is checked before "m" and "s".
    let (num, millis_per_unit) = UNITS
        .iter()
        .find_map(|(unit, factor)| s.strip_suffix(unit).map(|num| (num, *factor)))
        .context("Duration must end with d, h, m, s, or ms")?;

    let num: u64 = num.parse().context("Invalid number in duration")?;
    let millis = num
        .checked_mul(millis_per_unit)
        .context("Duration is too large")?;
    Ok(Duration::from_millis(millis))
}

/// Format using the largest unit that divides the duration evenly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    for (unit, factor) in UNITS.iter().skip(1) {
        let factor = u128::from(*factor);
        if millis % factor == 0 {
            return format!("{}{unit}", millis / factor);
        }
    }
    format!("{millis}ms")
}

/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Use with `#[serde(serialize_with = "serialize_duration")]`.
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1_500));
        assert_eq!(parse_duration(" 20S ").unwrap(), Duration::from_secs(20));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration("-1d").is_err());
        assert!(parse_duration("1.5h").is_err());
        assert!(parse_duration(&format!("{}d", u64::MAX)).is_err());
    }

    #[test]
    fn formats_with_largest_even_unit() {
        assert_eq!(format_duration(Duration::from_secs(30 * 86_400)), "30d");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(2_500)), "2500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn serde_round_trip_through_toml() {
        #[derive(Deserialize, Serialize)]
        struct Settings {
            #[serde(
                deserialize_with = "deserialize_duration",
                serialize_with = "serialize_duration"
            )]
            timeout: Duration,
        }

        let settings: Settings = toml::from_str(r#"timeout = "20s""#).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(toml::to_string(&settings).unwrap().trim(), r#"timeout = "20s""#);
    }
}
