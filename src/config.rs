//! Shared configuration plumbing: YAML loading and declarative `Duration` fields.
//!
//! Runner configs travel as YAML (the same `serde_yaml` sniffing
//! `brrtrouter::spec::load_spec` uses for OpenAPI documents), with human-readable duration
//! strings like `"30s"` or `"1h"` decoded into [`std::time::Duration`] at deserialize time.

use serde::{de::Error as _, Deserialize, Deserializer};
use std::time::Duration;

/// Parse a duration string of the form `<number><unit>` where unit is one of
/// `ms`, `s`, `m`, `h`. A bare number is treated as seconds.
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let (num_part, unit) = match raw.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: f64 = num_part
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration '{raw}'"))?;
    let secs = match unit {
        "ms" => value / 1000.0,
        "s" | "" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => anyhow::bail!("unknown duration unit '{other}' in '{raw}'"),
    };
    if secs < 0.0 {
        anyhow::bail!("duration '{raw}' must not be negative");
    }
    Ok(Duration::from_secs_f64(secs))
}

/// `serde(with = "duration")` helper: accepts either a duration string or a plain number
/// of seconds, so existing numeric YAML configs keep working.
pub mod duration {
    use super::*;

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Seconds(f64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => parse_duration(&s).map_err(D::Error::custom),
            Raw::Seconds(n) => Ok(Duration::from_secs_f64(n)),
        }
    }
}

/// Load and deserialize a YAML configuration document, mirroring the sniff-then-parse
/// shape of `brrtrouter::spec::load_spec`.
pub fn from_yaml_str<T: serde::de::DeserializeOwned>(yaml: &str) -> anyhow::Result<T> {
    Ok(serde_yaml::from_str(yaml)?)
}
