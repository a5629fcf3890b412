//! Human-friendly duration parsing for configuration values.
//!
//! Accepts `300ms`, `10s`, `5m`, `1h`, `1d`, or a bare number of seconds.

use std::{fmt, time::Duration};

use serde::{Deserializer, de};

/// Parse a duration string such as `"300ms"` or `"10"` (seconds).
pub fn parse(input: &str) -> Result<Duration, String> {
  let s = input.trim();
  let split = s
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(s.len());
  let (digits, unit) = s.split_at(split);
  let value: u64 = digits
    .parse()
    .map_err(|_| format!("invalid duration: {input:?}"))?;
  let duration = match unit.trim() {
    "" | "s" => Duration::from_secs(value),
    "ms" => Duration::from_millis(value),
    "m" => Duration::from_secs(value * 60),
    "h" => Duration::from_secs(value * 3600),
    "d" => Duration::from_secs(value * 86_400),
    other => return Err(format!("unknown duration unit {other:?} in {input:?}")),
  };
  Ok(duration)
}

/// `#[serde(deserialize_with = "linkwatch_core::duration::deserialize")]`
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
  D: Deserializer<'de>,
{
  deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl de::Visitor<'_> for DurationVisitor {
  type Value = Duration;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a duration such as \"300ms\", \"10s\" or a number of seconds")
  }

  fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
    Ok(Duration::from_secs(v))
  }

  fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
    u64::try_from(v)
      .map(Duration::from_secs)
      .map_err(|_| E::custom("duration must not be negative"))
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
    parse(v).map_err(E::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_units() {
    assert_eq!(parse("300ms").unwrap(), Duration::from_millis(300));
    assert_eq!(parse("10s").unwrap(), Duration::from_secs(10));
    assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
    assert_eq!(parse("42").unwrap(), Duration::from_secs(42));
  }

  #[test]
  fn rejects_garbage() {
    assert!(parse("ten seconds").is_err());
    assert!(parse("10parsecs").is_err());
  }
}
