use std::time::Duration;
use thiserror::Error;

/// A duration expression could not be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid duration '{input}': {reason}")]
pub struct InvalidDuration {
    pub input: String,
    pub reason: &'static str,
}

/// Parse a duration expression such as `"500ms"`, `"30s"`, `"1m"`, `"2h"`
/// or a compound like `"1h30m"`.
///
/// Each component is an unsigned integer followed by one of `ms`, `s`, `m`,
/// `h`. Whitespace around the expression is ignored. A zero total is
/// rejected: the scheduler would spin.
pub fn parse_duration(input: &str) -> Result<Duration, InvalidDuration> {
    let fail = |reason| InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(fail("empty expression"));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| fail("missing unit"))?;
        if digits_end == 0 {
            return Err(fail("expected a number"));
        }
        let value: u64 = rest[..digits_end]
            .parse()
            .map_err(|_| fail("number out of range"))?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let component = match &rest[..unit_end] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(|| fail("number out of range"))?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(|| fail("number out of range"))?),
            _ => return Err(fail("unknown unit (use ms, s, m or h)")),
        };
        total = total
            .checked_add(component)
            .ok_or_else(|| fail("number out of range"))?;
        rest = &rest[unit_end..];
    }

    if total.is_zero() {
        return Err(fail("must be greater than zero"));
    }

    Ok(total)
}

/// Render a duration in the same notation [`parse_duration`] accepts.
pub fn format_duration(d: Duration) -> String {
    let mut ms = d.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("h", 3_600_000u128), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
        if ms >= size {
            out.push_str(&format!("{}{}", ms / size, unit));
            ms %= size;
        }
    }
    out
}
