//! Best-effort parsing of free-form duration strings.
//!
//! Accepts the compact notation used in definition files: a sequence of
//! decimal numbers each followed by a unit (`ns`, `us`/`µs`, `ms`, `s`, `m`,
//! `h`), e.g. `"300ms"`, `"1.5h"`, `"2h45m"`. A bare `"0"` is zero.
//! Anything else yields `None`; callers treat that as "no limit".

use std::time::Duration;

pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::ZERO);
    }

    let mut total_secs = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total_secs += value * scale;
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(total_secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("10us"), Some(Duration::from_micros(10)));
    }

    #[test]
    fn compound_and_fractional() {
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration(" 1m30s "), Some(Duration::from_secs(90)));
    }

    #[test]
    fn zero_is_accepted() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn garbage_degrades_to_none() {
        for input in ["", "   ", "soon", "10", "-5s", "5 s", "1x", "h", ".", "1..2s"] {
            assert_eq!(parse_duration(input), None, "input {input:?}");
        }
    }
}
