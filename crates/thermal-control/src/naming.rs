//! Sensor name handling: natural sort order and telemetry renaming.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// A sort key that orders embedded numbers numerically, so that
/// `Port2` sorts before `Port10`. Text runs compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey(Vec<Segment>);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Number(u64),
    Text(String),
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Generates a [`NaturalKey`] for a string, splitting it into digit runs and
/// lowercased text runs.
pub fn natural_key(text: &str) -> NaturalKey {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut buf_is_digits = false;

    for ch in text.chars() {
        let is_digit = ch.is_ascii_digit();
        if !buf.is_empty() && is_digit != buf_is_digits {
            segments.push(flush(&mut buf, buf_is_digits));
        }
        buf_is_digits = is_digit;
        buf.push(ch);
    }
    if !buf.is_empty() {
        segments.push(flush(&mut buf, buf_is_digits));
    }

    NaturalKey(segments)
}

fn flush(buf: &mut String, is_digits: bool) -> Segment {
    let text = std::mem::take(buf);
    if is_digits {
        // Digit runs in sensor names are small; fall back to text ordering
        // on the (pathological) overflow case.
        match text.parse::<u64>() {
            Ok(n) => Segment::Number(n),
            Err(_) => Segment::Text(text),
        }
    } else {
        Segment::Text(text.to_lowercase())
    }
}

/// Sorts a list of names in natural order.
pub fn natural_sort(names: &mut [String]) {
    names.sort_by_key(|name| natural_key(name));
}

fn asic_internal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ASIC [pt]").unwrap())
}

fn transceiver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Transceiver (Port\d+)$").unwrap())
}

/// Rewrites a sensor name for telemetry output.
///
/// ASIC-internal probe sensors (`ASIC p…` / `ASIC t…`) are dropped entirely,
/// transceiver sensors are shortened to their port name, and everything else
/// passes through unchanged. Domain grouping and PID input always use the
/// original name.
pub fn normalize_sensor_name(name: &str) -> Option<String> {
    if asic_internal_re().is_match(name) {
        return None;
    }
    if let Some(captures) = transceiver_re().captures(name) {
        return Some(captures[1].to_string());
    }
    Some(name.to_string())
}
