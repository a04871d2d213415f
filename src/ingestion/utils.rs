//! Utility functions for common operations

use crate::ingestion::types::{Cell, PropertyCategory};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;

/// Date-only formats accepted for `list_date`
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Datetime formats accepted for `list_date`; the time part is discarded
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a listing date in any of the supported layouts
pub fn parse_list_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Compact YYYYMMDD
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Coerce an optional CSV cell to a number.
/// Blank cells are `Missing`; anything non-numeric is kept as `Invalid`.
pub fn parse_cell(raw: Option<&str>) -> Cell {
    let s = match raw.map(str::trim) {
        None | Some("") => return Cell::Missing,
        Some(s) => s,
    };

    // Exports sometimes carry currency symbols and thousands separators
    let clean = s.trim_start_matches('$').replace(',', "");
    match clean.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Value(v),
        _ => Cell::Invalid(s.to_string()),
    }
}

/// Trimmed text, `None` when blank
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Title-case text: a letter following any non-letter is upper-cased,
/// every other letter is lower-cased
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;

    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }

    out
}

/// Median ignoring order of input; `None` for an empty slice
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        Some(v[mid])
    } else {
        Some((v[mid - 1] + v[mid]) / 2.0)
    }
}

/// Most frequent value; ties resolve to the smallest value
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < v.len() {
        let mut j = i;
        while j < v.len() && v[j] == v[i] {
            j += 1;
        }
        let run = j - i;
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((v[i], run));
        }
        i = j;
    }

    best.map(|(value, _)| value)
}

/// Quantile with linear interpolation between closest ranks.
/// `sorted` must be ascending.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Round half to even at `dp` decimal places
pub fn round_half_even(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Split "City, Region" on the first comma into (city, state)
pub fn split_location(location: &str) -> (String, Option<String>) {
    match location.split_once(',') {
        Some((city, state)) => {
            let state = state.trim();
            let state = (!state.is_empty()).then(|| state.to_string());
            (city.trim().to_string(), state)
        }
        None => (location.trim().to_string(), None),
    }
}

/// Categorize a property type name into a broad group.
/// Rules are tried in priority order; "house" inside "townhouse" or
/// "penthouse" does not count as a house.
pub fn categorize_property_type(type_name: &str) -> PropertyCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("apartment") || lower.contains("flat") || lower.contains("studio") {
        PropertyCategory::Apartment
    } else if lower.contains("villa") || contains_plain_house(&lower) {
        PropertyCategory::House
    } else if lower.contains("townhouse") {
        PropertyCategory::Townhouse
    } else if lower.contains("penthouse") {
        PropertyCategory::Luxury
    } else {
        PropertyCategory::Other
    }
}

fn contains_plain_house(lower: &str) -> bool {
    lower
        .match_indices("house")
        .any(|(idx, _)| {
            let before = &lower[..idx];
            !before.ends_with("town") && !before.ends_with("pent")
        })
}

/// YYYYMMDD integer key for a calendar date
pub fn date_key(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        assert_eq!(parse_list_date("2024-01-15"), Some(expected));
        assert_eq!(parse_list_date(" 2024/01/15 "), Some(expected));
        assert_eq!(parse_list_date("01/15/2024"), Some(expected));
        assert_eq!(parse_list_date("20240115"), Some(expected));
        assert_eq!(parse_list_date("2024-01-15 08:30:00"), Some(expected));
        assert_eq!(parse_list_date("2024-01-15T08:30:00"), Some(expected));
        assert_eq!(parse_list_date("2024-01-15T08:30:00+04:00"), Some(expected));
    }

    #[test]
    fn test_parse_list_date_invalid() {
        assert_eq!(parse_list_date("not a date"), None);
        assert_eq!(parse_list_date("2024-13-01"), None);
        assert_eq!(parse_list_date("20241341"), None);
        assert_eq!(parse_list_date(""), None);
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(Some("800000")), Cell::Value(800_000.0));
        assert_eq!(parse_cell(Some("$1,250,000.50")), Cell::Value(1_250_000.5));
        assert_eq!(parse_cell(Some("  ")), Cell::Missing);
        assert_eq!(parse_cell(None), Cell::Missing);
        assert_eq!(parse_cell(Some("n/a")), Cell::Invalid("n/a".to_string()));
        assert_eq!(parse_cell(Some("NaN")), Cell::Invalid("NaN".to_string()));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("dubai marina, dubai"), "Dubai Marina, Dubai");
        assert_eq!(title_case("JUMEIRAH VILLAGE"), "Jumeirah Village");
        assert_eq!(title_case("al-barsha"), "Al-Barsha");
        assert_eq!(title_case("2nd street"), "2Nd Street");
    }

    #[test]
    fn test_median_and_mode() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);

        assert_eq!(mode(&[2.0, 3.0, 3.0, 1.0]), Some(3.0));
        assert_eq!(mode(&[4.0, 2.0, 4.0, 2.0]), Some(2.0));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn test_quantile_linear() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.25), Some(1.75));
        assert_eq!(quantile(&v, 0.75), Some(3.25));
        assert_eq!(quantile(&[7.0], 0.25), Some(7.0));
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(800_000.0 / 1_200.0, 2), 666.67);
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.375, 2), 0.38);
    }

    #[test]
    fn test_split_location() {
        assert_eq!(
            split_location("Dubai Marina, Dubai"),
            ("Dubai Marina".to_string(), Some("Dubai".to_string()))
        );
        assert_eq!(split_location("Sharjah"), ("Sharjah".to_string(), None));
        assert_eq!(
            split_location("Downtown, Dubai, Uae"),
            ("Downtown".to_string(), Some("Dubai, Uae".to_string()))
        );
    }

    #[test]
    fn test_categorize_property_type() {
        assert_eq!(categorize_property_type("Apartment"), PropertyCategory::Apartment);
        assert_eq!(categorize_property_type("Cozy Flat"), PropertyCategory::Apartment);
        assert_eq!(categorize_property_type("Studio"), PropertyCategory::Apartment);
        assert_eq!(categorize_property_type("Villa"), PropertyCategory::House);
        assert_eq!(categorize_property_type("Guest House"), PropertyCategory::House);
        assert_eq!(categorize_property_type("Townhouse"), PropertyCategory::Townhouse);
        assert_eq!(
            categorize_property_type("Penthouse Suite"),
            PropertyCategory::Luxury
        );
        assert_eq!(categorize_property_type("Office"), PropertyCategory::Other);
    }

    #[test]
    fn test_date_key() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(date_key(d), 20240309);
    }
}
