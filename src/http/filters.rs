//! Query-string → `Filters` parsing for the HTTP API (spec §4.8).

use crate::error::DeckError;
use crate::model::{Filters, SortDir, SortKey};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;

/// Parses the optional `sort`, `sort_dir`, `status`, `model`, `project`,
/// `since`, `from`, `to` query params into `Filters`.
///
/// `since` accepts `<n>d` (days) or `<n>m` (months, approximated as 30
/// days each) — note `ms` is a unit suffix collision the spec calls out
/// explicitly as NOT meaning months. Anything else is parsed as a
/// standard `humantime`-less duration string via `parse_duration`.
pub fn parse_filters(params: &HashMap<String, String>) -> Result<Filters, DeckError> {
    let mut filters = Filters {
        model: params.get("model").cloned(),
        status: params.get("status").cloned(),
        project: params.get("project").cloned(),
        session: params.get("session").cloned(),
        ..Default::default()
    };

    if let Some(raw) = params.get("sort") {
        filters.sort = match raw.as_str() {
            "date" => SortKey::Date,
            "cost" => SortKey::Cost,
            "tokens" => SortKey::Tokens,
            "duration" => SortKey::Duration,
            other => return Err(DeckError::InvalidFilter(format!("unknown sort key '{other}'"))),
        };
    }
    if let Some(raw) = params.get("sort_dir") {
        filters.sort_dir = match raw.as_str() {
            "asc" => SortDir::Asc,
            "desc" => SortDir::Desc,
            other => return Err(DeckError::InvalidFilter(format!("unknown sort_dir '{other}'"))),
        };
    }
    if let Some(raw) = params.get("since") {
        filters.since = Some(parse_since(raw)?);
    }
    if let Some(raw) = params.get("from") {
        filters.from = Some(parse_timestamp(raw)?);
    }
    if let Some(raw) = params.get("to") {
        filters.to = Some(parse_timestamp(raw)?);
    }

    Ok(filters)
}

fn parse_since(raw: &str) -> Result<chrono::Duration, DeckError> {
    if let Some(days) = raw.strip_suffix('d').filter(|_| !raw.ends_with("ms")) {
        let n: i64 = days
            .parse()
            .map_err(|_| DeckError::InvalidFilter(format!("invalid since value '{raw}'")))?;
        return Ok(chrono::Duration::days(n));
    }
    if let Some(months) = raw.strip_suffix('m').filter(|_| !raw.ends_with("ms")) {
        let n: i64 = months
            .parse()
            .map_err(|_| DeckError::InvalidFilter(format!("invalid since value '{raw}'")))?;
        return Ok(chrono::Duration::days(n * 30));
    }
    parse_std_duration(raw)
}

/// Fallback parser for `since` values that aren't `<n>d`/`<n>m`: plain
/// integers are seconds, `<n>h` is hours, `<n>ms` is milliseconds.
fn parse_std_duration(raw: &str) -> Result<chrono::Duration, DeckError> {
    if let Some(ms) = raw.strip_suffix("ms") {
        let n: i64 = ms
            .parse()
            .map_err(|_| DeckError::InvalidFilter(format!("invalid since value '{raw}'")))?;
        return Ok(chrono::Duration::milliseconds(n));
    }
    if let Some(hours) = raw.strip_suffix('h') {
        let n: i64 = hours
            .parse()
            .map_err(|_| DeckError::InvalidFilter(format!("invalid since value '{raw}'")))?;
        return Ok(chrono::Duration::hours(n));
    }
    let n: i64 = raw
        .parse()
        .map_err(|_| DeckError::InvalidFilter(format!("invalid since value '{raw}'")))?;
    Ok(chrono::Duration::seconds(n))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DeckError> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DeckError::InvalidFilter(format!("invalid date '{raw}'")))?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DeckError::InvalidFilter(format!("invalid timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn since_days_suffix() {
        let f = parse_filters(&params(&[("since", "7d")])).unwrap();
        assert_eq!(f.since, Some(chrono::Duration::days(7)));
    }

    #[test]
    fn since_months_suffix_is_thirty_day_blocks() {
        let f = parse_filters(&params(&[("since", "2m")])).unwrap();
        assert_eq!(f.since, Some(chrono::Duration::days(60)));
    }

    #[test]
    fn since_milliseconds_suffix_is_not_months() {
        let f = parse_filters(&params(&[("since", "500ms")])).unwrap();
        assert_eq!(f.since, Some(chrono::Duration::milliseconds(500)));
    }

    #[test]
    fn from_accepts_plain_date() {
        let f = parse_filters(&params(&[("from", "2026-01-15")])).unwrap();
        assert_eq!(f.from.unwrap().format("%Y-%m-%d").to_string(), "2026-01-15");
    }

    #[test]
    fn unknown_sort_key_is_rejected() {
        assert!(parse_filters(&params(&[("sort", "bogus")])).is_err());
    }
}
