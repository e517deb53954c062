//! Date and datetime text forms stored in document fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Stored datetime form, e.g. `2025-03-14 09:30:00`. Sorts lexically in time order.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// RFC 3339, `YYYY-MM-DD HH:MM[:SS[.f]]` (space or `T`), or a bare date at midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_datetime(t: NaiveDateTime) -> String {
    t.format(DATETIME_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_datetime(s).map(|t| t.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_forms() {
        let t = parse_datetime("2025-03-14 09:30:00").unwrap();
        assert_eq!(format_datetime(t), "2025-03-14 09:30:00");
        assert_eq!(parse_datetime("2025-03-14T09:30"), Some(t));
        assert_eq!(parse_datetime("2025-03-14T09:30:00Z"), Some(t));
        assert_eq!(format_datetime(parse_datetime("2025-03-14").unwrap()), "2025-03-14 00:00:00");
        assert!(parse_datetime("14/03/2025").is_none());
    }
}
