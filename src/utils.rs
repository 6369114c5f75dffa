use std::{fs, path::Path};

use chrono::{DateTime, Local, NaiveDate, ParseError};
use serde::Serialize;

pub fn parse_date(date_str: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// `2021-01-01` -> `20210101`, as used in archive file names
pub fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// UTC calendar date of an epoch-milliseconds timestamp
pub fn date_from_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Local wall-clock time stamped into every archived envelope
pub fn fetched_at() -> String {
    Local::now().to_rfc3339()
}

/// Writes `value` as 2-space indented JSON, replacing any existing file
pub fn write_json<T: Serialize>(value: &T, output_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(value)?;
    fs::write(output_path, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_date_strips_separators() {
        let date = parse_date("2025-09-15").unwrap();
        assert_eq!(compact_date(date), "20250915");
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        assert!(parse_date("09/15/2025").is_err());
        assert!(parse_date("2025-13-01").is_err());
    }

    #[test]
    fn millis_map_to_utc_calendar_day() {
        // 2024-01-02 05:00:00 UTC, how daily bars are stamped for New York sessions
        assert_eq!(
            date_from_millis(1_704_171_600_000),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(date_from_millis(0), NaiveDate::from_ymd_opt(1970, 1, 1));
    }

    #[test]
    fn write_json_is_pretty_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_json(&json!({"symbol": "AAPL", "data": [1, 2]}), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"symbol\": \"AAPL\""));
        let back: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["data"][1], 2);
    }
}
