//! Date handling for forecast selection.
//!
//! Forecast dates arrive as compact strings: `YYYYMMDD` or `YYYYMMDDHHMM`.
//! Only the calendar day selects a forecast folder; the hour and minute
//! are accepted and dropped.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ForecastError, ForecastResult};

/// Parse a compact forecast date (`YYYYMMDD` or `YYYYMMDDHHMM`).
pub fn parse_forecast_date(s: &str) -> ForecastResult<NaiveDate> {
    let trimmed = s.trim();
    match trimmed.len() {
        8 => NaiveDate::parse_from_str(trimmed, "%Y%m%d")
            .map_err(|e| ForecastError::InvalidDate(format!("'{}': {}", s, e))),
        12 => NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M")
            .map(|dt| dt.date())
            .map_err(|e| ForecastError::InvalidDate(format!("'{}': {}", s, e))),
        _ => Err(ForecastError::InvalidDate(format!(
            "'{}' is not YYYYMMDD or YYYYMMDDHHMM",
            s
        ))),
    }
}

/// Inclusive list of days between `start` and `end`.
///
/// A missing end means the single day `start`.
pub fn date_range(start: &str, end: Option<&str>) -> ForecastResult<Vec<NaiveDate>> {
    let first = parse_forecast_date(start)?;
    let last = match end {
        Some(end) => parse_forecast_date(end)?,
        None => first,
    };
    days_between(first, last)
}

/// Inclusive list of days between two parsed dates.
pub fn days_between(first: NaiveDate, last: NaiveDate) -> ForecastResult<Vec<NaiveDate>> {
    if first > last {
        return Err(ForecastError::InvalidDate(format!(
            "start date {} is after end date {}",
            first.format("%Y%m%d"),
            last.format("%Y%m%d")
        )));
    }

    let mut days = Vec::with_capacity((last - first).num_days() as usize + 1);
    let mut day = first;
    while day <= last {
        days.push(day);
        day += Duration::days(1);
    }
    Ok(days)
}

/// Format a date the way forecast folders name it.
pub fn folder_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_formats() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_forecast_date("20240305").unwrap(), day);
        assert_eq!(parse_forecast_date("202403051800").unwrap(), day);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_forecast_date("2024-03-05"),
            Err(ForecastError::InvalidDate(_))
        ));
        assert!(parse_forecast_date("20241305").is_err());
    }

    #[test]
    fn test_date_range_inclusive() {
        let days = date_range("20231230", Some("20240102")).unwrap();
        assert_eq!(days.len(), 4);
        assert_eq!(folder_date(days[0]), "20231230");
        assert_eq!(folder_date(days[3]), "20240102");
    }

    #[test]
    fn test_date_range_single_day() {
        let days = date_range("202401010000", None).unwrap();
        assert_eq!(days.len(), 1);
    }

    #[test]
    fn test_date_range_inverted() {
        assert!(date_range("20240102", Some("20240101")).is_err());
    }
}
