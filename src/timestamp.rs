//! Normalises the `DATE_TIME` strings of each source into [`Timestamp`].
//!
//! The format is fixed per source file: it is either declared in the configuration
//! or inferred once from the file's first timestamp, never re-detected per row.

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data_models::Timestamp;

pub const YMD_HMS: &str = "%Y-%m-%d %H:%M:%S";
pub const DMY_HM: &str = "%d-%m-%Y %H:%M";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `YYYY-MM-DD HH:MM:SS`
    #[default]
    YmdHms,
    /// `DD-MM-YYYY HH:MM`
    DmyHm,
    /// Decide from the first non-empty value of the file.
    Auto,
    /// Any chrono strftime pattern.
    Custom(String),
}

impl DateFormat {
    const KNOWN: [DateFormat; 2] = [DateFormat::YmdHms, DateFormat::DmyHm];

    /// strftime pattern, `None` for [`DateFormat::Auto`].
    pub fn pattern(&self) -> Option<&str> {
        match self {
            DateFormat::YmdHms => Some(YMD_HMS),
            DateFormat::DmyHm => Some(DMY_HM),
            DateFormat::Auto => None,
            DateFormat::Custom(pattern) => Some(pattern),
        }
    }

    /// First known format family that parses `sample`.
    pub fn infer(sample: &str) -> Option<DateFormat> {
        let sample = sample.trim();
        Self::KNOWN.into_iter().find(|format| {
            format
                .pattern()
                .is_some_and(|p| NaiveDateTime::parse_from_str(sample, p).is_ok())
        })
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pattern() {
            Some(pattern) => f.write_str(pattern),
            None => f.write_str("auto"),
        }
    }
}

/// Parses one file's timestamps with a fixed pattern and optional zone conversion.
///
/// * no zones: the wall-clock value is kept as is.
/// * input zone only: values stay in the input zone's wall clock.
/// * output zone only: values are read as UTC and converted.
/// * both: values are localised in the input zone and converted.
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    pattern: String,
    input_tz: Option<Tz>,
    output_tz: Option<Tz>,
}

impl TimestampNormalizer {
    pub fn new(pattern: impl Into<String>, input_tz: Option<Tz>, output_tz: Option<Tz>) -> Self {
        Self {
            pattern: pattern.into(),
            input_tz,
            output_tz,
        }
    }

    pub fn naive(pattern: impl Into<String>) -> Self {
        Self::new(pattern, None, None)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn normalize(&self, raw: &str) -> Result<Timestamp, String> {
        let raw = raw.trim();
        let naive = NaiveDateTime::parse_from_str(raw, &self.pattern).map_err(|e| {
            format!(
                "Failed to parse timestamp '{}' with format '{}': {}",
                raw, self.pattern, e
            )
        })?;

        let Some(output_tz) = self.output_tz else {
            return Ok(naive);
        };

        let utc = match self.input_tz {
            Some(input_tz) => input_tz
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| {
                    format!(
                        "Ambiguous or invalid local time '{}' for timezone {}",
                        raw, input_tz
                    )
                })?
                .with_timezone(&Utc),
            None => Utc.from_utc_datetime(&naive),
        };
        Ok(utc.with_timezone(&output_tz).naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, s))
            .unwrap()
    }

    #[test]
    fn test_both_format_families() {
        let iso = TimestampNormalizer::naive(YMD_HMS);
        assert_eq!(iso.normalize("2020-05-15 13:45:00").unwrap(), ts(2020, 5, 15, 13, 45, 0));

        let day_first = TimestampNormalizer::naive(DMY_HM);
        assert_eq!(day_first.normalize("15-05-2020 13:45").unwrap(), ts(2020, 5, 15, 13, 45, 0));
    }

    #[test]
    fn test_wrong_format_is_an_error_not_a_panic() {
        let iso = TimestampNormalizer::naive(YMD_HMS);
        let err = iso.normalize("15-05-2020 13:45").unwrap_err();
        assert!(err.contains("15-05-2020 13:45"));
        assert!(iso.normalize("").is_err());
        assert!(iso.normalize("not a date").is_err());
    }

    #[test]
    fn test_infer_format() {
        assert_eq!(DateFormat::infer("2020-05-15 00:15:00"), Some(DateFormat::YmdHms));
        assert_eq!(DateFormat::infer(" 15-05-2020 00:15 "), Some(DateFormat::DmyHm));
        assert_eq!(DateFormat::infer("05/15/2020"), None);
    }

    #[test]
    fn test_output_zone_treats_naive_input_as_utc() {
        let normalizer = TimestampNormalizer::new(YMD_HMS, None, Some(chrono_tz::Asia::Kolkata));
        let converted = normalizer.normalize("2020-05-15 06:00:00").unwrap();
        assert_eq!(converted, ts(2020, 5, 15, 11, 30, 0));
    }

    #[test]
    fn test_input_and_output_zone_conversion() {
        let normalizer = TimestampNormalizer::new(
            DMY_HM,
            Some(chrono_tz::Asia::Kolkata),
            Some(chrono_tz::UTC),
        );
        let converted = normalizer.normalize("15-05-2020 05:30").unwrap();
        assert_eq!(converted, ts(2020, 5, 15, 0, 0, 0));
    }

    #[test]
    fn test_input_zone_only_keeps_wall_clock() {
        let normalizer = TimestampNormalizer::new(YMD_HMS, Some(chrono_tz::Europe::Prague), None);
        let parsed = normalizer.normalize("2020-03-29 02:30:00").unwrap();
        assert_eq!(parsed.hour(), 2);
    }

    #[test]
    fn test_nonexistent_local_time_fails() {
        // 02:30 does not exist in Prague on the spring-forward day.
        let normalizer = TimestampNormalizer::new(
            YMD_HMS,
            Some(chrono_tz::Europe::Prague),
            Some(chrono_tz::UTC),
        );
        assert!(normalizer.normalize("2020-03-29 02:30:00").is_err());
    }

    #[test]
    fn test_date_format_serde_names() {
        let formats: Vec<DateFormat> =
            serde_json::from_str(r#"["ymd_hms", "dmy_hm", "auto", {"custom": "%Y/%m/%d %H:%M"}]"#).unwrap();
        assert_eq!(
            formats,
            vec![
                DateFormat::YmdHms,
                DateFormat::DmyHm,
                DateFormat::Auto,
                DateFormat::Custom("%Y/%m/%d %H:%M".to_string())
            ]
        );
    }
}
