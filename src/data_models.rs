use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Canonical timestamp: wall-clock time in the zone the run normalises to.
pub type Timestamp = NaiveDateTime;

pub const DATE_TIME_COLUMN: &str = "DATE_TIME";
pub const PLANT_ID_COLUMN: &str = "PLANT_ID";
pub const SOURCE_KEY_COLUMN: &str = "SOURCE_KEY";

/// How many individual row issues a report keeps for diagnostics.
const MAX_RECORDED_ISSUES: usize = 20;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Generation,
    Weather,
}

impl SourceKind {
    pub fn columns(self) -> &'static [Column] {
        match self {
            SourceKind::Generation => &[Column::AcPower, Column::DcPower, Column::DailyYield],
            SourceKind::Weather => &[
                Column::AmbientTemperature,
                Column::ModuleTemperature,
                Column::Irradiation,
            ],
        }
    }

    /// Header names every file of this kind must carry.
    pub fn required_headers(self) -> Vec<&'static str> {
        let mut headers = vec![DATE_TIME_COLUMN, PLANT_ID_COLUMN, SOURCE_KEY_COLUMN];
        headers.extend(self.columns().iter().map(|c| c.header()));
        headers
    }

    /// Suffix applied to colliding non-key columns after a join.
    pub fn join_suffix(self) -> &'static str {
        match self {
            SourceKind::Generation => "_gen",
            SourceKind::Weather => "_weather",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Generation => write!(f, "generation"),
            SourceKind::Weather => write!(f, "weather"),
        }
    }
}

/// Numeric measurement columns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    AcPower,
    DcPower,
    DailyYield,
    AmbientTemperature,
    ModuleTemperature,
    Irradiation,
}

impl Column {
    pub fn header(self) -> &'static str {
        match self {
            Column::AcPower => "AC_POWER",
            Column::DcPower => "DC_POWER",
            Column::DailyYield => "DAILY_YIELD",
            Column::AmbientTemperature => "AMBIENT_TEMPERATURE",
            Column::ModuleTemperature => "MODULE_TEMPERATURE",
            Column::Irradiation => "IRRADIATION",
        }
    }

    pub fn kind(self) -> SourceKind {
        match self {
            Column::AcPower | Column::DcPower | Column::DailyYield => SourceKind::Generation,
            Column::AmbientTemperature | Column::ModuleTemperature | Column::Irradiation => {
                SourceKind::Weather
            }
        }
    }
}

/// One row of generation or weather data. Only the fields of its source kind are populated;
/// a `None` in a populated field marks a value that was empty or failed to parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    pub timestamp: Option<Timestamp>,
    pub plant_id: Option<i64>,
    pub source_key: String,
    pub ac_power: Option<f64>,
    pub dc_power: Option<f64>,
    pub daily_yield: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub module_temperature: Option<f64>,
    pub irradiation: Option<f64>,
}

impl Reading {
    pub fn value(&self, column: Column) -> Option<f64> {
        match column {
            Column::AcPower => self.ac_power,
            Column::DcPower => self.dc_power,
            Column::DailyYield => self.daily_yield,
            Column::AmbientTemperature => self.ambient_temperature,
            Column::ModuleTemperature => self.module_temperature,
            Column::Irradiation => self.irradiation,
        }
    }

    pub fn set_value(&mut self, column: Column, value: Option<f64>) {
        match column {
            Column::AcPower => self.ac_power = value,
            Column::DcPower => self.dc_power = value,
            Column::DailyYield => self.daily_yield = value,
            Column::AmbientTemperature => self.ambient_temperature = value,
            Column::ModuleTemperature => self.module_temperature = value,
            Column::Irradiation => self.irradiation = value,
        }
    }

    /// Hour of day (0..=23) of the timestamp, if it parsed.
    pub fn hour(&self) -> Option<u32> {
        self.timestamp.map(|ts| ts.hour())
    }

    /// Join key; rows lacking either part can never match.
    pub fn key(&self) -> Option<(Timestamp, i64)> {
        Some((self.timestamp?, self.plant_id?))
    }
}

/// A single field that failed to parse.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub path: PathBuf,
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub column: String,
    pub value: String,
    pub message: String,
}

/// Per-row parse failures absorbed while loading.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub sources: Vec<PathBuf>,
    pub rows_read: usize,
    pub failed_rows: usize,
    pub timestamp_failures: usize,
    pub numeric_failures: usize,
    pub issues: Vec<RowIssue>,
}

impl ParseReport {
    pub fn record_issue(&mut self, issue: RowIssue, is_timestamp: bool) {
        if is_timestamp {
            self.timestamp_failures += 1;
        } else {
            self.numeric_failures += 1;
        }
        if self.issues.len() < MAX_RECORDED_ISSUES {
            self.issues.push(issue);
        }
    }

    pub fn merge(&mut self, other: ParseReport) {
        self.sources.extend(other.sources);
        self.rows_read += other.rows_read;
        self.failed_rows += other.failed_rows;
        self.timestamp_failures += other.timestamp_failures;
        self.numeric_failures += other.numeric_failures;
        let room = MAX_RECORDED_ISSUES.saturating_sub(self.issues.len());
        self.issues.extend(other.issues.into_iter().take(room));
    }

    pub fn is_clean(&self) -> bool {
        self.failed_rows == 0
    }
}

/// Readings of one source kind, possibly concatenated from several files.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    kind: SourceKind,
    readings: Vec<Reading>,
    report: ParseReport,
}

impl Table {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            readings: Vec::new(),
            report: ParseReport::default(),
        }
    }

    pub fn from_readings(kind: SourceKind, readings: Vec<Reading>) -> Self {
        let report = ParseReport {
            rows_read: readings.len(),
            ..Default::default()
        };
        Self {
            kind,
            readings,
            report,
        }
    }

    pub(crate) fn with_report(kind: SourceKind, readings: Vec<Reading>, report: ParseReport) -> Self {
        Self {
            kind,
            readings,
            report,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn report(&self) -> &ParseReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Appends all rows of `other`; no deduplication.
    pub fn append(&mut self, other: Table) {
        self.readings.extend(other.readings);
        self.report.merge(other.report);
    }

    pub fn filter<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(&Reading) -> bool,
    {
        let readings: Vec<Reading> = self.readings.iter().filter(|r| predicate(r)).cloned().collect();
        Table::from_readings(self.kind, readings)
    }

    pub fn group_by<K, F>(&self, mut key: F) -> BTreeMap<K, Vec<&Reading>>
    where
        K: Ord,
        F: FnMut(&Reading) -> K,
    {
        let mut groups: BTreeMap<K, Vec<&Reading>> = BTreeMap::new();
        for reading in &self.readings {
            groups.entry(key(reading)).or_default().push(reading);
        }
        groups
    }

    /// Rows of a single inverter or sensor.
    pub fn for_source(&self, plant_id: i64, source_key: &str) -> Table {
        self.filter(|r| r.plant_id == Some(plant_id) && r.source_key == source_key)
    }

    pub fn null_timestamp_count(&self) -> usize {
        self.readings.iter().filter(|r| r.timestamp.is_none()).count()
    }
}

/// Generation and weather rows joined on (timestamp, plant id).
/// `SOURCE_KEY` exists on both sides and is kept twice with `_gen`/`_weather` suffixes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CombinedRecord {
    pub timestamp: Timestamp,
    pub plant_id: i64,
    pub source_key_gen: String,
    pub source_key_weather: String,
    pub ac_power: Option<f64>,
    pub dc_power: Option<f64>,
    pub daily_yield: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub module_temperature: Option<f64>,
    pub irradiation: Option<f64>,
    /// Timestamp of the weather row when it differs from `timestamp` (nearest matching only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_timestamp: Option<Timestamp>,
}

impl CombinedRecord {
    pub fn from_pair(generation: &Reading, weather: &Reading, timestamp: Timestamp, plant_id: i64) -> Self {
        Self {
            timestamp,
            plant_id,
            source_key_gen: generation.source_key.clone(),
            source_key_weather: weather.source_key.clone(),
            ac_power: generation.ac_power,
            dc_power: generation.dc_power,
            daily_yield: generation.daily_yield,
            ambient_temperature: weather.ambient_temperature,
            module_temperature: weather.module_temperature,
            irradiation: weather.irradiation,
            weather_timestamp: weather.timestamp.filter(|ts| *ts != timestamp),
        }
    }

    pub fn value(&self, column: Column) -> Option<f64> {
        match column {
            Column::AcPower => self.ac_power,
            Column::DcPower => self.dc_power,
            Column::DailyYield => self.daily_yield,
            Column::AmbientTemperature => self.ambient_temperature,
            Column::ModuleTemperature => self.module_temperature,
            Column::Irradiation => self.irradiation,
        }
    }

    /// Column names of a combined row, key columns first.
    pub fn column_names() -> Vec<String> {
        let mut names = vec![DATE_TIME_COLUMN.to_string(), PLANT_ID_COLUMN.to_string()];
        for kind in [SourceKind::Generation, SourceKind::Weather] {
            names.push(format!("{}{}", SOURCE_KEY_COLUMN, kind.join_suffix()));
            names.extend(kind.columns().iter().map(|c| c.header().to_string()));
        }
        names
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct HourlyBucket {
    pub hour: u32,
    pub ac_power: f64,
}

/// Maximal run of consecutive peak hours.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub buckets: Vec<HourlyBucket>,
}

impl PeakWindow {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn hours(&self) -> Vec<u32> {
        self.buckets.iter().map(|b| b.hour).collect()
    }

    pub fn total_ac_power(&self) -> f64 {
        self.buckets.iter().map(|b| b.ac_power).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(plant: i64, key: &str, hour: u32) -> Reading {
        Reading {
            timestamp: NaiveDate::from_ymd_opt(2020, 5, 15).and_then(|d| d.and_hms_opt(hour, 0, 0)),
            plant_id: Some(plant),
            source_key: key.to_string(),
            ac_power: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_required_headers_per_kind() {
        let generation = SourceKind::Generation.required_headers();
        assert_eq!(
            generation,
            vec!["DATE_TIME", "PLANT_ID", "SOURCE_KEY", "AC_POWER", "DC_POWER", "DAILY_YIELD"]
        );
        let weather = SourceKind::Weather.required_headers();
        assert!(weather.contains(&"IRRADIATION"));
        assert!(!weather.contains(&"AC_POWER"));
    }

    #[test]
    fn test_group_by_and_for_source() {
        let table = Table::from_readings(
            SourceKind::Generation,
            vec![reading(1, "a", 10), reading(1, "b", 11), reading(2, "a", 12)],
        );
        let by_plant = table.group_by(|r| r.plant_id);
        assert_eq!(by_plant[&Some(1)].len(), 2);
        assert_eq!(by_plant[&Some(2)].len(), 1);

        let single = table.for_source(1, "b");
        assert_eq!(single.len(), 1);
        assert_eq!(single.readings()[0].hour(), Some(11));
    }

    #[test]
    fn test_append_keeps_duplicates() {
        let mut table = Table::from_readings(SourceKind::Generation, vec![reading(1, "a", 10)]);
        table.append(Table::from_readings(SourceKind::Generation, vec![reading(1, "a", 10)]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.report().rows_read, 2);
    }

    #[test]
    fn test_combined_column_names_are_suffixed() {
        let names = CombinedRecord::column_names();
        assert!(names.contains(&"SOURCE_KEY_gen".to_string()));
        assert!(names.contains(&"SOURCE_KEY_weather".to_string()));
        assert_eq!(names.iter().filter(|n| n.as_str() == "DATE_TIME").count(), 1);
        assert_eq!(names.iter().filter(|n| n.as_str() == "PLANT_ID").count(), 1);
    }
}
