use chrono_tz::Tz;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::{resolve_timezone, SourceConfig};
use crate::data_models::{
    Column, ParseReport, Reading, RowIssue, SourceKind, Table, DATE_TIME_COLUMN, PLANT_ID_COLUMN,
    SOURCE_KEY_COLUMN,
};
use crate::errors::{ConfigError, LoadError};
use crate::timestamp::{DateFormat, TimestampNormalizer};

/// Cell contents read as a missing value rather than a parse failure.
const NULL_MARKERS: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

/// A source file with its zone resolved.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub date_format: DateFormat,
    pub input_tz: Option<Tz>,
}

impl SourceInput {
    pub fn new(path: impl Into<PathBuf>, kind: SourceKind, date_format: DateFormat) -> Self {
        Self {
            path: path.into(),
            kind,
            date_format,
            input_tz: None,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, ConfigError> {
        let input_tz = resolve_timezone(
            config.input_timezone.as_deref(),
            &config.path.to_string_lossy(),
        )?;
        Ok(Self {
            path: config.path.clone(),
            kind: config.kind,
            date_format: config.date_format.clone(),
            input_tz,
        })
    }
}

/// Column positions resolved from the header row.
struct ColumnIndices {
    date_time: usize,
    plant_id: usize,
    source_key: usize,
    measurements: Vec<(Column, usize)>,
}

impl ColumnIndices {
    /// Number of fields a row needs to reach every required column.
    fn width(&self) -> usize {
        self.measurements
            .iter()
            .map(|(_, index)| *index)
            .chain([self.date_time, self.plant_id, self.source_key])
            .max()
            .map_or(0, |max| max + 1)
    }

    fn resolve(headers: &StringRecord, kind: SourceKind, path: &Path) -> Result<Self, LoadError> {
        let header_map: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(index, header)| (header.trim(), index))
            .collect();

        let missing: Vec<String> = kind
            .required_headers()
            .into_iter()
            .filter(|h| !header_map.contains_key(h))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                path: path.to_path_buf(),
                kind,
                missing,
            });
        }

        Ok(Self {
            date_time: header_map[DATE_TIME_COLUMN],
            plant_id: header_map[PLANT_ID_COLUMN],
            source_key: header_map[SOURCE_KEY_COLUMN],
            measurements: kind
                .columns()
                .iter()
                .map(|column| (*column, header_map[column.header()]))
                .collect(),
        })
    }
}

/// Reads generation and weather CSV files into typed tables.
#[derive(Debug, Clone, Default)]
pub struct CsvLoader {
    output_tz: Option<Tz>,
}

impl CsvLoader {
    pub fn new(output_tz: Option<Tz>) -> Self {
        Self { output_tz }
    }

    /// Loads one file. Missing or unreadable files and absent required columns fail the
    /// whole file; bad cells only null the offending field and are counted in the report.
    pub fn load(&self, input: &SourceInput) -> Result<Table, LoadError> {
        let path = input.path.as_path();
        debug!("Loading {} source {} ({})", input.kind, path.display(), input.date_format);
        let file = File::open(path).map_err(|e| LoadError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| LoadError::HeaderReadError {
                path: path.to_path_buf(),
                source: e,
            })?
            .clone();
        let indices = ColumnIndices::resolve(&headers, input.kind, path)?;

        let mut normalizer = input
            .date_format
            .pattern()
            .map(|p| TimestampNormalizer::new(p, input.input_tz, self.output_tz));
        let mut report = ParseReport {
            sources: vec![path.to_path_buf()],
            ..Default::default()
        };
        let mut readings = Vec::new();

        for (row_index, result) in reader.records().enumerate() {
            let row = row_index + 1;
            let mut row_failed = false;

            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!("Failed to read record at row {} in {}: {}", row, path.display(), e);
                    report.record_issue(
                        issue(path, row, "<record>", "", e.to_string()),
                        false,
                    );
                    report.failed_rows += 1;
                    readings.push(Reading::default());
                    continue;
                }
            };

            let mut reading = Reading::default();

            if record.len() < indices.width() {
                let message = format!("row has {} fields, expected {}", record.len(), indices.width());
                debug!("{} (row {} in {})", message, row, path.display());
                report.record_issue(issue(path, row, "<record>", "", message), false);
                row_failed = true;
            }

            // Timestamp
            let raw_ts = record.get(indices.date_time).unwrap_or("");
            if normalizer.is_none() && !raw_ts.is_empty() {
                if let Some(format) = DateFormat::infer(raw_ts) {
                    info!("Inferred date format '{}' for {}", format, path.display());
                    normalizer = format
                        .pattern()
                        .map(|p| TimestampNormalizer::new(p, input.input_tz, self.output_tz));
                }
            }
            match &normalizer {
                Some(n) => match n.normalize(raw_ts) {
                    Ok(ts) => reading.timestamp = Some(ts),
                    Err(message) => {
                        debug!("{} (row {} in {})", message, row, path.display());
                        report.record_issue(issue(path, row, DATE_TIME_COLUMN, raw_ts, message), true);
                        row_failed = true;
                    }
                },
                None => {
                    report.record_issue(
                        issue(path, row, DATE_TIME_COLUMN, raw_ts, "no known date format matches".to_string()),
                        true,
                    );
                    row_failed = true;
                }
            }

            // Plant id
            let raw_plant = record.get(indices.plant_id).unwrap_or("");
            match parse_plant_id(raw_plant) {
                Ok(id) => reading.plant_id = id,
                Err(message) => {
                    report.record_issue(issue(path, row, PLANT_ID_COLUMN, raw_plant, message), false);
                    row_failed = true;
                }
            }

            reading.source_key = record.get(indices.source_key).unwrap_or("").to_string();

            // Measurements
            for (column, index) in &indices.measurements {
                let raw_value = record.get(*index).unwrap_or("");
                match parse_measurement(raw_value) {
                    Ok(value) => reading.set_value(*column, value),
                    Err(message) => {
                        debug!(
                            "Float parse failed for {} ('{}') in {} at row {}: {}",
                            column.header(),
                            raw_value,
                            path.display(),
                            row,
                            message
                        );
                        report.record_issue(issue(path, row, column.header(), raw_value, message), false);
                        row_failed = true;
                    }
                }
            }

            if row_failed {
                report.failed_rows += 1;
            }
            readings.push(reading);
        }

        report.rows_read = readings.len();
        if report.is_clean() {
            info!("Loaded {} rows from {}", readings.len(), path.display());
        } else {
            warn!(
                "Loaded {} rows from {}; {} rows failed to parse ({} timestamp, {} numeric failures)",
                readings.len(),
                path.display(),
                report.failed_rows,
                report.timestamp_failures,
                report.numeric_failures
            );
        }

        Ok(Table::with_report(input.kind, readings, report))
    }

    /// Loads and concatenates several files of the same kind, keeping every row.
    pub fn load_all(&self, inputs: &[SourceInput], kind: SourceKind) -> Result<Table, LoadError> {
        if inputs.is_empty() {
            return Err(LoadError::EmptySourceList { kind });
        }

        let mut table = Table::new(kind);
        for input in inputs {
            if input.kind != kind {
                return Err(LoadError::MixedKinds {
                    path: input.path.clone(),
                    expected: kind,
                    found: input.kind,
                });
            }
            table.append(self.load(input)?);
        }
        Ok(table)
    }
}

fn issue(path: &Path, row: usize, column: &str, value: &str, message: String) -> RowIssue {
    RowIssue {
        path: path.to_path_buf(),
        row,
        column: column.to_string(),
        value: value.to_string(),
        message,
    }
}

/// Parse a float that may use comma as decimal separator
pub fn parse_locale_float(s: &str) -> Result<f64, std::num::ParseFloatError> {
    s.replace(',', ".").parse::<f64>()
}

fn parse_measurement(raw: &str) -> Result<Option<f64>, String> {
    if NULL_MARKERS.contains(&raw) {
        return Ok(None);
    }
    parse_locale_float(raw)
        .map(Some)
        .map_err(|e| format!("'{}' is not a number: {}", raw, e))
}

fn parse_plant_id(raw: &str) -> Result<Option<i64>, String> {
    if NULL_MARKERS.contains(&raw) {
        return Ok(None);
    }
    match raw.parse::<i64>() {
        Ok(id) => Ok(Some(id)),
        // Some exports write integer ids as floats ("4135001.0").
        Err(_) => match parse_locale_float(raw) {
            Ok(f) if !(f >= i64::MIN as f64 && f < i64::MAX as f64) => {
                Err(format!("plant id {} is out of range", f))
            }
            Ok(f) if f.fract().abs() < 1e-9 => Ok(Some(f.round() as i64)),
            Ok(f) => Err(format!("plant id {} is not a whole number", f)),
            Err(e) => Err(format!("'{}' is not a plant id: {}", raw, e)),
        },
    }
}
