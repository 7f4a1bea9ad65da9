use chrono::Duration;
use chrono_tz::Tz;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::data_models::SourceKind;
use crate::errors::ConfigError;
use crate::timestamp::DateFormat;

/// One input file (or glob of files sharing the same settings).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub kind: SourceKind,
    #[serde(default)]
    pub date_format: DateFormat,
    /// IANA zone the file's timestamps are recorded in; naive when absent.
    #[serde(default)]
    pub input_timezone: Option<String>,
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>, kind: SourceKind, date_format: DateFormat) -> Self {
        Self {
            path: path.into(),
            kind,
            date_format,
            input_timezone: None,
        }
    }
}

/// How generation rows find their weather partner.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Equal timestamp and plant id only.
    #[default]
    Exact,
    /// Closest weather row of the same plant within the tolerance.
    Nearest { tolerance_secs: i64 },
}

impl JoinStrategy {
    /// Rejects tolerances that are negative or too large for a `Duration`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            JoinStrategy::Exact => Ok(()),
            JoinStrategy::Nearest { tolerance_secs } => {
                if tolerance_secs >= 0 && Duration::try_seconds(tolerance_secs).is_some() {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidTolerance {
                        value: tolerance_secs,
                    })
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    #[serde(default = "default_top_hours")]
    pub top_hours: usize,
    #[serde(default = "default_peak_threshold_factor")]
    pub peak_threshold_factor: f64,
    #[serde(default = "default_min_window_len")]
    pub min_window_len: usize,
}

fn default_top_hours() -> usize {
    3
}

fn default_peak_threshold_factor() -> f64 {
    0.9
}

fn default_min_window_len() -> usize {
    3
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_hours: default_top_hours(),
            peak_threshold_factor: default_peak_threshold_factor(),
            min_window_len: default_min_window_len(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub output_timezone: Option<String>,
    #[serde(default)]
    pub join: JoinStrategy,
    #[serde(flatten)]
    pub analysis: AnalysisSettings,
}

impl PipelineConfig {
    /// The two-plant layout of the original dataset. Plant 1 generation uses day-first dates.
    pub fn standard(data_dir: &Path) -> Self {
        let sources = vec![
            SourceConfig::new(
                data_dir.join("power_generation_plant_1.csv"),
                SourceKind::Generation,
                DateFormat::DmyHm,
            ),
            SourceConfig::new(
                data_dir.join("power_generation_plant_2.csv"),
                SourceKind::Generation,
                DateFormat::YmdHms,
            ),
            SourceConfig::new(
                data_dir.join("weather_sensor_plant_1.csv"),
                SourceKind::Weather,
                DateFormat::YmdHms,
            ),
            SourceConfig::new(
                data_dir.join("weather_sensor_plant_2.csv"),
                SourceKind::Weather,
                DateFormat::YmdHms,
            ),
        ];
        Self {
            sources,
            ..Default::default()
        }
    }

    /// Walks `data_dir` for CSV files named like generation or weather sources.
    /// Every discovered file gets its date format inferred at load time.
    pub fn discover(data_dir: &Path) -> Result<Self, ConfigError> {
        if !data_dir.is_dir() {
            return Err(ConfigError::NotFound {
                path: data_dir.to_path_buf(),
            });
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(data_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "csv"))
        {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            let kind = if name.contains("generation") {
                SourceKind::Generation
            } else if name.contains("weather") {
                SourceKind::Weather
            } else {
                debug!("Skipping unrecognised file {}", entry.path().display());
                continue;
            };
            info!("Discovered {} source {}", kind, entry.path().display());
            sources.push(SourceConfig::new(entry.path(), kind, DateFormat::Auto));
        }

        let config = Self {
            sources,
            ..Default::default()
        };
        config.ensure_both_kinds()?;
        Ok(config)
    }

    pub fn output_tz(&self) -> Result<Option<Tz>, ConfigError> {
        resolve_timezone(self.output_timezone.as_deref(), "output_timezone")
    }

    /// Sources of one kind with glob patterns expanded, in configuration order.
    pub fn sources_of(&self, kind: SourceKind) -> Result<Vec<SourceConfig>, ConfigError> {
        let mut expanded = Vec::new();
        for source in self.sources.iter().filter(|s| s.kind == kind) {
            expanded.extend(expand_glob(source)?);
        }
        Ok(expanded)
    }

    pub fn ensure_both_kinds(&self) -> Result<(), ConfigError> {
        for kind in [SourceKind::Generation, SourceKind::Weather] {
            if !self.sources.iter().any(|s| s.kind == kind) {
                return Err(ConfigError::NoSources { kind });
            }
        }
        Ok(())
    }
}

pub fn resolve_timezone(name: Option<&str>, context: &str) -> Result<Option<Tz>, ConfigError> {
    name.map(|n| {
        n.parse::<Tz>().map_err(|_| ConfigError::InvalidTimeZone {
            name: n.to_string(),
            context: context.to_string(),
        })
    })
    .transpose()
}

fn expand_glob(source: &SourceConfig) -> Result<Vec<SourceConfig>, ConfigError> {
    let path_str = source.path.to_string_lossy();
    if !(path_str.contains('*') || path_str.contains('?') || path_str.contains('[')) {
        return Ok(vec![source.clone()]);
    }

    let paths = glob::glob(&path_str).map_err(|e| ConfigError::InvalidPattern {
        pattern: path_str.to_string(),
        message: e.to_string(),
    })?;
    let mut matched: Vec<PathBuf> = paths.filter_map(|entry| entry.ok()).collect();
    matched.sort();
    if matched.is_empty() {
        warn!("Glob {} matched no files", path_str);
    } else {
        info!("Expanded glob {} to {} files", path_str, matched.len());
    }

    Ok(matched
        .into_iter()
        .map(|path| SourceConfig {
            path,
            ..source.clone()
        })
        .collect())
}

pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    let config: PipelineConfig =
        serde_json::from_reader(reader).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Loaded {} source entries from {}", config.sources.len(), path.display());

    config.ensure_both_kinds()?;
    config.join.validate()?;
    resolve_timezone(config.output_timezone.as_deref(), "output_timezone")?;
    for source in &config.sources {
        resolve_timezone(
            source.input_timezone.as_deref(),
            &source.path.to_string_lossy(),
        )?;
    }
    Ok(config)
}
