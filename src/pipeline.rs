//! Explicit pipeline: load -> align -> aggregate / statistics -> report.
//! Each stage takes its inputs as arguments and returns its outputs.

use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::aggregate::{
    generation_by_plant, hourly_generation, hourly_profile, readings_per_plant, top_peak_hours,
    HourlyGeneration, HourlyStats, PeakDetector,
};
use crate::align::{join, CombinedTable};
use crate::config::PipelineConfig;
use crate::data_models::{ParseReport, PeakWindow, SourceKind, Table};
use crate::errors::{ConfigError, PipelineError};
use crate::parsers::{CsvLoader, SourceInput};
use crate::stats::{panel_efficiency, panel_efficiency_by_plant, WeatherCorrelations};

/// Generation and weather tables of one run.
#[derive(Debug, Clone)]
pub struct LoadedTables {
    pub generation: Table,
    pub weather: Table,
}

#[derive(Serialize, Debug, Clone)]
pub struct AnalysisReport {
    pub generation_rows: usize,
    pub weather_rows: usize,
    pub combined_rows: usize,
    pub unmatched_generation_rows: usize,
    pub generation_parse: ParseReport,
    pub weather_parse: ParseReport,
    pub hourly_generation: HourlyGeneration,
    pub peak_hours: Vec<u32>,
    pub peak_windows: Vec<PeakWindow>,
    /// NaN when total DC power is zero.
    pub efficiency_percent: f64,
    pub efficiency_by_plant: BTreeMap<i64, f64>,
    pub correlations: WeatherCorrelations,
    pub generation_by_plant: BTreeMap<i64, f64>,
    pub readings_per_plant: BTreeMap<i64, usize>,
    pub hourly_profile: Vec<HourlyStats>,
}

#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<AnalysisReport, PipelineError> {
        let tables = self.load()?;
        let combined = self.align(&tables);
        Ok(self.analyze(&tables, &combined))
    }

    /// Loads both kinds. Each kind is attempted and logged even if the other fails;
    /// the generation error wins when both fail.
    pub fn load(&self) -> Result<LoadedTables, PipelineError> {
        let loader = CsvLoader::new(self.config.output_tz()?);
        let generation = self.load_kind(&loader, SourceKind::Generation);
        let weather = self.load_kind(&loader, SourceKind::Weather);

        match (generation, weather) {
            (Ok(generation), Ok(weather)) => Ok(LoadedTables { generation, weather }),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    fn load_kind(&self, loader: &CsvLoader, kind: SourceKind) -> Result<Table, PipelineError> {
        let inputs = self
            .config
            .sources_of(kind)?
            .iter()
            .map(SourceInput::from_config)
            .collect::<Result<Vec<_>, ConfigError>>()?;
        loader.load_all(&inputs, kind).map_err(|e| {
            error!("Failed to load {} data: {}", kind, e);
            PipelineError::from(e)
        })
    }

    pub fn align(&self, tables: &LoadedTables) -> CombinedTable {
        join(&tables.generation, &tables.weather, self.config.join)
    }

    pub fn analyze(&self, tables: &LoadedTables, combined: &CombinedTable) -> AnalysisReport {
        let settings = &self.config.analysis;
        let generation = &tables.generation;

        let hourly = hourly_generation(generation);
        let peak_hours = top_peak_hours(&hourly, settings.top_hours);
        let detector = PeakDetector {
            rank: settings.top_hours,
            threshold_factor: settings.peak_threshold_factor,
            min_window_len: settings.min_window_len,
        };
        let peak_windows = detector.detect(&hourly);
        info!("Peak hours {:?}, {} peak windows", peak_hours, peak_windows.len());

        let efficiency_percent = panel_efficiency(generation).unwrap_or_else(|e| {
            warn!("Panel efficiency undefined: {}", e);
            f64::NAN
        });
        let efficiency_by_plant = panel_efficiency_by_plant(generation)
            .into_iter()
            .map(|(plant, result)| (plant, result.unwrap_or(f64::NAN)))
            .collect();

        AnalysisReport {
            generation_rows: generation.len(),
            weather_rows: tables.weather.len(),
            combined_rows: combined.len(),
            unmatched_generation_rows: combined.unmatched_generation(),
            generation_parse: generation.report().clone(),
            weather_parse: tables.weather.report().clone(),
            hourly_generation: hourly,
            peak_hours,
            peak_windows,
            efficiency_percent,
            efficiency_by_plant,
            correlations: WeatherCorrelations::compute(combined),
            generation_by_plant: generation_by_plant(generation),
            readings_per_plant: readings_per_plant(generation),
            hourly_profile: hourly_profile(generation),
        }
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== Solar Plant Analysis ==========")?;
        writeln!(
            f,
            "Generation rows: {} ({} rows failed to parse)",
            self.generation_rows, self.generation_parse.failed_rows
        )?;
        writeln!(
            f,
            "Weather rows: {} ({} rows failed to parse)",
            self.weather_rows, self.weather_parse.failed_rows
        )?;
        writeln!(
            f,
            "Combined rows: {} ({} generation rows without weather match)",
            self.combined_rows, self.unmatched_generation_rows
        )?;
        writeln!(f, "Best hours to redirect energy to batteries: {:?}", self.peak_hours)?;
        if self.peak_windows.is_empty() {
            writeln!(f, "No sustained peak periods found")?;
        }
        for window in &self.peak_windows {
            writeln!(
                f,
                "Peak period {:02}:00-{:02}:59 ({} h, {:.2} kW total)",
                window.start_hour,
                window.end_hour,
                window.len(),
                window.total_ac_power()
            )?;
        }
        writeln!(f, "Panel efficiency: {:.2}%", self.efficiency_percent)?;
        for (plant, efficiency) in &self.efficiency_by_plant {
            writeln!(f, "  plant {}: {:.2}%", plant, efficiency)?;
        }
        writeln!(
            f,
            "Correlation ambient temperature / generation: {:.2}",
            self.correlations.ambient_temperature
        )?;
        writeln!(
            f,
            "Correlation module temperature / generation: {:.2}",
            self.correlations.module_temperature
        )?;
        writeln!(
            f,
            "Correlation irradiation / generation: {:.2}",
            self.correlations.irradiation
        )?;
        for (plant, total) in &self.generation_by_plant {
            writeln!(f, "Total AC generation plant {}: {:.2} kW", plant, total)?;
        }
        write!(f, "==========================================")
    }
}
