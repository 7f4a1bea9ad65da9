use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::align::CombinedTable;
use crate::data_models::{Column, Table};
use crate::errors::StatsError;

/// Weather columns correlated against AC generation.
pub const CORRELATION_PAIRS: [(Column, Column); 3] = [
    (Column::AmbientTemperature, Column::AcPower),
    (Column::ModuleTemperature, Column::AcPower),
    (Column::Irradiation, Column::AcPower),
];

/// `100 * sum(AC) / sum(DC)`. Missing values are left out of both sums.
pub fn panel_efficiency(table: &Table) -> Result<f64, StatsError> {
    let total_ac: f64 = table.iter().filter_map(|r| r.ac_power).sum();
    let total_dc: f64 = table.iter().filter_map(|r| r.dc_power).sum();
    if total_dc == 0.0 {
        return Err(StatsError::DivisionByZero { numerator: total_ac });
    }
    Ok(total_ac / total_dc * 100.0)
}

pub fn panel_efficiency_by_plant(table: &Table) -> BTreeMap<i64, Result<f64, StatsError>> {
    table
        .group_by(|r| r.plant_id)
        .into_keys()
        .flatten()
        .map(|plant| (plant, panel_efficiency(&table.filter(|r| r.plant_id == Some(plant)))))
        .collect()
}

/// Pearson coefficient over the rows where both columns are present.
/// NaN when fewer than two such rows exist or either column holds a single distinct value.
pub fn correlation(combined: &CombinedTable, a: Column, b: Column) -> f64 {
    pearson(&combined.paired(a, b))
}

pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    let Some(&(first_x, first_y)) = pairs.first() else {
        return f64::NAN;
    };
    // Constant columns leave rounding noise in the deviations.
    if pairs.iter().all(|(x, _)| *x == first_x) || pairs.iter().all(|(_, y)| *y == first_y) {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
}

/// Correlation of each weather variable with AC power. NaN marks an undefined coefficient.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct WeatherCorrelations {
    pub ambient_temperature: f64,
    pub module_temperature: f64,
    pub irradiation: f64,
}

impl WeatherCorrelations {
    pub fn compute(combined: &CombinedTable) -> Self {
        let [ambient, module, irradiation] = CORRELATION_PAIRS.map(|(a, b)| {
            let r = correlation(combined, a, b);
            if r.is_nan() {
                warn!("Correlation of {} with {} is undefined", a.header(), b.header());
            }
            r
        });
        Self {
            ambient_temperature: ambient,
            module_temperature: module,
            irradiation,
        }
    }
}
