//! Hour-of-day aggregation and peak-period detection over generation tables.

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data_models::{HourlyBucket, PeakWindow, Table};

pub const HOURS_PER_DAY: u32 = 24;

/// Summed AC power per hour of day, across all dates.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct HourlyGeneration(BTreeMap<u32, f64>);

impl HourlyGeneration {
    pub fn get(&self, hour: u32) -> Option<f64> {
        self.0.get(&hour).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Buckets in ascending hour order.
    pub fn buckets(&self) -> Vec<HourlyBucket> {
        self.0
            .iter()
            .map(|(&hour, &ac_power)| HourlyBucket { hour, ac_power })
            .collect()
    }
}

impl FromIterator<(u32, f64)> for HourlyGeneration {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Rows without a timestamp are skipped; a missing AC value contributes nothing
/// but still creates its hour's bucket.
pub fn hourly_generation(table: &Table) -> HourlyGeneration {
    let mut sums: BTreeMap<u32, f64> = BTreeMap::new();
    let mut skipped = 0usize;
    for reading in table.iter() {
        match reading.hour() {
            Some(hour) => *sums.entry(hour).or_insert(0.0) += reading.ac_power.unwrap_or(0.0),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("Hourly bucketing skipped {} rows without a timestamp", skipped);
    }
    HourlyGeneration(sums)
}

/// The `n` hours with the largest sums, largest first; equal sums keep ascending hour order.
pub fn top_peak_hours(hourly: &HourlyGeneration, n: usize) -> Vec<u32> {
    ranked(hourly).into_iter().take(n).map(|b| b.hour).collect()
}

fn ranked(hourly: &HourlyGeneration) -> Vec<HourlyBucket> {
    let mut buckets = hourly.buckets();
    buckets.sort_by(|a, b| b.ac_power.total_cmp(&a.ac_power));
    buckets
}

/// `factor` times the sum of the `rank`-th largest hour. With fewer hours than `rank`
/// the smallest available hour is used; `None` for an empty map.
pub fn peak_threshold(hourly: &HourlyGeneration, rank: usize, factor: f64) -> Option<f64> {
    let ranked = ranked(hourly);
    let index = rank.max(1).min(ranked.len()).checked_sub(1)?;
    ranked.get(index).map(|b| b.ac_power * factor)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetector {
    pub rank: usize,
    pub threshold_factor: f64,
    pub min_window_len: usize,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self {
            rank: 3,
            threshold_factor: 0.9,
            min_window_len: 3,
        }
    }
}

impl PeakDetector {
    /// Runs of numerically adjacent hours (0..=23, no wrap past midnight) whose sum exceeds
    /// the threshold. Hours absent from the map break a run.
    pub fn detect(&self, hourly: &HourlyGeneration) -> Vec<PeakWindow> {
        let Some(threshold) = peak_threshold(hourly, self.rank, self.threshold_factor) else {
            return Vec::new();
        };
        debug!("Peak threshold {:.3} (rank {}, factor {})", threshold, self.rank, self.threshold_factor);

        let mut windows = Vec::new();
        let mut run: Vec<HourlyBucket> = Vec::new();
        for hour in 0..HOURS_PER_DAY {
            match hourly.get(hour).filter(|&power| power > threshold) {
                Some(ac_power) => run.push(HourlyBucket { hour, ac_power }),
                None => self.close_run(&mut run, &mut windows),
            }
        }
        self.close_run(&mut run, &mut windows);
        windows
    }

    fn close_run(&self, run: &mut Vec<HourlyBucket>, windows: &mut Vec<PeakWindow>) {
        let buckets = std::mem::take(run);
        if buckets.is_empty() || buckets.len() < self.min_window_len {
            return;
        }
        windows.push(PeakWindow {
            start_hour: buckets[0].hour,
            end_hour: buckets[buckets.len() - 1].hour,
            buckets,
        });
    }
}

pub fn detect_peak_windows(hourly: &HourlyGeneration, threshold_factor: f64) -> Vec<PeakWindow> {
    PeakDetector {
        threshold_factor,
        ..Default::default()
    }
    .detect(hourly)
}

/// Total AC power per plant.
pub fn generation_by_plant(table: &Table) -> BTreeMap<i64, f64> {
    table
        .group_by(|r| r.plant_id)
        .into_iter()
        .filter_map(|(plant, rows)| {
            Some((plant?, rows.iter().filter_map(|r| r.ac_power).sum::<f64>()))
        })
        .collect()
}

/// Rows carrying a DAILY_YIELD value, per plant.
pub fn readings_per_plant(table: &Table) -> BTreeMap<i64, usize> {
    table
        .group_by(|r| r.plant_id)
        .into_iter()
        .filter_map(|(plant, rows)| {
            Some((plant?, rows.iter().filter(|r| r.daily_yield.is_some()).count()))
        })
        .collect()
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct HourlyStats {
    pub hour: u32,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Distribution of individual AC readings per hour of day.
pub fn hourly_profile(table: &Table) -> Vec<HourlyStats> {
    table
        .group_by(|r| r.hour())
        .into_iter()
        .filter_map(|(hour, rows)| {
            let hour = hour?;
            let values: Vec<f64> = rows.iter().filter_map(|r| r.ac_power).collect();
            if values.is_empty() {
                return None;
            }
            let count = values.len();
            Some(HourlyStats {
                hour,
                count,
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean: values.iter().sum::<f64>() / count as f64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::{Reading, SourceKind};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn row(day: u32, hour: u32, plant: i64, ac: Option<f64>) -> Reading {
        Reading {
            timestamp: NaiveDate::from_ymd_opt(2020, 5, day).and_then(|d| d.and_hms_opt(hour, 15, 0)),
            plant_id: Some(plant),
            source_key: "inv".to_string(),
            ac_power: ac,
            dc_power: ac.map(|v| v * 10.0),
            daily_yield: Some(0.0),
            ..Default::default()
        }
    }

    fn hourly(pairs: &[(u32, f64)]) -> HourlyGeneration {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_hourly_generation_sums_across_dates() {
        let table = Table::from_readings(
            SourceKind::Generation,
            vec![
                row(15, 10, 1, Some(50.0)),
                row(16, 10, 1, Some(30.0)),
                row(15, 14, 2, Some(100.0)),
            ],
        );
        assert_eq!(hourly_generation(&table), hourly(&[(10, 80.0), (14, 100.0)]));
    }

    #[test]
    fn test_hourly_generation_skips_null_timestamps() {
        let mut no_ts = row(15, 9, 1, Some(1000.0));
        no_ts.timestamp = None;
        let table = Table::from_readings(
            SourceKind::Generation,
            vec![no_ts, row(15, 9, 1, None), row(15, 9, 1, Some(2.0))],
        );
        let result = hourly_generation(&table);
        assert_eq!(result.get(9), Some(2.0));
        assert!(result.buckets().iter().all(|b| b.hour < HOURS_PER_DAY));
    }

    #[test]
    fn test_top_peak_hours_ordering() {
        let map = hourly(&[(10, 80.0), (14, 100.0), (9, 20.0)]);
        assert_eq!(top_peak_hours(&map, 2), vec![14, 10]);
        assert_eq!(top_peak_hours(&map, 10), vec![14, 10, 9]);
    }

    #[test]
    fn test_top_peak_hours_ties_prefer_lower_hour() {
        let map = hourly(&[(13, 50.0), (11, 50.0), (12, 70.0)]);
        assert_eq!(top_peak_hours(&map, 3), vec![12, 11, 13]);
    }

    #[test]
    fn test_peak_window_scenario() {
        let map = hourly(&[(0, 10.0), (1, 95.0), (2, 96.0), (3, 94.0), (4, 5.0)]);
        assert_relative_eq!(peak_threshold(&map, 3, 0.9).unwrap(), 84.6, epsilon = 1e-9);

        let windows = detect_peak_windows(&map, 0.9);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].hours(), vec![1, 2, 3]);
        assert_eq!(windows[0].len(), 3);
        assert_eq!((windows[0].start_hour, windows[0].end_hour), (1, 3));
        assert_relative_eq!(windows[0].total_ac_power(), 285.0);
    }

    #[test]
    fn test_short_runs_and_gaps_are_not_windows() {
        // Hours 10-11 peak, 12 missing, 13-14 peak: two runs of two.
        let map = hourly(&[(10, 100.0), (11, 100.0), (13, 100.0), (14, 100.0), (15, 1.0)]);
        assert!(detect_peak_windows(&map, 0.9).is_empty());

        let detector = PeakDetector {
            min_window_len: 2,
            ..Default::default()
        };
        let windows = detector.detect(&map);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].hours(), vec![13, 14]);
    }

    #[test]
    fn test_window_running_to_end_of_day_is_closed() {
        let map = hourly(&[(20, 9.0), (21, 10.0), (22, 10.0), (23, 10.0)]);
        let windows = detect_peak_windows(&map, 0.95);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].hours(), vec![21, 22, 23]);
    }

    #[test]
    fn test_empty_map_has_no_threshold() {
        let empty = HourlyGeneration::default();
        assert_eq!(peak_threshold(&empty, 3, 0.9), None);
        assert!(detect_peak_windows(&empty, 0.9).is_empty());
        assert!(top_peak_hours(&empty, 3).is_empty());
    }

    #[test]
    fn test_per_plant_totals_and_profile() {
        let table = Table::from_readings(
            SourceKind::Generation,
            vec![
                row(15, 10, 4135001, Some(10.0)),
                row(15, 10, 4135001, Some(30.0)),
                row(15, 11, 4136001, Some(5.0)),
            ],
        );
        let totals = generation_by_plant(&table);
        assert_eq!(totals[&4135001], 40.0);
        assert_eq!(totals[&4136001], 5.0);
        assert_eq!(readings_per_plant(&table)[&4135001], 2);

        let profile = hourly_profile(&table);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].hour, 10);
        assert_eq!(profile[0].count, 2);
        assert_eq!(profile[0].min, 10.0);
        assert_eq!(profile[0].max, 30.0);
        assert_relative_eq!(profile[0].mean, 20.0);
    }
}
