//! Inner join of generation and weather tables on (timestamp, plant id).

use chrono::Duration;
use log::{debug, info};
use std::collections::HashMap;

use crate::config::JoinStrategy;
use crate::data_models::{Column, CombinedRecord, Reading, Table, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    records: Vec<CombinedRecord>,
    unmatched_generation: usize,
    strategy: JoinStrategy,
}

impl CombinedTable {
    pub fn records(&self) -> &[CombinedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Generation rows that found no weather partner (or lacked a key).
    pub fn unmatched_generation(&self) -> usize {
        self.unmatched_generation
    }

    pub fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    /// Pairs of values where both columns are present, in row order.
    pub fn paired(&self, a: Column, b: Column) -> Vec<(f64, f64)> {
        self.records
            .iter()
            .filter_map(|r| Some((r.value(a)?, r.value(b)?)))
            .collect()
    }
}

/// Joins every generation row to the weather rows of the same plant at the same time.
///
/// Duplicate keys on either side multiply out, as in a relational inner join.
/// Rows without a timestamp or plant id never match.
pub fn join(generation: &Table, weather: &Table, strategy: JoinStrategy) -> CombinedTable {
    let (records, unmatched_generation) = match strategy {
        JoinStrategy::Exact => join_exact(generation, weather),
        JoinStrategy::Nearest { tolerance_secs } => {
            let tolerance = Duration::try_seconds(tolerance_secs.max(0)).unwrap_or(Duration::MAX);
            join_nearest(generation, weather, tolerance)
        }
    };

    info!(
        "Joined {} generation rows with {} weather rows into {} combined rows ({:?}, {} unmatched)",
        generation.len(),
        weather.len(),
        records.len(),
        strategy,
        unmatched_generation
    );

    CombinedTable {
        records,
        unmatched_generation,
        strategy,
    }
}

fn join_exact(generation: &Table, weather: &Table) -> (Vec<CombinedRecord>, usize) {
    let mut index: HashMap<(Timestamp, i64), Vec<&Reading>> = HashMap::new();
    for reading in weather.iter() {
        if let Some(key) = reading.key() {
            index.entry(key).or_default().push(reading);
        }
    }

    let mut records = Vec::new();
    let mut unmatched = 0;
    for gen_row in generation.iter() {
        let partners = gen_row.key().and_then(|key| index.get(&key).map(|rows| (key, rows)));
        match partners {
            Some(((timestamp, plant_id), rows)) => {
                records.extend(
                    rows.iter()
                        .map(|w| CombinedRecord::from_pair(gen_row, w, timestamp, plant_id)),
                );
            }
            None => unmatched += 1,
        }
    }
    (records, unmatched)
}

fn join_nearest(
    generation: &Table,
    weather: &Table,
    tolerance: Duration,
) -> (Vec<CombinedRecord>, usize) {
    let mut by_plant: HashMap<i64, Vec<(Timestamp, &Reading)>> = HashMap::new();
    for reading in weather.iter() {
        if let Some((timestamp, plant_id)) = reading.key() {
            by_plant.entry(plant_id).or_default().push((timestamp, reading));
        }
    }
    for rows in by_plant.values_mut() {
        rows.sort_by_key(|(ts, _)| *ts);
    }

    let mut records = Vec::new();
    let mut unmatched = 0;
    for gen_row in generation.iter() {
        let matched = gen_row.key().and_then(|(timestamp, plant_id)| {
            let rows = by_plant.get(&plant_id)?;
            let partner = nearest_within(rows, timestamp, tolerance)?;
            Some(CombinedRecord::from_pair(gen_row, partner, timestamp, plant_id))
        });
        match matched {
            Some(record) => records.push(record),
            None => unmatched += 1,
        }
    }
    debug!("Nearest join tolerance {}s", tolerance.num_seconds());
    (records, unmatched)
}

/// Closest row to `target` within `tolerance`; the earlier row wins a tie.
fn nearest_within<'a>(
    rows: &[(Timestamp, &'a Reading)],
    target: Timestamp,
    tolerance: Duration,
) -> Option<&'a Reading> {
    let split = rows.partition_point(|(ts, _)| *ts < target);
    let before = split.checked_sub(1).and_then(|i| rows.get(i));
    let after = rows.get(split);

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if (target - b.0) <= (a.0 - target) {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    let distance = if best.0 >= target { best.0 - target } else { target - best.0 };
    (distance <= tolerance).then_some(best.1)
}
