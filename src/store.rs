// Metric store: region name -> latest snapshot.
// Every ingestion clears the store before repopulating it; a missing key means disconnected.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::Serialize;

use crate::mapping::SensorMapping;
use crate::telemetry::{HUMIDITY, NORMALIZED, TEMPERATURE};
use crate::types::*;

/// Counts from one ingestion cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records: usize,
    pub stored: usize,
    pub unresolved: usize,
    pub unknown_region: usize,
    pub incomplete: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    snapshots: HashMap<String, MetricSnapshot>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the store's contents with the snapshots resolvable from `records`.
    /// A later record for the same region overwrites an earlier one.
    pub fn ingest(
        &mut self,
        records: &[TelemetryRecord],
        mapping: &SensorMapping,
        mode: TelemetryMode,
        regions: &[Region],
        fallback: &NormalizedFallback,
    ) -> IngestReport {
        self.snapshots.clear();

        let known: HashSet<&str> = regions.iter().map(|r| r.name.as_str()).collect();
        let mut report = IngestReport {
            records: records.len(),
            ..Default::default()
        };

        for record in records {
            let Some(region) = mapping.resolve(&record.id) else {
                report.unresolved += 1;
                continue;
            };
            if !known.contains(region) {
                report.unknown_region += 1;
                continue;
            }
            let Some(snapshot) = snapshot_for(record, mode, fallback) else {
                report.incomplete += 1;
                continue;
            };
            self.snapshots.insert(region.to_string(), snapshot);
        }

        report.stored = self.snapshots.len();
        debug!(
            "ingested {} record(s): {} stored, {} unresolved, {} unknown region, {} incomplete",
            report.records, report.stored, report.unresolved, report.unknown_region, report.incomplete
        );
        report
    }

    pub fn get(&self, region: &str) -> Option<&MetricSnapshot> {
        self.snapshots.get(region)
    }

    pub fn contains(&self, region: &str) -> bool {
        self.snapshots.contains_key(region)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.snapshots.keys().map(String::as_str)
    }
}

/// Snapshot for a record, or `None` when a field the mode needs is absent.
fn snapshot_for(
    record: &TelemetryRecord,
    mode: TelemetryMode,
    fallback: &NormalizedFallback,
) -> Option<MetricSnapshot> {
    match mode {
        TelemetryMode::Continuous => Some(MetricSnapshot {
            normalized: fallback.normalized(record)?,
            temperature: record.finite(TEMPERATURE)?,
            humidity: record.finite(HUMIDITY)?,
        }),
        TelemetryMode::Categorical => Some(MetricSnapshot {
            normalized: record.finite(NORMALIZED)?,
            temperature: 0.0,
            humidity: 0.0,
        }),
    }
}
