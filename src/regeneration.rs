// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Batch export of features with their geometry and location references.
//!
//! A full run shards the id space of a feature type over the worker pool;
//! a delta run only touches features with pending change markers. Failures
//! of single features are logged and counted, never propagated.

use crate::catalog::CodeValueMap;
use crate::config::RoadRefConfig;
use crate::coord_conversion::geometry_to_wgs84;
use crate::geometry_utils::{merge_lines, simplify_geometry, sub_line};
use crate::models::{
    ChangeKind, FeatureChange, FeatureId, FeatureRecord, FeatureTypeId, PropertyValue,
};
use crate::openlr::{EncodedReference, LocationReferenceBuilder, LocationReferenceError};
use crate::roadnet::RoadNetError;
use crate::store::dirty::DirtySequence;
use crate::store::{Store, StoreError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum RegenerationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    RoadNet(#[from] RoadNetError),
    #[error(transparent)]
    LocationReference(#[from] LocationReferenceError),
    #[error("feature {type_id}/{feature_id} has no geometry on the road network")]
    NoGeometry {
        type_id: FeatureTypeId,
        feature_id: FeatureId,
    },
    #[error("sink failed: {0}")]
    Sink(#[from] std::io::Error),
    #[error("sink serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One exported feature. Deletions carry no geometry and no references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedFeature {
    #[serde(rename = "type")]
    pub type_id: FeatureTypeId,
    pub id: FeatureId,
    pub version: u32,
    pub change: ChangeKind,
    /// WGS84.
    pub geometry: Option<geojson::Value>,
    pub references: Vec<EncodedReference>,
    pub value: Option<i64>,
}

impl ExportedFeature {
    fn tombstone(type_id: FeatureTypeId, id: FeatureId) -> Self {
        Self {
            type_id,
            id,
            version: 0,
            change: ChangeKind::Deleted,
            geometry: None,
            references: Vec::new(),
            value: None,
        }
    }
}

/// Destination of exported features. `accept` is called concurrently from
/// the workers. `flush` must not return before every accepted feature is
/// durable; markers are cleared only once it has.
pub trait FeatureSink: Send + Sync {
    fn accept(&self, feature: ExportedFeature) -> Result<(), RegenerationError>;
    fn flush(&self) -> Result<(), RegenerationError>;
}

/// A writer that can push what it has written to stable storage.
pub trait SyncWrite: Write {
    fn sync(&mut self) -> std::io::Result<()>;
}

impl SyncWrite for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_all()
    }
}

impl<W: SyncWrite> SyncWrite for BufWriter<W> {
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.get_mut().sync()
    }
}

impl SyncWrite for Vec<u8> {
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes one JSON document per line. `flush` returns once the lines are on
/// stable storage.
pub struct JsonLinesSink<W: SyncWrite + Send> {
    writer: Mutex<W>,
}

impl<W: SyncWrite + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: SyncWrite + Send> FeatureSink for JsonLinesSink<W> {
    fn accept(&self, feature: ExportedFeature) -> Result<(), RegenerationError> {
        let mut line = serde_json::to_vec(&feature)?;
        line.push(b'\n');
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(&line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), RegenerationError> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush()?;
        writer.sync()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerationReport {
    pub feature_type: FeatureTypeId,
    pub exported: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Shards whose store read failed as a whole.
    pub failed_ranges: usize,
}

impl RegenerationReport {
    fn new(feature_type: FeatureTypeId) -> Self {
        Self {
            feature_type,
            ..Default::default()
        }
    }

    fn merge(mut self, other: RegenerationReport) -> Self {
        self.exported += other.exported;
        self.deleted += other.deleted;
        self.failed += other.failed;
        self.failed_ranges += other.failed_ranges;
        self
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.failed_ranges == 0
    }
}

/// Splits `min..=max` into at most `workers` contiguous inclusive ranges.
pub fn shard_ranges(min: FeatureId, max: FeatureId, workers: usize) -> Vec<(FeatureId, FeatureId)> {
    if min > max {
        return Vec::new();
    }
    let workers = workers.max(1) as u64;
    let span = max - min;
    let step = span / workers + 1;

    let mut ranges = Vec::new();
    let mut from = min;
    loop {
        let to = from.saturating_add(step - 1).min(max);
        ranges.push((from, to));
        if to >= max {
            break;
        }
        from = to + 1;
    }
    ranges
}

/// Dirty sequences seen at the start of a delta cycle.
#[derive(Debug, Clone, Default)]
pub struct DeltaCycle {
    sequences: Vec<DirtySequence>,
}

enum Outcome {
    Exported,
    Deleted,
    Failed,
}

pub struct Regenerator {
    store: Store,
    builder: Arc<LocationReferenceBuilder>,
    config: RoadRefConfig,
    code_values: CodeValueMap,
}

impl Regenerator {
    pub fn new(
        store: Store,
        builder: Arc<LocationReferenceBuilder>,
        config: RoadRefConfig,
        code_values: CodeValueMap,
    ) -> Self {
        Self {
            store,
            builder,
            config,
            code_values,
        }
    }

    fn value_of(&self, feature: &FeatureRecord) -> Option<i64> {
        let attribute = self.config.value_attribute?;
        match feature.property(attribute)? {
            PropertyValue::Code(code) => self.code_values.get(code).copied(),
            PropertyValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Pieces of the road network links covered by the feature, merged,
    /// simplified and converted to WGS84. Uses the same links the location
    /// references are built from.
    fn geometry_of(&self, feature: &FeatureRecord) -> Result<Option<geojson::Value>, RegenerationError> {
        let cache = self.builder.cache();
        let mut pieces = Vec::new();

        for extent in &feature.extents {
            let links = cache.get_links(extent.sequence_id)?;
            for link in links.iter().filter(|l| l.overlaps(extent.start, extent.end)) {
                let span = link.position_span();
                let from = (extent.start.max(link.start_position) - link.start_position) / span;
                let to = (extent.end.min(link.end_position) - link.start_position) / span;
                if let Some(piece) = sub_line(&link.geometry, from, to) {
                    pieces.push(piece);
                }
            }
        }

        Ok(merge_lines(pieces).map(|merged| {
            let simplified = simplify_geometry(&merged, self.config.simplify_tolerance_m);
            geojson::Value::from(&geometry_to_wgs84(&simplified))
        }))
    }

    pub fn export_feature(
        &self,
        feature: &FeatureRecord,
        change: ChangeKind,
    ) -> Result<ExportedFeature, RegenerationError> {
        let geometry = self
            .geometry_of(feature)?
            .ok_or(RegenerationError::NoGeometry {
                type_id: feature.type_id,
                feature_id: feature.id,
            })?;
        let references = self.builder.to_location_references(&feature.extents)?;

        Ok(ExportedFeature {
            type_id: feature.type_id,
            id: feature.id,
            version: feature.version,
            change,
            geometry: Some(geometry),
            references,
            value: self.value_of(feature),
        })
    }

    fn export_into(&self, feature: &FeatureRecord, change: ChangeKind, sink: &dyn FeatureSink) -> bool {
        match self
            .export_feature(feature, change)
            .and_then(|exported| sink.accept(exported))
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to export feature {}/{}: {}",
                    feature.type_id, feature.id, e
                );
                false
            }
        }
    }

    fn export_range(
        &self,
        type_id: FeatureTypeId,
        from: FeatureId,
        to: FeatureId,
        sink: &dyn FeatureSink,
    ) -> RegenerationReport {
        let mut report = RegenerationReport::new(type_id);
        let features = match self.store.find_features_in_range(type_id, from, to) {
            Ok(features) => features,
            Err(e) => {
                error!("Failed to read features {}..={} of type {}: {}", from, to, type_id, e);
                report.failed_ranges += 1;
                return report;
            }
        };

        for feature in &features {
            if self.export_into(feature, ChangeKind::Modified, sink) {
                report.exported += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Exports every feature of a type.
    pub fn run_full(
        &self,
        type_id: FeatureTypeId,
        sink: &dyn FeatureSink,
    ) -> Result<RegenerationReport, RegenerationError> {
        let started = Instant::now();
        let Some((min, max)) = self.store.feature_id_bounds(type_id)? else {
            info!("No features of type {}", type_id);
            return Ok(RegenerationReport::new(type_id));
        };

        let shards = shard_ranges(min, max, self.config.worker_count);
        info!(
            "Full regeneration of type {}: ids {}..={} over {} shards",
            type_id,
            min,
            max,
            shards.len()
        );

        let report = shards
            .par_iter()
            .map(|&(from, to)| self.export_range(type_id, from, to, sink))
            .reduce(|| RegenerationReport::new(type_id), RegenerationReport::merge);
        sink.flush()?;

        self.store.put_setting(
            &format!("last_full_regeneration/{type_id}"),
            &chrono::Utc::now().timestamp(),
        )?;
        info!("Full regeneration of type {} done in {:?}: {:?}", type_id, started.elapsed(), report);
        Ok(report)
    }

    /// Exports features with pending changes, then clears the direct change
    /// markers of the ones that made it into the sink, unless a marker was
    /// rewritten while the run was going on. Sequence markers stay until
    /// `complete_delta_cycle`.
    pub fn run_delta(
        &self,
        type_id: FeatureTypeId,
        sink: &dyn FeatureSink,
    ) -> Result<RegenerationReport, RegenerationError> {
        let started = Instant::now();
        let changes = self.store.get_dirty_feature_changes(type_id)?;
        info!("Delta regeneration of type {}: {} changed features", type_id, changes.len());

        let results: Vec<(FeatureChange, Outcome)> = changes
            .par_iter()
            .map(|change| {
                let current = match change.kind {
                    ChangeKind::Deleted => Ok(None),
                    _ => self.store.find_feature(type_id, change.feature_id),
                };
                let outcome = match current {
                    Ok(Some(feature)) => {
                        if self.export_into(&feature, change.kind, sink) {
                            Outcome::Exported
                        } else {
                            Outcome::Failed
                        }
                    }
                    // Gone from the store, whatever the marker says
                    Ok(None) => match sink.accept(ExportedFeature::tombstone(type_id, change.feature_id)) {
                        Ok(()) => Outcome::Deleted,
                        Err(e) => {
                            error!("Failed to export deletion of {}/{}: {}", type_id, change.feature_id, e);
                            Outcome::Failed
                        }
                    },
                    Err(e) => {
                        error!("Failed to read feature {}/{}: {}", type_id, change.feature_id, e);
                        Outcome::Failed
                    }
                };
                (*change, outcome)
            })
            .collect();

        sink.flush()?;

        let mut report = RegenerationReport::new(type_id);
        let mut done = Vec::new();
        for (change, outcome) in results {
            match outcome {
                Outcome::Exported => report.exported += 1,
                Outcome::Deleted => report.deleted += 1,
                Outcome::Failed => {
                    report.failed += 1;
                    continue;
                }
            }
            done.push(change);
        }
        let kept = self.store.clear_processed_changes(type_id, &done)?;
        if kept > 0 {
            info!("{} features of type {} changed during the run, kept for the next one", kept, type_id);
        }

        info!("Delta regeneration of type {} done in {:?}: {:?}", type_id, started.elapsed(), report);
        Ok(report)
    }

    /// Snapshot of the dirty sequence markers, taken before the first
    /// `run_delta` of a cycle.
    pub fn begin_delta_cycle(&self) -> Result<DeltaCycle, RegenerationError> {
        let sequences = self.store.dirty_sequence_markers()?;
        info!("Delta cycle over {} dirty sequences", sequences.len());
        Ok(DeltaCycle { sequences })
    }

    /// Clears the sequence markers of the cycle once every feature type has
    /// been regenerated. Sequences marked after `begin_delta_cycle` stay.
    /// Nothing is cleared when any run had failures so the affected features
    /// are picked up again next cycle.
    pub fn complete_delta_cycle(
        &self,
        cycle: &DeltaCycle,
        reports: &[RegenerationReport],
    ) -> Result<bool, RegenerationError> {
        if reports.iter().all(RegenerationReport::is_clean) {
            let kept = self.store.clear_sequence_dirty(&cycle.sequences)?;
            if kept > 0 {
                info!("{} sequences were marked dirty again during the cycle", kept);
            }
            self.store.flush()?;
            Ok(true)
        } else {
            warn!("Keeping dirty sequence markers, some features failed to export");
            Ok(false)
        }
    }
}
