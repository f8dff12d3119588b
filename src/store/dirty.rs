//! Change markers driving incremental regeneration.
//!
//! Direct feature changes are stored explicitly. Changes caused by a link
//! sequence being rebuilt are never stored: they are derived on read by joining
//! the dirty sequence markers against the position index.
//!
//! Every marker value carries a generation taken from the database id
//! generator when it was written:
//! - feature change: `[kind: u8][generation: u64]`
//! - dirty sequence: `[generation: u64]`
//!
//! Clearing compares against the generation that was read, so a marker
//! rewritten in the meantime survives until the next cycle.

use super::key_codec::{ChangeKey, dirty_sequence_prefix, feature_change_prefix};
use super::{Store, StoreError};
use crate::models::{ChangeKind, FeatureChange, FeatureId, FeatureTypeId, SequenceId};
use std::collections::BTreeMap;
use tracing::debug;

/// A dirty sequence marker as read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtySequence {
    pub sequence_id: SequenceId,
    pub generation: u64,
}

/// Combines a pending change with a newer one for the same feature.
fn combine(previous: ChangeKind, next: ChangeKind) -> ChangeKind {
    match (previous, next) {
        (_, ChangeKind::Deleted) => ChangeKind::Deleted,
        (ChangeKind::New, _) => ChangeKind::New,
        (ChangeKind::Deleted, ChangeKind::New) => ChangeKind::Modified,
        (_, next) => next,
    }
}

fn encode_feature_marker(kind: ChangeKind, generation: u64) -> Vec<u8> {
    let mut value = Vec::with_capacity(9);
    value.push(kind.to_byte());
    value.extend_from_slice(&generation.to_be_bytes());
    value
}

fn decode_feature_marker(bytes: &[u8]) -> Option<(ChangeKind, u64)> {
    let (&kind, generation) = bytes.split_first()?;
    Some((
        ChangeKind::from_byte(kind)?,
        u64::from_be_bytes(generation.try_into().ok()?),
    ))
}

fn decode_generation(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

impl Store {
    pub fn mark_sequence_dirty(&self, sequence_ids: &[SequenceId]) -> Result<(), StoreError> {
        let generation = self.db.generate_id()?.to_be_bytes();
        let mut batch = sled::Batch::default();
        for &sequence_id in sequence_ids {
            batch.insert(ChangeKey::Sequence(sequence_id).encode(), &generation[..]);
        }
        self.changes.apply_batch(batch)?;
        Ok(())
    }

    pub fn dirty_sequences(&self) -> Result<Vec<SequenceId>, StoreError> {
        Ok(self
            .dirty_sequence_markers()?
            .into_iter()
            .map(|marker| marker.sequence_id)
            .collect())
    }

    pub fn dirty_sequence_markers(&self) -> Result<Vec<DirtySequence>, StoreError> {
        let mut markers = Vec::new();
        for entry in self.changes.scan_prefix(dirty_sequence_prefix()) {
            let (key, value) = entry?;
            if let ChangeKey::Sequence(sequence_id) = ChangeKey::decode(&key)? {
                let generation = decode_generation(&value).ok_or_else(|| {
                    StoreError::Corrupt(format!("malformed dirty marker for sequence {sequence_id}"))
                })?;
                markers.push(DirtySequence {
                    sequence_id,
                    generation,
                });
            }
        }
        Ok(markers)
    }

    pub fn mark_feature_changed(
        &self,
        type_id: FeatureTypeId,
        changes: &[(FeatureId, ChangeKind)],
    ) -> Result<(), StoreError> {
        let generation = self.db.generate_id()?;
        for &(feature_id, kind) in changes {
            let key = ChangeKey::Feature {
                type_id,
                feature_id,
            }
            .encode();
            self.changes.fetch_and_update(key, |existing| {
                let merged = existing
                    .and_then(decode_feature_marker)
                    .map_or(kind, |(previous, _)| combine(previous, kind));
                Some(encode_feature_marker(merged, generation))
            })?;
        }
        Ok(())
    }

    /// Explicitly recorded changes only.
    pub fn direct_feature_changes(
        &self,
        type_id: FeatureTypeId,
    ) -> Result<Vec<FeatureChange>, StoreError> {
        let mut changes = Vec::new();
        for entry in self.changes.scan_prefix(feature_change_prefix(type_id)) {
            let (key, value) = entry?;
            let ChangeKey::Feature { feature_id, .. } = ChangeKey::decode(&key)? else {
                continue;
            };
            let (kind, generation) = decode_feature_marker(&value).ok_or_else(|| {
                StoreError::Corrupt(format!("unknown change marker for {type_id}/{feature_id}"))
            })?;
            changes.push(FeatureChange {
                type_id,
                feature_id,
                kind,
                generation: Some(generation),
            });
        }
        Ok(changes)
    }

    /// Direct changes, plus every feature positioned on a dirty sequence tagged
    /// as `Modified`. A direct change wins over the derived tag. Ordered by id.
    pub fn get_dirty_feature_changes(
        &self,
        type_id: FeatureTypeId,
    ) -> Result<Vec<FeatureChange>, StoreError> {
        let mut merged: BTreeMap<FeatureId, FeatureChange> = BTreeMap::new();

        for sequence_id in self.dirty_sequences()? {
            for feature_id in self.find_feature_ids_on_sequence(type_id, sequence_id)? {
                merged.insert(
                    feature_id,
                    FeatureChange {
                        type_id,
                        feature_id,
                        kind: ChangeKind::Modified,
                        generation: None,
                    },
                );
            }
        }
        let indirect = merged.len();

        for change in self.direct_feature_changes(type_id)? {
            merged.insert(change.feature_id, change);
        }

        debug!(
            "Type {}: {} dirty features ({} via dirty sequences)",
            type_id,
            merged.len(),
            indirect
        );
        Ok(merged.into_values().collect())
    }

    /// Removes the direct markers of the features, whatever their generation.
    pub fn clear_feature_changes(
        &self,
        type_id: FeatureTypeId,
        feature_ids: &[FeatureId],
    ) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for &feature_id in feature_ids {
            batch.remove(
                ChangeKey::Feature {
                    type_id,
                    feature_id,
                }
                .encode(),
            );
        }
        self.changes.apply_batch(batch)?;
        Ok(())
    }

    /// Removes the direct markers the changes were read from. A marker
    /// rewritten since then is kept. Returns the number of markers kept.
    pub fn clear_processed_changes(
        &self,
        type_id: FeatureTypeId,
        changes: &[FeatureChange],
    ) -> Result<usize, StoreError> {
        let mut kept = 0;
        for change in changes {
            let Some(generation) = change.generation else {
                continue;
            };
            let key = ChangeKey::Feature {
                type_id,
                feature_id: change.feature_id,
            }
            .encode();
            let read = encode_feature_marker(change.kind, generation);
            if self
                .changes
                .compare_and_swap(key, Some(read), None::<&[u8]>)?
                .is_err()
            {
                debug!(
                    "Change marker of {}/{} was rewritten, keeping it",
                    type_id, change.feature_id
                );
                kept += 1;
            }
        }
        Ok(kept)
    }

    pub fn clear_all_sequence_dirty(&self) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for entry in self.changes.scan_prefix(dirty_sequence_prefix()) {
            let (key, _) = entry?;
            batch.remove(key);
        }
        self.changes.apply_batch(batch)?;
        Ok(())
    }

    /// Removes the given sequence markers unless they were marked again after
    /// being read. Returns the number of markers kept.
    pub fn clear_sequence_dirty(&self, markers: &[DirtySequence]) -> Result<usize, StoreError> {
        let mut kept = 0;
        for marker in markers {
            let swapped = self.changes.compare_and_swap(
                ChangeKey::Sequence(marker.sequence_id).encode(),
                Some(marker.generation.to_be_bytes()),
                None::<&[u8]>,
            )?;
            if swapped.is_err() {
                debug!("Sequence {} was marked dirty again, keeping it", marker.sequence_id);
                kept += 1;
            }
        }
        Ok(kept)
    }
}
