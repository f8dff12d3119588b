// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Persistent store for road links, positioned features and change markers.
//!
//! Backed by one `sled` database with a tree per namespace. Features live in a
//! single tree holding both the primary record and a position index keyed by
//! sequence (see [`key_codec`]); every write touching both goes through one
//! transaction on that tree.

pub mod dirty;
pub mod key_codec;

use crate::models::{FeatureId, FeatureRecord, FeatureTypeId, LinearExtent, RoadLink, SequenceId};
use ahash::AHashMap as HashMap;
use key_codec::{FeatureKey, decode_link_key, link_key, position_prefix, primary_prefix};
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const LINKS_NAMESPACE: &str = "links";
pub const FEATURES_NAMESPACE: &str = "features";
pub const CHANGES_NAMESPACE: &str = "changes";
pub const SETTINGS_NAMESPACE: &str = "settings";

const NAMESPACES: [&str; 4] = [
    LINKS_NAMESPACE,
    FEATURES_NAMESPACE,
    CHANGES_NAMESPACE,
    SETTINGS_NAMESPACE,
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Engine(#[from] sled::Error),
    #[error("namespace '{0}' is missing from the store")]
    MissingNamespace(String),
    #[error("malformed key in namespace '{namespace}' ({len} bytes)")]
    MalformedKey { namespace: &'static str, len: usize },
    #[error("failed to encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode record: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(e: TransactionError<StoreError>) -> Self {
        match e {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(engine) => StoreError::Engine(engine),
        }
    }
}

pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::standard(),
    )?)
}

pub(crate) fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

fn verify_namespaces(db: &sled::Db) -> Result<(), StoreError> {
    let names = db.tree_names();
    for namespace in NAMESPACES {
        if !names.iter().any(|name| name.as_ref() == namespace.as_bytes()) {
            return Err(StoreError::MissingNamespace(namespace.to_string()));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    links: sled::Tree,
    features: sled::Tree,
    changes: sled::Tree,
    settings: sled::Tree,
}

impl Store {
    /// Opens an existing store. Every namespace must already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        verify_namespaces(&db)?;
        info!("Opened store at {}", path.as_ref().display());
        Self::from_db(db)
    }

    /// Opens a store, creating any missing namespace.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store that is removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            links: db.open_tree(LINKS_NAMESPACE)?,
            features: db.open_tree(FEATURES_NAMESPACE)?,
            changes: db.open_tree(CHANGES_NAMESPACE)?,
            settings: db.open_tree(SETTINGS_NAMESPACE)?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // --- Road links ---

    pub fn upsert_links(&self, sequence_id: SequenceId, links: &[RoadLink]) -> Result<(), StoreError> {
        self.links
            .insert(link_key(sequence_id).to_vec(), encode_value(&links)?)?;
        Ok(())
    }

    pub fn delete_links(&self, sequence_id: SequenceId) -> Result<(), StoreError> {
        self.links.remove(link_key(sequence_id))?;
        Ok(())
    }

    pub fn get_links(&self, sequence_id: SequenceId) -> Result<Option<Vec<RoadLink>>, StoreError> {
        self.links
            .get(link_key(sequence_id))?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    pub fn get_all_links(&self) -> Result<HashMap<SequenceId, Vec<RoadLink>>, StoreError> {
        let mut all = HashMap::new();
        for entry in self.links.iter() {
            let (key, value) = entry?;
            all.insert(decode_link_key(&key)?, decode_value(&value)?);
        }
        Ok(all)
    }

    // --- Features ---

    /// Writes the record and its position keys in one transaction. Position
    /// keys for sequences the previous version occupied but this one does not
    /// are removed; the previous version is read inside the same transaction.
    pub fn upsert_feature(&self, feature: &FeatureRecord) -> Result<(), StoreError> {
        let type_id = feature.type_id;
        let primary_key = FeatureKey::Primary {
            type_id,
            feature_id: feature.id,
        }
        .encode();
        let record = encode_value(feature)?;
        let new_sequences = feature.sequence_ids();
        let mut positions = Vec::with_capacity(new_sequences.len());
        for &sequence_id in &new_sequences {
            let extents: Vec<LinearExtent> = feature.extents_on(sequence_id);
            positions.push((
                FeatureKey::Position {
                    type_id,
                    sequence_id,
                    feature_id: feature.id,
                }
                .encode(),
                encode_value(&extents)?,
            ));
        }

        self.features.transaction(|tx| {
            let previous: Option<FeatureRecord> = match tx.get(primary_key.as_slice())? {
                Some(bytes) => Some(decode_value(&bytes).map_err(ConflictableTransactionError::Abort)?),
                None => None,
            };

            tx.insert(primary_key.as_slice(), record.as_slice())?;
            for (key, value) in &positions {
                tx.insert(key.as_slice(), value.as_slice())?;
            }
            if let Some(previous) = previous {
                for stale in previous.sequence_ids().difference(&new_sequences) {
                    tx.remove(
                        FeatureKey::Position {
                            type_id,
                            sequence_id: *stale,
                            feature_id: feature.id,
                        }
                        .encode(),
                    )?;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn delete_feature(&self, type_id: FeatureTypeId, feature_id: FeatureId) -> Result<bool, StoreError> {
        let primary_key = FeatureKey::Primary {
            type_id,
            feature_id,
        }
        .encode();

        let deleted = self.features.transaction(|tx| {
            let Some(bytes) = tx.remove(primary_key.as_slice())? else {
                return Ok(false);
            };
            let previous: FeatureRecord =
                decode_value(&bytes).map_err(ConflictableTransactionError::Abort)?;
            for sequence_id in previous.sequence_ids() {
                tx.remove(
                    FeatureKey::Position {
                        type_id,
                        sequence_id,
                        feature_id,
                    }
                    .encode(),
                )?;
            }
            Ok(true)
        })?;
        Ok(deleted)
    }

    pub fn find_feature(
        &self,
        type_id: FeatureTypeId,
        feature_id: FeatureId,
    ) -> Result<Option<FeatureRecord>, StoreError> {
        self.features
            .get(
                FeatureKey::Primary {
                    type_id,
                    feature_id,
                }
                .encode(),
            )?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Ids of the features of a type positioned on the sequence, via a prefix scan
    /// of the position index.
    pub fn find_feature_ids_on_sequence(
        &self,
        type_id: FeatureTypeId,
        sequence_id: SequenceId,
    ) -> Result<Vec<FeatureId>, StoreError> {
        let mut ids = Vec::new();
        for entry in self.features.scan_prefix(position_prefix(type_id, sequence_id)) {
            let (key, _) = entry?;
            ids.push(FeatureKey::decode(&key)?.feature_id());
        }
        Ok(ids)
    }

    pub fn find_features_overlapping_sequence(
        &self,
        type_id: FeatureTypeId,
        sequence_id: SequenceId,
    ) -> Result<Vec<FeatureRecord>, StoreError> {
        let mut features = Vec::new();
        for feature_id in self.find_feature_ids_on_sequence(type_id, sequence_id)? {
            match self.find_feature(type_id, feature_id)? {
                Some(feature) => features.push(feature),
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "position key for {type_id}/{feature_id} on sequence {sequence_id} has no record"
                    )));
                }
            }
        }
        Ok(features)
    }

    pub fn all_features(&self, type_id: FeatureTypeId) -> Result<Vec<FeatureRecord>, StoreError> {
        let mut features = Vec::new();
        for entry in self.features.scan_prefix(primary_prefix(type_id)) {
            let (_, value) = entry?;
            features.push(decode_value(&value)?);
        }
        Ok(features)
    }

    /// All features of a type grouped by every sequence they are positioned on.
    pub fn features_by_sequence(
        &self,
        type_id: FeatureTypeId,
    ) -> Result<HashMap<SequenceId, Vec<FeatureRecord>>, StoreError> {
        let mut grouped: HashMap<SequenceId, Vec<FeatureRecord>> = HashMap::new();
        for feature in self.all_features(type_id)? {
            let sequences: BTreeSet<SequenceId> = feature.sequence_ids();
            for sequence_id in sequences {
                grouped.entry(sequence_id).or_default().push(feature.clone());
            }
        }
        debug!(
            "Grouped features of type {} over {} sequences",
            type_id,
            grouped.len()
        );
        Ok(grouped)
    }

    /// Lowest and highest feature id of a type, if any feature exists.
    pub fn feature_id_bounds(
        &self,
        type_id: FeatureTypeId,
    ) -> Result<Option<(FeatureId, FeatureId)>, StoreError> {
        let mut iter = self.features.scan_prefix(primary_prefix(type_id));
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let (first_key, _) = first?;
        let first_id = FeatureKey::decode(&first_key)?.feature_id();
        let last_id = match iter.next_back() {
            Some(last) => FeatureKey::decode(&last?.0)?.feature_id(),
            None => first_id,
        };
        Ok(Some((first_id, last_id)))
    }

    /// Features with ids in `from_id..=to_id`.
    pub fn find_features_in_range(
        &self,
        type_id: FeatureTypeId,
        from_id: FeatureId,
        to_id: FeatureId,
    ) -> Result<Vec<FeatureRecord>, StoreError> {
        let start = FeatureKey::Primary {
            type_id,
            feature_id: from_id,
        }
        .encode();
        let end = FeatureKey::Primary {
            type_id,
            feature_id: to_id,
        }
        .encode();

        let mut features = Vec::new();
        for entry in self.features.range(start..=end) {
            let (_, value) = entry?;
            features.push(decode_value(&value)?);
        }
        Ok(features)
    }

    // --- Settings ---

    pub fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.settings.insert(key.as_bytes(), encode_value(value)?)?;
        Ok(())
    }

    pub fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.settings
            .get(key.as_bytes())?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }
}
