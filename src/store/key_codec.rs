// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Fixed-width big-endian key layouts for the store namespaces.
//!
//! Big-endian integers keep the byte order equal to the numeric order, so a
//! prefix scan over `[kind][type]` or `[kind][type][sequence]` visits ids in
//! ascending order.
//!
//! Feature table:
//! - primary:   `[0][type: u32][feature: u64]`
//! - position:  `[1][type: u32][sequence: u64][feature: u64]`
//!
//! Change table:
//! - feature change: `[0][type: u32][feature: u64]`
//! - dirty sequence: `[1][sequence: u64]`

use super::StoreError;
use crate::models::{FeatureId, FeatureTypeId, SequenceId};

pub const PRIMARY_KIND: u8 = 0;
pub const POSITION_KIND: u8 = 1;

pub const FEATURE_CHANGE_KIND: u8 = 0;
pub const DIRTY_SEQUENCE_KIND: u8 = 1;

const PRIMARY_LEN: usize = 1 + 4 + 8;
const POSITION_LEN: usize = 1 + 4 + 8 + 8;
const DIRTY_SEQUENCE_LEN: usize = 1 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKey {
    Primary {
        type_id: FeatureTypeId,
        feature_id: FeatureId,
    },
    Position {
        type_id: FeatureTypeId,
        sequence_id: SequenceId,
        feature_id: FeatureId,
    },
}

impl FeatureKey {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            FeatureKey::Primary {
                type_id,
                feature_id,
            } => {
                let mut key = primary_prefix(type_id);
                key.extend_from_slice(&feature_id.to_be_bytes());
                key
            }
            FeatureKey::Position {
                type_id,
                sequence_id,
                feature_id,
            } => {
                let mut key = position_prefix(type_id, sequence_id);
                key.extend_from_slice(&feature_id.to_be_bytes());
                key
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        match (bytes.first(), bytes.len()) {
            (Some(&PRIMARY_KIND), PRIMARY_LEN) => Ok(FeatureKey::Primary {
                type_id: read_u32(bytes, 1),
                feature_id: read_u64(bytes, 5),
            }),
            (Some(&POSITION_KIND), POSITION_LEN) => Ok(FeatureKey::Position {
                type_id: read_u32(bytes, 1),
                sequence_id: read_u64(bytes, 5),
                feature_id: read_u64(bytes, 13),
            }),
            _ => Err(StoreError::MalformedKey {
                namespace: "features",
                len: bytes.len(),
            }),
        }
    }

    pub fn feature_id(&self) -> FeatureId {
        match *self {
            FeatureKey::Primary { feature_id, .. } | FeatureKey::Position { feature_id, .. } => {
                feature_id
            }
        }
    }
}

pub fn primary_prefix(type_id: FeatureTypeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(PRIMARY_LEN);
    key.push(PRIMARY_KIND);
    key.extend_from_slice(&type_id.to_be_bytes());
    key
}

/// Prefix of every position key of a type. Shorter than [`position_prefix`].
pub fn position_type_prefix(type_id: FeatureTypeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(POSITION_LEN);
    key.push(POSITION_KIND);
    key.extend_from_slice(&type_id.to_be_bytes());
    key
}

pub fn position_prefix(type_id: FeatureTypeId, sequence_id: SequenceId) -> Vec<u8> {
    let mut key = position_type_prefix(type_id);
    key.extend_from_slice(&sequence_id.to_be_bytes());
    key
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKey {
    Feature {
        type_id: FeatureTypeId,
        feature_id: FeatureId,
    },
    Sequence(SequenceId),
}

impl ChangeKey {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ChangeKey::Feature {
                type_id,
                feature_id,
            } => {
                let mut key = feature_change_prefix(type_id);
                key.extend_from_slice(&feature_id.to_be_bytes());
                key
            }
            ChangeKey::Sequence(sequence_id) => {
                let mut key = Vec::with_capacity(DIRTY_SEQUENCE_LEN);
                key.push(DIRTY_SEQUENCE_KIND);
                key.extend_from_slice(&sequence_id.to_be_bytes());
                key
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        match (bytes.first(), bytes.len()) {
            (Some(&FEATURE_CHANGE_KIND), PRIMARY_LEN) => Ok(ChangeKey::Feature {
                type_id: read_u32(bytes, 1),
                feature_id: read_u64(bytes, 5),
            }),
            (Some(&DIRTY_SEQUENCE_KIND), DIRTY_SEQUENCE_LEN) => {
                Ok(ChangeKey::Sequence(read_u64(bytes, 1)))
            }
            _ => Err(StoreError::MalformedKey {
                namespace: "changes",
                len: bytes.len(),
            }),
        }
    }
}

pub fn feature_change_prefix(type_id: FeatureTypeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(PRIMARY_LEN);
    key.push(FEATURE_CHANGE_KIND);
    key.extend_from_slice(&type_id.to_be_bytes());
    key
}

pub fn dirty_sequence_prefix() -> [u8; 1] {
    [DIRTY_SEQUENCE_KIND]
}

pub fn link_key(sequence_id: SequenceId) -> [u8; 8] {
    sequence_id.to_be_bytes()
}

pub fn decode_link_key(bytes: &[u8]) -> Result<SequenceId, StoreError> {
    if bytes.len() != 8 {
        return Err(StoreError::MalformedKey {
            namespace: "links",
            len: bytes.len(),
        });
    }
    Ok(read_u64(bytes, 0))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_be_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(buf)
}
