// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use chrono::NaiveDate;
use geo::{EuclideanLength, LineString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type SequenceId = u64;
pub type NodeId = u64;
pub type FeatureId = u64;
pub type FeatureTypeId = u32;
pub type AttributeTypeId = u32;

/// Traversal direction relative to the digitised direction of a link sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId {
    pub sequence_id: SequenceId,
    pub link_number: u32,
}

impl LinkId {
    pub fn new(sequence_id: SequenceId, link_number: u32) -> Self {
        Self {
            sequence_id,
            link_number,
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sequence_id, self.link_number)
    }
}

/// Topology level of a link. Divided roads carry an abstract `Road` centre line
/// plus one `Carriageway` per driving direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyLevel {
    Road,
    RoadAndCarriageway,
    Carriageway,
    Lane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadType {
    Ordinary,
    Divided,
    Roundabout,
    SlipRoad,
    TrafficSquare,
    Parking,
    ServiceRoad,
    Ferry,
    PedestrianPath,
    CyclePath,
    Stairs,
    Other,
}

/// Half-open validity window `[from, to)`. An open `to` means currently valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

impl Validity {
    pub fn open_from(from: NaiveDate) -> Self {
        Self { from, to: None }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && self.to.is_none_or(|to| date < to)
    }
}

/// Back-reference from a connector link to the stretch of a parent sequence it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperPosition {
    pub sequence_id: SequenceId,
    pub start: f64,
    pub end: f64,
}

/// One link of a road-link sequence. Geometry is stored in the projected
/// national grid (UTM 33N, metres).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadLink {
    pub id: LinkId,
    pub validity: Validity,
    pub start_position: f64,
    pub end_position: f64,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub geometry: LineString<f64>,
    pub road_type: RoadType,
    pub topology_level: TopologyLevel,
    pub connector: bool,
    pub lane_overview: Option<Vec<String>>,
    pub super_position: Option<SuperPosition>,
}

impl RoadLink {
    pub fn length_m(&self) -> f64 {
        self.geometry.euclidean_length()
    }

    pub fn position_span(&self) -> f64 {
        self.end_position - self.start_position
    }

    /// True when the link shares a stretch of positive length with `[start, end)`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start < self.end_position && end > self.start_position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
    Middle,
}

/// A feature's location on a link sequence, as fractions of the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearExtent {
    pub sequence_id: SequenceId,
    pub start: f64,
    pub end: f64,
    pub direction: Option<Direction>,
    pub side: Option<Side>,
    pub lanes: Vec<String>,
}

impl LinearExtent {
    pub fn new(sequence_id: SequenceId, start: f64, end: f64) -> Self {
        Self {
            sequence_id,
            start,
            end,
            direction: None,
            side: None,
            lanes: Vec::new(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn nominal_direction(&self) -> Direction {
        self.direction.unwrap_or(Direction::Forward)
    }

    pub fn is_well_formed(&self) -> bool {
        0.0 <= self.start && self.start < self.end && self.end <= 1.0
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && self.end > start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Code(u32),
    TextList(Vec<String>),
}

impl PropertyValue {
    pub fn as_code(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(v) => Some(*v),
            PropertyValue::Code(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

/// A feature positioned on the road network (speed limit, lane stretch, road class, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: FeatureId,
    pub type_id: FeatureTypeId,
    pub version: u32,
    pub validity: Validity,
    pub extents: Vec<LinearExtent>,
    pub properties: BTreeMap<AttributeTypeId, PropertyValue>,
}

impl FeatureRecord {
    pub fn sequence_ids(&self) -> BTreeSet<SequenceId> {
        self.extents.iter().map(|e| e.sequence_id).collect()
    }

    pub fn extents_on(&self, sequence_id: SequenceId) -> Vec<LinearExtent> {
        self.extents
            .iter()
            .filter(|e| e.sequence_id == sequence_id)
            .cloned()
            .collect()
    }

    pub fn overlaps(&self, sequence_id: SequenceId, start: f64, end: f64) -> bool {
        self.extents
            .iter()
            .any(|e| e.sequence_id == sequence_id && e.overlaps(start, end))
    }

    pub fn property(&self, attribute: AttributeTypeId) -> Option<&PropertyValue> {
        self.properties.get(&attribute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn to_byte(self) -> u8 {
        match self {
            ChangeKind::New => 0,
            ChangeKind::Modified => 1,
            ChangeKind::Deleted => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ChangeKind::New),
            1 => Some(ChangeKind::Modified),
            2 => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureChange {
    pub type_id: FeatureTypeId,
    pub feature_id: FeatureId,
    pub kind: ChangeKind,
    /// Generation of the stored direct marker this change was read from.
    /// `None` when the change only derives from a dirty sequence.
    pub generation: Option<u64>,
}
