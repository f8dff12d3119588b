// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Fixtures shared by the unit tests.

use crate::config::RoadRefConfig;
use crate::models::*;
use chrono::NaiveDate;
use geo::{Coord, LineString};
use std::collections::BTreeMap;

pub const LANE_TYPE: FeatureTypeId = 616;
pub const LANE_ATTRIBUTE: AttributeTypeId = 5528;
pub const CLASS_TYPE: FeatureTypeId = 821;
pub const CLASS_ATTRIBUTE: AttributeTypeId = 9338;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Config with a fixed reference date inside every fixture's validity.
pub fn test_config() -> RoadRefConfig {
    RoadRefConfig {
        reference_date: Some(date(2024, 6, 1)),
        worker_count: 2,
        ..RoadRefConfig::default()
    }
}

/// Position `p` on sequence `seq` sits at 1000 m per unit of position along x.
/// Sequences are laid out on separate rows.
pub fn point_on(sequence_id: SequenceId, position: f64) -> Coord<f64> {
    Coord {
        x: 500_000.0 + position * 1000.0,
        y: 6_600_000.0 + sequence_id as f64 * 10_000.0,
    }
}

/// Straight two-way link with lanes `["1", "2"]`.
pub fn link(
    sequence_id: SequenceId,
    link_number: u32,
    start: f64,
    end: f64,
    start_node: NodeId,
    end_node: NodeId,
) -> RoadLink {
    RoadLink {
        id: LinkId::new(sequence_id, link_number),
        validity: Validity::open_from(date(2020, 1, 1)),
        start_position: start,
        end_position: end,
        start_node,
        end_node,
        geometry: LineString::new(vec![point_on(sequence_id, start), point_on(sequence_id, end)]),
        road_type: RoadType::Ordinary,
        topology_level: TopologyLevel::RoadAndCarriageway,
        connector: false,
        lane_overview: Some(vec!["1".to_string(), "2".to_string()]),
        super_position: None,
    }
}

pub fn feature_on(type_id: FeatureTypeId, id: FeatureId, extents: &[(SequenceId, f64, f64)]) -> FeatureRecord {
    FeatureRecord {
        id,
        type_id,
        version: 1,
        validity: Validity::open_from(date(2020, 1, 1)),
        extents: extents
            .iter()
            .map(|&(sequence_id, start, end)| LinearExtent::new(sequence_id, start, end))
            .collect(),
        properties: BTreeMap::new(),
    }
}

pub fn lane_feature(id: FeatureId, sequence_id: SequenceId, start: f64, end: f64, lanes: &[&str]) -> FeatureRecord {
    let mut feature = feature_on(LANE_TYPE, id, &[(sequence_id, start, end)]);
    feature.properties.insert(
        LANE_ATTRIBUTE,
        PropertyValue::TextList(lanes.iter().map(|l| l.to_string()).collect()),
    );
    feature
}

pub fn class_feature(id: FeatureId, sequence_id: SequenceId, start: f64, end: f64, code: u32) -> FeatureRecord {
    let mut feature = feature_on(CLASS_TYPE, id, &[(sequence_id, start, end)]);
    feature.properties.insert(CLASS_ATTRIBUTE, PropertyValue::Code(code));
    feature
}
