// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::models::{AttributeTypeId, FeatureTypeId, RoadType, TopologyLevel};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::path::Path;

/// Domain rules for building the road network and exporting features.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoadRefConfig {
    /// Feature type carrying the lane overview of a stretch of road.
    pub lane_feature_type: FeatureTypeId,
    pub lane_overview_attribute: AttributeTypeId,
    /// Feature type carrying the functional road class.
    pub classification_feature_type: FeatureTypeId,
    pub classification_attribute: AttributeTypeId,
    pub allowed_road_types: Vec<RoadType>,
    pub top_level_topology: Vec<TopologyLevel>,
    /// Lanes whose numeric prefix is odd run with the digitised direction.
    pub odd_lanes_forward: bool,
    /// Pass-through nodes between two links longer than this are not reference anchors.
    pub anchor_min_link_length_m: f64,
    pub worst_road_class: u8,
    pub simplify_tolerance_m: f64,
    /// Attribute holding the exported value of a feature (e.g. the speed limit).
    pub value_attribute: Option<AttributeTypeId>,
    pub worker_count: usize,
    /// Date used for link validity checks. Defaults to today.
    pub reference_date: Option<NaiveDate>,
}

impl Default for RoadRefConfig {
    fn default() -> Self {
        Self {
            lane_feature_type: 616,
            lane_overview_attribute: 5528,
            classification_feature_type: 821,
            classification_attribute: 9338,
            allowed_road_types: vec![
                RoadType::Ordinary,
                RoadType::Divided,
                RoadType::Roundabout,
                RoadType::SlipRoad,
                RoadType::TrafficSquare,
            ],
            top_level_topology: vec![TopologyLevel::RoadAndCarriageway, TopologyLevel::Carriageway],
            odd_lanes_forward: true,
            anchor_min_link_length_m: 100.0,
            worst_road_class: 7,
            simplify_tolerance_m: 1.0,
            value_attribute: Some(2021),
            worker_count: 8,
            reference_date: None,
        }
    }
}

impl RoadRefConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RoadRefConfig =
            serde_json::from_str(r#"{ "anchor_min_link_length_m": 50.0, "worker_count": 2 }"#)
                .unwrap();

        assert_eq!(config.anchor_min_link_length_m, 50.0);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.lane_feature_type, 616);
        assert!(config.odd_lanes_forward);
    }
}
