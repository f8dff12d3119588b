// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::coord_conversion::coord_to_wgs84;
use crate::models::{Direction, NodeId};
use crate::openlr::MapNode;
use geo::Coord;

/// A graph node with its anchor validity resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub id: NodeId,
    pub direction: Direction,
    /// Projected (UTM 33N) position.
    pub coordinate: Coord<f64>,
    pub degree: usize,
    pub valid: bool,
}

/// A node is a usable reference anchor unless it merely joins two links that
/// are both longer than `min_link_length_m`.
pub fn is_valid_anchor(incident_lengths_m: &[f64], min_link_length_m: f64) -> bool {
    !(incident_lengths_m.len() == 2 && incident_lengths_m.iter().all(|&l| l > min_link_length_m))
}

impl MapNode for RoadNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn wgs84_coordinate(&self) -> Coord<f64> {
        coord_to_wgs84(self.coordinate)
    }
}
