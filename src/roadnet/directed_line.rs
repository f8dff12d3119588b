// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::classification::{Fow, Frc, form_of_way};
use crate::coord_conversion::line_to_wgs84;
use crate::models::{Direction, LinkId, NodeId, RoadLink};
use crate::openlr::MapLine;
use geo::{Coord, LineString};
use std::sync::Arc;

/// A link as seen when travelling in one direction. Reverse lines carry the
/// reversed geometry and swapped nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectedLine {
    pub link: Arc<RoadLink>,
    pub direction: Direction,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub geometry: LineString<f64>,
    pub frc: Frc,
    pub fow: Fow,
    length_m: f64,
}

impl DirectedLine {
    pub fn new(link: Arc<RoadLink>, direction: Direction, frc: Frc) -> Self {
        let (start_node, end_node, geometry) = match direction {
            Direction::Forward => (link.start_node, link.end_node, link.geometry.clone()),
            Direction::Reverse => {
                let mut coords = link.geometry.0.clone();
                coords.reverse();
                (link.end_node, link.start_node, LineString::new(coords))
            }
        };
        Self {
            direction,
            start_node,
            end_node,
            geometry,
            frc,
            fow: form_of_way(link.road_type),
            length_m: link.length_m(),
            link,
        }
    }

    pub fn id(&self) -> LinkId {
        self.link.id
    }

    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    pub fn start_coord(&self) -> Coord<f64> {
        self.geometry.0.first().copied().unwrap_or_default()
    }

    pub fn end_coord(&self) -> Coord<f64> {
        self.geometry.0.last().copied().unwrap_or_default()
    }

    /// Metres from the start of travel to a sequence position, clamped to the link.
    pub fn distance_to_position(&self, position: f64) -> f64 {
        let span = self.link.position_span();
        if span <= 0.0 {
            return 0.0;
        }
        let position = position.clamp(self.link.start_position, self.link.end_position);
        let fraction = match self.direction {
            Direction::Forward => (position - self.link.start_position) / span,
            Direction::Reverse => (self.link.end_position - position) / span,
        };
        fraction * self.length_m
    }
}

impl MapLine for DirectedLine {
    fn line_id(&self) -> LinkId {
        self.link.id
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn start_node_id(&self) -> NodeId {
        self.start_node
    }

    fn end_node_id(&self) -> NodeId {
        self.end_node
    }

    fn length_m(&self) -> f64 {
        self.length_m
    }

    fn frc(&self) -> Frc {
        self.frc
    }

    fn fow(&self) -> Fow {
        self.fow
    }

    fn projected_geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    fn wgs84_geometry(&self) -> LineString<f64> {
        line_to_wgs84(&self.geometry)
    }
}
