// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{LinePath, LocationReferenceError, MapLine, MapNode, RoadGraph};
use crate::geometry_utils::bearing_deg;
use crate::roadnet::classification::{Fow, Frc};
use crate::roadnet::directed_line::DirectedLine;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Distance along a line used to compute reference point bearings.
pub const BEARING_DISTANCE_M: f64 = 20.0;
/// Longest stretch allowed between two consecutive reference points.
pub const MAX_POINT_DISTANCE_M: f64 = 15_000.0;

/// A validated line location ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct LineLocation {
    pub lines: Vec<Arc<DirectedLine>>,
    pub positive_offset_m: f64,
    pub negative_offset_m: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocationFactory;

impl LocationFactory {
    /// Offsets are clamped so that the trimmed location never has a
    /// negative length.
    pub fn create(&self, path: &LinePath) -> Result<LineLocation, LocationReferenceError> {
        if path.lines.is_empty() {
            return Err(LocationReferenceError::EmptyPath);
        }
        let length = path.length_m();
        let positive_offset_m = path.positive_offset_m.clamp(0.0, length);
        let negative_offset_m = path.negative_offset_m.clamp(0.0, length - positive_offset_m);

        Ok(LineLocation {
            lines: path.lines.clone(),
            positive_offset_m,
            negative_offset_m,
        })
    }
}

pub trait LocationEncoder: Send + Sync {
    type Location;

    fn encode(
        &self,
        location: &LineLocation,
        graph: &dyn RoadGraph,
    ) -> Result<Self::Location, LocationReferenceError>;
}

pub trait LocationMarshaller<L>: Send + Sync {
    fn marshal(&self, location: &L) -> Result<String, LocationReferenceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReferencePoint {
    pub lon: f64,
    pub lat: f64,
    pub bearing: f64,
    pub frc: Frc,
    pub fow: Fow,
    /// Zero on the last point.
    pub distance_to_next_m: f64,
    /// Least important road class up to the next point; `None` on the last point.
    pub lowest_frc_to_next: Option<Frc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineLocationReference {
    pub points: Vec<LocationReferencePoint>,
    pub positive_offset_m: f64,
    pub negative_offset_m: f64,
}

/// Places reference points at the start of the location, at every valid node
/// along it, and at its end. Invalid nodes are skipped unless the stretch
/// since the previous point would otherwise get too long.
#[derive(Debug, Clone, Copy, Default)]
pub struct LrpEncoder;

impl LrpEncoder {
    /// Indexes of the lines that start a new reference point.
    fn anchor_lines(
        &self,
        lines: &[Arc<DirectedLine>],
        graph: &dyn RoadGraph,
    ) -> Result<Vec<usize>, LocationReferenceError> {
        let mut anchors = vec![0];
        let mut since_anchor = lines[0].length_m();

        for (index, line) in lines.iter().enumerate().skip(1) {
            let node = graph.node_at(line.start_node_id(), line.direction(), line.start_coord())?;
            if node.is_valid() || since_anchor + line.length_m() > MAX_POINT_DISTANCE_M {
                anchors.push(index);
                since_anchor = 0.0;
            }
            since_anchor += line.length_m();
        }
        Ok(anchors)
    }
}

impl LocationEncoder for LrpEncoder {
    type Location = LineLocationReference;

    fn encode(
        &self,
        location: &LineLocation,
        graph: &dyn RoadGraph,
    ) -> Result<LineLocationReference, LocationReferenceError> {
        let lines = &location.lines;
        let Some(last) = lines.last() else {
            return Err(LocationReferenceError::EmptyPath);
        };

        let anchors = self.anchor_lines(lines, graph)?;
        let mut points = Vec::with_capacity(anchors.len() + 1);

        for (i, &first) in anchors.iter().enumerate() {
            let until = anchors.get(i + 1).copied().unwrap_or(lines.len());
            let stretch = &lines[first..until];
            let line = &lines[first];
            let node = graph.node_at(line.start_node_id(), line.direction(), line.start_coord())?;
            let coordinate = node.wgs84_coordinate();

            points.push(LocationReferencePoint {
                lon: coordinate.x,
                lat: coordinate.y,
                bearing: bearing_deg(line.projected_geometry(), BEARING_DISTANCE_M, false),
                frc: line.frc(),
                fow: line.fow(),
                distance_to_next_m: stretch.iter().map(|l| l.length_m()).sum(),
                lowest_frc_to_next: stretch.iter().map(|l| l.frc()).max(),
            });
        }

        let end = graph.node_at(last.end_node_id(), last.direction(), last.end_coord())?;
        let coordinate = end.wgs84_coordinate();
        points.push(LocationReferencePoint {
            lon: coordinate.x,
            lat: coordinate.y,
            bearing: bearing_deg(last.projected_geometry(), BEARING_DISTANCE_M, true),
            frc: last.frc(),
            fow: last.fow(),
            distance_to_next_m: 0.0,
            lowest_frc_to_next: None,
        });

        Ok(LineLocationReference {
            points,
            positive_offset_m: location.positive_offset_m,
            negative_offset_m: location.negative_offset_m,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl<L: Serialize + Send + Sync> LocationMarshaller<L> for JsonMarshaller {
    fn marshal(&self, location: &L) -> Result<String, LocationReferenceError> {
        Ok(serde_json::to_string(location)?)
    }
}

impl JsonMarshaller {
    pub fn unmarshal<L: DeserializeOwned>(&self, reference: &str) -> Result<L, LocationReferenceError> {
        Ok(serde_json::from_str(reference)?)
    }
}
