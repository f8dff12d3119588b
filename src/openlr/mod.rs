// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Turning feature extents into location references.
//!
//! The graph cache implements the line and node contracts below so the
//! bundled encoder can walk it; the path builder groups extents into
//! connected paths and hands each one to a `LocationEncoder`.

pub mod encoder;
pub mod path;
pub mod path_builder;


use crate::models::{Direction, LinkId, NodeId};
use crate::roadnet::RoadNetError;
use crate::roadnet::classification::{Fow, Frc};
use crate::roadnet::directed_line::DirectedLine;
use crate::roadnet::node::RoadNode;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use encoder::{
    JsonMarshaller, LineLocation, LineLocationReference, LocationEncoder, LocationFactory,
    LocationMarshaller, LocationReferencePoint, LrpEncoder,
};
pub use path::LinePath;
pub use path_builder::LocationReferenceBuilder;

/// A directed edge as seen by the encoder.
pub trait MapLine {
    fn line_id(&self) -> LinkId;
    fn direction(&self) -> Direction;
    fn start_node_id(&self) -> NodeId;
    fn end_node_id(&self) -> NodeId;
    fn length_m(&self) -> f64;
    fn frc(&self) -> Frc;
    fn fow(&self) -> Fow;
    fn projected_geometry(&self) -> &LineString<f64>;
    fn wgs84_geometry(&self) -> LineString<f64>;
}

pub trait MapNode {
    fn node_id(&self) -> NodeId;
    /// Whether a reference point may be anchored here.
    fn is_valid(&self) -> bool;
    fn wgs84_coordinate(&self) -> Coord<f64>;
}

/// Node and edge lookups the encoder needs from the road network.
pub trait RoadGraph: Send + Sync {
    fn node_at(
        &self,
        node: NodeId,
        direction: Direction,
        coordinate: Coord<f64>,
    ) -> Result<Arc<RoadNode>, RoadNetError>;

    fn incoming_lines(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError>;

    fn outgoing_lines(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError>;
}

#[derive(Error, Debug)]
pub enum LocationReferenceError {
    #[error(transparent)]
    RoadNet(#[from] RoadNetError),
    #[error("extent on sequence {sequence_id} has an invalid range {start}..{end}")]
    InvalidExtent {
        sequence_id: u64,
        start: f64,
        end: f64,
    },
    #[error("cannot build a location from an empty path")]
    EmptyPath,
    #[error("encoding failed: {0}")]
    Encoding(String),
    #[error("marshalling failed: {0}")]
    Marshal(#[from] serde_json::Error),
}

/// One transportable location reference. `direction` is relative to the
/// nominal direction of the extents it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedReference {
    pub direction: Direction,
    pub reference: String,
}
