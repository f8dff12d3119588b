// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::path::{CoordKey, LinePath, coord_key};
use super::{
    EncodedReference, JsonMarshaller, LocationEncoder, LocationFactory, LocationMarshaller,
    LocationReferenceError, LrpEncoder,
};
use crate::models::{Direction, LinearExtent};
use crate::roadnet::RoadNetCache;
use crate::roadnet::directed_line::DirectedLine;
use ahash::AHashMap as HashMap;
use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

/// Builds location references for feature extents against the graph cache.
/// Holds no mutable state of its own and can be shared across threads.
pub struct LocationReferenceBuilder<E = LrpEncoder, M = JsonMarshaller> {
    cache: Arc<RoadNetCache>,
    factory: LocationFactory,
    encoder: E,
    marshaller: M,
}

impl LocationReferenceBuilder<LrpEncoder, JsonMarshaller> {
    pub fn with_defaults(cache: Arc<RoadNetCache>) -> Self {
        Self::new(cache, LrpEncoder, JsonMarshaller)
    }
}

impl<E, M> LocationReferenceBuilder<E, M>
where
    E: LocationEncoder,
    M: LocationMarshaller<E::Location>,
{
    pub fn new(cache: Arc<RoadNetCache>, encoder: E, marshaller: M) -> Self {
        Self {
            cache,
            factory: LocationFactory,
            encoder,
            marshaller,
        }
    }

    pub fn cache(&self) -> &Arc<RoadNetCache> {
        &self.cache
    }

    /// One reference per connected path, forward references first.
    pub fn to_location_references(
        &self,
        extents: &[LinearExtent],
    ) -> Result<Vec<EncodedReference>, LocationReferenceError> {
        let (forward, reverse) = self.build_paths(extents)?;

        let mut references = Vec::new();
        for (direction, paths) in [(Direction::Forward, forward), (Direction::Reverse, reverse)] {
            for path in merge_connected(order_by_connectivity(paths)) {
                let location = self.factory.create(&path)?;
                let encoded = self.encoder.encode(&location, self.cache.as_ref())?;
                references.push(EncodedReference {
                    direction,
                    reference: self.marshaller.marshal(&encoded)?,
                });
            }
        }
        Ok(references)
    }

    /// Unmerged per-run paths for every extent, once along the nominal
    /// direction and once against it.
    pub fn build_paths(
        &self,
        extents: &[LinearExtent],
    ) -> Result<(Vec<LinePath>, Vec<LinePath>), LocationReferenceError> {
        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        for extent in extents {
            let nominal = extent.nominal_direction();
            forward.extend(self.paths_for_extent(extent, nominal)?);
            reverse.extend(self.paths_for_extent(extent, nominal.opposite())?);
        }
        // The reverse runs were collected walking against the extents
        reverse.reverse();
        Ok((forward, reverse))
    }

    /// Connected runs of the extent's links that permit `direction`, trimmed to
    /// the extent.
    pub fn paths_for_extent(
        &self,
        extent: &LinearExtent,
        direction: Direction,
    ) -> Result<Vec<LinePath>, LocationReferenceError> {
        if !extent.is_well_formed() {
            return Err(LocationReferenceError::InvalidExtent {
                sequence_id: extent.sequence_id,
                start: extent.start,
                end: extent.end,
            });
        }

        let mut lines: Vec<Arc<DirectedLine>> = Vec::new();
        for link in self.cache.get_links(extent.sequence_id)? {
            if link.overlaps(extent.start, extent.end) && self.cache.has_direction(link.id, direction)? {
                lines.push(self.cache.directed_line(link.id, direction)?);
            }
        }
        if direction == Direction::Reverse {
            lines.reverse();
        }

        let (entry, exit) = match direction {
            Direction::Forward => (extent.start, extent.end),
            Direction::Reverse => (extent.end, extent.start),
        };

        let runs = lines.into_iter().map(|line| vec![line]).coalesce(|mut run, next| {
            let touches = match (run.last(), next.first()) {
                (Some(prev), Some(line)) => coord_key(prev.end_coord()) == coord_key(line.start_coord()),
                _ => false,
            };
            if touches {
                run.extend(next);
                Ok(run)
            } else {
                Err((run, next))
            }
        });

        let paths: Vec<LinePath> = runs
            .filter_map(|run| {
                let first = run.first()?;
                let last = run.last()?;
                let positive = first.distance_to_position(entry);
                let negative = last.length_m() - last.distance_to_position(exit);
                Some(LinePath::new(run, positive, negative))
            })
            .collect();

        if paths.is_empty() {
            debug!(
                "Extent {}..{} on sequence {} has no {:?} links in the road network",
                extent.start, extent.end, extent.sequence_id, direction
            );
        }
        Ok(paths)
    }
}

/// Orders paths so each is followed by the one starting where it ends where
/// possible. Chains are walked from paths whose start is not another path's
/// end; anything left over (cycles) is appended in input order.
pub fn order_by_connectivity(paths: Vec<LinePath>) -> Vec<LinePath> {
    let ends: ahash::AHashSet<CoordKey> = paths.iter().filter_map(LinePath::end_key).collect();
    let mut by_start: HashMap<CoordKey, Vec<usize>> = HashMap::new();
    for (index, path) in paths.iter().enumerate() {
        if let Some(start) = path.start_key() {
            by_start.entry(start).or_default().push(index);
        }
    }

    let mut visited = vec![false; paths.len()];
    let mut order = Vec::with_capacity(paths.len());

    let follow = |root: usize, visited: &mut Vec<bool>, order: &mut Vec<usize>| {
        let mut current = Some(root);
        while let Some(index) = current.take() {
            if visited[index] {
                break;
            }
            visited[index] = true;
            order.push(index);
            current = paths[index]
                .end_key()
                .and_then(|end| by_start.get(&end))
                .and_then(|next| next.iter().copied().find(|&n| !visited[n]));
        }
    };

    for index in 0..paths.len() {
        let is_root = paths[index].start_key().is_none_or(|start| !ends.contains(&start));
        if is_root && !visited[index] {
            follow(index, &mut visited, &mut order);
        }
    }
    for index in 0..paths.len() {
        if !visited[index] {
            follow(index, &mut visited, &mut order);
        }
    }

    let mut slots: Vec<Option<LinePath>> = paths.into_iter().map(Some).collect();
    order.into_iter().filter_map(|index| slots[index].take()).collect()
}

/// Joins runs of consecutive paths whose trimmed coverage meets end to start.
/// Paths that share a node but leave part of a line uncovered stay apart.
pub fn merge_connected(paths: Vec<LinePath>) -> Vec<LinePath> {
    paths
        .into_iter()
        .map(|path| vec![path])
        .coalesce(|mut group, next| {
            let connected = match (group.last(), next.first()) {
                (Some(prev), Some(path)) => prev.continues_into(path),
                _ => false,
            };
            if connected {
                group.extend(next);
                Ok(group)
            } else {
                Err((group, next))
            }
        })
        .filter_map(LinePath::join)
        .collect()
}
