// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! In-memory directed road network built once from the store.
//!
//! The build resolves per-link lane overview (and from it the allowed travel
//! directions) and functional road class from the supporting feature layers,
//! then registers every relevant link in per-direction adjacency maps. After
//! the build the maps are frozen behind an `Arc` and read without locking;
//! only the directed-line and node memo caches are filled lazily.

pub mod classification;
pub mod directed_line;
pub mod lane_overview;
pub mod node;

#[cfg(test)]
mod roadnet_tests;

use crate::config::RoadRefConfig;
use crate::models::{Direction, FeatureRecord, LinkId, NodeId, RoadLink, SequenceId};
use crate::openlr::RoadGraph;
use crate::store::{Store, StoreError};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use classification::{Frc, resolve_road_class};
use dashmap::DashMap;
use directed_line::DirectedLine;
use geo::Coord;
use lane_overview::{AllowedDirections, directions_from_lane_overview, resolve_lane_overview};
use node::{RoadNode, is_valid_anchor};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum RoadNetError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("link {link}: lane overview {lanes:?} does not give a usable direction")]
    InvalidLaneParity { link: LinkId, lanes: Vec<String> },
    #[error("link {link}: lane '{lane}' has no lane number")]
    MalformedLane { link: LinkId, lane: String },
    #[error("missing data: {0}")]
    MissingData(String),
    #[error("road network is not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone)]
struct ResolvedLink {
    link: Arc<RoadLink>,
    directions: AllowedDirections,
    frc: Frc,
}

/// Frozen result of the build.
#[derive(Debug, Default)]
struct RoadNetSnapshot {
    known_sequences: HashSet<SequenceId>,
    links_by_sequence: HashMap<SequenceId, Vec<Arc<RoadLink>>>,
    resolved: HashMap<LinkId, ResolvedLink>,
    /// Indexed by `Direction::index()`, keyed by the node a line leaves from.
    outgoing: [HashMap<NodeId, Vec<LinkId>>; 2],
    /// Indexed by `Direction::index()`, keyed by the node a line arrives at.
    incoming: [HashMap<NodeId, Vec<LinkId>>; 2],
}

fn freeze(map: DashMap<NodeId, Vec<LinkId>>) -> HashMap<NodeId, Vec<LinkId>> {
    map.into_iter()
        .map(|(node, mut links)| {
            links.sort_unstable();
            (node, links)
        })
        .collect()
}

fn empty_features() -> &'static [FeatureRecord] {
    &[]
}

impl RoadNetSnapshot {
    fn build(store: &Store, config: &RoadRefConfig) -> Result<Self, RoadNetError> {
        let (links, (lane_features, class_features)) = rayon::join(
            || store.get_all_links(),
            || {
                rayon::join(
                    || store.features_by_sequence(config.lane_feature_type),
                    || store.features_by_sequence(config.classification_feature_type),
                )
            },
        );
        let links = links?;
        let lane_features = lane_features?;
        let class_features = class_features?;
        info!(
            "Loaded {} link sequences, lane features on {} sequences, road class features on {} sequences",
            links.len(),
            lane_features.len(),
            class_features.len()
        );

        let today = config.today();
        let resolved: DashMap<LinkId, ResolvedLink> = DashMap::new();
        let outgoing = [DashMap::new(), DashMap::new()];
        let incoming = [DashMap::new(), DashMap::new()];
        let excluded = AtomicUsize::new(0);

        let sequences: Vec<(&SequenceId, &Vec<RoadLink>)> = links.iter().collect();
        sequences
            .par_iter()
            .try_for_each(|&(sequence_id, sequence_links)| -> Result<(), RoadNetError> {
                let own_lanes = lane_features
                    .get(sequence_id)
                    .map_or(empty_features(), Vec::as_slice);
                let own_classes = class_features
                    .get(sequence_id)
                    .map_or(empty_features(), Vec::as_slice);

                for link in sequence_links {
                    let relevant = config.top_level_topology.contains(&link.topology_level)
                        && config.allowed_road_types.contains(&link.road_type)
                        && link.validity.contains(today);
                    if !relevant {
                        continue;
                    }

                    let parent = link.super_position.map(|p| p.sequence_id);
                    let parent_lanes = parent
                        .and_then(|id| lane_features.get(&id))
                        .map_or(empty_features(), Vec::as_slice);
                    let parent_classes = parent
                        .and_then(|id| class_features.get(&id))
                        .map_or(empty_features(), Vec::as_slice);

                    let Some(lanes) = resolve_lane_overview(
                        link,
                        sequence_links,
                        own_lanes,
                        parent_lanes,
                        config.lane_overview_attribute,
                    ) else {
                        // Usually a footpath or similar without any speed regulation
                        debug!("Link {} has no lane overview, leaving it out", link.id);
                        excluded.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };

                    let directions =
                        directions_from_lane_overview(link.id, &lanes, config.odd_lanes_forward)?;
                    let frc = resolve_road_class(
                        link,
                        own_classes,
                        parent_classes,
                        config.classification_attribute,
                        config.worst_road_class,
                    );

                    if directions.permits(Direction::Forward) {
                        let d = Direction::Forward.index();
                        outgoing[d].entry(link.start_node).or_insert_with(Vec::new).push(link.id);
                        incoming[d].entry(link.end_node).or_insert_with(Vec::new).push(link.id);
                    }
                    if directions.permits(Direction::Reverse) {
                        let d = Direction::Reverse.index();
                        outgoing[d].entry(link.end_node).or_insert_with(Vec::new).push(link.id);
                        incoming[d].entry(link.start_node).or_insert_with(Vec::new).push(link.id);
                    }

                    resolved.insert(
                        link.id,
                        ResolvedLink {
                            link: Arc::new(link.clone()),
                            directions,
                            frc,
                        },
                    );
                }
                Ok(())
            })?;

        let resolved: HashMap<LinkId, ResolvedLink> = resolved.into_iter().collect();
        let mut links_by_sequence: HashMap<SequenceId, Vec<Arc<RoadLink>>> = HashMap::new();
        for entry in resolved.values() {
            links_by_sequence
                .entry(entry.link.id.sequence_id)
                .or_default()
                .push(entry.link.clone());
        }
        for sequence_links in links_by_sequence.values_mut() {
            sequence_links.sort_by(|a, b| a.start_position.total_cmp(&b.start_position));
        }

        info!(
            "Registered {} links in the road network, left out {} without lane overview",
            resolved.len(),
            excluded.load(Ordering::Relaxed)
        );

        let [out_forward, out_reverse] = outgoing;
        let [in_forward, in_reverse] = incoming;
        Ok(Self {
            known_sequences: links.keys().copied().collect(),
            links_by_sequence,
            resolved,
            outgoing: [freeze(out_forward), freeze(out_reverse)],
            incoming: [freeze(in_forward), freeze(in_reverse)],
        })
    }

    fn resolved(&self, link: LinkId) -> Result<&ResolvedLink, RoadNetError> {
        self.resolved
            .get(&link)
            .ok_or_else(|| RoadNetError::MissingData(format!("link {link} is not in the road network")))
    }
}

pub struct RoadNetCache {
    store: Store,
    config: RoadRefConfig,
    init_lock: Mutex<()>,
    snapshot: OnceLock<Arc<RoadNetSnapshot>>,
    lines: DashMap<(LinkId, Direction), Arc<DirectedLine>>,
    nodes: DashMap<(NodeId, Direction), Arc<RoadNode>>,
}

impl RoadNetCache {
    pub fn new(store: Store, config: RoadRefConfig) -> Self {
        Self {
            store,
            config,
            init_lock: Mutex::new(()),
            snapshot: OnceLock::new(),
            lines: DashMap::new(),
            nodes: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RoadRefConfig {
        &self.config
    }

    /// Builds the network on first call. Concurrent callers wait for the
    /// first build; later calls return immediately.
    pub fn initialize(&self) -> Result<(), RoadNetError> {
        if self.snapshot.get().is_some() {
            return Ok(());
        }
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.snapshot.get().is_some() {
            return Ok(());
        }

        let started = Instant::now();
        let snapshot = RoadNetSnapshot::build(&self.store, &self.config)?;
        let _ = self.snapshot.set(Arc::new(snapshot));
        info!("Road network ready in {:?}", started.elapsed());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.get().is_some()
    }

    fn snapshot(&self) -> Result<&RoadNetSnapshot, RoadNetError> {
        self.snapshot
            .get()
            .map(Arc::as_ref)
            .ok_or(RoadNetError::NotInitialized)
    }

    /// Relevant links of a sequence ordered by position. A sequence that exists
    /// but has no relevant link gives an empty list; an unknown one is an error.
    pub fn get_links(&self, sequence_id: SequenceId) -> Result<Vec<Arc<RoadLink>>, RoadNetError> {
        let snapshot = self.snapshot()?;
        match snapshot.links_by_sequence.get(&sequence_id) {
            Some(links) => Ok(links.clone()),
            None if snapshot.known_sequences.contains(&sequence_id) => Ok(Vec::new()),
            None => Err(RoadNetError::MissingData(format!(
                "link sequence {sequence_id} is not in the store"
            ))),
        }
    }

    pub fn link(&self, link: LinkId) -> Result<Arc<RoadLink>, RoadNetError> {
        Ok(self.snapshot()?.resolved(link)?.link.clone())
    }

    pub fn has_direction(&self, link: LinkId, direction: Direction) -> Result<bool, RoadNetError> {
        Ok(self.snapshot()?.resolved(link)?.directions.permits(direction))
    }

    pub fn allowed_directions(&self, link: LinkId) -> Result<AllowedDirections, RoadNetError> {
        Ok(self.snapshot()?.resolved(link)?.directions)
    }

    pub fn get_functional_road_class(&self, link: LinkId) -> Result<Frc, RoadNetError> {
        Ok(self.snapshot()?.resolved(link)?.frc)
    }

    pub fn directed_line(
        &self,
        link: LinkId,
        direction: Direction,
    ) -> Result<Arc<DirectedLine>, RoadNetError> {
        if let Some(line) = self.lines.get(&(link, direction)) {
            return Ok(line.clone());
        }
        let resolved = self.snapshot()?.resolved(link)?;
        let line = Arc::new(DirectedLine::new(
            resolved.link.clone(),
            direction,
            resolved.frc,
        ));
        Ok(self
            .lines
            .entry((link, direction))
            .or_insert(line)
            .clone())
    }

    fn lines_at(
        &self,
        adjacency: &HashMap<NodeId, Vec<LinkId>>,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError> {
        adjacency
            .get(&node)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .map(|&link| self.directed_line(link, direction))
            .collect()
    }

    pub fn get_incoming_lines(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError> {
        let snapshot = self.snapshot()?;
        self.lines_at(&snapshot.incoming[direction.index()], node, direction)
    }

    pub fn get_outgoing_lines(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError> {
        let snapshot = self.snapshot()?;
        self.lines_at(&snapshot.outgoing[direction.index()], node, direction)
    }

    /// The node with its anchor validity, memoized per (node, direction).
    /// `geometry` supplies the node position and is only called on a miss.
    pub fn get_node(
        &self,
        node: NodeId,
        direction: Direction,
        geometry: impl FnOnce() -> Coord<f64>,
    ) -> Result<Arc<RoadNode>, RoadNetError> {
        if let Some(cached) = self.nodes.get(&(node, direction)) {
            return Ok(cached.clone());
        }
        let snapshot = self.snapshot()?;

        // The same physical node is reachable from both traversal directions
        let mut incident: BTreeSet<LinkId> = BTreeSet::new();
        for d in [direction, direction.opposite()] {
            for adjacency in [&snapshot.incoming[d.index()], &snapshot.outgoing[d.index()]] {
                if let Some(links) = adjacency.get(&node) {
                    incident.extend(links.iter().copied());
                }
            }
        }
        let lengths = incident
            .iter()
            .map(|&link| snapshot.resolved(link).map(|r| r.link.length_m()))
            .collect::<Result<Vec<f64>, RoadNetError>>()?;

        let computed = Arc::new(RoadNode {
            id: node,
            direction,
            coordinate: geometry(),
            degree: incident.len(),
            valid: is_valid_anchor(&lengths, self.config.anchor_min_link_length_m),
        });
        Ok(self
            .nodes
            .entry((node, direction))
            .or_insert(computed)
            .clone())
    }
}

impl RoadGraph for RoadNetCache {
    fn node_at(
        &self,
        node: NodeId,
        direction: Direction,
        coordinate: Coord<f64>,
    ) -> Result<Arc<RoadNode>, RoadNetError> {
        self.get_node(node, direction, || coordinate)
    }

    fn incoming_lines(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError> {
        self.get_incoming_lines(node, direction)
    }

    fn outgoing_lines(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> Result<Vec<Arc<DirectedLine>>, RoadNetError> {
        self.get_outgoing_lines(node, direction)
    }
}
