// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::classification::Frc;
use super::{RoadNetCache, RoadNetError};
use crate::models::{Direction, LinkId, RoadLink, RoadType, TopologyLevel, Validity};
use crate::openlr::{MapLine, MapNode, RoadGraph};
use crate::store::Store;
use crate::test_support::{class_feature, date, lane_feature, link, point_on, test_config};
use geo::Coord;
use std::sync::Arc;

fn cache_with(links: Vec<RoadLink>) -> RoadNetCache {
    let store = Store::temporary().unwrap();
    for link in &links {
        let sequence: Vec<RoadLink> = links
            .iter()
            .filter(|l| l.id.sequence_id == link.id.sequence_id)
            .cloned()
            .collect();
        store.upsert_links(link.id.sequence_id, &sequence).unwrap();
    }
    RoadNetCache::new(store, test_config())
}

fn with_lanes(mut link: RoadLink, lanes: &[&str]) -> RoadLink {
    link.lane_overview = Some(lanes.iter().map(|l| l.to_string()).collect());
    link
}

#[test]
fn lookups_before_initialize_fail() {
    let cache = cache_with(vec![link(1, 1, 0.0, 1.0, 1, 2)]);
    assert!(matches!(cache.get_links(1), Err(RoadNetError::NotInitialized)));
}

#[test]
fn two_way_link_is_registered_in_both_directions() {
    let cache = cache_with(vec![link(1, 1, 0.0, 1.0, 1, 2)]);
    cache.initialize().unwrap();
    let id = LinkId::new(1, 1);

    assert!(cache.has_direction(id, Direction::Forward).unwrap());
    assert!(cache.has_direction(id, Direction::Reverse).unwrap());

    let forward_out = cache.get_outgoing_lines(1, Direction::Forward).unwrap();
    assert_eq!(forward_out.len(), 1);
    assert_eq!(forward_out[0].end_node_id(), 2);

    let reverse_out = cache.get_outgoing_lines(2, Direction::Reverse).unwrap();
    assert_eq!(reverse_out.len(), 1);
    assert_eq!(reverse_out[0].end_node_id(), 1);

    assert_eq!(cache.get_incoming_lines(2, Direction::Forward).unwrap().len(), 1);
    assert_eq!(cache.get_incoming_lines(1, Direction::Reverse).unwrap().len(), 1);
}

#[test]
fn odd_lanes_only_register_forward() {
    let cache = cache_with(vec![with_lanes(link(1, 1, 0.0, 1.0, 1, 2), &["1", "3"])]);
    cache.initialize().unwrap();
    let id = LinkId::new(1, 1);

    assert!(cache.has_direction(id, Direction::Forward).unwrap());
    assert!(!cache.has_direction(id, Direction::Reverse).unwrap());
    assert!(cache.get_outgoing_lines(2, Direction::Reverse).unwrap().is_empty());
    assert!(cache.get_incoming_lines(1, Direction::Reverse).unwrap().is_empty());
}

#[test]
fn even_lanes_only_register_reverse() {
    let cache = cache_with(vec![with_lanes(link(1, 1, 0.0, 1.0, 1, 2), &["2", "4"])]);
    cache.initialize().unwrap();

    assert!(cache.get_outgoing_lines(1, Direction::Forward).unwrap().is_empty());
    assert_eq!(cache.get_outgoing_lines(2, Direction::Reverse).unwrap().len(), 1);
}

#[test]
fn unusable_parity_aborts_initialization() {
    let mut broken = link(1, 1, 0.0, 1.0, 1, 2);
    broken.lane_overview = Some(Vec::new());
    let cache = cache_with(vec![broken]);

    assert!(matches!(
        cache.initialize(),
        Err(RoadNetError::InvalidLaneParity { .. })
    ));
    assert!(!cache.is_initialized());
}

#[test]
fn unknown_sequence_is_missing_data() {
    let cache = cache_with(vec![link(1, 1, 0.0, 1.0, 1, 2)]);
    cache.initialize().unwrap();
    assert!(matches!(cache.get_links(999), Err(RoadNetError::MissingData(_))));
}

#[test]
fn links_without_lane_overview_are_left_out() {
    let mut footpath = link(1, 1, 0.0, 1.0, 1, 2);
    footpath.lane_overview = None;
    let cache = cache_with(vec![footpath]);
    cache.initialize().unwrap();

    assert!(cache.get_links(1).unwrap().is_empty());
    assert!(matches!(
        cache.link(LinkId::new(1, 1)),
        Err(RoadNetError::MissingData(_))
    ));
}

#[test]
fn irrelevant_links_are_filtered() {
    let mut pedestrian = link(1, 1, 0.0, 0.25, 1, 2);
    pedestrian.road_type = RoadType::PedestrianPath;
    let mut lane_level = link(1, 2, 0.25, 0.5, 2, 3);
    lane_level.topology_level = TopologyLevel::Lane;
    let mut expired = link(1, 3, 0.5, 0.75, 3, 4);
    expired.validity = Validity {
        from: date(2020, 1, 1),
        to: Some(date(2023, 1, 1)),
    };
    let kept = link(1, 4, 0.75, 1.0, 4, 5);

    let cache = cache_with(vec![pedestrian, lane_level, expired, kept]);
    cache.initialize().unwrap();

    let ids: Vec<LinkId> = cache.get_links(1).unwrap().iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![LinkId::new(1, 4)]);
}

#[test]
fn lane_and_class_features_are_resolved() {
    let mut plain = link(5, 1, 0.0, 1.0, 1, 2);
    plain.lane_overview = None;
    let store = Store::temporary().unwrap();
    store.upsert_links(5, &[plain]).unwrap();
    store.upsert_feature(&lane_feature(1, 5, 0.0, 1.0, &["1"])).unwrap();
    store.upsert_feature(&class_feature(2, 5, 0.0, 0.5, 3)).unwrap();
    store.upsert_feature(&class_feature(3, 5, 0.5, 1.0, 4)).unwrap();

    let cache = RoadNetCache::new(store, test_config());
    cache.initialize().unwrap();
    let id = LinkId::new(5, 1);

    assert!(cache.has_direction(id, Direction::Forward).unwrap());
    assert!(!cache.has_direction(id, Direction::Reverse).unwrap());
    assert_eq!(cache.get_functional_road_class(id).unwrap(), Frc::Frc4);
}

#[test]
fn unclassified_links_get_the_worst_class() {
    let cache = cache_with(vec![link(1, 1, 0.0, 1.0, 1, 2)]);
    cache.initialize().unwrap();
    assert_eq!(
        cache.get_functional_road_class(LinkId::new(1, 1)).unwrap(),
        Frc::Frc7
    );
}

#[test]
fn links_come_back_in_position_order() {
    let cache = cache_with(vec![
        link(1, 3, 0.6, 1.0, 3, 4),
        link(1, 1, 0.0, 0.2, 1, 2),
        link(1, 2, 0.2, 0.6, 2, 3),
    ]);
    cache.initialize().unwrap();

    let numbers: Vec<u32> = cache
        .get_links(1)
        .unwrap()
        .iter()
        .map(|l| l.id.link_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn repeated_initialize_is_a_noop() {
    let store = Store::temporary().unwrap();
    store.upsert_links(1, &[link(1, 1, 0.0, 1.0, 1, 2)]).unwrap();
    let cache = RoadNetCache::new(store.clone(), test_config());
    cache.initialize().unwrap();

    store.upsert_links(2, &[link(2, 1, 0.0, 1.0, 5, 6)]).unwrap();
    cache.initialize().unwrap();

    assert_eq!(cache.get_links(1).unwrap().len(), 1);
    assert!(matches!(cache.get_links(2), Err(RoadNetError::MissingData(_))));
}

#[test]
fn concurrent_initialize_builds_once() {
    let cache = Arc::new(cache_with(vec![link(1, 1, 0.0, 1.0, 1, 2)]));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            std::thread::spawn(move || cache.initialize())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(cache.get_links(1).unwrap().len(), 1);
}

#[test]
fn pass_through_between_long_links_is_not_an_anchor() {
    // Two 500 m links meeting at node 2
    let cache = cache_with(vec![link(1, 1, 0.0, 0.5, 1, 2), link(1, 2, 0.5, 1.0, 2, 3)]);
    cache.initialize().unwrap();

    let middle = cache
        .get_node(2, Direction::Forward, || point_on(1, 0.5))
        .unwrap();
    assert_eq!(middle.degree, 2);
    assert!(!middle.is_valid());

    let dead_end = cache
        .get_node(1, Direction::Forward, || point_on(1, 0.0))
        .unwrap();
    assert_eq!(dead_end.degree, 1);
    assert!(dead_end.is_valid());
}

#[test]
fn short_link_keeps_pass_through_an_anchor() {
    let cache = cache_with(vec![link(1, 1, 0.0, 0.05, 1, 2), link(1, 2, 0.05, 1.0, 2, 3)]);
    cache.initialize().unwrap();

    let node = cache
        .get_node(2, Direction::Reverse, || point_on(1, 0.05))
        .unwrap();
    assert!(node.is_valid());
}

#[test]
fn junctions_are_anchors() {
    let mut side_road = link(2, 1, 0.0, 1.0, 2, 9);
    side_road.geometry.0[0] = point_on(1, 0.5);
    let cache = cache_with(vec![
        link(1, 1, 0.0, 0.5, 1, 2),
        link(1, 2, 0.5, 1.0, 2, 3),
        side_road,
    ]);
    cache.initialize().unwrap();

    let node = cache
        .node_at(2, Direction::Forward, point_on(1, 0.5))
        .unwrap();
    assert_eq!(node.degree, 3);
    assert!(node.is_valid());
}

#[test]
fn one_way_links_still_count_towards_degree_in_both_directions() {
    let cache = cache_with(vec![
        with_lanes(link(1, 1, 0.0, 0.5, 1, 2), &["1"]),
        with_lanes(link(1, 2, 0.5, 1.0, 2, 3), &["1"]),
    ]);
    cache.initialize().unwrap();

    let reverse = cache
        .get_node(2, Direction::Reverse, || Coord { x: 0.0, y: 0.0 })
        .unwrap();
    assert_eq!(reverse.degree, 2);
    assert!(!reverse.is_valid());
}

#[test]
fn memoized_lines_and_nodes_are_shared() {
    let cache = cache_with(vec![link(1, 1, 0.0, 1.0, 1, 2)]);
    cache.initialize().unwrap();
    let id = LinkId::new(1, 1);

    let a = cache.directed_line(id, Direction::Reverse).unwrap();
    let b = cache.directed_line(id, Direction::Reverse).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.start_node_id(), 2);
    assert_eq!(a.projected_geometry().0[0], point_on(1, 1.0));

    let first = cache.get_node(1, Direction::Forward, || point_on(1, 0.0)).unwrap();
    let second = cache
        .get_node(1, Direction::Forward, || panic!("node should be memoized"))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
