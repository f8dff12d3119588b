// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::RoadNetError;
use crate::models::{AttributeTypeId, Direction, FeatureRecord, LinkId, PropertyValue, RoadLink};
use std::collections::BTreeSet;

/// Directions a link may be traversed in, as derived from its lane overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllowedDirections {
    Forward,
    Reverse,
    Both,
}

impl AllowedDirections {
    pub fn permits(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (AllowedDirections::Both, _)
                | (AllowedDirections::Forward, Direction::Forward)
                | (AllowedDirections::Reverse, Direction::Reverse)
        )
    }
}

/// Leading digits of a lane label, e.g. `"3K"` -> 3.
fn lane_number(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Odd and even lane numbers run in opposite directions. With `odd_lanes_forward`,
/// `{1}` is forward only, `{0}` reverse only and `{0, 1}` both. Any other parity
/// set (an empty overview, or labels without a lane number) is a data error.
pub fn directions_from_lane_overview(
    link: LinkId,
    lanes: &[String],
    odd_lanes_forward: bool,
) -> Result<AllowedDirections, RoadNetError> {
    let mut parities = BTreeSet::new();
    for lane in lanes {
        let number = lane_number(lane).ok_or_else(|| RoadNetError::MalformedLane {
            link,
            lane: lane.clone(),
        })?;
        parities.insert(number % 2);
    }

    let (forward_parity, reverse_parity) = if odd_lanes_forward { (1, 0) } else { (0, 1) };
    let forward = parities.contains(&forward_parity);
    let reverse = parities.contains(&reverse_parity);

    match (forward, reverse) {
        (true, true) => Ok(AllowedDirections::Both),
        (true, false) => Ok(AllowedDirections::Forward),
        (false, true) => Ok(AllowedDirections::Reverse),
        (false, false) => Err(RoadNetError::InvalidLaneParity {
            link,
            lanes: lanes.to_vec(),
        }),
    }
}

fn lanes_of(feature: &FeatureRecord, attribute: AttributeTypeId) -> Option<Vec<String>> {
    match feature.property(attribute)? {
        PropertyValue::TextList(lanes) => Some(lanes.clone()),
        PropertyValue::Text(text) => Some(text.split('#').map(str::to_string).collect()),
        _ => None,
    }
}

/// Lane overview for a link: its own, else (for connectors) the one of the
/// nearest non-connector link of the sequence, else the first overlapping
/// lane feature. `None` means the link cannot be placed in the graph.
pub fn resolve_lane_overview(
    link: &RoadLink,
    siblings: &[RoadLink],
    lane_features: &[FeatureRecord],
    super_lane_features: &[FeatureRecord],
    attribute: AttributeTypeId,
) -> Option<Vec<String>> {
    if let Some(lanes) = &link.lane_overview {
        return Some(lanes.clone());
    }

    if link.connector {
        let nearest = siblings
            .iter()
            .filter(|s| !s.connector && s.id != link.id)
            .min_by(|a, b| {
                let da = (a.start_position - link.start_position).abs();
                let db = (b.start_position - link.start_position).abs();
                da.total_cmp(&db)
            });
        if let Some(lanes) = nearest.and_then(|s| s.lane_overview.clone()) {
            return Some(lanes);
        }
    }

    let own = lane_features
        .iter()
        .filter(|f| f.overlaps(link.id.sequence_id, link.start_position, link.end_position))
        .find_map(|f| lanes_of(f, attribute));
    if own.is_some() {
        return own;
    }

    let parent = link.super_position?;
    super_lane_features
        .iter()
        .filter(|f| f.overlaps(parent.sequence_id, parent.start, parent.end))
        .find_map(|f| lanes_of(f, attribute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lane_feature, link};

    fn lanes(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn parity_sets_map_to_directions() {
        let id = LinkId::new(1, 1);
        assert_eq!(
            directions_from_lane_overview(id, &lanes(&["1", "2"]), true).unwrap(),
            AllowedDirections::Both
        );
        assert_eq!(
            directions_from_lane_overview(id, &lanes(&["1", "3K"]), true).unwrap(),
            AllowedDirections::Forward
        );
        assert_eq!(
            directions_from_lane_overview(id, &lanes(&["2", "4H1"]), true).unwrap(),
            AllowedDirections::Reverse
        );
        assert_eq!(
            directions_from_lane_overview(id, &lanes(&["2"]), false).unwrap(),
            AllowedDirections::Forward
        );
    }

    #[test]
    fn unusable_overviews_are_data_errors() {
        let id = LinkId::new(1, 1);
        assert!(matches!(
            directions_from_lane_overview(id, &[], true),
            Err(RoadNetError::InvalidLaneParity { .. })
        ));
        assert!(matches!(
            directions_from_lane_overview(id, &lanes(&["K"]), true),
            Err(RoadNetError::MalformedLane { .. })
        ));
    }

    #[test]
    fn permits_matches_allowed_set() {
        assert!(AllowedDirections::Both.permits(Direction::Forward));
        assert!(AllowedDirections::Both.permits(Direction::Reverse));
        assert!(AllowedDirections::Forward.permits(Direction::Forward));
        assert!(!AllowedDirections::Forward.permits(Direction::Reverse));
        assert!(!AllowedDirections::Reverse.permits(Direction::Forward));
    }

    #[test]
    fn connectors_borrow_from_the_nearest_regular_sibling() {
        let mut far = link(7, 1, 0.0, 0.2, 1, 2);
        far.lane_overview = Some(lanes(&["1"]));
        let mut near = link(7, 3, 0.6, 1.0, 4, 5);
        near.lane_overview = Some(lanes(&["2"]));
        let mut connector = link(7, 2, 0.5, 0.6, 3, 4);
        connector.connector = true;
        connector.lane_overview = None;

        let siblings = vec![far, connector.clone(), near];
        let resolved = resolve_lane_overview(&connector, &siblings, &[], &[], 5528);
        assert_eq!(resolved, Some(lanes(&["2"])));
    }

    #[test]
    fn falls_back_to_overlapping_lane_features() {
        let mut plain = link(7, 1, 0.0, 0.5, 1, 2);
        plain.lane_overview = None;
        let features = vec![
            lane_feature(1, 7, 0.5, 1.0, &["1"]),
            lane_feature(2, 7, 0.0, 0.6, &["1", "2"]),
        ];

        let resolved = resolve_lane_overview(&plain, &[plain.clone()], &features, &[], 5528);
        assert_eq!(resolved, Some(lanes(&["1", "2"])));

        let resolved = resolve_lane_overview(&plain, &[plain.clone()], &[], &[], 5528);
        assert_eq!(resolved, None);
    }
}
