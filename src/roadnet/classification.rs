// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::models::{AttributeTypeId, FeatureRecord, RoadLink, RoadType};
use serde::{Deserialize, Serialize};

/// Functional road class. `Frc0` is the most important road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Frc {
    Frc0,
    Frc1,
    Frc2,
    Frc3,
    Frc4,
    Frc5,
    Frc6,
    Frc7,
}

impl Frc {
    /// Codes outside 0..=7 clamp to the nearest class.
    pub fn from_code(code: i64) -> Self {
        match code {
            i64::MIN..=0 => Frc::Frc0,
            1 => Frc::Frc1,
            2 => Frc::Frc2,
            3 => Frc::Frc3,
            4 => Frc::Frc4,
            5 => Frc::Frc5,
            6 => Frc::Frc6,
            _ => Frc::Frc7,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Form of way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fow {
    Undefined,
    Motorway,
    MultipleCarriageway,
    SingleCarriageway,
    Roundabout,
    TrafficSquare,
    SlipRoad,
    Other,
}

pub fn form_of_way(road_type: RoadType) -> Fow {
    match road_type {
        RoadType::Ordinary => Fow::SingleCarriageway,
        RoadType::Divided => Fow::MultipleCarriageway,
        RoadType::Roundabout => Fow::Roundabout,
        RoadType::SlipRoad => Fow::SlipRoad,
        RoadType::TrafficSquare => Fow::TrafficSquare,
        RoadType::Parking | RoadType::ServiceRoad | RoadType::Ferry => Fow::Other,
        RoadType::PedestrianPath | RoadType::CyclePath | RoadType::Stairs => Fow::Other,
        RoadType::Other => Fow::Undefined,
    }
}

/// Highest classification code among the features overlapping the link.
/// Connectors with a super-position are classified from their parent stretch.
pub fn resolve_road_class(
    link: &RoadLink,
    own_features: &[FeatureRecord],
    parent_features: &[FeatureRecord],
    attribute: AttributeTypeId,
    worst: u8,
) -> Frc {
    let (features, sequence_id, start, end) = match (link.connector, link.super_position) {
        (true, Some(parent)) => (parent_features, parent.sequence_id, parent.start, parent.end),
        _ => (
            own_features,
            link.id.sequence_id,
            link.start_position,
            link.end_position,
        ),
    };

    features
        .iter()
        .filter(|f| f.overlaps(sequence_id, start, end))
        .filter_map(|f| f.property(attribute).and_then(|v| v.as_code()))
        .max()
        .map_or(Frc::from_code(i64::from(worst)), Frc::from_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SuperPosition;
    use crate::test_support::{class_feature, link};

    #[test]
    fn highest_code_wins() {
        let l = link(3, 1, 0.2, 0.6, 1, 2);
        let features = vec![
            class_feature(1, 3, 0.0, 0.3, 2),
            class_feature(2, 3, 0.3, 1.0, 5),
            class_feature(3, 3, 0.7, 1.0, 6),
        ];
        assert_eq!(resolve_road_class(&l, &features, &[], 9338, 7), Frc::Frc5);
    }

    #[test]
    fn defaults_to_worst_class() {
        let l = link(3, 1, 0.2, 0.6, 1, 2);
        assert_eq!(resolve_road_class(&l, &[], &[], 9338, 7), Frc::Frc7);
    }

    #[test]
    fn connectors_use_their_parent_stretch() {
        let mut connector = link(3, 1, 0.0, 1.0, 1, 2);
        connector.connector = true;
        connector.super_position = Some(SuperPosition {
            sequence_id: 9,
            start: 0.4,
            end: 0.5,
        });
        let own = vec![class_feature(1, 3, 0.0, 1.0, 6)];
        let parent = vec![
            class_feature(2, 9, 0.0, 0.45, 1),
            class_feature(3, 9, 0.6, 1.0, 4),
        ];
        assert_eq!(resolve_road_class(&connector, &own, &parent, 9338, 7), Frc::Frc1);
    }

    #[test]
    fn codes_clamp_into_range() {
        assert_eq!(Frc::from_code(-3), Frc::Frc0);
        assert_eq!(Frc::from_code(42), Frc::Frc7);
        assert_eq!(Frc::from_code(4).value(), 4);
    }
}
