// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use crate::models::LinkId;
use crate::roadnet::directed_line::DirectedLine;
use geo::Coord;
use std::sync::Arc;

/// Exact key for a projected coordinate. Links that touch share bit-identical
/// endpoints in the source data.
pub type CoordKey = (u64, u64);

/// Trims at or below this are treated as no trim when joining paths.
const TRIM_TOLERANCE_M: f64 = 1e-3;

pub fn coord_key(coord: Coord<f64>) -> CoordKey {
    // -0.0 and 0.0 must land on the same key
    ((coord.x + 0.0).to_bits(), (coord.y + 0.0).to_bits())
}

/// Connected directed lines trimmed at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePath {
    pub lines: Vec<Arc<DirectedLine>>,
    /// Metres trimmed from the start of the first line.
    pub positive_offset_m: f64,
    /// Metres trimmed from the end of the last line.
    pub negative_offset_m: f64,
}

impl LinePath {
    pub fn new(lines: Vec<Arc<DirectedLine>>, positive_offset_m: f64, negative_offset_m: f64) -> Self {
        Self {
            lines,
            positive_offset_m,
            negative_offset_m,
        }
    }

    pub fn start_key(&self) -> Option<CoordKey> {
        self.lines.first().map(|l| coord_key(l.start_coord()))
    }

    pub fn end_key(&self) -> Option<CoordKey> {
        self.lines.last().map(|l| coord_key(l.end_coord()))
    }

    pub fn length_m(&self) -> f64 {
        self.lines.iter().map(|l| l.length_m()).sum()
    }

    /// Length covered after both offsets are applied.
    pub fn trimmed_length_m(&self) -> f64 {
        (self.length_m() - self.positive_offset_m - self.negative_offset_m).max(0.0)
    }

    /// True when `next` starts at this path's end node.
    pub fn connects_to(&self, next: &LinePath) -> bool {
        match (self.end_key(), next.start_key()) {
            (Some(end), Some(start)) => end == start,
            _ => false,
        }
    }

    /// True when the trimmed coverage of `next` continues this one without a
    /// gap: the paths connect and neither is trimmed at the shared node.
    pub fn continues_into(&self, next: &LinePath) -> bool {
        self.connects_to(next)
            && self.negative_offset_m <= TRIM_TOLERANCE_M
            && next.positive_offset_m <= TRIM_TOLERANCE_M
    }

    pub fn line_ids(&self) -> Vec<LinkId> {
        self.lines.iter().map(|l| l.id()).collect()
    }

    /// Concatenates paths in order. The result keeps the first path's start
    /// trim and the last path's end trim; inner trims are dropped.
    pub fn join(paths: Vec<LinePath>) -> Option<LinePath> {
        let positive_offset_m = paths.first()?.positive_offset_m;
        let negative_offset_m = paths.last()?.negative_offset_m;
        let lines: Vec<Arc<DirectedLine>> = paths.into_iter().flat_map(|p| p.lines).collect();
        if lines.is_empty() {
            return None;
        }
        Some(LinePath::new(lines, positive_offset_m, negative_offset_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::roadnet::classification::Frc;
    use crate::test_support::link;

    fn path(start: f64, end: f64, num: u32, pos: f64, neg: f64) -> LinePath {
        let l = Arc::new(link(1, num, start, end, num as u64, num as u64 + 1));
        LinePath::new(
            vec![Arc::new(DirectedLine::new(l, Direction::Forward, Frc::Frc7))],
            pos,
            neg,
        )
    }

    #[test]
    fn join_keeps_outer_offsets() {
        let a = path(0.0, 0.1, 1, 5.0, 7.0);
        let b = path(0.1, 0.3, 2, 11.0, 13.0);
        assert!(a.connects_to(&b));
        assert!(!b.connects_to(&a));
        assert!(!a.continues_into(&b));

        let joined = LinePath::join(vec![a, b]).unwrap();
        assert_eq!(joined.line_ids(), vec![LinkId::new(1, 1), LinkId::new(1, 2)]);
        assert_eq!(joined.positive_offset_m, 5.0);
        assert_eq!(joined.negative_offset_m, 13.0);
        assert!((joined.length_m() - 300.0).abs() < 1e-6);
        assert!((joined.trimmed_length_m() - 282.0).abs() < 1e-6);
    }

    #[test]
    fn only_untrimmed_inner_ends_continue() {
        assert!(path(0.0, 0.1, 1, 5.0, 0.0).continues_into(&path(0.1, 0.3, 2, 0.0, 13.0)));
        assert!(!path(0.0, 0.1, 1, 5.0, 0.0).continues_into(&path(0.1, 0.3, 2, 20.0, 0.0)));
        assert!(!path(0.0, 0.1, 1, 0.0, 20.0).continues_into(&path(0.1, 0.3, 2, 0.0, 0.0)));
    }

    #[test]
    fn joining_nothing_gives_nothing() {
        assert!(LinePath::join(Vec::new()).is_none());
    }

    #[test]
    fn signed_zero_shares_a_key() {
        assert_eq!(
            coord_key(Coord { x: 0.0, y: -0.0 }),
            coord_key(Coord { x: -0.0, y: 0.0 })
        );
    }
}
