// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use geo::{Coord, EuclideanLength, Geometry, Line, LineString, MultiLineString, Simplify};

/// Endpoints closer than this are treated as the same point when chaining lines.
const JOIN_TOLERANCE_M: f64 = 1e-6;

// --- Metric Geometry Functions (projected space) ---

pub fn line_length_m(line: &LineString<f64>) -> f64 {
    line.euclidean_length()
}

pub fn same_point(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() <= JOIN_TOLERANCE_M && (a.y - b.y).abs() <= JOIN_TOLERANCE_M
}

fn interpolate(segment: Line<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: segment.start.x + (segment.end.x - segment.start.x) * t,
        y: segment.start.y + (segment.end.y - segment.start.y) * t,
    }
}

/// The part of `line` between two fractions of its length.
/// Returns `None` for an empty line or an empty range.
pub fn sub_line(line: &LineString<f64>, from_fraction: f64, to_fraction: f64) -> Option<LineString<f64>> {
    let from_fraction = from_fraction.clamp(0.0, 1.0);
    let to_fraction = to_fraction.clamp(0.0, 1.0);
    if line.0.len() < 2 || to_fraction <= from_fraction {
        return None;
    }

    let total = line.euclidean_length();
    if total <= 0.0 {
        return None;
    }
    let from_m = from_fraction * total;
    let to_m = to_fraction * total;

    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut walked = 0.0;
    for segment in line.lines() {
        let seg_len = segment.euclidean_length();
        let seg_start = walked;
        let seg_end = walked + seg_len;
        walked = seg_end;

        if seg_len <= 0.0 || seg_end < from_m {
            continue;
        }
        if seg_start > to_m {
            break;
        }

        if coords.is_empty() {
            coords.push(interpolate(segment, ((from_m - seg_start) / seg_len).max(0.0)));
        }
        if seg_end <= to_m {
            coords.push(segment.end);
        } else {
            coords.push(interpolate(segment, (to_m - seg_start) / seg_len));
            break;
        }
    }

    coords.dedup_by(|a, b| same_point(*a, *b));
    if coords.len() < 2 {
        return None;
    }
    Some(LineString::new(coords))
}

/// Douglas-Peucker simplification, keeping both endpoints.
pub fn simplify_line(line: &LineString<f64>, tolerance_m: f64) -> LineString<f64> {
    if tolerance_m <= 0.0 || line.0.len() <= 2 {
        return line.clone();
    }
    line.simplify(&tolerance_m)
}

pub fn simplify_geometry(geometry: &Geometry<f64>, tolerance_m: f64) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) => Geometry::LineString(simplify_line(line, tolerance_m)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines
                .0
                .iter()
                .map(|line| simplify_line(line, tolerance_m))
                .collect(),
        )),
        other => other.clone(),
    }
}

/// Chain line pieces that share endpoints (in either orientation) into as few
/// lines as possible. One chain gives a `LineString`, several a `MultiLineString`.
pub fn merge_lines(lines: Vec<LineString<f64>>) -> Option<Geometry<f64>> {
    let mut remaining: Vec<Vec<Coord<f64>>> = lines
        .into_iter()
        .map(|line| line.0)
        .filter(|coords| coords.len() >= 2)
        .collect();
    remaining.reverse();

    let mut chains: Vec<LineString<f64>> = Vec::new();
    while let Some(mut chain) = remaining.pop() {
        loop {
            let head = chain[0];
            let tail = chain[chain.len() - 1];

            let Some(idx) = remaining.iter().rposition(|piece| {
                let first = piece[0];
                let last = piece[piece.len() - 1];
                same_point(tail, first)
                    || same_point(tail, last)
                    || same_point(head, last)
                    || same_point(head, first)
            }) else {
                break;
            };

            let mut piece = remaining.remove(idx);
            let first = piece[0];
            let last = piece[piece.len() - 1];
            if same_point(tail, first) {
                chain.extend(piece.into_iter().skip(1));
            } else if same_point(tail, last) {
                piece.reverse();
                chain.extend(piece.into_iter().skip(1));
            } else if same_point(head, last) {
                piece.pop();
                piece.extend(chain);
                chain = piece;
            } else {
                piece.reverse();
                piece.pop();
                piece.extend(chain);
                chain = piece;
            }
        }
        chains.push(LineString::new(chain));
    }

    match chains.len() {
        0 => None,
        1 => chains.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(chains))),
    }
}

/// Grid bearing in degrees [0, 360) of the first `distance_m` of the line,
/// or of its last `distance_m` walked backwards when `from_end` is set.
pub fn bearing_deg(line: &LineString<f64>, distance_m: f64, from_end: bool) -> f64 {
    let total = line.euclidean_length();
    if total <= 0.0 {
        return 0.0;
    }
    let fraction = (distance_m / total).min(1.0);
    let (origin, target) = if from_end {
        let origin = line.0[line.0.len() - 1];
        let target = sub_line(line, 1.0 - fraction, 1.0)
            .map(|l| l.0[0])
            .unwrap_or(line.0[0]);
        (origin, target)
    } else {
        let origin = line.0[0];
        let target = sub_line(line, 0.0, fraction)
            .map(|l| l.0[l.0.len() - 1])
            .unwrap_or(line.0[line.0.len() - 1]);
        (origin, target)
    };

    let degrees = (target.x - origin.x).atan2(target.y - origin.y).to_degrees();
    (degrees + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn sub_line_cuts_inside_segments() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0)];
        let cut = sub_line(&line, 0.25, 0.75).unwrap();

        assert_eq!(cut.0.first().unwrap(), &Coord { x: 50.0, y: 0.0 });
        assert_eq!(cut.0[1], Coord { x: 100.0, y: 0.0 });
        assert_eq!(cut.0.last().unwrap(), &Coord { x: 100.0, y: 50.0 });
        assert!((line_length_m(&cut) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn sub_line_rejects_empty_ranges() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        assert!(sub_line(&line, 0.5, 0.5).is_none());
        assert!(sub_line(&line, 0.7, 0.2).is_none());
        assert_eq!(sub_line(&line, 0.0, 1.0).unwrap(), line);
    }

    #[test]
    fn merge_chains_pieces_in_any_orientation() {
        let a = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        let b = line_string![(x: 20.0, y: 0.0), (x: 10.0, y: 0.0)];
        let c = line_string![(x: 20.0, y: 0.0), (x: 30.0, y: 0.0)];

        match merge_lines(vec![a, b, c]) {
            Some(Geometry::LineString(line)) => {
                let xs: Vec<f64> = line.0.iter().map(|c| c.x).collect();
                assert_eq!(xs, vec![0.0, 10.0, 20.0, 30.0]);
            }
            other => panic!("expected one line, got {other:?}"),
        }
    }

    #[test]
    fn merge_keeps_disconnected_pieces_apart() {
        let a = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        let b = line_string![(x: 50.0, y: 0.0), (x: 60.0, y: 0.0)];

        match merge_lines(vec![a, b]) {
            Some(Geometry::MultiLineString(lines)) => assert_eq!(lines.0.len(), 2),
            other => panic!("expected multi line, got {other:?}"),
        }
        assert!(merge_lines(Vec::new()).is_none());
    }

    #[test]
    fn bearings_follow_compass_convention() {
        let north = line_string![(x: 0.0, y: 0.0), (x: 0.0, y: 100.0)];
        let east = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)];

        assert!(bearing_deg(&north, 20.0, false).abs() < 1e-9);
        assert!((bearing_deg(&east, 20.0, false) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(&north, 20.0, true) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn simplify_drops_collinear_points() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.01), (x: 10.0, y: 0.0)];
        assert_eq!(simplify_line(&line, 1.0).0.len(), 2);
        assert_eq!(simplify_line(&line, 0.0).0.len(), 3);
    }
}
