// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

// ===========================================================================
// UTM zone 33N (EPSG:25833) <-> WGS84 (EPSG:4326)
// Transverse Mercator via the Krüger series (third order, sub-millimetre in-zone).
// ===========================================================================

use geo::{Coord, LineString, MapCoords};

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_222_101;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const UTM33_CENTRAL_MERIDIAN: f64 = 15.0;

struct KrugerSeries {
    n: f64,
    rectifying_radius: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl KrugerSeries {
    fn new() -> Self {
        let n = FLATTENING / (2.0 - FLATTENING);
        let n2 = n * n;
        let n3 = n2 * n;
        Self {
            n,
            rectifying_radius: SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
        }
    }
}

/// Convert (longitude, latitude) in degrees to UTM 33N (easting, northing) in metres.
pub fn wgs84_to_utm33(lon: f64, lat: f64) -> (f64, f64) {
    let k = KrugerSeries::new();
    let phi = lat.to_radians();
    let dlambda = (lon - UTM33_CENTRAL_MERIDIAN).to_radians();

    let c = 2.0 * k.n.sqrt() / (1.0 + k.n);
    let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
    let xi_prime = (t / dlambda.cos()).atan();
    let eta_prime = (dlambda.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_prime;
    let mut eta = eta_prime;
    for (j, alpha) in k.alpha.iter().enumerate() {
        let m = 2.0 * (j as f64 + 1.0);
        xi += alpha * (m * xi_prime).sin() * (m * eta_prime).cosh();
        eta += alpha * (m * xi_prime).cos() * (m * eta_prime).sinh();
    }

    let scale = SCALE_FACTOR * k.rectifying_radius;
    (FALSE_EASTING + scale * eta, scale * xi)
}

/// Convert UTM 33N (easting, northing) in metres to (longitude, latitude) in degrees.
pub fn utm33_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let k = KrugerSeries::new();
    let scale = SCALE_FACTOR * k.rectifying_radius;
    let xi = northing / scale;
    let eta = (easting - FALSE_EASTING) / scale;

    let mut xi_prime = xi;
    let mut eta_prime = eta;
    for (j, beta) in k.beta.iter().enumerate() {
        let m = 2.0 * (j as f64 + 1.0);
        xi_prime -= beta * (m * xi).sin() * (m * eta).cosh();
        eta_prime -= beta * (m * xi).cos() * (m * eta).sinh();
    }

    let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
    let mut phi = chi;
    for (j, delta) in k.delta.iter().enumerate() {
        let m = 2.0 * (j as f64 + 1.0);
        phi += delta * (m * chi).sin();
    }
    let lambda = (eta_prime.sinh() / xi_prime.cos()).atan();

    (UTM33_CENTRAL_MERIDIAN + lambda.to_degrees(), phi.to_degrees())
}

pub fn coord_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    let (x, y) = utm33_to_wgs84(coord.x, coord.y);
    Coord { x, y }
}

/// Convert a UTM 33N line to WGS84 (x = longitude, y = latitude).
pub fn line_to_wgs84(line: &LineString<f64>) -> LineString<f64> {
    line.map_coords(coord_to_wgs84)
}

pub fn geometry_to_wgs84(geometry: &geo::Geometry<f64>) -> geo::Geometry<f64> {
    geometry.map_coords(coord_to_wgs84)
}
