/// WGS84 -> UTM forward projection
///
/// The velocity and direction math works on planar (easting, northing)
/// coordinates in a fixed UTM zone supplied by the caller. Standard
/// transverse-Mercator series expansion, k0 = 0.9996. Tracks are assumed
/// to stay within one zone and one hemisphere; the planar deltas the rest
/// of the pipeline consumes are unaffected by the false offsets.

const SEMI_MAJOR_M: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING_M: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH_M: f64 = 10_000_000.0;

/// UTM zone containing a longitude, clamped to the valid 1..=60 range.
pub fn zone_for_longitude(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

/// Central meridian of a zone, degrees.
fn central_meridian(zone: u8) -> f64 {
    f64::from(zone) * 6.0 - 183.0
}

/// Project a geographic coordinate to (easting, northing) in meters.
pub fn project(zone: u8, lat: f64, lon: f64) -> (f64, f64) {
    let e2 = FLATTENING * (2.0 - FLATTENING);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let dlam = (lon - central_meridian(zone)).to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let nu = SEMI_MAJOR_M / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * dlam;

    // meridian arc length from the equator
    let m = SEMI_MAJOR_M
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let easting = SCALE_FACTOR
        * nu
        * (a
            + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING_M;

    let mut northing = SCALE_FACTOR
        * (m + nu
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));

    if lat < 0.0 {
        northing += FALSE_NORTHING_SOUTH_M;
    }

    (easting, northing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_lookup() {
        assert_eq!(zone_for_longitude(144.9631), 55); // Melbourne
        assert_eq!(zone_for_longitude(0.5), 31);
        assert_eq!(zone_for_longitude(-74.0), 18); // New York
        assert_eq!(zone_for_longitude(-180.0), 1);
        assert_eq!(zone_for_longitude(180.0), 60);
    }

    #[test]
    fn central_meridian_maps_to_false_easting() {
        let (easting, _) = project(55, -37.8, 147.0);
        assert!((easting - 500_000.0).abs() < 1e-6, "easting was {easting}");
    }

    #[test]
    fn equator_origin() {
        let (easting, northing) = project(31, 0.0, 3.0);
        assert!((easting - 500_000.0).abs() < 1e-6);
        assert!(northing.abs() < 1e-6, "northing was {northing}");
    }

    #[test]
    fn one_degree_of_latitude_on_the_central_meridian() {
        let (_, n0) = project(31, 0.0, 3.0);
        let (_, n1) = project(31, 1.0, 3.0);
        let arc = n1 - n0;
        // a degree of meridian arc near the equator, scaled by k0
        assert!(arc > 110_000.0 && arc < 111_200.0, "arc was {arc}");
    }

    #[test]
    fn eastward_offset_near_the_equator() {
        let (e0, _) = project(31, 0.0, 3.0);
        let (e1, _) = project(31, 0.0, 3.1);
        let offset = e1 - e0;
        // 0.1 degrees of longitude at the equator, scaled by k0
        assert!((offset - 11_127.0).abs() < 50.0, "offset was {offset}");
    }

    #[test]
    fn melbourne_lands_in_zone_55_south() {
        let (easting, northing) = project(55, -37.8136, 144.9631);
        assert!(easting > 315_000.0 && easting < 325_000.0, "easting was {easting}");
        assert!(
            northing > 5_800_000.0 && northing < 5_830_000.0,
            "northing was {northing}"
        );
    }

    #[test]
    fn northing_grows_northward_either_hemisphere() {
        let (_, n_south_low) = project(55, -37.9, 145.0);
        let (_, n_south_high) = project(55, -37.8, 145.0);
        assert!(n_south_high > n_south_low);

        let (_, n_north_low) = project(31, 48.0, 3.0);
        let (_, n_north_high) = project(31, 48.1, 3.0);
        assert!(n_north_high > n_north_low);
    }
}
