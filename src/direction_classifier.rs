/// Inbound/outbound classification
///
/// Splits velocity samples by whether the direction of travel points into
/// the half-plane facing a fixed reference point. Comparison happens on
/// the wrapped difference between the two compass bearings, which has no
/// seam at 0/360.

use crate::track::LatLon;
use crate::utm_projector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Inbound, Direction::Outbound];

    pub fn index(self) -> usize {
        match self {
            Direction::Inbound => 0,
            Direction::Outbound => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Classify a sample's bearing against the bearing from the sample to the
/// reference point, both computed in the same planar zone. Inbound means
/// travel within the open 180-degree window centred on the to-reference
/// bearing; both window boundaries classify outbound.
pub fn classify(lat: f64, lon: f64, bearing: f64, reference: LatLon, zone: u8) -> Direction {
    let (se, sn) = utm_projector::project(zone, lat, lon);
    let (re, rn) = utm_projector::project(zone, reference.lat, reference.lon);

    let theta = (rn - sn).atan2(re - se);
    let ref_bearing = (90.0 - theta.to_degrees()).rem_euclid(360.0);

    let diff = (bearing - ref_bearing).rem_euclid(360.0);
    if diff < 90.0 || diff > 270.0 {
        Direction::Inbound
    } else {
        Direction::Outbound
    }
}
