/// Shared track representation
///
/// Both source formats (track-log XML and activity JSON) produce the same
/// ordered point sequence, so the velocity and binning stages are format
/// agnostic. A Track is immutable once parsed.

use std::io::Read;

use chrono::{DateTime, Utc};
use geo::{point, HaversineDistance};
use thiserror::Error;

/// A plain geographic position, used for the directional reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One GPS sample. Owned by the Track that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    pub elev: f64,
    pub time: DateTime<Utc>,
}

/// An ordered point sequence, insertion order = chronological order.
/// Monotone non-decreasing time is assumed downstream, not enforced here.
#[derive(Debug, Clone, Default)]
pub struct Track {
    points: Vec<Point>,
}

impl Track {
    pub fn new(points: Vec<Point>) -> Self {
        Track { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// (min, max) latitude over the raw points, None for an empty track.
    pub fn lat_bounds(&self) -> Option<(f64, f64)> {
        Self::bounds(self.points.iter().map(|p| p.lat))
    }

    /// (min, max) longitude over the raw points, None for an empty track.
    pub fn lon_bounds(&self) -> Option<(f64, f64)> {
        Self::bounds(self.points.iter().map(|p| p.lon))
    }

    fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
        let mut out: Option<(f64, f64)> = None;

        for v in values {
            out = Some(match out {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }

        out
    }

    /// Total great-circle length in meters, for summary reporting.
    pub fn haversine_length_m(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| {
                let a = point!(x: w[0].lon, y: w[0].lat);
                let b = point!(x: w[1].lon, y: w[1].lat);
                a.haversine_distance(&b)
            })
            .sum()
    }
}

/// The parsing capability: turn an input stream into a point sequence.
/// One implementation per source format, selected by the caller.
pub trait TrackParser {
    fn parse(&self, input: &mut dyn Read) -> Result<Track, ParseError>;
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML stream broke mid-track (truncated upload). The points
    /// parsed before the break are attached so the caller can decide
    /// whether a partial track is acceptable.
    #[error("track log truncated after partial parse: {message}")]
    TruncatedXml { partial: Vec<Point>, message: String },

    /// Activity record has no `path` array.
    #[error("activity record has no path")]
    MissingPath,

    /// Activity contains manually entered points, which carry no reliable
    /// GPS timing and cannot support velocity derivation.
    #[error("activity contains manually entered points")]
    ManualEntry,

    /// A track point is missing a required child element.
    #[error("track point missing required field `{0}`")]
    MissingField(&'static str),

    /// A field was present but unparseable or out of range.
    #[error("bad value for `{field}`: {value:?}")]
    BadValue { field: &'static str, value: String },

    #[error("malformed activity record: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
