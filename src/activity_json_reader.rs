/// Activity JSON reader (format B)
///
/// One activity record per stream: a `start_time` plus a `path` array of
/// point objects whose `timestamp` is an offset in seconds from the
/// start. Records without a path, and records containing manually entered
/// points (no reliable GPS timing), are disqualified before any
/// kinematics run.

use std::io::Read;

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

use crate::track::{ParseError, Point, Track, TrackParser};

const START_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

pub struct ActivityJsonReader;

#[derive(Debug, Deserialize)]
struct ActivityRecord {
    start_time: String,
    #[serde(default)]
    path: Option<Vec<PathEntry>>,
}

#[derive(Debug, Deserialize)]
struct PathEntry {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    /// offset from start_time, seconds
    timestamp: f64,
    #[serde(rename = "type", default)]
    entry_type: Option<String>,
}

impl TrackParser for ActivityJsonReader {
    fn parse(&self, input: &mut dyn Read) -> Result<Track, ParseError> {
        let record: ActivityRecord = serde_json::from_reader(input)?;

        let path = record.path.ok_or(ParseError::MissingPath)?;
        if path
            .iter()
            .any(|p| p.entry_type.as_deref() == Some("manual"))
        {
            return Err(ParseError::ManualEntry);
        }

        let start = NaiveDateTime::parse_from_str(&record.start_time, START_TIME_FORMAT)
            .map_err(|_| ParseError::BadValue {
                field: "start_time",
                value: record.start_time.clone(),
            })?
            .and_utc();

        let points = path
            .into_iter()
            .map(|p| Point {
                lat: p.latitude,
                lon: p.longitude,
                elev: p.altitude,
                time: start + Duration::milliseconds((p.timestamp * 1000.0).round() as i64),
            })
            .collect();

        Ok(Track::new(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "userID": 5510224,
        "uri": "/fitnessActivities/101",
        "type": "Cycling",
        "start_time": "Tue, 18 Dec 2012 08:00:00",
        "total_distance": 1204.0,
        "path": [
            {"latitude": -37.8000, "longitude": 144.9500, "altitude": 12.0, "timestamp": 0.0, "type": "start"},
            {"latitude": -37.7990, "longitude": 144.9510, "altitude": 12.5, "timestamp": 10.0, "type": "gps"},
            {"latitude": -37.7980, "longitude": 144.9520, "altitude": 13.0, "timestamp": 20.5, "type": "gps"},
            {"latitude": -37.7970, "longitude": 144.9530, "altitude": 13.5, "timestamp": 31.0, "type": "end"}
        ]
    }"#;

    #[test]
    fn parses_an_activity_record() {
        let mut input = SAMPLE.as_bytes();
        let track = ActivityJsonReader.parse(&mut input).unwrap();

        assert_eq!(track.len(), 4);

        let points = track.points();
        assert!((points[1].lat - -37.799).abs() < 1e-9);
        assert!((points[1].elev - 12.5).abs() < 1e-9);
        assert_eq!(points[0].time.to_rfc3339(), "2012-12-18T08:00:00+00:00");
        // fractional offsets survive to millisecond precision
        assert_eq!((points[2].time - points[0].time).num_milliseconds(), 20_500);
    }

    #[test]
    fn missing_path_is_disqualified() {
        let mut input = r#"{"userID": 1, "start_time": "Tue, 18 Dec 2012 08:00:00"}"#.as_bytes();

        assert!(matches!(
            ActivityJsonReader.parse(&mut input),
            Err(ParseError::MissingPath)
        ));
    }

    #[test]
    fn manual_entries_are_disqualified() {
        let json = r#"{
            "start_time": "Tue, 18 Dec 2012 08:00:00",
            "path": [
                {"latitude": -37.8, "longitude": 144.95, "altitude": 12.0, "timestamp": 0.0, "type": "gps"},
                {"latitude": -37.7, "longitude": 144.96, "altitude": 13.0, "timestamp": 10.0, "type": "manual"}
            ]
        }"#;
        let mut input = json.as_bytes();

        assert!(matches!(
            ActivityJsonReader.parse(&mut input),
            Err(ParseError::ManualEntry)
        ));
    }

    #[test]
    fn bad_start_time_is_reported() {
        let json = r#"{
            "start_time": "2012-12-18 08:00:00",
            "path": [
                {"latitude": -37.8, "longitude": 144.95, "altitude": 12.0, "timestamp": 0.0, "type": "gps"}
            ]
        }"#;
        let mut input = json.as_bytes();

        assert!(matches!(
            ActivityJsonReader.parse(&mut input),
            Err(ParseError::BadValue { field: "start_time", .. })
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut input = r#"{"start_time": "#.as_bytes();

        assert!(matches!(
            ActivityJsonReader.parse(&mut input),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn empty_path_yields_an_empty_track() {
        let json = r#"{"start_time": "Tue, 18 Dec 2012 08:00:00", "path": []}"#;
        let mut input = json.as_bytes();

        let track = ActivityJsonReader.parse(&mut input).unwrap();
        assert!(track.is_empty());
    }
}
