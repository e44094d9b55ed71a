/// Track-log XML reader (format A)
///
/// Streams <trkpt> elements instead of parsing the whole document, so a
/// truncated upload still yields every point that made it onto the wire.
/// A structural error mid-stream is reported as TruncatedXml with the
/// partial point sequence attached; whether a partial track is acceptable
/// input for the kinematics stage is the caller's call, not ours.

use std::io::{BufReader, Read};

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::track::{ParseError, Point, Track, TrackParser};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub struct GpxReader;

#[derive(Default)]
struct PendingPoint {
    lat: Option<f64>,
    lon: Option<f64>,
    elev: Option<f64>,
    time: Option<DateTime<Utc>>,
}

impl PendingPoint {
    fn finish(self) -> Result<Point, ParseError> {
        Ok(Point {
            lat: self.lat.ok_or(ParseError::MissingField("lat"))?,
            lon: self.lon.ok_or(ParseError::MissingField("lon"))?,
            elev: self.elev.ok_or(ParseError::MissingField("ele"))?,
            time: self.time.ok_or(ParseError::MissingField("time"))?,
        })
    }
}

enum TextTarget {
    Elevation,
    Time,
}

impl TrackParser for GpxReader {
    fn parse(&self, input: &mut dyn Read) -> Result<Track, ParseError> {
        let mut reader = Reader::from_reader(BufReader::new(input));
        let mut buf = Vec::new();

        let mut points: Vec<Point> = Vec::new();
        let mut pending: Option<PendingPoint> = None;
        let mut target: Option<TextTarget> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"trkpt" => {
                        let (lat, lon) = read_coords(&e)?;
                        pending = Some(PendingPoint {
                            lat: Some(lat),
                            lon: Some(lon),
                            ..PendingPoint::default()
                        });
                    }
                    b"ele" if pending.is_some() => target = Some(TextTarget::Elevation),
                    b"time" if pending.is_some() => target = Some(TextTarget::Time),
                    _ => {}
                },
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"trkpt" => {
                    // a self-closing track point carries no elevation or time
                    return Err(ParseError::MissingField("ele"));
                }
                Ok(Event::Text(t)) => {
                    if let (Some(field), Some(p)) = (&target, pending.as_mut()) {
                        let text = String::from_utf8_lossy(t.as_ref());
                        let text = text.trim();

                        match field {
                            TextTarget::Elevation => {
                                p.elev = Some(parse_float("ele", text)?);
                            }
                            TextTarget::Time => {
                                let parsed = NaiveDateTime::parse_from_str(text, TIME_FORMAT)
                                    .map_err(|_| ParseError::BadValue {
                                        field: "time",
                                        value: text.to_string(),
                                    })?;
                                p.time = Some(parsed.and_utc());
                            }
                        }
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"trkpt" => {
                        target = None;
                        if let Some(p) = pending.take() {
                            points.push(p.finish()?);
                        }
                    }
                    b"ele" | b"time" => target = None,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(ParseError::TruncatedXml {
                        partial: points,
                        message: err.to_string(),
                    });
                }
            }

            buf.clear();
        }

        Ok(Track::new(points))
    }
}

fn read_coords(e: &BytesStart) -> Result<(f64, f64), ParseError> {
    let mut lat = None;
    let mut lon = None;

    for attr in e.attributes().with_checks(false).flatten() {
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_float("lat", String::from_utf8_lossy(&attr.value).trim())?),
            b"lon" => lon = Some(parse_float("lon", String::from_utf8_lossy(&attr.value).trim())?),
            _ => {}
        }
    }

    let lat = lat.ok_or(ParseError::MissingField("lat"))?;
    let lon = lon.ok_or(ParseError::MissingField("lon"))?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(ParseError::BadValue {
            field: "lat",
            value: lat.to_string(),
        });
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ParseError::BadValue {
            field: "lon",
            value: lon.to_string(),
        });
    }

    Ok((lat, lon))
}

fn parse_float(field: &'static str, text: &str) -> Result<f64, ParseError> {
    text.parse::<f64>().map_err(|_| ParseError::BadValue {
        field,
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><time>2012-12-18T07:59:00Z</time></metadata>
  <trk>
    <name>Morning commute</name>
    <trkseg>
      <trkpt lat="-37.8000" lon="144.9500"><ele>12.0</ele><time>2012-12-18T08:00:00Z</time></trkpt>
      <trkpt lat="-37.7990" lon="144.9510"><ele>12.5</ele><time>2012-12-18T08:00:10Z</time></trkpt>
      <trkpt lat="-37.7980" lon="144.9520"><ele>13.0</ele><time>2012-12-18T08:00:20Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn parses_a_complete_track_log() {
        let mut input = SAMPLE.as_bytes();
        let track = GpxReader.parse(&mut input).unwrap();

        assert_eq!(track.len(), 3);

        let points = track.points();
        assert!((points[0].lat - -37.8).abs() < 1e-9);
        assert!((points[0].lon - 144.95).abs() < 1e-9);
        assert!((points[0].elev - 12.0).abs() < 1e-9);
        assert_eq!(
            (points[2].time - points[0].time).num_seconds(),
            20,
            "timestamps should span 20 seconds"
        );
    }

    #[test]
    fn metadata_time_is_not_a_track_point() {
        let mut input = SAMPLE.as_bytes();
        let track = GpxReader.parse(&mut input).unwrap();
        // only timestamps inside <trkpt> count
        assert_eq!(track.points()[0].time.to_rfc3339(), "2012-12-18T08:00:00+00:00");
    }

    #[test]
    fn truncated_stream_hands_back_partial_points() {
        // cut mid-tag, as an interrupted upload would
        let cut = SAMPLE.find(r#"<trkpt lat="-37.7980""#).unwrap() + 12;
        let mut input = SAMPLE[..cut].as_bytes();

        match GpxReader.parse(&mut input) {
            Err(ParseError::TruncatedXml { partial, .. }) => {
                assert_eq!(partial.len(), 2);
                assert!((partial[1].lat - -37.799).abs() < 1e-9);
            }
            other => panic!("expected TruncatedXml, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unparseable_coordinates() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="abc" lon="144.95"><ele>1.0</ele><time>2012-12-18T08:00:00Z</time></trkpt>
        </trkseg></trk></gpx>"#;
        let mut input = xml.as_bytes();

        match GpxReader.parse(&mut input) {
            Err(ParseError::BadValue { field: "lat", .. }) => {}
            other => panic!("expected BadValue for lat, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="-97.0" lon="144.95"><ele>1.0</ele><time>2012-12-18T08:00:00Z</time></trkpt>
        </trkseg></trk></gpx>"#;
        let mut input = xml.as_bytes();

        assert!(matches!(
            GpxReader.parse(&mut input),
            Err(ParseError::BadValue { field: "lat", .. })
        ));
    }

    #[test]
    fn rejects_a_point_without_elevation() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="-37.8" lon="144.95"><time>2012-12-18T08:00:00Z</time></trkpt>
        </trkseg></trk></gpx>"#;
        let mut input = xml.as_bytes();

        assert!(matches!(
            GpxReader.parse(&mut input),
            Err(ParseError::MissingField("ele"))
        ));
    }

    #[test]
    fn rejects_a_bad_timestamp() {
        let xml = r#"<gpx><trk><trkseg>
            <trkpt lat="-37.8" lon="144.95"><ele>1.0</ele><time>18/12/2012 08:00</time></trkpt>
        </trkseg></trk></gpx>"#;
        let mut input = xml.as_bytes();

        assert!(matches!(
            GpxReader.parse(&mut input),
            Err(ParseError::BadValue { field: "time", .. })
        ));
    }

    #[test]
    fn empty_document_is_an_empty_track() {
        let mut input = r#"<gpx version="1.1"></gpx>"#.as_bytes();
        let track = GpxReader.parse(&mut input).unwrap();
        assert!(track.is_empty());
    }
}
