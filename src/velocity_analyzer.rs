/// Velocity and speed-anomaly derivation
///
/// Turns a Track into one record per consecutive point pair: planar
/// distance and compass bearing in the supplied UTM zone, velocity in
/// km/h, its vector components, and a speed anomaly. The anomaly is the
/// fractional deviation of a short-window smoothed copy of the velocity
/// series (GPS jitter removed) from a long-window smoothed copy (the
/// rider's quiescent speed for the whole track).

use chrono::{DateTime, Utc};

use crate::track::Track;
use crate::utm_projector;
use crate::window_smoother::{smooth_flat, SmoothError, DEFAULT_WINDOW};

const MPS_TO_KMH: f64 = 3.6;

/// Derived kinematics for one consecutive point pair. Position and time
/// are those of the later point. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct VelocityRecord {
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// compass bearing, degrees clockwise from north, [0, 360)
    pub bearing: f64,
    /// planar distance, meters
    pub dist: f64,
    /// km/h
    pub vel: f64,
    /// eastward velocity component, km/h
    pub u: f64,
    /// northward velocity component, km/h
    pub v: f64,
    /// fractional deviation from the track's quiescent speed
    pub anom: f64,
}

/// Derive the velocity-record sequence for a track.
///
/// Consecutive pairs with exactly zero elapsed time (duplicate
/// timestamps) are dropped before any division, keeping every per-pair
/// series index-aligned. With `smooth_output` set, the reported velocity
/// (and its u/v decomposition) is the short-window smoothed series; the
/// anomaly is always computed from the raw velocities.
///
/// Tracks with fewer than two points yield an empty sequence.
pub fn calculate_velocities(
    track: &Track,
    zone: u8,
    smooth_output: bool,
) -> Result<Vec<VelocityRecord>, SmoothError> {
    let points = track.points();
    if points.len() < 2 {
        return Ok(Vec::new());
    }

    let planar: Vec<(f64, f64)> = points
        .iter()
        .map(|p| utm_projector::project(zone, p.lat, p.lon))
        .collect();

    let mut times = Vec::new();
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    let mut thetas = Vec::new();
    let mut dists = Vec::new();
    let mut vels = Vec::new();

    for (pair, coords) in points.windows(2).zip(planar.windows(2)) {
        let elapsed = (pair[1].time - pair[0].time).num_milliseconds() as f64 / 1000.0;
        if elapsed == 0.0 {
            continue;
        }

        let run = coords[1].0 - coords[0].0;
        let rise = coords[1].1 - coords[0].1;
        let dist = (rise * rise + run * run).sqrt();
        let theta = rise.atan2(run);

        times.push(pair[1].time);
        lats.push(pair[1].lat);
        lons.push(pair[1].lon);
        thetas.push(theta);
        dists.push(dist);
        vels.push(dist / elapsed * MPS_TO_KMH);
    }

    // long window approximates the quiescent speed for the whole track,
    // the short window keeps local speed changes while dropping jitter.
    // Both windows are clamped here as explicit policy; the smoother
    // itself refuses undersized input.
    let long_window = vels.len() / 2;
    let short_window = DEFAULT_WINDOW.min(vels.len());

    let long_smooth = smooth_flat(&vels, long_window)?;
    let short_smooth = smooth_flat(&vels, short_window)?;

    let out_vels = if smooth_output {
        smooth_flat(&vels, short_window)?
    } else {
        vels.clone()
    };

    let records = (0..vels.len())
        .map(|i| {
            // a stationary baseline would divide by zero; call that no anomaly
            let anom = if long_smooth[i] == 0.0 {
                0.0
            } else {
                (short_smooth[i] - long_smooth[i]) / long_smooth[i]
            };

            VelocityRecord {
                time: times[i],
                lat: lats[i],
                lon: lons[i],
                bearing: (90.0 - thetas[i].to_degrees()).rem_euclid(360.0),
                dist: dists[i],
                vel: out_vels[i],
                u: out_vels[i] * thetas[i].cos(),
                v: out_vels[i] * thetas[i].sin(),
                anom,
            }
        })
        .collect();

    Ok(records)
}
