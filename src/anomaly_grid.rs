/// Spatial anomaly binning
///
/// Accumulates the speed anomalies of many tracks into a fixed 2-D grid
/// of running per-cell averages, optionally split into inbound/outbound
/// layers against a reference point. The spatial domain is fixed at
/// construction from the bounding box of the supplied tracks and never
/// resized. Averages are recalculated explicitly, not on every add: the
/// average view is stale after add_track until recalculate runs.

use thiserror::Error;

use crate::direction_classifier::{classify, Direction};
use crate::track::{LatLon, Track};
use crate::velocity_analyzer::calculate_velocities;
use crate::window_smoother::SmoothError;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("no track points to establish the grid domain")]
    EmptyDomain,

    #[error("grid needs at least 2 bins per axis")]
    TooFewBins,

    /// A record fell outside the domain fixed at construction. Not
    /// recoverable by the grid; the caller supplied a track beyond the
    /// bounding box it was built with.
    #[error("{axis} {value} outside grid domain [{min}, {max}]")]
    OutOfBounds {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("cell ({x}, {y}) outside {xnum}x{ynum} grid")]
    BadCell {
        x: usize,
        y: usize,
        xnum: usize,
        ynum: usize,
    },

    #[error("grid was built without a reference point")]
    NotDirectional,

    #[error("directional grid needs a direction to read")]
    DirectionRequired,

    #[error(transparent)]
    Velocity(#[from] SmoothError),
}

#[derive(Debug, Clone)]
struct Layer {
    total: Vec<f64>,
    count: Vec<u32>,
    average: Vec<f64>,
}

impl Layer {
    fn zeroed(cells: usize) -> Self {
        Layer {
            total: vec![0.0; cells],
            count: vec![0; cells],
            average: vec![0.0; cells],
        }
    }
}

/// A dense accumulator over a rectangular lat/lon domain. Bin edges are
/// evenly spaced and inclusive of both ends; bins are right-closed
/// (a value belongs to the last edge at or below it).
#[derive(Debug, Clone)]
pub struct AnomalyGrid {
    lon_edges: Vec<f64>,
    lat_edges: Vec<f64>,
    zone: u8,
    reference: Option<LatLon>,
    layers: Vec<Layer>,
}

impl AnomalyGrid {
    /// Build a grid spanning the union of the tracks' bounding boxes and
    /// fold every track in, recalculating once at the end.
    pub fn from_tracks(
        tracks: &[Track],
        xnum: usize,
        ynum: usize,
        zone: u8,
        reference: Option<LatLon>,
    ) -> Result<Self, GridError> {
        if xnum < 2 || ynum < 2 {
            return Err(GridError::TooFewBins);
        }

        let (minlat, maxlat) = union_bounds(tracks.iter().filter_map(Track::lat_bounds))
            .ok_or(GridError::EmptyDomain)?;
        let (minlon, maxlon) = union_bounds(tracks.iter().filter_map(Track::lon_bounds))
            .ok_or(GridError::EmptyDomain)?;

        let nlayers = if reference.is_some() { 2 } else { 1 };
        let mut grid = AnomalyGrid {
            lon_edges: linspace(minlon, maxlon, xnum),
            lat_edges: linspace(minlat, maxlat, ynum),
            zone,
            reference,
            layers: vec![Layer::zeroed(xnum * ynum); nlayers],
        };

        for track in tracks {
            grid.add_track(track, false)?;
        }
        grid.recalculate();

        Ok(grid)
    }

    /// Fold one more track's velocity records into the accumulators.
    /// Averages are only refreshed when `recalculate` is set; batching
    /// callers recalculate once after their last add.
    pub fn add_track(&mut self, track: &Track, recalculate: bool) -> Result<(), GridError> {
        let records = calculate_velocities(track, self.zone, false)?;

        for r in &records {
            let (xi, yi) = self.bin_index(r.lon, r.lat)?;
            let cell = xi * self.lat_edges.len() + yi;

            let layer = match self.reference {
                Some(reference) => {
                    let direction = classify(r.lat, r.lon, r.bearing, reference, self.zone);
                    &mut self.layers[direction.index()]
                }
                None => &mut self.layers[0],
            };

            layer.total[cell] += r.anom;
            layer.count[cell] += 1;
        }

        if recalculate {
            self.recalculate();
        }

        Ok(())
    }

    /// Refresh the average view from the accumulators. Cells that have
    /// never received a record keep their previous value (initially 0),
    /// so a zero average is ambiguous; consult the count to distinguish
    /// "no data" from "no anomaly".
    pub fn recalculate(&mut self) {
        for layer in &mut self.layers {
            for i in 0..layer.total.len() {
                if layer.count[i] > 0 {
                    layer.average[i] = layer.total[i] / f64::from(layer.count[i]);
                }
            }
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.lon_edges.len(), self.lat_edges.len())
    }

    pub fn lon_edges(&self) -> &[f64] {
        &self.lon_edges
    }

    pub fn lat_edges(&self) -> &[f64] {
        &self.lat_edges
    }

    pub fn is_directional(&self) -> bool {
        self.reference.is_some()
    }

    pub fn average_at(
        &self,
        x: usize,
        y: usize,
        direction: Option<Direction>,
    ) -> Result<f64, GridError> {
        let layer = self.layer(direction)?;
        Ok(layer.average[self.cell(x, y)?])
    }

    pub fn count_at(
        &self,
        x: usize,
        y: usize,
        direction: Option<Direction>,
    ) -> Result<u32, GridError> {
        let layer = self.layer(direction)?;
        Ok(layer.count[self.cell(x, y)?])
    }

    /// Dense average view for renderers, indexed `x_bin * ynum + y_bin`.
    pub fn averages(&self, direction: Option<Direction>) -> Result<&[f64], GridError> {
        Ok(&self.layer(direction)?.average)
    }

    pub fn counts(&self, direction: Option<Direction>) -> Result<&[u32], GridError> {
        Ok(&self.layer(direction)?.count)
    }

    fn layer(&self, direction: Option<Direction>) -> Result<&Layer, GridError> {
        match (self.reference.is_some(), direction) {
            (true, Some(d)) => Ok(&self.layers[d.index()]),
            (true, None) => Err(GridError::DirectionRequired),
            (false, None) => Ok(&self.layers[0]),
            (false, Some(_)) => Err(GridError::NotDirectional),
        }
    }

    fn cell(&self, x: usize, y: usize) -> Result<usize, GridError> {
        let (xnum, ynum) = self.shape();
        if x >= xnum || y >= ynum {
            return Err(GridError::BadCell { x, y, xnum, ynum });
        }
        Ok(x * ynum + y)
    }

    fn bin_index(&self, lon: f64, lat: f64) -> Result<(usize, usize), GridError> {
        let xi = locate(&self.lon_edges, lon).ok_or_else(|| GridError::OutOfBounds {
            axis: "longitude",
            value: lon,
            min: self.lon_edges[0],
            max: *self.lon_edges.last().unwrap_or(&f64::NAN),
        })?;
        let yi = locate(&self.lat_edges, lat).ok_or_else(|| GridError::OutOfBounds {
            axis: "latitude",
            value: lat,
            min: self.lat_edges[0],
            max: *self.lat_edges.last().unwrap_or(&f64::NAN),
        })?;

        Ok((xi, yi))
    }
}

fn union_bounds(bounds: impl Iterator<Item = (f64, f64)>) -> Option<(f64, f64)> {
    let mut out: Option<(f64, f64)> = None;

    for (lo, hi) in bounds {
        out = Some(match out {
            None => (lo, hi),
            Some((a, b)) => (a.min(lo), b.max(hi)),
        });
    }

    out
}

/// Evenly spaced edges, inclusive of both ends. The final edge is pinned
/// to `hi` so a value at the exact domain maximum always bins.
fn linspace(lo: f64, hi: f64, num: usize) -> Vec<f64> {
    let step = (hi - lo) / (num - 1) as f64;
    let mut edges: Vec<f64> = (0..num).map(|i| lo + step * i as f64).collect();
    edges[num - 1] = hi;
    edges
}

/// Right-closed bin lookup: index of the last edge at or below the value.
/// None when the value lies outside [first, last].
fn locate(edges: &[f64], value: f64) -> Option<usize> {
    if !value.is_finite() {
        return None;
    }
    if value < edges[0] || value > *edges.last()? {
        return None;
    }

    let idx = edges.partition_point(|e| *e <= value) - 1;
    Some(idx.min(edges.len() - 1))
}
