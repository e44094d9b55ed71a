/// Ride speed-anomaly batch pipeline
///
/// Walks a folder of recorded rides (.gpx track logs and .json activity
/// records), derives per-segment velocities and speed anomalies, folds
/// every ride into one spatial grid and writes CSV reports an external
/// renderer can plot: where riders speed up, where they slow down, and
/// optionally split by travel direction against a reference point.

use std::env;
use std::error::Error;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

mod activity_json_reader;
mod anomaly_grid;
mod direction_classifier;
mod gpx_reader;
mod track;
mod utm_projector;
mod velocity_analyzer;
mod window_smoother;

use activity_json_reader::ActivityJsonReader;
use anomaly_grid::{AnomalyGrid, GridError};
use direction_classifier::Direction;
use gpx_reader::GpxReader;
use track::{LatLon, ParseError, Track, TrackParser};
use velocity_analyzer::calculate_velocities;
use window_smoother::SmoothError;

const DEFAULT_GRID_BINS: usize = 50;
// Application-level default reference for directional binning:
// Melbourne CBD, where the sample rides converge.
const DEFAULT_REFERENCE: LatLon = LatLon {
    lat: -37.8136,
    lon: 144.9631,
};

struct CliOptions {
    tracks_dir: PathBuf,
    out_dir: PathBuf,
    bins: usize,
    zone: Option<u8>,
    reference: Option<LatLon>,
}

struct LoadedTrack {
    track: Track,
    format: &'static str,
    status: &'static str,
    warning: Option<String>,
}

#[derive(Debug, Serialize)]
struct TrackSummaryRow {
    filename: String,
    format: &'static str,
    status: &'static str,
    points: usize,
    records: usize,
    distance_km: f64,
    duration_min: f64,
    mean_vel_kmh: f64,
    mean_abs_anom: f64,
    max_anom: f64,
}

#[derive(Debug, Serialize)]
struct GridCellRow {
    layer: &'static str,
    x_bin: usize,
    y_bin: usize,
    lon: f64,
    lat: f64,
    average: f64,
    count: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts = parse_args()?;

    println!("🚴 RIDE SPEED-ANOMALY GRID");
    println!("==========================");
    println!("⚡ Parsing tracks on {} cores", num_cpus::get());

    let files = collect_track_files(&opts.tracks_dir);
    if files.is_empty() {
        println!(
            "⚠️  No .gpx or .json tracks under {}",
            opts.tracks_dir.display()
        );
        return Ok(());
    }
    println!(
        "🔍 Found {} track files under {}\n",
        files.len(),
        opts.tracks_dir.display()
    );

    // parse every file independently in parallel; the grid fold below is
    // strictly sequential
    let outcomes: Vec<(PathBuf, Result<LoadedTrack, ParseError>)> = files
        .par_iter()
        .map(|path| (path.clone(), load_track(path)))
        .collect();

    let mut loaded: Vec<(String, LoadedTrack)> = Vec::new();
    for (path, outcome) in outcomes {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match outcome {
            Ok(t) => {
                println!("   ✅ {} ({} points, {})", name, t.track.len(), t.format);
                if let Some(warning) = &t.warning {
                    println!("      ⚠️  {warning}");
                }
                loaded.push((name, t));
            }
            // bad tracks are skipped, the rest still aggregate
            Err(e) => println!("   ❌ Skipping {name}: {e}"),
        }
    }

    if loaded.is_empty() {
        println!("\n⚠️  Nothing parsed, nothing to bin");
        return Ok(());
    }

    let zone = match opts.zone {
        Some(zone) => zone,
        None => {
            let mid_lon = loaded
                .iter()
                .find_map(|(_, t)| t.track.lon_bounds())
                .map(|(lo, hi)| (lo + hi) / 2.0)
                .unwrap_or(0.0);
            utm_projector::zone_for_longitude(mid_lon)
        }
    };
    println!("\n🗺️  Using UTM zone {zone}");
    if let Some(reference) = opts.reference {
        println!(
            "🧭 Directional binning against reference ({:.4}, {:.4})",
            reference.lat, reference.lon
        );
    }

    let summaries = loaded
        .par_iter()
        .map(|(name, t)| summarize(name, t, zone))
        .collect::<Result<Vec<_>, SmoothError>>()?;

    let tracks: Vec<Track> = loaded.iter().map(|(_, t)| t.track.clone()).collect();
    let grid = match AnomalyGrid::from_tracks(
        &tracks,
        opts.bins,
        opts.bins,
        zone,
        opts.reference,
    ) {
        Ok(grid) => grid,
        Err(GridError::EmptyDomain) => {
            println!("\n⚠️  Parsed tracks carry no points, nothing to bin");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    fs::create_dir_all(&opts.out_dir)?;
    write_track_summary(&opts.out_dir.join("track_summary.csv"), &summaries)?;
    write_grid_cells(&opts.out_dir.join("grid_cells.csv"), &grid)?;

    let total_records: usize = summaries.iter().map(|s| s.records).sum();
    let total_km: f64 = summaries.iter().map(|s| s.distance_km).sum();
    println!(
        "\n📊 {} tracks, {} velocity records, {:.1} km binned into {}x{} cells",
        summaries.len(),
        total_records,
        total_km,
        opts.bins,
        opts.bins
    );

    report_extremes(&grid)?;

    println!("\n✅ Reports written to {}", opts.out_dir.display());

    Ok(())
}

fn parse_args() -> Result<CliOptions, Box<dyn Error>> {
    let mut opts = CliOptions {
        tracks_dir: PathBuf::from("tracks"),
        out_dir: PathBuf::from("output"),
        bins: DEFAULT_GRID_BINS,
        zone: None,
        reference: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bins" => {
                let value = args.next().ok_or("--bins needs a value")?;
                opts.bins = value.parse()?;
            }
            "--zone" => {
                let value = args.next().ok_or("--zone needs a value")?;
                opts.zone = Some(value.parse()?);
            }
            "--reference" => {
                let value = args.next().ok_or("--reference needs LAT,LON")?;
                opts.reference = Some(parse_reference(&value)?);
            }
            "--directional" => {
                if opts.reference.is_none() {
                    opts.reference = Some(DEFAULT_REFERENCE);
                }
            }
            "--out" => {
                let value = args.next().ok_or("--out needs a directory")?;
                opts.out_dir = PathBuf::from(value);
            }
            other => opts.tracks_dir = PathBuf::from(other),
        }
    }

    Ok(opts)
}

fn parse_reference(value: &str) -> Result<LatLon, Box<dyn Error>> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or("--reference needs LAT,LON")?;

    Ok(LatLon {
        lat: lat.trim().parse()?,
        lon: lon.trim().parse()?,
    })
}

fn collect_track_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase())
                    .as_deref(),
                Some("gpx") | Some("json")
            )
        })
        .collect();

    files.sort();
    files
}

fn load_track(path: &Path) -> Result<LoadedTrack, ParseError> {
    let mut file = File::open(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "json" {
        let track = ActivityJsonReader.parse(&mut file)?;
        return Ok(LoadedTrack {
            track,
            format: "activity-json",
            status: "ok",
            warning: None,
        });
    }

    match GpxReader.parse(&mut file) {
        Ok(track) => Ok(LoadedTrack {
            track,
            format: "track-log-xml",
            status: "ok",
            warning: None,
        }),
        // a truncated upload still yields usable points
        Err(ParseError::TruncatedXml { partial, message }) if !partial.is_empty() => {
            Ok(LoadedTrack {
                track: Track::new(partial),
                format: "track-log-xml",
                status: "partial",
                warning: Some(format!(
                    "truncated track log, keeping parsed points ({message})"
                )),
            })
        }
        Err(e) => Err(e),
    }
}

fn summarize(name: &str, loaded: &LoadedTrack, zone: u8) -> Result<TrackSummaryRow, SmoothError> {
    let track = &loaded.track;
    let records = calculate_velocities(track, zone, false)?;

    let duration_min = match (track.points().first(), track.points().last()) {
        (Some(first), Some(last)) => (last.time - first.time).num_seconds() as f64 / 60.0,
        _ => 0.0,
    };

    let (mean_vel_kmh, mean_abs_anom) = if records.is_empty() {
        (0.0, 0.0)
    } else {
        let n = records.len() as f64;
        (
            records.iter().map(|r| r.vel).sum::<f64>() / n,
            records.iter().map(|r| r.anom.abs()).sum::<f64>() / n,
        )
    };

    Ok(TrackSummaryRow {
        filename: name.to_string(),
        format: loaded.format,
        status: loaded.status,
        points: track.len(),
        records: records.len(),
        distance_km: track.haversine_length_m() / 1000.0,
        duration_min,
        mean_vel_kmh,
        mean_abs_anom,
        max_anom: records.iter().map(|r| r.anom).fold(0.0, f64::max),
    })
}

fn write_track_summary(path: &Path, rows: &[TrackSummaryRow]) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn grid_layers(grid: &AnomalyGrid) -> Vec<(&'static str, Option<Direction>)> {
    if grid.is_directional() {
        Direction::ALL
            .iter()
            .map(|d| (d.as_str(), Some(*d)))
            .collect()
    } else {
        vec![("all", None)]
    }
}

fn write_grid_cells(path: &Path, grid: &AnomalyGrid) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    let (xnum, ynum) = grid.shape();

    for (layer, direction) in grid_layers(grid) {
        for x in 0..xnum {
            for y in 0..ynum {
                writer.serialize(GridCellRow {
                    layer,
                    x_bin: x,
                    y_bin: y,
                    lon: grid.lon_edges()[x],
                    lat: grid.lat_edges()[y],
                    average: grid.average_at(x, y, direction)?,
                    count: grid.count_at(x, y, direction)?,
                })?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

fn report_extremes(grid: &AnomalyGrid) -> Result<(), GridError> {
    let (xnum, ynum) = grid.shape();

    for (layer, direction) in grid_layers(grid) {
        let mut slowest: Option<(f64, f64, f64)> = None;
        let mut fastest: Option<(f64, f64, f64)> = None;

        for x in 0..xnum {
            for y in 0..ynum {
                if grid.count_at(x, y, direction)? == 0 {
                    continue;
                }
                let average = grid.average_at(x, y, direction)?;
                let lon = grid.lon_edges()[x];
                let lat = grid.lat_edges()[y];

                if slowest.map_or(true, |(a, _, _)| average < a) {
                    slowest = Some((average, lon, lat));
                }
                if fastest.map_or(true, |(a, _, _)| average > a) {
                    fastest = Some((average, lon, lat));
                }
            }
        }

        if let (Some((slow, slon, slat)), Some((fast, flon, flat))) = (slowest, fastest) {
            println!(
                "🔻 {layer}: strongest slowdown {:.1}% at ({slon:.4}, {slat:.4})",
                slow * 100.0
            );
            println!(
                "🔺 {layer}: strongest speedup  {:+.1}% at ({flon:.4}, {flat:.4})",
                fast * 100.0
            );
        }
    }

    Ok(())
}
