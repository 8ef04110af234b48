use std::io::BufReader;

use chrono::{DateTime, Utc};
use geo::{HaversineDistance, Point};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::comparison::METERS_PER_MILE;
use crate::models::summary::{format_decimal_minutes, MileSplit, TrackRow, TrackSummary};

/// Window length, in samples, for the rolling pace column of the full export.
const ROLLING_WINDOW: usize = 10;

/// Mile crossings closer than this to the end of the track are treated as
/// the end itself, so GPS jitter does not produce a sub-meter "partial".
const PARTIAL_SPLIT_MIN_METERS: f64 = 1.0;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("invalid GPX document: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("track has fewer than two timed points")]
    EmptyTrack,
    #[error("track point missing timestamp")]
    MissingTime,
}

/// Turns decoded track text into summary statistics or a full per-point
/// table. The orchestrator treats every failure from this seam opaquely.
pub trait SummaryProvider {
    fn summarize(&self, text: &str) -> Result<TrackSummary, TrackError>;
    fn full_rows(&self, text: &str) -> Result<Vec<TrackRow>, TrackError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpxSummarizer;

impl SummaryProvider for GpxSummarizer {
    fn summarize(&self, text: &str) -> Result<TrackSummary, TrackError> {
        let points = read_points(text)?;
        Ok(summarize_points(&points))
    }

    fn full_rows(&self, text: &str) -> Result<Vec<TrackRow>, TrackError> {
        let points = read_points(text)?;
        Ok(rows_from_points(&points))
    }
}

struct SamplePoint {
    point: Point<f64>,
    elevation: Option<f64>,
    time: OffsetDateTime,
}

fn read_points(text: &str) -> Result<Vec<SamplePoint>, TrackError> {
    let document = gpx::read(BufReader::new(text.as_bytes()))?;

    let mut points = Vec::new();
    for track in &document.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                let time = waypoint.time.ok_or(TrackError::MissingTime)?;
                points.push(SamplePoint {
                    point: waypoint.point(),
                    elevation: waypoint.elevation,
                    time: OffsetDateTime::from(time),
                });
            }
        }
    }

    if points.len() < 2 {
        return Err(TrackError::EmptyTrack);
    }
    Ok(points)
}

/// Cumulative haversine distance at each sample, in meters. First entry is 0.
fn cumulative_distances(points: &[SamplePoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].point.haversine_distance(&pair[1].point);
        cumulative.push(total);
    }
    cumulative
}

fn summarize_points(points: &[SamplePoint]) -> TrackSummary {
    let cumulative = cumulative_distances(points);
    let total_meters = cumulative[cumulative.len() - 1];
    let total_miles = total_meters / METERS_PER_MILE;

    let start = points[0].time;
    let end = points[points.len() - 1].time;
    let total_minutes = (end - start).as_seconds_f64() / 60.0;

    let pace_minutes_per_mile = if total_miles > 0.0 {
        total_minutes / total_miles
    } else {
        0.0
    };

    TrackSummary {
        total_distance_miles: total_miles,
        total_distance_meters: total_meters,
        pace_mile_string: format_decimal_minutes(pace_minutes_per_mile),
        total_time_minutes: total_minutes,
        start_time: to_chrono(start),
        splits: mile_splits(points, &cumulative),
    }
}

/// Per-mile durations, interpolating the crossing time within the leg that
/// carries the track past each mile mark.
fn mile_splits(points: &[SamplePoint], cumulative: &[f64]) -> Vec<MileSplit> {
    let total_meters = cumulative[cumulative.len() - 1];
    let start = points[0].time;
    let end_seconds = (points[points.len() - 1].time - start).as_seconds_f64();

    let mut splits = Vec::new();
    let mut previous_crossing = 0.0;
    let mut mile = 1u32;

    while mile as f64 * METERS_PER_MILE <= total_meters {
        let crossing = crossing_seconds(points, cumulative, mile as f64 * METERS_PER_MILE);
        splits.push(MileSplit {
            mile,
            minutes: (crossing - previous_crossing) / 60.0,
            partial: false,
        });
        previous_crossing = crossing;
        mile += 1;
    }

    let leftover_meters = total_meters - (mile as f64 - 1.0) * METERS_PER_MILE;
    if leftover_meters > PARTIAL_SPLIT_MIN_METERS {
        splits.push(MileSplit {
            mile,
            minutes: (end_seconds - previous_crossing) / 60.0,
            partial: true,
        });
    }

    splits
}

/// Seconds from track start until the cumulative distance reaches
/// `target_meters`, linearly interpolated within the crossing leg.
fn crossing_seconds(points: &[SamplePoint], cumulative: &[f64], target_meters: f64) -> f64 {
    let start = points[0].time;
    for (i, pair) in cumulative.windows(2).enumerate() {
        if pair[1] >= target_meters {
            let leg = pair[1] - pair[0];
            let fraction = if leg > 0.0 {
                (target_meters - pair[0]) / leg
            } else {
                0.0
            };
            let t0 = (points[i].time - start).as_seconds_f64();
            let t1 = (points[i + 1].time - start).as_seconds_f64();
            return t0 + fraction * (t1 - t0);
        }
    }
    (points[points.len() - 1].time - start).as_seconds_f64()
}

fn rows_from_points(points: &[SamplePoint]) -> Vec<TrackRow> {
    let cumulative = cumulative_distances(points);

    let mut rows = Vec::with_capacity(points.len());
    for (i, sample) in points.iter().enumerate() {
        let leg_meters = if i == 0 {
            0.0
        } else {
            cumulative[i] - cumulative[i - 1]
        };
        let leg_seconds = if i == 0 {
            0.0
        } else {
            (sample.time - points[i - 1].time).as_seconds_f64()
        };
        let speed_mps = if leg_seconds > 0.0 {
            leg_meters / leg_seconds
        } else {
            0.0
        };

        // Rolling pace over the trailing window, in minutes per mile.
        let window_start = i.saturating_sub(ROLLING_WINDOW);
        let window_meters = cumulative[i] - cumulative[window_start];
        let window_seconds = (sample.time - points[window_start].time).as_seconds_f64();
        let rolling_pace_min_mile = if i > 0 && window_meters > 0.0 {
            Some((window_seconds / 60.0) / (window_meters / METERS_PER_MILE))
        } else {
            None
        };

        rows.push(TrackRow {
            time: sample.time.format(&Rfc3339).unwrap_or_default(),
            latitude: sample.point.y(),
            longitude: sample.point.x(),
            elevation: sample.elevation,
            leg_distance_meters: leg_meters,
            cumulative_distance_meters: cumulative[i],
            speed_mps,
            rolling_pace_min_mile,
        });
    }
    rows
}

fn to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_default()
}
