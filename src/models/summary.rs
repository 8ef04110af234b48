use chrono::{DateTime, Utc};
use serde::Serialize;

/// Summary statistics for one uploaded track, produced once per submission.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub total_distance_miles: f64,
    pub total_distance_meters: f64,
    pub pace_mile_string: String,
    pub total_time_minutes: f64,
    pub start_time: DateTime<Utc>,
    pub splits: Vec<MileSplit>,
}

/// Duration of one per-mile segment. The trailing fraction of a mile, if
/// any, is reported as a partial split under the next mile index.
#[derive(Debug, Clone, Serialize)]
pub struct MileSplit {
    pub mile: u32,
    pub minutes: f64,
    pub partial: bool,
}

/// One row of the full per-point export.
#[derive(Debug, Clone, Serialize)]
pub struct TrackRow {
    pub time: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub leg_distance_meters: f64,
    pub cumulative_distance_meters: f64,
    pub speed_mps: f64,
    pub rolling_pace_min_mile: Option<f64>,
}

/// What the upload endpoint returns for display.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayPayload {
    pub pace_mile_string: String,
    pub total_time_string: String,
    pub gps_distance_miles: f64,
    pub gps_distance_meters: f64,
    pub start_time: DateTime<Utc>,
    pub splits: Vec<SplitLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitLine {
    pub label: String,
    pub time_string: String,
}

impl DisplayPayload {
    pub fn from_summary(summary: &TrackSummary) -> Self {
        let splits = summary
            .splits
            .iter()
            .map(|split| SplitLine {
                label: if split.partial {
                    format!("Mile {} (partial)", split.mile)
                } else {
                    format!("Mile {}", split.mile)
                },
                time_string: format_decimal_minutes(split.minutes),
            })
            .collect();

        Self {
            pace_mile_string: summary.pace_mile_string.clone(),
            total_time_string: format_decimal_minutes(summary.total_time_minutes),
            gps_distance_miles: summary.total_distance_miles,
            gps_distance_meters: summary.total_distance_meters,
            start_time: summary.start_time,
            splits,
        }
    }
}

/// Formats decimal minutes as "M:SS.s", e.g. 8.5 -> "8:30.0".
pub fn format_decimal_minutes(decimal_minutes: f64) -> String {
    let mut minutes = decimal_minutes.trunc() as i64;
    let mut seconds = (decimal_minutes - minutes as f64) * 60.0;
    // One decimal of seconds; keep "59.97" from printing as "60.0".
    if seconds > 59.949 {
        minutes += 1;
        seconds = 0.0;
    }
    format!("{}:{:04.1}", minutes, seconds)
}
