use serde::Serialize;

pub const METERS_PER_MILE: f64 = 1609.344;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comparison {
    pub error_percent: f64,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComparisonRow {
    pub source: &'static str,
    pub distance_meters: f64,
}

/// Compares the GPS-derived distance against a device-reported one.
///
/// Returns `None` when no usable submitted distance is available; a zero,
/// negative, or non-finite value is "no comparison", not an error. The
/// denominator is the submitted distance, not the GPS distance.
pub fn compare(gps_distance_miles: f64, submitted_distance_miles: Option<f64>) -> Option<Comparison> {
    let submitted = submitted_distance_miles?;
    if !submitted.is_finite() || submitted <= 0.0 {
        return None;
    }

    let error_percent = 100.0 * (submitted - gps_distance_miles) / submitted;
    Some(Comparison {
        error_percent,
        rows: vec![
            ComparisonRow {
                source: "Submitted",
                distance_meters: submitted * METERS_PER_MILE,
            },
            ComparisonRow {
                source: "GPS",
                distance_meters: gps_distance_miles * METERS_PER_MILE,
            },
        ],
    })
}
