use std::io::Read;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::comparison::{self, Comparison};
use crate::db::CalibrationStore;
use crate::error::SubmissionError;
use crate::models::summary::DisplayPayload;
use crate::session::{SessionRegistry, Submission, SubmissionPhase};
use crate::track::SummaryProvider;

#[derive(Debug, Deserialize)]
pub struct ComparisonRequest {
    pub submitted_distance_miles: Option<f64>,
    #[serde(default)]
    pub opt_in: bool,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub device_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonOutcome {
    pub comparison: Option<Comparison>,
    pub recorded: bool,
}

/// Decodes and summarizes one uploaded track, registering it for the
/// follow-up compare and export steps. No persistence happens here.
pub async fn handle_upload<P: SummaryProvider>(
    registry: &SessionRegistry,
    provider: &P,
    content: &[u8],
    filename: &str,
) -> Result<(Uuid, DisplayPayload), SubmissionError> {
    // 1. Validate the extension and decode to track text.
    let decoded = decode_track_bytes(content, filename)?;

    // 2. Hash the decompressed bytes; compressed and plain uploads of the
    //    same content must produce the same hash.
    let file_hash = hex::encode(Sha256::digest(decoded.as_bytes()));

    // 3. Summarize. Provider failures of any kind surface as one kind.
    let summary = provider.summarize(&decoded).map_err(|e| {
        warn!("Track provider rejected {}: {}", filename, e);
        SubmissionError::Parse(e.to_string())
    })?;

    let payload = DisplayPayload::from_summary(&summary);

    // 4. Register the submission so later steps skip re-decoding.
    let id = registry
        .insert(Submission {
            filename: filename.to_string(),
            content: decoded,
            file_hash,
            summary,
            phase: SubmissionPhase::Parsed,
            comparison: None,
        })
        .await;

    info!("Parsed {} as submission {}", filename, id);
    Ok((id, payload))
}

/// Runs the comparison for a parsed submission and, when the user opted in
/// and a comparison was actually produced, upserts a calibration row.
/// A storage failure is logged and reported as `recorded: false`; it never
/// suppresses the comparison result.
pub async fn compare_and_record(
    registry: &SessionRegistry,
    store: &CalibrationStore,
    id: Uuid,
    request: &ComparisonRequest,
) -> Result<ComparisonOutcome, SubmissionError> {
    let submission = registry
        .get(id)
        .await
        .ok_or(SubmissionError::UnknownSubmission(id))?;

    let comparison = comparison::compare(
        submission.summary.total_distance_miles,
        request.submitted_distance_miles,
    );
    let Some(comparison) = comparison else {
        return Ok(ComparisonOutcome {
            comparison: None,
            recorded: false,
        });
    };

    registry
        .update(id, |s| {
            s.comparison = Some(comparison.clone());
            if s.phase == SubmissionPhase::Parsed {
                s.phase = SubmissionPhase::Compared;
            }
        })
        .await;

    let mut recorded = false;
    if request.opt_in {
        // compare() only succeeds for a finite positive submitted distance.
        if let Some(submitted) = request.submitted_distance_miles {
            let label = device_label(request);
            match store
                .record(
                    &submission.file_hash,
                    submission.summary.total_distance_miles,
                    submitted,
                    &label,
                )
                .await
                .map_err(SubmissionError::Persistence)
            {
                Ok(()) => {
                    recorded = true;
                    registry
                        .update(id, |s| s.phase = SubmissionPhase::Persisted)
                        .await;
                    info!("Recorded calibration for submission {}", id);
                }
                Err(e) => {
                    error!("Failed to record calibration for submission {}: {}", id, e);
                }
            }
        }
    }

    Ok(ComparisonOutcome {
        comparison: Some(comparison),
        recorded,
    })
}

/// Serializes the full per-point table for a cached submission as CSV.
/// Returns the derived attachment filename alongside the bytes.
pub async fn export_csv<P: SummaryProvider>(
    registry: &SessionRegistry,
    provider: &P,
    id: Uuid,
) -> Result<(String, Vec<u8>), SubmissionError> {
    let submission = registry
        .get(id)
        .await
        .ok_or(SubmissionError::UnknownSubmission(id))?;

    let rows = provider.full_rows(&submission.content).map_err(|e| {
        warn!("Track provider rejected cached submission {}: {}", id, e);
        SubmissionError::Parse(e.to_string())
    })?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        writer
            .serialize(row)
            .map_err(|e| SubmissionError::Internal(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| SubmissionError::Internal(e.to_string()))?;

    Ok((csv_file_name(&submission.filename), bytes))
}

/// "run.gpx.gz" -> "run.csv", "run.gpx" -> "run.csv".
pub fn csv_file_name(upload_name: &str) -> String {
    let base = upload_name
        .strip_suffix(".gpx.gz")
        .or_else(|| upload_name.strip_suffix(".gpx"))
        .unwrap_or(upload_name);
    format!("{}.csv", base)
}

fn decode_track_bytes(content: &[u8], filename: &str) -> Result<String, SubmissionError> {
    if filename.ends_with(".gpx.gz") {
        let mut decoder = GzDecoder::new(content);
        let mut bytes = Vec::new();
        decoder
            .read_to_end(&mut bytes)
            .map_err(SubmissionError::Decompression)?;
        decode_utf8(bytes)
    } else if filename.ends_with(".gpx") {
        decode_utf8(content.to_vec())
    } else {
        Err(SubmissionError::UnsupportedFormat(filename.to_string()))
    }
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String, SubmissionError> {
    String::from_utf8(bytes).map_err(|e| SubmissionError::Encoding(e.utf8_error()))
}

fn device_label(request: &ComparisonRequest) -> String {
    let class = request.device_class.as_deref().unwrap_or("");
    let model = request.device_model.as_deref().unwrap_or("");
    format!("{} {}", class, model).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{queries, CalibrationStore};
    use crate::session::SubmissionPhase;
    use crate::track::fixtures::SAMPLE_GPX;
    use crate::track::{GpxSummarizer, TrackError};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::io::Write;

    async fn memory_store() -> CalibrationStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(queries::CREATE_CALIB_TABLE)
            .execute(&pool)
            .await
            .unwrap();
        CalibrationStore::new(pool)
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    struct FailingProvider;

    impl SummaryProvider for FailingProvider {
        fn summarize(
            &self,
            _text: &str,
        ) -> Result<crate::models::summary::TrackSummary, TrackError> {
            Err(TrackError::EmptyTrack)
        }

        fn full_rows(&self, _text: &str) -> Result<Vec<crate::models::summary::TrackRow>, TrackError> {
            Err(TrackError::EmptyTrack)
        }
    }

    #[tokio::test]
    async fn rejects_unsupported_extensions_without_parsing() {
        let registry = SessionRegistry::new();

        let result =
            handle_upload(&registry, &GpxSummarizer, b"whatever", "data.txt").await;

        assert!(matches!(result, Err(SubmissionError::UnsupportedFormat(_))));
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn compressed_and_plain_uploads_hash_identically() {
        let registry = SessionRegistry::new();

        let (plain_id, _) = handle_upload(
            &registry,
            &GpxSummarizer,
            SAMPLE_GPX.as_bytes(),
            "run.gpx",
        )
        .await
        .unwrap();
        let (gz_id, _) = handle_upload(
            &registry,
            &GpxSummarizer,
            &gzip(SAMPLE_GPX.as_bytes()),
            "run.gpx.gz",
        )
        .await
        .unwrap();

        let plain = registry.get(plain_id).await.unwrap();
        let compressed = registry.get(gz_id).await.unwrap();
        assert_eq!(plain.file_hash, compressed.file_hash);
        assert_eq!(plain.file_hash.len(), 64);
    }

    #[tokio::test]
    async fn corrupt_gzip_is_a_decompression_error() {
        let registry = SessionRegistry::new();

        let mut corrupt = gzip(SAMPLE_GPX.as_bytes());
        corrupt.truncate(corrupt.len() / 2);
        let result =
            handle_upload(&registry, &GpxSummarizer, &corrupt, "run.gpx.gz").await;

        assert!(matches!(result, Err(SubmissionError::Decompression(_))));
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_encoding_error() {
        let registry = SessionRegistry::new();

        let result =
            handle_upload(&registry, &GpxSummarizer, &[0xff, 0xfe, 0x00], "run.gpx").await;

        assert!(matches!(result, Err(SubmissionError::Encoding(_))));
    }

    #[tokio::test]
    async fn provider_failures_surface_as_parse_errors() {
        let registry = SessionRegistry::new();

        let result = handle_upload(
            &registry,
            &FailingProvider,
            SAMPLE_GPX.as_bytes(),
            "run.gpx",
        )
        .await;

        assert!(matches!(result, Err(SubmissionError::Parse(_))));
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn comparison_without_distance_is_a_no_op() {
        let registry = SessionRegistry::new();
        let store = memory_store().await;
        let (id, _) = handle_upload(&registry, &GpxSummarizer, SAMPLE_GPX.as_bytes(), "run.gpx")
            .await
            .unwrap();

        let request = ComparisonRequest {
            submitted_distance_miles: None,
            opt_in: true,
            device_class: Some("watch".to_string()),
            device_model: None,
        };
        let outcome = compare_and_record(&registry, &store, id, &request)
            .await
            .unwrap();

        assert!(outcome.comparison.is_none());
        assert!(!outcome.recorded);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(
            registry.get(id).await.unwrap().phase,
            SubmissionPhase::Parsed
        );
    }

    #[tokio::test]
    async fn opt_in_comparison_persists_exactly_one_row() {
        let registry = SessionRegistry::new();
        let store = memory_store().await;
        let (id, _) = handle_upload(&registry, &GpxSummarizer, SAMPLE_GPX.as_bytes(), "run.gpx")
            .await
            .unwrap();

        let request = ComparisonRequest {
            submitted_distance_miles: Some(2.1),
            opt_in: true,
            device_class: Some("Apple Watch".to_string()),
            device_model: Some("Series 6".to_string()),
        };

        // Requested twice in a row: the upsert stays idempotent.
        let first = compare_and_record(&registry, &store, id, &request)
            .await
            .unwrap();
        let second = compare_and_record(&registry, &store, id, &request)
            .await
            .unwrap();

        assert!(first.recorded && second.recorded);
        assert_eq!(store.count().await.unwrap(), 1);

        let submission = registry.get(id).await.unwrap();
        assert_eq!(submission.phase, SubmissionPhase::Persisted);
        let row = store.get(&submission.file_hash).await.unwrap().unwrap();
        assert_eq!(row.user_distance_miles, 2.1);
        assert_eq!(row.device_type, "Apple Watch Series 6");
        let expected = comparison::compare(
            submission.summary.total_distance_miles,
            Some(2.1),
        )
        .unwrap();
        assert_eq!(first.comparison.unwrap(), expected);
    }

    #[tokio::test]
    async fn comparison_without_opt_in_never_touches_the_store() {
        let registry = SessionRegistry::new();
        let store = memory_store().await;
        let (id, _) = handle_upload(&registry, &GpxSummarizer, SAMPLE_GPX.as_bytes(), "run.gpx")
            .await
            .unwrap();

        let request = ComparisonRequest {
            submitted_distance_miles: Some(2.1),
            opt_in: false,
            device_class: None,
            device_model: None,
        };
        let outcome = compare_and_record(&registry, &store, id, &request)
            .await
            .unwrap();

        assert!(outcome.comparison.is_some());
        assert!(!outcome.recorded);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(
            registry.get(id).await.unwrap().phase,
            SubmissionPhase::Compared
        );
    }

    #[tokio::test]
    async fn unknown_submissions_are_typed_errors() {
        let registry = SessionRegistry::new();
        let store = memory_store().await;

        let request = ComparisonRequest {
            submitted_distance_miles: Some(1.0),
            opt_in: false,
            device_class: None,
            device_model: None,
        };
        let result = compare_and_record(&registry, &store, Uuid::new_v4(), &request).await;
        assert!(matches!(result, Err(SubmissionError::UnknownSubmission(_))));

        let result = export_csv(&registry, &GpxSummarizer, Uuid::new_v4()).await;
        assert!(matches!(result, Err(SubmissionError::UnknownSubmission(_))));
    }

    #[tokio::test]
    async fn export_reuses_cached_content_and_derives_the_filename() {
        let registry = SessionRegistry::new();
        let (id, _) = handle_upload(
            &registry,
            &GpxSummarizer,
            &gzip(SAMPLE_GPX.as_bytes()),
            "morning-run.gpx.gz",
        )
        .await
        .unwrap();

        let (filename, bytes) = export_csv(&registry, &GpxSummarizer, id).await.unwrap();

        assert_eq!(filename, "morning-run.csv");
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("cumulative_distance_meters"));
        assert!(header.contains("rolling_pace_min_mile"));
        // Header plus one row per track point.
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn derives_csv_file_names() {
        assert_eq!(csv_file_name("run.gpx"), "run.csv");
        assert_eq!(csv_file_name("run.gpx.gz"), "run.csv");
        assert_eq!(csv_file_name("weird"), "weird.csv");
    }
}
