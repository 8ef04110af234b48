use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::models::calibration::CalibrationRecord;

pub mod queries;

pub type DbPool = Pool<Sqlite>;

pub async fn init_pool(database_path: &str) -> Result<DbPool> {
    // mode=rwc creates the database file on first run.
    let database_url = format!("sqlite://{}?mode=rwc", database_path);
    info!("Connecting to {}", database_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    sqlx::query(queries::CREATE_CALIB_TABLE).execute(&pool).await?;
    Ok(pool)
}

/// Persistence for opted-in calibration submissions, one row per content hash.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    pool: DbPool,
}

impl CalibrationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert: a resubmission of the same content replaces the
    /// prior row for that hash atomically.
    pub async fn record(
        &self,
        file_hash: &str,
        gps_distance_miles: f64,
        user_distance_miles: f64,
        device_label: &str,
    ) -> Result<(), sqlx::Error> {
        let device_type = sanitize_device_label(device_label);

        let mut tx = self.pool.begin().await?;
        sqlx::query(queries::UPSERT_CALIBRATION)
            .bind(file_hash)
            .bind(gps_distance_miles)
            .bind(user_distance_miles)
            .bind(&device_type)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    pub async fn get(&self, file_hash: &str) -> Result<Option<CalibrationRecord>, sqlx::Error> {
        sqlx::query_as::<_, CalibrationRecord>(queries::SELECT_CALIBRATION)
            .bind(file_hash)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(queries::COUNT_CALIBRATION_ROWS)
            .fetch_one(&self.pool)
            .await
    }
}

/// Strips quote and statement-separator characters from a device label.
///
/// Writes go through bound parameters; this additionally guarantees stored
/// labels contain no SQL metacharacters. Total over arbitrary input; a
/// label that sanitizes away entirely is replaced rather than stored empty.
pub fn sanitize_device_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | ';' | '`' | '\\') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().to_string();

    if cleaned.is_empty() && !label.is_empty() {
        return "unknown".to_string();
    }
    cleaned
}
