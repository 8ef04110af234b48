use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct CalibrationRecord {
    pub file_hash: String, // lowercase hex SHA-256 of the decompressed track bytes
    pub gps_distance_miles: f64,
    pub user_distance_miles: f64,
    pub device_type: String, // device class plus free-text model, sanitized
}
