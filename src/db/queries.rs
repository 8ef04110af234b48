pub const CREATE_CALIB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS calib (
    file_hash TEXT PRIMARY KEY,
    gps_distance_miles REAL NOT NULL,
    user_distance_miles REAL NOT NULL,
    device_type TEXT NOT NULL DEFAULT ''
);
"#;

pub const UPSERT_CALIBRATION: &str = r#"
INSERT INTO calib (file_hash, gps_distance_miles, user_distance_miles, device_type)
VALUES ($1, $2, $3, $4)
ON CONFLICT (file_hash) DO UPDATE
SET gps_distance_miles = excluded.gps_distance_miles,
    user_distance_miles = excluded.user_distance_miles,
    device_type = excluded.device_type;
"#;

pub const SELECT_CALIBRATION: &str = r#"
SELECT file_hash, gps_distance_miles, user_distance_miles, device_type
FROM calib WHERE file_hash = $1;
"#;

pub const COUNT_CALIBRATION_ROWS: &str = r#"
SELECT COUNT(*) FROM calib;
"#;
