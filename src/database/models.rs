// src/database/models.rs
use crate::models::GpsFix;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FixRow {
    id: i64,
    dt: String,
    vehicle: Option<String>,
    driver: Option<String>,
    position: Option<String>,
    country: Option<String>,
    speed: Option<i64>,
    mileage: Option<f64>,
    ignition_status: Option<bool>,
    engine_status: Option<bool>,
    longitude: Option<f64>,
    latitude: Option<f64>,
}

impl From<FixRow> for GpsFix {
    fn from(row: FixRow) -> Self {
        Self {
            id: row.id,
            dt: row.dt,
            vehicle: row.vehicle,
            driver: row.driver,
            position: row.position,
            country: row.country,
            speed: row.speed,
            mileage: row.mileage,
            ignition_status: row.ignition_status,
            engine_status: row.engine_status,
            longitude: row.longitude,
            latitude: row.latitude,
        }
    }
}

/// Rows sharing `(dt, position, speed, longitude, latitude)`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DuplicateGroup {
    pub dt: String,
    pub position: Option<String>,
    pub speed: Option<i64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Number of rows in the group
    pub count: i64,
    /// Lowest identifier, the row that survives deduplication
    pub keep_id: i64,
}
