//! Data models.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::GpsReaderError;

/// Column names of a GPS table, in storage order.
pub const COLUMN_NAMES: [&str; 12] = [
    "id",
    "dt",
    "vehicle",
    "driver",
    "position",
    "country",
    "speed",
    "mileage",
    "ignition_status",
    "engine_status",
    "longitude",
    "latitude",
];

/// Lower bound used when a search leaves the start date open.
pub const EARLIEST_DATE: &str = "2000-01-01";

/// GPS fix as stored, with the identifier assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub id: i64,
    /// Naive timestamp text, `YYYY-MM-DD HH:MM:SS` by convention
    pub dt: String,
    /// Registration number of the vehicle
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    /// Human readable place name
    pub position: Option<String>,
    /// Country code
    pub country: Option<String>,
    /// Speed in km/h
    pub speed: Option<i64>,
    /// Cumulative odometer reading in km
    pub mileage: Option<f64>,
    pub ignition_status: Option<bool>,
    pub engine_status: Option<bool>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// GPS fix to be inserted. The store assigns the identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NewGpsFix {
    pub dt: String,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub position: Option<String>,
    pub country: Option<String>,
    pub speed: Option<i64>,
    pub mileage: Option<f64>,
    pub ignition_status: Option<bool>,
    pub engine_status: Option<bool>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl From<GpsFix> for NewGpsFix {
    fn from(fix: GpsFix) -> Self {
        Self {
            dt: fix.dt,
            vehicle: fix.vehicle,
            driver: fix.driver,
            position: fix.position,
            country: fix.country,
            speed: fix.speed,
            mileage: fix.mileage,
            ignition_status: fix.ignition_status,
            engine_status: fix.engine_status,
            longitude: fix.longitude,
            latitude: fix.latitude,
        }
    }
}

/// Column-oriented table of fixes.
///
/// All columns always have the same length. `id` is `None` for rows that
/// have not been stored yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FixFrame {
    pub id: Vec<Option<i64>>,
    pub dt: Vec<String>,
    pub vehicle: Vec<Option<String>>,
    pub driver: Vec<Option<String>>,
    pub position: Vec<Option<String>>,
    pub country: Vec<Option<String>>,
    pub speed: Vec<Option<i64>>,
    pub mileage: Vec<Option<f64>>,
    pub ignition_status: Vec<Option<bool>>,
    pub engine_status: Vec<Option<bool>>,
    pub longitude: Vec<Option<f64>>,
    pub latitude: Vec<Option<f64>>,
}

impl FixFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixes(fixes: impl IntoIterator<Item = GpsFix>) -> Self {
        let mut frame = Self::new();
        for fix in fixes {
            let id = fix.id;
            frame.push(Some(id), fix.into());
        }
        frame
    }

    pub fn from_new_fixes(fixes: impl IntoIterator<Item = NewGpsFix>) -> Self {
        let mut frame = Self::new();
        for fix in fixes {
            frame.push(None, fix);
        }
        frame
    }

    /// Append one row
    pub fn push(&mut self, id: Option<i64>, fix: NewGpsFix) {
        self.id.push(id);
        self.dt.push(fix.dt);
        self.vehicle.push(fix.vehicle);
        self.driver.push(fix.driver);
        self.position.push(fix.position);
        self.country.push(fix.country);
        self.speed.push(fix.speed);
        self.mileage.push(fix.mileage);
        self.ignition_status.push(fix.ignition_status);
        self.engine_status.push(fix.engine_status);
        self.longitude.push(fix.longitude);
        self.latitude.push(fix.latitude);
    }

    pub fn len(&self) -> usize {
        self.dt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dt.is_empty()
    }

    pub fn column_names(&self) -> &'static [&'static str] {
        &COLUMN_NAMES
    }

    /// Row `index` without its identifier, `None` past the shortest column
    pub fn new_fix(&self, index: usize) -> Option<NewGpsFix> {
        Some(NewGpsFix {
            dt: self.dt.get(index)?.clone(),
            vehicle: self.vehicle.get(index)?.clone(),
            driver: self.driver.get(index)?.clone(),
            position: self.position.get(index)?.clone(),
            country: self.country.get(index)?.clone(),
            speed: *self.speed.get(index)?,
            mileage: *self.mileage.get(index)?,
            ignition_status: *self.ignition_status.get(index)?,
            engine_status: *self.engine_status.get(index)?,
            longitude: *self.longitude.get(index)?,
            latitude: *self.latitude.get(index)?,
        })
    }

    /// Fails unless every column has as many rows as `dt`
    pub fn validate(&self) -> Result<(), GpsReaderError> {
        let rows = self.len();
        let lengths = [
            ("id", self.id.len()),
            ("vehicle", self.vehicle.len()),
            ("driver", self.driver.len()),
            ("position", self.position.len()),
            ("country", self.country.len()),
            ("speed", self.speed.len()),
            ("mileage", self.mileage.len()),
            ("ignition_status", self.ignition_status.len()),
            ("engine_status", self.engine_status.len()),
            ("longitude", self.longitude.len()),
            ("latitude", self.latitude.len()),
        ];
        match lengths.into_iter().find(|(_, len)| *len != rows) {
            Some((column, found)) => Err(GpsReaderError::MisalignedFrame {
                column,
                expected: rows,
                found,
            }),
            None => Ok(()),
        }
    }

    /// `(latitude, longitude)` of row `index`, if both are known
    pub fn coordinates(&self, index: usize) -> Option<(f64, f64)> {
        match (self.latitude.get(index)?, self.longitude.get(index)?) {
            (Some(lat), Some(lon)) => Some((*lat, *lon)),
            _ => None,
        }
    }
}

/// Inclusive range on the `dt` column. Missing bounds are open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    /// Build a range from a `[start, end]` pair
    pub fn new(bounds: Vec<Option<String>>) -> Result<Self, GpsReaderError> {
        match <[Option<String>; 2]>::try_from(bounds) {
            Ok([start, end]) => Ok(Self { start, end }),
            Err(bounds) => Err(GpsReaderError::InvalidDateRange(format!(
                "expected 2 elements, got {}",
                bounds.len()
            ))),
        }
    }

    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// Bounds with open ends replaced by `2000-01-01` and `today`
    pub fn resolve(&self, today: NaiveDate) -> (String, String) {
        let start = non_empty(&self.start)
            .map(str::to_string)
            .unwrap_or_else(|| EARLIEST_DATE.to_string());
        let end = non_empty(&self.end)
            .map(str::to_string)
            .unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
        (start, end)
    }
}

/// Search criteria for fixes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchFilter {
    /// Substring of the registration number
    pub vehicle: Option<String>,
    /// Substring of the driver name
    pub driver: Option<String>,
    pub between: Option<DateRange>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vehicle(mut self, vehicle: impl Into<String>) -> Self {
        self.vehicle = Some(vehicle.into());
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn between(mut self, range: DateRange) -> Self {
        self.between = Some(range);
        self
    }

    /// True when no criterion was given
    pub fn is_empty(&self) -> bool {
        non_empty(&self.vehicle).is_none()
            && non_empty(&self.driver).is_none()
            && self.between.is_none()
    }

    pub(crate) fn vehicle_pattern(&self) -> Option<&str> {
        non_empty(&self.vehicle)
    }

    pub(crate) fn driver_pattern(&self) -> Option<&str> {
        non_empty(&self.driver)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Parse a naive fix timestamp.
///
/// Accepts ISO-like forms (`2021-11-11 01:43:00`, `2021-11-11T01:43:00`,
/// `2021-11-11 01:43`, `2021-11-11`) and day-first forms
/// (`11.11.2021 01:43:00`, `11-11-2021 01:43:00`).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, GpsReaderError> {
    const FORMATS: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%d.%m.%Y %H:%M:%S",
        "%d-%m-%Y %H:%M:%S",
    ];
    let trimmed = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| GpsReaderError::InvalidTimestamp(value.to_string()))
}
