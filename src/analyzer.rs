//! Route analysis over a filtered snapshot of fixes.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    charts::{DistanceDiagram, SpeedDiagram},
    config::DatabaseConfig,
    database::{Database, TableName},
    errors::GpsReaderError,
    map::RouteMap,
    models::{FixFrame, SearchFilter},
};

/// Loads one snapshot of fixes and derives reports, maps and charts from it.
///
/// Without a snapshot every derived operation fails with
/// [`GpsReaderError::NoData`].
pub struct RouteAnalyzer {
    company: String,
    database: Database,
    table: TableName,
    gps_data: Option<FixFrame>,
}

impl RouteAnalyzer {
    /// Create an analyzer. A snapshot is loaded only if `filter` has a criterion.
    pub async fn new(
        company: impl Into<String>,
        database: Database,
        table: TableName,
        filter: &SearchFilter,
    ) -> Result<Self, GpsReaderError> {
        let mut analyzer = Self {
            company: company.into(),
            database,
            table,
            gps_data: None,
        };

        if filter.is_empty() {
            warn!("No data selected.");
        } else {
            analyzer.gps_data = Some(analyzer.load(filter).await?);
        }
        Ok(analyzer)
    }

    /// Open the company database from configuration and create an analyzer
    pub async fn from_config(
        config: &DatabaseConfig,
        company: &str,
        filter: &SearchFilter,
    ) -> Result<Self, GpsReaderError> {
        let database = Database::from_config(config, company).await?;
        Self::new(company, database, config.table_name()?, filter).await
    }

    /// Replace the snapshot with the fixes matching `filter`.
    ///
    /// Returns the number of rows selected.
    pub async fn data_filter(&mut self, filter: &SearchFilter) -> Result<usize, GpsReaderError> {
        self.gps_data = None;
        let frame = self.load(filter).await?;
        let selected = frame.len();
        info!("{} rows selected.", selected);
        self.gps_data = Some(frame);
        Ok(selected)
    }

    async fn load(&self, filter: &SearchFilter) -> Result<FixFrame, GpsReaderError> {
        let fixes = self
            .database
            .search(&self.table, filter)
            .fetch_all()
            .await?;
        Ok(FixFrame::from_fixes(fixes))
    }

    pub fn gps_data(&self) -> Option<&FixFrame> {
        self.gps_data.as_ref()
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Non-empty snapshot
    fn selected(&self) -> Result<&FixFrame, GpsReaderError> {
        match &self.gps_data {
            Some(frame) if !frame.is_empty() => Ok(frame),
            _ => Err(GpsReaderError::NoData),
        }
    }

    /// Summary of the selected route
    pub fn route_info(&self) -> Result<RouteInfo, GpsReaderError> {
        let data = self.selected()?;

        let vehicles: BTreeSet<&String> = data.vehicle.iter().flatten().collect();
        let drivers: BTreeSet<&String> = data.driver.iter().flatten().collect();

        let first_date = data.dt.iter().min().cloned().unwrap_or_default();
        let last_date = data.dt.iter().max().cloned().unwrap_or_default();

        let mileage = data
            .mileage
            .iter()
            .flatten()
            .fold(None, |acc: Option<(f64, f64)>, &m| match acc {
                None => Some((m, m)),
                Some((lo, hi)) => Some((lo.min(m), hi.max(m))),
            });

        Ok(RouteInfo {
            company: self.company.clone(),
            vehicles: vehicles.into_iter().cloned().collect(),
            drivers: drivers.into_iter().cloned().collect(),
            start_end_date: (first_date, last_date),
            start_end_country: (
                data.country.first().cloned().flatten(),
                data.country.last().cloned().flatten(),
            ),
            start_end_mileage: mileage,
            distance_km: mileage.map(|(lo, hi)| hi - lo),
        })
    }

    /// Start, end and border crossing rows of the snapshot, in order
    pub fn crossing_borders(&self) -> Result<Vec<BorderCrossing>, GpsReaderError> {
        let data = self.gps_data.as_ref().ok_or(GpsReaderError::NoData)?;

        Ok(detect_crossings(&data.country)
            .into_iter()
            .map(|(index, kind)| {
                let transition = match kind {
                    CrossingKind::Entry => Some(Transition {
                        from: data.country[index - 1].clone(),
                        to: data.country[index].clone(),
                    }),
                    CrossingKind::Exit => Some(Transition {
                        from: data.country[index].clone(),
                        to: data.country[index + 1].clone(),
                    }),
                    CrossingKind::Start | CrossingKind::End => None,
                };
                BorderCrossing {
                    index,
                    dt: data.dt[index].clone(),
                    vehicle: data.vehicle[index].clone(),
                    driver: data.driver[index].clone(),
                    position: data.position[index].clone(),
                    country: data.country[index].clone(),
                    kind,
                    transition,
                }
            })
            .collect())
    }

    /// Map with a marker per fix plus start and end markers
    pub fn route_map(&self, include_crossings: bool) -> Result<RouteMap, GpsReaderError> {
        let data = self.selected()?;
        let mut map = RouteMap::centered_on(data)?;
        map.add_route_points(data);
        map.add_start_end(data);
        if include_crossings {
            map.add_crossings(data, &self.crossing_borders()?);
        }
        Ok(map)
    }

    /// Map with only the start, end and border crossing markers
    pub fn crossing_borders_map(&self) -> Result<RouteMap, GpsReaderError> {
        let data = self.selected()?;
        let mut map = RouteMap::centered_on(data)?;
        map.add_start_end(data);
        map.add_crossings(data, &self.crossing_borders()?);
        Ok(map)
    }

    /// Travelled distance per day
    pub fn distance_diagram(&self) -> Result<DistanceDiagram, GpsReaderError> {
        DistanceDiagram::from_frame(self.selected()?)
    }

    /// Speed trace and daily mean speed
    pub fn speed_diagram(&self) -> Result<SpeedDiagram, GpsReaderError> {
        SpeedDiagram::from_frame(self.selected()?)
    }
}

impl fmt::Debug for RouteAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteAnalyzer")
            .field("company", &self.company)
            .field("table", &self.table)
            .field("rows", &self.gps_data.as_ref().map(FixFrame::len))
            .finish()
    }
}

/// Tag rows of a country sequence.
///
/// The first row is always `Start` and the last always `End`. An interior row
/// is `Entry` when its country differs from the previous row, otherwise `Exit`
/// when it differs from the next row. Untagged rows are left out.
pub fn detect_crossings(countries: &[Option<String>]) -> Vec<(usize, CrossingKind)> {
    let n = countries.len();
    if n == 0 {
        return Vec::new();
    }

    let mut tags = vec![(0, CrossingKind::Start)];
    for i in 1..n.saturating_sub(1) {
        if countries[i] != countries[i - 1] {
            tags.push((i, CrossingKind::Entry));
        } else if countries[i] != countries[i + 1] {
            tags.push((i, CrossingKind::Exit));
        }
    }
    tags.push((n - 1, CrossingKind::End));
    tags
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingKind {
    Start,
    Entry,
    Exit,
    End,
}

impl fmt::Display for CrossingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossingKind::Start => write!(f, "start"),
            CrossingKind::Entry => write!(f, "entry"),
            CrossingKind::Exit => write!(f, "exit"),
            CrossingKind::End => write!(f, "end"),
        }
    }
}

/// Countries on both sides of a border crossing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderCrossing {
    /// Row of the snapshot
    pub index: usize,
    pub dt: String,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub position: Option<String>,
    pub country: Option<String>,
    pub kind: CrossingKind,
    pub transition: Option<Transition>,
}

/// Route summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub company: String,
    /// Distinct vehicles, sorted
    pub vehicles: Vec<String>,
    /// Distinct drivers, sorted
    pub drivers: Vec<String>,
    pub start_end_date: (String, String),
    /// Country of the first and the last fix
    pub start_end_country: (Option<String>, Option<String>),
    pub start_end_mileage: Option<(f64, f64)>,
    pub distance_km: Option<f64>,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        writeln!(f, "{:<20} {}", "", self.company)?;
        writeln!(f, "{:<20} {:?}", "vehicle", self.vehicles)?;
        writeln!(f, "{:<20} {:?}", "driver", self.drivers)?;
        writeln!(
            f,
            "{:<20} ({}, {})",
            "start/end date", self.start_end_date.0, self.start_end_date.1
        )?;
        writeln!(
            f,
            "{:<20} [{}, {}]",
            "start/end country",
            opt(&self.start_end_country.0),
            opt(&self.start_end_country.1)
        )?;
        match self.start_end_mileage {
            Some((lo, hi)) => writeln!(f, "{:<20} ({:.2}, {:.2})", "start/end mileage", lo, hi)?,
            None => writeln!(f, "{:<20} -", "start/end mileage")?,
        }
        match self.distance_km {
            Some(km) => writeln!(f, "{:<20} {:.2}", "distance(km)", km),
            None => writeln!(f, "{:<20} -", "distance(km)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countries(codes: &[&str]) -> Vec<Option<String>> {
        codes.iter().map(|c| Some(c.to_string())).collect()
    }

    #[test]
    fn crossings_tag_first_and_last_rows() {
        let tags = detect_crossings(&countries(&["A", "A", "B", "B", "C"]));
        assert_eq!(
            tags,
            vec![
                (0, CrossingKind::Start),
                (1, CrossingKind::Exit),
                (2, CrossingKind::Entry),
                (3, CrossingKind::Exit),
                (4, CrossingKind::End),
            ]
        );
    }

    #[test]
    fn crossings_skip_rows_inside_a_country() {
        let tags = detect_crossings(&countries(&["PL", "PL", "PL", "DE", "DE", "DE"]));
        assert_eq!(
            tags,
            vec![
                (0, CrossingKind::Start),
                (2, CrossingKind::Exit),
                (3, CrossingKind::Entry),
                (5, CrossingKind::End),
            ]
        );
    }

    #[test]
    fn crossings_without_border() {
        let tags = detect_crossings(&countries(&["PL", "PL", "PL"]));
        assert_eq!(tags, vec![(0, CrossingKind::Start), (2, CrossingKind::End)]);
    }

    #[test]
    fn crossings_short_sequences() {
        assert!(detect_crossings(&[]).is_empty());
        assert_eq!(
            detect_crossings(&countries(&["PL"])),
            vec![(0, CrossingKind::Start), (0, CrossingKind::End)]
        );
        assert_eq!(
            detect_crossings(&countries(&["PL", "DE"])),
            vec![(0, CrossingKind::Start), (1, CrossingKind::End)]
        );
    }

    #[test]
    fn route_info_display() {
        let info = RouteInfo {
            company: "acme".to_string(),
            vehicles: vec!["PL55555".to_string()],
            drivers: vec!["John Smith".to_string()],
            start_end_date: (
                "2021-11-11 01:43:00".to_string(),
                "2021-11-12 05:50:00".to_string(),
            ),
            start_end_country: (Some("PL".to_string()), Some("DE".to_string())),
            start_end_mileage: Some((100.0, 350.5)),
            distance_km: Some(250.5),
        };

        let text = info.to_string();
        assert!(text.contains("acme"));
        assert!(text.contains("[PL, DE]"));
        assert!(text.contains("250.50"));
    }
}
