//! Distance and speed diagrams.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::errors::GpsReaderError;
use crate::models::{parse_timestamp, FixFrame};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;
const DAY_SECONDS: f64 = 86_400.0;

/// Kilometres travelled per day and cumulatively
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceDiagram {
    /// Sum of the per-step distances of each day
    pub daily: Vec<(NaiveDate, f64)>,
    /// Running total of the per-step distances at each fix
    pub cumulative: Vec<(NaiveDateTime, f64)>,
}

/// Speed trace and daily mean speed in km/h
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedDiagram {
    pub trace: Vec<(NaiveDateTime, f64)>,
    pub daily_mean: Vec<(NaiveDate, f64)>,
}

/// Distance covered from each fix to the next one.
///
/// Missing mileage is forward filled. The last fix gets the distance from
/// its reading to the highest reading of the route. Steps without a known
/// reading count as zero.
pub fn step_distances(mileage: &[Option<f64>]) -> Vec<f64> {
    let filled: Vec<Option<f64>> = mileage
        .iter()
        .scan(None, |last, m| {
            if m.is_some() {
                *last = *m;
            }
            Some(*last)
        })
        .collect();
    let max = filled.iter().flatten().copied().reduce(f64::max);

    (0..filled.len())
        .map(|i| {
            let next = if i + 1 == filled.len() {
                max
            } else {
                filled[i + 1]
            };
            match (filled[i], next) {
                (Some(current), Some(next)) => next - current,
                _ => 0.0,
            }
        })
        .collect()
}

fn timestamps(frame: &FixFrame) -> Result<Vec<NaiveDateTime>, GpsReaderError> {
    frame.dt.iter().map(|dt| parse_timestamp(dt)).collect()
}

impl DistanceDiagram {
    pub fn from_frame(frame: &FixFrame) -> Result<Self, GpsReaderError> {
        let times = timestamps(frame)?;
        let steps = step_distances(&frame.mileage);

        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut cumulative = Vec::with_capacity(steps.len());
        let mut total = 0.0;
        for (time, km) in times.iter().zip(&steps) {
            *daily.entry(time.date()).or_default() += km;
            total += km;
            cumulative.push((*time, total));
        }

        Ok(Self {
            daily: daily.into_iter().collect(),
            cumulative,
        })
    }

    pub fn total_km(&self) -> f64 {
        self.cumulative.last().map(|(_, km)| *km).unwrap_or_default()
    }

    /// Render as SVG: daily bars on the left axis, running total on the right axis
    pub fn to_svg(&self) -> Result<String, GpsReaderError> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
            draw_distance(&root, self).map_err(|e| GpsReaderError::ChartError(e.to_string()))?;
        }
        Ok(svg)
    }

    pub fn save(&self, path: &Path) -> Result<(), GpsReaderError> {
        std::fs::write(path, self.to_svg()?)?;
        info!("Distance diagram saved to {}", path.display());
        Ok(())
    }
}

impl SpeedDiagram {
    pub fn from_frame(frame: &FixFrame) -> Result<Self, GpsReaderError> {
        let times = timestamps(frame)?;

        let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        let mut trace = Vec::with_capacity(times.len());
        for (time, speed) in times.iter().zip(&frame.speed) {
            let speed = speed.unwrap_or(0) as f64;
            let day = days.entry(time.date()).or_default();
            day.0 += speed;
            day.1 += 1;
            trace.push((*time, speed));
        }

        Ok(Self {
            trace,
            daily_mean: days
                .into_iter()
                .map(|(date, (sum, count))| (date, sum / count as f64))
                .collect(),
        })
    }

    /// Render as SVG with a fixed 0-100 km/h axis
    pub fn to_svg(&self) -> Result<String, GpsReaderError> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
            draw_speed(&root, self).map_err(|e| GpsReaderError::ChartError(e.to_string()))?;
        }
        Ok(svg)
    }

    pub fn save(&self, path: &Path) -> Result<(), GpsReaderError> {
        std::fs::write(path, self.to_svg()?)?;
        info!("Speed diagram saved to {}", path.display());
        Ok(())
    }
}

fn seconds(time: &NaiveDateTime) -> f64 {
    time.and_utc().timestamp() as f64
}

fn day_start(date: &NaiveDate) -> f64 {
    date.and_hms_opt(0, 0, 0).map(|t| seconds(&t)).unwrap_or_default()
}

fn format_day(value: &f64) -> String {
    DateTime::from_timestamp(*value as i64, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// X range covering whole days of the given points
fn day_range(points: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = points.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
        (lo.min(x), hi.max(x))
    });
    if !lo.is_finite() {
        return (0.0, DAY_SECONDS);
    }
    let lo = (lo / DAY_SECONDS).floor() * DAY_SECONDS;
    let hi = ((hi / DAY_SECONDS).floor() + 1.0) * DAY_SECONDS;
    (lo, hi)
}

/// Y range including zero and every value, padded by a tenth of its span
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    if span > 0.0 {
        (
            if lo < 0.0 { lo - span * 0.1 } else { 0.0 },
            if hi > 0.0 { hi + span * 0.1 } else { 0.0 },
        )
    } else {
        (0.0, 1.0)
    }
}

fn draw_distance<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    diagram: &DistanceDiagram,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let (x_min, x_max) = day_range(diagram.cumulative.iter().map(|(t, _)| seconds(t)));
    let (y_min, y_max) = value_range(diagram.daily.iter().map(|(_, km)| *km));
    let (total_min, total_max) = value_range(diagram.cumulative.iter().map(|(_, km)| *km));

    let mut chart = ChartBuilder::on(root)
        .caption("KM diagram", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?
        .set_secondary_coord(x_min..x_max, total_min..total_max);

    chart
        .configure_mesh()
        .x_label_formatter(&format_day)
        .y_desc("km")
        .draw()?;
    chart.configure_secondary_axes().y_desc("km cumsum").draw()?;

    chart
        .draw_series(diagram.daily.iter().map(|(date, km)| {
            let x0 = day_start(date);
            Rectangle::new(
                [(x0 + 0.1 * DAY_SECONDS, 0.0), (x0 + 0.9 * DAY_SECONDS, *km)],
                BLUE.mix(0.6).filled(),
            )
        }))?
        .label("km/day")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLUE.filled()));

    chart
        .draw_secondary_series(LineSeries::new(
            diagram.cumulative.iter().map(|(t, km)| (seconds(t), *km)),
            &RED,
        ))?
        .label("km")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_speed<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    diagram: &SpeedDiagram,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let (x_min, x_max) = day_range(diagram.trace.iter().map(|(t, _)| seconds(t)));

    let mut chart = ChartBuilder::on(root)
        .caption("Speed diagram", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0.0..100.0)?;

    chart
        .configure_mesh()
        .x_label_formatter(&format_day)
        .y_desc("km/h")
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            diagram.trace.iter().map(|(t, speed)| (seconds(t), *speed)),
            &BLUE,
        ))?
        .label("speed (km/h)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            diagram
                .daily_mean
                .iter()
                .map(|(date, speed)| (day_start(date), *speed)),
            &RED,
        ))?
        .label("day mean")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
