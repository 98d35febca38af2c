//! Route map artifact.
//!
//! A map is a list of markers. It serializes to GeoJSON and to a standalone
//! Leaflet page that any browser can render.

use std::fmt::Display;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::analyzer::{BorderCrossing, CrossingKind};
use crate::errors::GpsReaderError;
use crate::models::FixFrame;

const ROUTE_COLOR: &str = "#6495ED";
const DEFAULT_ZOOM: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// One fix of the route
    Point,
    Start,
    End,
    Entry,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub latitude: f64,
    pub longitude: f64,
    pub kind: MarkerKind,
    pub color: String,
    /// Font Awesome icon name
    pub icon: Option<String>,
    /// HTML shown on click
    pub popup: String,
    /// HTML shown on hover
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteMap {
    /// `(latitude, longitude)`
    pub center: (f64, f64),
    pub zoom: u8,
    pub markers: Vec<Marker>,
}

impl RouteMap {
    pub fn new(center: (f64, f64), zoom: u8) -> Self {
        Self {
            center,
            zoom,
            markers: Vec::new(),
        }
    }

    /// Empty map centred on the first fix that has coordinates
    pub(crate) fn centered_on(frame: &FixFrame) -> Result<Self, GpsReaderError> {
        let center = (0..frame.len())
            .find_map(|i| frame.coordinates(i))
            .ok_or(GpsReaderError::NoData)?;
        Ok(Self::new(center, DEFAULT_ZOOM))
    }

    pub fn add_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    pub fn markers_of(&self, kind: MarkerKind) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(move |m| m.kind == kind)
    }

    pub(crate) fn add_route_points(&mut self, frame: &FixFrame) {
        for i in 0..frame.len() {
            let Some((latitude, longitude)) = frame.coordinates(i) else {
                debug!("Row {} has no coordinates, skipped", i);
                continue;
            };
            self.add_marker(Marker {
                latitude,
                longitude,
                kind: MarkerKind::Point,
                color: ROUTE_COLOR.to_string(),
                icon: None,
                popup: fix_popup(frame, i),
                tooltip: fix_tooltip(frame, i),
            });
        }
    }

    pub(crate) fn add_start_end(&mut self, frame: &FixFrame) {
        let last = frame.len().saturating_sub(1);
        for (index, kind, title, icon) in [
            (0, MarkerKind::Start, "START POINT", "play"),
            (last, MarkerKind::End, "END POINT", "flag-checkered"),
        ] {
            if let Some((latitude, longitude)) = frame.coordinates(index) {
                self.add_marker(Marker {
                    latitude,
                    longitude,
                    kind,
                    color: "black".to_string(),
                    icon: Some(icon.to_string()),
                    popup: format!("{title}<br>{}", fix_popup(frame, index)),
                    tooltip: fix_tooltip(frame, index),
                });
            }
        }
    }

    pub(crate) fn add_crossings(&mut self, frame: &FixFrame, crossings: &[BorderCrossing]) {
        for crossing in crossings {
            let (kind, color, icon) = match crossing.kind {
                CrossingKind::Entry => (MarkerKind::Entry, "green", "sign-in"),
                CrossingKind::Exit => (MarkerKind::Exit, "red", "sign-out"),
                CrossingKind::Start | CrossingKind::End => continue,
            };
            let Some((latitude, longitude)) = frame.coordinates(crossing.index) else {
                continue;
            };
            let (from, to) = crossing
                .transition
                .as_ref()
                .map(|t| (opt(&t.from), opt(&t.to)))
                .unwrap_or_default();

            self.add_marker(Marker {
                latitude,
                longitude,
                kind,
                color: color.to_string(),
                icon: Some(icon.to_string()),
                popup: format!(
                    "dt: {}<br>vehicle: {}<br>driver: {}<br>position: {}<br>country: {}<br>\
                     Occurrence: From {} To {}",
                    escape_html(&crossing.dt),
                    escape_html(&opt(&crossing.vehicle)),
                    escape_html(&opt(&crossing.driver)),
                    escape_html(&opt(&crossing.position)),
                    escape_html(&opt(&crossing.country)),
                    escape_html(&from),
                    escape_html(&to),
                ),
                tooltip: fix_tooltip(frame, crossing.index),
            });
        }
    }

    /// GeoJSON `FeatureCollection` with one `Point` feature per marker
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .markers
            .iter()
            .map(|m| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [m.longitude, m.latitude],
                    },
                    "properties": {
                        "kind": m.kind,
                        "color": m.color,
                        "icon": m.icon,
                        "popup": m.popup,
                        "tooltip": m.tooltip,
                    },
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }

    /// Standalone Leaflet page
    pub fn to_html(&self) -> Result<String, GpsReaderError> {
        // `<` inside the script block could close it; JSON strings accept the escape
        let geojson = serde_json::to_string(&self.to_geojson())?.replace('<', "\\u003c");
        Ok(HTML_TEMPLATE
            .replace("{{LAT}}", &self.center.0.to_string())
            .replace("{{LON}}", &self.center.1.to_string())
            .replace("{{ZOOM}}", &self.zoom.to_string())
            .replace("{{GEOJSON}}", &geojson))
    }

    /// Write the map, as GeoJSON for a `.geojson`/`.json` path, as HTML otherwise
    pub fn save(&self, path: &Path) -> Result<(), GpsReaderError> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("geojson") | Some("json") => serde_json::to_string_pretty(&self.to_geojson())?,
            _ => self.to_html()?,
        };
        std::fs::write(path, content)?;
        info!("Map with {} markers saved to {}", self.markers.len(), path.display());
        Ok(())
    }
}

fn opt<T: Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

fn fix_popup(frame: &FixFrame, i: usize) -> String {
    format!(
        "dt: {}<br>vehicle: {}<br>driver: {}<br>position: {}<br>country: {}<br>\
         speed: {}<br>mileage: {}",
        escape_html(&frame.dt[i]),
        escape_html(&opt(&frame.vehicle[i])),
        escape_html(&opt(&frame.driver[i])),
        escape_html(&opt(&frame.position[i])),
        escape_html(&opt(&frame.country[i])),
        opt(&frame.speed[i]),
        opt(&frame.mileage[i]),
    )
}

fn fix_tooltip(frame: &FixFrame, i: usize) -> String {
    format!(
        "{};\n {}; {}, {}",
        escape_html(&frame.dt[i]),
        escape_html(&opt(&frame.vehicle[i])),
        escape_html(&opt(&frame.position[i])),
        escape_html(&opt(&frame.country[i])),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Route map</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const map = L.map('map').setView([{{LAT}}, {{LON}}], {{ZOOM}});
L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
  maxZoom: 19,
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
const route = {{GEOJSON}};
L.geoJSON(route, {
  pointToLayer: (feature, latlng) => {
    const p = feature.properties;
    const point = p.kind === 'point';
    return L.circleMarker(latlng, {
      radius: point ? 2 : 8,
      weight: point ? 4 : 2,
      color: p.color,
      fillOpacity: point ? 0.2 : 0.8,
      bubblingMouseEvents: false
    });
  },
  onEachFeature: (feature, layer) => {
    layer.bindPopup(feature.properties.popup, { maxWidth: 900 });
    layer.bindTooltip(feature.properties.tooltip);
  }
}).addTo(map);
</script>
</body>
</html>
"#;
