//! GPS route reader
//!
//! Stores GPS fixes of a transport company in SQLite and analyses routes:
//! route summaries, border crossings, route maps and distance/speed diagrams.

pub mod analyzer;
pub mod charts;
pub mod config;
pub mod database;
pub mod errors;
pub mod map;
pub mod models;
pub mod validation;

pub use analyzer::RouteAnalyzer;
pub use database::{Database, InsertMode, TableName};
pub use errors::GpsReaderError;
pub use models::{DateRange, FixFrame, GpsFix, NewGpsFix, SearchFilter};
