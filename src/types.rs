use chrono::NaiveDate;
use geo::{MultiPolygon, Point};
use serde::Serialize;

/// One Darwin Core occurrence row, as ingested.
///
/// `species` and `event_date` stay optional here; cleaning turns the
/// survivors into [`CleanRecord`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceRecord {
    pub row: usize,
    pub gbif_id: String,
    pub occurrence_id: String,
    pub species: Option<String>,
    pub family: String,
    pub locality: String,
    pub event_date_raw: String,
    // None when a coordinate is empty or not finite
    pub location: Option<Point<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub occurrence_id: String,
    pub species: String,
    pub family: String,
    pub locality: String,
    pub event_date: NaiveDate,
    pub location: Option<Point<f64>>,
}

#[derive(Debug, Clone)]
pub struct ProtectedArea {
    pub code: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaCount {
    pub code: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<[String; 5]>,
}

/// Everything the dashboard shows for one (file, species) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub species_options: Vec<String>,
    pub selected_species: Option<String>,
    pub total_records: usize,
    pub skipped_dates: usize,
    pub table: RecordTable,
    pub years: Vec<YearCount>,
    pub areas: Vec<AreaCount>,
}
