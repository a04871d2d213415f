//! Core data types for the listing pipeline
//! Pure data structures, one record type per stage:
//! `RawRecord` -> `ValidatedRecord` -> `NormalizedRecord`

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;

/// Raw upload before CSV parsing
#[derive(Debug)]
pub enum RawData {
    File(PathBuf),
    Csv(String),
}

impl RawData {
    /// Resolve the upload to its CSV text, reading from disk if needed
    pub async fn into_text(self) -> std::io::Result<String> {
        match self {
            RawData::File(path) => tokio::fs::read_to_string(path).await,
            RawData::Csv(text) => Ok(text),
        }
    }
}

/// One CSV row exactly as uploaded. Blank cells come through as `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub list_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<String>,
    #[serde(default)]
    pub bathrooms: Option<String>,
    #[serde(default)]
    pub sqft: Option<String>,
    #[serde(default)]
    pub lot_size: Option<String>,
    #[serde(default)]
    pub listing_status: Option<String>,
}

/// A numeric cell after a coercion attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Value(f64),
    Invalid(String),
}

impl Cell {
    pub fn value(&self) -> Option<f64> {
        match self {
            Cell::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

/// Row with a parsed list date; numeric fields not yet trusted
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub list_date: NaiveDate,
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub price: Cell,
    pub sqft: Cell,
    pub bedrooms: Cell,
    pub bathrooms: Cell,
    pub lot_size: Option<f64>,
    pub listing_status: Option<String>,
}

/// Fully cleaned listing, ready for the dimension and fact stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub list_date: NaiveDate,
    pub location: String,
    pub property_type: String,
    pub price: f64,
    pub bedrooms: i32,
    pub bathrooms: f64,
    pub sqft: f64,
    pub lot_size: Option<f64>,
    pub listing_status: String,
    pub price_per_sqft: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How many cells were filled in per column
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ImputationCounts {
    pub price: usize,
    pub sqft: usize,
    pub bedrooms: usize,
    pub bathrooms: usize,
    pub location: usize,
    pub property_type: usize,
}

/// Tukey fence applied to price for one batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceFence {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl PriceFence {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// Per-stage row accounting for one normalization run
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub invalid_dates: usize,
    pub coercion_failures: usize,
    pub outliers: usize,
    pub sanity_failures: usize,
    pub output_rows: usize,
    pub imputed: ImputationCounts,
    pub price_fence: Option<PriceFence>,
}

impl NormalizeReport {
    pub fn dropped(&self) -> usize {
        self.invalid_dates + self.coercion_failures + self.outliers + self.sanity_failures
    }
}

impl std::fmt::Display for NormalizeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input: {}, output: {}, invalid dates: {}, coercion failures: {}, outliers: {}, sanity failures: {}",
            self.input_rows,
            self.output_rows,
            self.invalid_dates,
            self.coercion_failures,
            self.outliers,
            self.sanity_failures
        )
    }
}

#[derive(Debug)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    pub report: NormalizeReport,
}

/// Broad property grouping stored on the property type dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyCategory {
    #[serde(rename = "Residential-Apartment")]
    Apartment,
    #[serde(rename = "Residential-House")]
    House,
    #[serde(rename = "Residential-Townhouse")]
    Townhouse,
    #[serde(rename = "Residential-Luxury")]
    Luxury,
    Other,
}

impl PropertyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyCategory::Apartment => "Residential-Apartment",
            PropertyCategory::House => "Residential-House",
            PropertyCategory::Townhouse => "Residential-Townhouse",
            PropertyCategory::Luxury => "Residential-Luxury",
            PropertyCategory::Other => "Other",
        }
    }
}

impl std::fmt::Display for PropertyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `dim_location` row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationDim {
    pub location_id: i64,
    pub location: String,
    pub city: String,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

/// `dim_property_type` row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyTypeDim {
    pub property_type_id: i64,
    pub property_type: String,
    pub type_name: String,
    pub category: PropertyCategory,
    pub created_at: DateTime<Utc>,
}

/// `dim_date` row, one per calendar day of the spine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateDim {
    pub date_id: i64,
    pub full_date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub quarter: u32,
    pub day_of_week: u32,
    pub day_name: String,
    pub is_weekend: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DimensionTables {
    pub locations: Vec<LocationDim>,
    pub property_types: Vec<PropertyTypeDim>,
    pub dates: Vec<DateDim>,
}

/// Which dimension a fact row failed to join against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMiss {
    Location,
    PropertyType,
    Date,
}

/// Outcome of resolving one dimension key for a fact row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKey {
    Resolved(i64),
    Unresolved(JoinMiss),
}

impl ForeignKey {
    /// Storage form: unresolved keys become NULL
    pub fn id(&self) -> Option<i64> {
        match self {
            ForeignKey::Resolved(id) => Some(*id),
            ForeignKey::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ForeignKey::Resolved(_))
    }
}

/// `fact_listings` row
#[derive(Debug, Clone, PartialEq)]
pub struct FactListing {
    pub listing_id: i64,
    pub location_id: ForeignKey,
    pub property_type_id: ForeignKey,
    pub date_id: ForeignKey,
    pub list_date: NaiveDate,
    pub listing_status: String,
    pub price: f64,
    pub bedrooms: i32,
    pub bathrooms: f64,
    pub sqft: f64,
    pub lot_size: Option<f64>,
    pub price_per_sqft: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join accounting for one fact load
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct JoinStats {
    pub rows: usize,
    pub location_misses: usize,
    pub property_type_misses: usize,
    pub date_misses: usize,
}

impl JoinStats {
    pub fn unresolved(&self) -> usize {
        self.location_misses + self.property_type_misses + self.date_misses
    }
}

#[derive(Debug)]
pub struct FactBatch {
    pub facts: Vec<FactListing>,
    pub join_stats: JoinStats,
}

/// End-to-end result of loading one upload
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub source: String,
    /// Rows the CSV reader could not deserialize
    pub malformed_rows: usize,
    pub normalize: NormalizeReport,
    pub locations: usize,
    pub property_types: usize,
    pub dates: usize,
    pub facts_loaded: usize,
    pub listing_ids: Range<i64>,
    pub join_stats: JoinStats,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} facts loaded (listing ids {}..{}), dimensions: {} locations, {} property types, {} dates",
            self.source,
            self.facts_loaded,
            self.listing_ids.start,
            self.listing_ids.end,
            self.locations,
            self.property_types,
            self.dates
        )
    }
}
