//! Star-schema warehouse: `dim_location`, `dim_property_type`, `dim_date`
//! and `fact_listings`
//!
//! Surrogate keys are allocated by the warehouse, not the batch. Dimension
//! rows are upserted by natural key so ids stay stable across uploads, and
//! appended facts are rebased past the current highest `listing_id`.

pub mod memory;
pub mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::PgWarehouse;

use crate::error::WarehouseError;
use crate::ingestion::types::{DimensionTables, FactListing};
use std::future::Future;
use std::ops::Range;
use std::str::FromStr;

/// How batch dimension tables are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionWriteMode {
    /// Lookup-or-insert by natural key; existing ids are kept
    #[default]
    Merge,
    /// Truncate and load the batch tables exactly as built
    Replace,
}

impl FromStr for DimensionWriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "merge" | "upsert" => Ok(DimensionWriteMode::Merge),
            "replace" | "truncate" => Ok(DimensionWriteMode::Replace),
            other => Err(format!("unknown dimension write mode: {}", other)),
        }
    }
}

impl std::fmt::Display for DimensionWriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionWriteMode::Merge => write!(f, "merge"),
            DimensionWriteMode::Replace => write!(f, "replace"),
        }
    }
}

pub trait Warehouse: Send + Sync {
    /// Persist a batch's dimension tables and return them carrying the
    /// warehouse's surrogate ids, ready for the fact join
    fn write_dimensions(
        &self,
        dims: DimensionTables,
        mode: DimensionWriteMode,
    ) -> impl Future<Output = Result<DimensionTables, WarehouseError>> + Send;

    /// Append fact rows, offsetting their batch-local listing ids by the
    /// current maximum. Returns the stored id range.
    fn append_facts(
        &self,
        facts: Vec<FactListing>,
    ) -> impl Future<Output = Result<Range<i64>, WarehouseError>> + Send;
}

/// Postgres identifiers used for the warehouse schema: ASCII letters,
/// digits and underscores, not starting with a digit
pub fn validate_identifier(ident: &str) -> Result<&str, WarehouseError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && ident.len() <= 63
        }
        None => false,
    };

    if valid {
        Ok(ident)
    } else {
        Err(WarehouseError::InvalidIdentifier(ident.to_string()))
    }
}
