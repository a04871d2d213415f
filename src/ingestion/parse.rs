//! Parse functions - turn uploaded CSV text into RawRecord structs

use crate::error::{EtlError, Result};
use crate::ingestion::types::RawRecord;
use tracing::{info, warn};

/// Columns every upload must carry
pub const REQUIRED_COLUMNS: &[&str] = &[
    "list_date",
    "location",
    "property_type",
    "price",
    "bedrooms",
    "bathrooms",
    "sqft",
];

/// Parsed upload plus the number of rows the CSV reader could not decode
#[derive(Debug)]
pub struct ParsedUpload {
    pub records: Vec<RawRecord>,
    pub malformed_rows: usize,
}

/// Parse listing CSV text, rejecting the whole upload when a required
/// column is absent
pub fn parse_listings(csv_text: &str) -> Result<ParsedUpload> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers()?.clone();
    info!("CSV columns: {:?}", headers.iter().collect::<Vec<_>>());

    let missing = missing_columns(headers.iter());
    if !missing.is_empty() {
        return Err(EtlError::Schema { missing });
    }

    let mut records = Vec::new();
    let mut malformed_rows = 0;

    for (idx, result) in reader.deserialize::<RawRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                malformed_rows += 1;
                if malformed_rows <= 10 {
                    // Only log first 10 errors
                    warn!("Failed to deserialize row {}: {}", idx, e);
                }
            }
        }
    }

    info!(
        "Parsed {} rows from CSV ({} malformed)",
        records.len(),
        malformed_rows
    );

    Ok(ParsedUpload {
        records,
        malformed_rows,
    })
}

/// Required columns not present in `headers`, in declaration order
pub fn missing_columns<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let present: Vec<&str> = headers.collect();
    REQUIRED_COLUMNS
        .iter()
        .filter(|col| !present.contains(col))
        .map(|col| col.to_string())
        .collect()
}
