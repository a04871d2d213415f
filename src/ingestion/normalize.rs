//! Normalization - clean raw listing rows into NormalizedRecord structs
//!
//! Stages run in a fixed order, each over the survivors of the previous one:
//! date parsing, imputation, text standardization, numeric coercion,
//! price outlier fencing, sanity filtering, then derived fields.

use crate::calculate_price_per_sqft;
use crate::error::{EtlError, Result};
use crate::ingestion::types::{
    Cell, ImputationCounts, NormalizeReport, NormalizedBatch, NormalizedRecord, PriceFence,
    RawRecord, ValidatedRecord,
};
use crate::ingestion::utils::{
    clean_text, median, mode, parse_cell, parse_list_date, quantile, title_case,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Placeholder for missing location and property type text
pub const UNKNOWN: &str = "Unknown";

/// Status applied when an upload does not carry one
pub const DEFAULT_LISTING_STATUS: &str = "Active";

/// Tukey fence multiplier
const IQR_MULTIPLIER: f64 = 1.5;

/// Row after coercion, before fencing and derived fields
#[derive(Debug, Clone)]
struct CoercedRecord {
    list_date: NaiveDate,
    location: String,
    property_type: String,
    price: f64,
    sqft: f64,
    bedrooms: i32,
    bathrooms: f64,
    lot_size: Option<f64>,
    listing_status: Option<String>,
}

/// Normalize a batch stamped with the current time
pub fn normalize(records: Vec<RawRecord>) -> Result<NormalizedBatch> {
    normalize_at(records, Utc::now())
}

/// Normalize a batch, stamping `created_at`/`updated_at` with `now`.
/// Fails with a data error when no row survives.
pub fn normalize_at(records: Vec<RawRecord>, now: DateTime<Utc>) -> Result<NormalizedBatch> {
    info!("Normalizing {} rows", records.len());

    let mut report = NormalizeReport {
        input_rows: records.len(),
        ..Default::default()
    };

    // Step 1: dates
    let validated: Vec<ValidatedRecord> = records.iter().filter_map(validate).collect();
    report.invalid_dates = report.input_rows - validated.len();
    if report.invalid_dates > 0 {
        warn!("Removing {} rows with invalid dates", report.invalid_dates);
    }

    // Steps 2-4: imputation and text standardization
    let imputed = impute(validated, &mut report.imputed);

    // Step 5: coercion of numeric fields
    let before = imputed.len();
    let coerced: Vec<CoercedRecord> = imputed.into_iter().filter_map(coerce).collect();
    report.coercion_failures = before - coerced.len();
    if report.coercion_failures > 0 {
        warn!(
            "Removing {} rows with non-numeric critical fields",
            report.coercion_failures
        );
    }

    // Step 6: price outliers
    let before = coerced.len();
    let fence = price_fence(coerced.iter().map(|r| r.price));
    let fenced: Vec<CoercedRecord> = match fence {
        Some(fence) => {
            debug!(
                "Price fence: {:.0} - {:.0} (Q1 {:.0}, Q3 {:.0})",
                fence.lower, fence.upper, fence.q1, fence.q3
            );
            coerced
                .into_iter()
                .filter(|r| fence.contains(r.price))
                .collect()
        }
        None => coerced,
    };
    report.price_fence = fence;
    report.outliers = before - fenced.len();
    if report.outliers > 0 {
        warn!("Removing {} price outliers", report.outliers);
    }

    // Step 7: reasonable minimums
    let before = fenced.len();
    let sane: Vec<CoercedRecord> = fenced.into_iter().filter(is_sane).collect();
    report.sanity_failures = before - sane.len();
    if report.sanity_failures > 0 {
        warn!(
            "Removing {} rows failing minimum value checks",
            report.sanity_failures
        );
    }

    // Steps 8-9: derived fields and metadata
    let records: Vec<NormalizedRecord> =
        sane.into_iter().filter_map(|r| finalize(r, now)).collect();
    report.output_rows = records.len();

    info!("Normalization complete: {}", report);

    if records.is_empty() {
        return Err(EtlError::Data("no rows survived normalization".to_string()));
    }

    Ok(NormalizedBatch { records, report })
}

/// Stage 1: parse the list date and type the remaining cells.
/// Rows without a usable date are dropped.
fn validate(raw: &RawRecord) -> Option<ValidatedRecord> {
    let list_date = raw.list_date.as_deref().and_then(parse_list_date)?;

    Some(ValidatedRecord {
        list_date,
        location: clean_text(raw.location.as_deref()),
        property_type: clean_text(raw.property_type.as_deref()),
        price: parse_cell(raw.price.as_deref()),
        sqft: parse_cell(raw.sqft.as_deref()),
        bedrooms: parse_cell(raw.bedrooms.as_deref()),
        bathrooms: parse_cell(raw.bathrooms.as_deref()),
        lot_size: parse_cell(raw.lot_size.as_deref()).value(),
        listing_status: clean_text(raw.listing_status.as_deref()),
    })
}

/// Steps 2-4: fill missing cells from batch statistics, then standardize text
fn impute(records: Vec<ValidatedRecord>, counts: &mut ImputationCounts) -> Vec<ValidatedRecord> {
    let column = |f: fn(&ValidatedRecord) -> &Cell| -> Vec<f64> {
        records.iter().filter_map(|r| f(r).value()).collect()
    };

    let price_median = median(&column(|r| &r.price));
    let sqft_median = median(&column(|r| &r.sqft));
    let bathrooms_median = median(&column(|r| &r.bathrooms));
    let bedrooms_mode = mode(&column(|r| &r.bedrooms));

    records
        .into_iter()
        .map(|mut r| {
            fill(&mut r.price, price_median, &mut counts.price);
            fill(&mut r.sqft, sqft_median, &mut counts.sqft);
            fill(&mut r.bathrooms, bathrooms_median, &mut counts.bathrooms);
            fill(&mut r.bedrooms, bedrooms_mode, &mut counts.bedrooms);

            if r.location.is_none() {
                counts.location += 1;
            }
            if r.property_type.is_none() {
                counts.property_type += 1;
            }
            r.location = Some(standardize_text(r.location.as_deref()));
            r.property_type = Some(standardize_text(r.property_type.as_deref()));
            r
        })
        .collect()
}

fn fill(cell: &mut Cell, with: Option<f64>, count: &mut usize) {
    if let (true, Some(value)) = (cell.is_missing(), with) {
        *cell = Cell::Value(value);
        *count += 1;
    }
}

/// Trimmed, title-cased text; `Unknown` when blank
pub fn standardize_text(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => title_case(s),
        None => UNKNOWN.to_string(),
    }
}

/// Step 5: every numeric field must hold a usable value
fn coerce(r: ValidatedRecord) -> Option<CoercedRecord> {
    let price = r.price.value();
    let sqft = r.sqft.value();
    let bathrooms = r.bathrooms.value();
    let bedrooms = r.bedrooms.value().and_then(whole_number);

    match (price, sqft, bedrooms, bathrooms) {
        (Some(price), Some(sqft), Some(bedrooms), Some(bathrooms)) => Some(CoercedRecord {
            list_date: r.list_date,
            location: r.location.unwrap_or_else(|| UNKNOWN.to_string()),
            property_type: r.property_type.unwrap_or_else(|| UNKNOWN.to_string()),
            price,
            sqft,
            bedrooms,
            bathrooms,
            lot_size: r.lot_size,
            listing_status: r.listing_status,
        }),
        _ => {
            debug!(
                "Coercion failed for row dated {} (price: {:?}, sqft: {:?}, bedrooms: {:?}, bathrooms: {:?})",
                r.list_date, r.price, r.sqft, r.bedrooms, r.bathrooms
            );
            None
        }
    }
}

fn whole_number(v: f64) -> Option<i32> {
    (v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX))
        .then_some(v as i32)
}

/// Tukey fence over the given prices; `None` when there are none
pub fn price_fence(prices: impl Iterator<Item = f64>) -> Option<PriceFence> {
    let mut sorted: Vec<f64> = prices.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;

    Some(PriceFence {
        q1,
        q3,
        lower: q1 - IQR_MULTIPLIER * iqr,
        upper: q3 + IQR_MULTIPLIER * iqr,
    })
}

/// Step 7
fn is_sane(r: &CoercedRecord) -> bool {
    r.price > 0.0 && r.sqft > 0.0 && r.bedrooms >= 0 && r.bathrooms > 0.0
}

/// Steps 8-9
fn finalize(r: CoercedRecord, now: DateTime<Utc>) -> Option<NormalizedRecord> {
    let price_per_sqft = calculate_price_per_sqft(r.price, r.sqft)?;

    Some(NormalizedRecord {
        list_date: r.list_date,
        location: r.location,
        property_type: r.property_type,
        price: r.price,
        bedrooms: r.bedrooms,
        bathrooms: r.bathrooms,
        sqft: r.sqft,
        lot_size: r.lot_size,
        listing_status: r
            .listing_status
            .unwrap_or_else(|| DEFAULT_LISTING_STATUS.to_string()),
        price_per_sqft,
        created_at: now,
        updated_at: now,
    })
}
