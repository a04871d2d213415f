//! Dimension builder - derive keyed dimension tables from a normalized batch
//! Pure functions; persistence is the warehouse's job

use crate::ingestion::types::{
    DateDim, DimensionTables, LocationDim, NormalizedRecord, PropertyTypeDim,
};
use crate::ingestion::utils::{categorize_property_type, date_key, split_location};
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use std::collections::HashSet;
use tracing::info;

/// Region recorded on every location row
pub const DEFAULT_REGION: &str = "UAE";

/// Build all three dimension tables for a batch
pub fn build_dimensions(records: &[NormalizedRecord], now: DateTime<Utc>) -> DimensionTables {
    let tables = DimensionTables {
        locations: build_locations(records, now),
        property_types: build_property_types(records, now),
        dates: build_date_spine(records),
    };

    info!(
        "Built dimensions: {} locations, {} property types, {} dates",
        tables.locations.len(),
        tables.property_types.len(),
        tables.dates.len()
    );

    tables
}

/// Distinct values in order of first appearance
fn first_appearance<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

pub fn build_locations(records: &[NormalizedRecord], now: DateTime<Utc>) -> Vec<LocationDim> {
    first_appearance(records.iter().map(|r| r.location.as_str()))
        .into_iter()
        .zip(1..)
        .map(|(location, location_id)| location_row(location_id, location, now))
        .collect()
}

pub fn location_row(location_id: i64, location: &str, now: DateTime<Utc>) -> LocationDim {
    let (city, state) = split_location(location);
    LocationDim {
        location_id,
        location: location.to_string(),
        city,
        state,
        zip_code: None,
        region: DEFAULT_REGION.to_string(),
        created_at: now,
    }
}

pub fn build_property_types(
    records: &[NormalizedRecord],
    now: DateTime<Utc>,
) -> Vec<PropertyTypeDim> {
    first_appearance(records.iter().map(|r| r.property_type.as_str()))
        .into_iter()
        .zip(1..)
        .map(|(property_type, property_type_id)| PropertyTypeDim {
            property_type_id,
            property_type: property_type.to_string(),
            type_name: property_type.to_string(),
            category: categorize_property_type(property_type),
            created_at: now,
        })
        .collect()
}

/// One row per calendar day between the batch's earliest and latest
/// list date, inclusive
pub fn build_date_spine(records: &[NormalizedRecord]) -> Vec<DateDim> {
    let min = records.iter().map(|r| r.list_date).min();
    let max = records.iter().map(|r| r.list_date).max();

    match (min, max) {
        (Some(min), Some(max)) => min
            .iter_days()
            .take_while(|d| *d <= max)
            .map(date_row)
            .collect(),
        _ => Vec::new(),
    }
}

pub fn date_row(date: NaiveDate) -> DateDim {
    let weekday = date.weekday();
    DateDim {
        date_id: date_key(date),
        full_date: date,
        year: date.year(),
        month: date.month(),
        month_name: date.format("%B").to_string(),
        quarter: (date.month() - 1) / 3 + 1,
        day_of_week: weekday.num_days_from_monday(),
        day_name: date.format("%A").to_string(),
        is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
    }
}
