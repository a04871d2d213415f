//! Fact loader - join normalized rows against dimension keys

use crate::ingestion::types::{
    DimensionTables, FactBatch, FactListing, ForeignKey, JoinMiss, JoinStats, NormalizedRecord,
};
use crate::ingestion::utils::date_key;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Build fact rows for a batch. Listing ids run `1..=N` in input order;
/// the warehouse rebases them when appending.
///
/// A row whose natural key is absent from a dimension keeps an
/// `Unresolved` foreign key instead of failing the batch.
pub fn load_facts(records: &[NormalizedRecord], dims: &DimensionTables) -> FactBatch {
    let locations: HashMap<&str, i64> = dims
        .locations
        .iter()
        .map(|l| (l.location.as_str(), l.location_id))
        .collect();
    let property_types: HashMap<&str, i64> = dims
        .property_types
        .iter()
        .map(|p| (p.property_type.as_str(), p.property_type_id))
        .collect();
    let dates: HashSet<i64> = dims.dates.iter().map(|d| d.date_id).collect();

    let mut stats = JoinStats::default();

    let facts: Vec<FactListing> = records
        .iter()
        .zip(1..)
        .map(|(r, listing_id)| {
            let location_id =
                resolve(locations.get(r.location.as_str()).copied(), JoinMiss::Location);
            let property_type_id = resolve(
                property_types.get(r.property_type.as_str()).copied(),
                JoinMiss::PropertyType,
            );
            let key = date_key(r.list_date);
            let date_id = resolve(dates.contains(&key).then_some(key), JoinMiss::Date);

            stats.rows += 1;
            if !location_id.is_resolved() {
                stats.location_misses += 1;
            }
            if !property_type_id.is_resolved() {
                stats.property_type_misses += 1;
            }
            if !date_id.is_resolved() {
                stats.date_misses += 1;
            }

            FactListing {
                listing_id,
                location_id,
                property_type_id,
                date_id,
                list_date: r.list_date,
                listing_status: r.listing_status.clone(),
                price: r.price,
                bedrooms: r.bedrooms,
                bathrooms: r.bathrooms,
                sqft: r.sqft,
                lot_size: r.lot_size,
                price_per_sqft: r.price_per_sqft,
                created_at: r.created_at,
                updated_at: r.updated_at,
            }
        })
        .collect();

    if stats.unresolved() > 0 {
        warn!(
            "Unresolved dimension keys: {} location, {} property type, {} date",
            stats.location_misses, stats.property_type_misses, stats.date_misses
        );
    }
    info!("Prepared {} fact rows", facts.len());

    FactBatch {
        facts,
        join_stats: stats,
    }
}

fn resolve(id: Option<i64>, miss: JoinMiss) -> ForeignKey {
    match id {
        Some(id) => ForeignKey::Resolved(id),
        None => ForeignKey::Unresolved(miss),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::dimensions::build_dimensions;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(day: u32, location: &str, property_type: &str, price: f64) -> NormalizedRecord {
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        NormalizedRecord {
            list_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            location: location.to_string(),
            property_type: property_type.to_string(),
            price,
            bedrooms: 3,
            bathrooms: 2.5,
            sqft: 2_000.0,
            lot_size: Some(3_000.0),
            listing_status: "Active".to_string(),
            price_per_sqft: price / 2_000.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> Vec<NormalizedRecord> {
        vec![
            record(3, "Dubai Marina, Dubai", "Apartment", 1_000_000.0),
            record(5, "Sharjah", "Villa", 2_000_000.0),
            record(4, "Dubai Marina, Dubai", "Villa", 1_500_000.0),
        ]
    }

    #[test]
    fn test_facts_join_all_dimensions() {
        let records = sample();
        let dims = build_dimensions(&records, Utc::now());

        let batch = load_facts(&records, &dims);

        assert_eq!(batch.facts.len(), 3);
        assert_eq!(batch.join_stats.unresolved(), 0);

        let ids: Vec<i64> = batch.facts.iter().map(|f| f.listing_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(batch.facts[0].location_id, ForeignKey::Resolved(1));
        assert_eq!(batch.facts[1].location_id, ForeignKey::Resolved(2));
        assert_eq!(batch.facts[2].location_id, ForeignKey::Resolved(1));
        assert_eq!(batch.facts[2].property_type_id, ForeignKey::Resolved(2));
        assert_eq!(batch.facts[1].date_id, ForeignKey::Resolved(20240105));
        assert_eq!(batch.facts[0].lot_size, Some(3_000.0));
    }

    #[test]
    fn test_join_miss_is_explicit() {
        let records = sample();
        let mut dims = build_dimensions(&records, Utc::now());
        dims.locations.retain(|l| l.location != "Sharjah");
        dims.dates.retain(|d| d.date_id != 20240103);

        let batch = load_facts(&records, &dims);

        assert_eq!(batch.facts.len(), 3);
        assert_eq!(
            batch.facts[1].location_id,
            ForeignKey::Unresolved(JoinMiss::Location)
        );
        assert_eq!(batch.facts[1].location_id.id(), None);
        assert_eq!(batch.facts[0].date_id, ForeignKey::Unresolved(JoinMiss::Date));
        assert_eq!(batch.join_stats.location_misses, 1);
        assert_eq!(batch.join_stats.date_misses, 1);
        assert_eq!(batch.join_stats.property_type_misses, 0);
    }

    #[test]
    fn test_facts_follow_rekeyed_dimensions() {
        let records = sample();
        let mut dims = build_dimensions(&records, Utc::now());
        for loc in dims.locations.iter_mut() {
            loc.location_id += 40;
        }

        let batch = load_facts(&records, &dims);

        assert_eq!(batch.facts[0].location_id, ForeignKey::Resolved(41));
        assert_eq!(batch.facts[1].location_id, ForeignKey::Resolved(42));
    }
}
