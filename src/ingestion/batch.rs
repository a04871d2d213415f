//! Batch pipeline - one upload from CSV text to warehouse rows
//!
//! parse -> normalize -> build dimensions -> write dimensions -> join facts
//! -> append facts. Every check that can reject the upload runs before the
//! first warehouse write.

use crate::error::Result;
use crate::ingestion::dimensions::build_dimensions;
use crate::ingestion::facts::load_facts;
use crate::ingestion::fetch::{fetch_object, fetch_source, is_csv_object, read_text};
use crate::ingestion::normalize::normalize_at;
use crate::ingestion::parse::parse_listings;
use crate::ingestion::types::LoadSummary;
use crate::storage::ObjectStore;
use crate::warehouse::{DimensionWriteMode, Warehouse};
use chrono::Utc;
use tracing::{info, warn};

/// Run the full pipeline over one upload's CSV text
pub async fn process_upload<W: Warehouse>(
    warehouse: &W,
    source: &str,
    csv_text: &str,
    mode: DimensionWriteMode,
) -> Result<LoadSummary> {
    info!("Processing {}", source);
    let now = Utc::now();

    let parsed = parse_listings(csv_text)?;
    let batch = normalize_at(parsed.records, now)?;
    info!("{}", batch.report);

    let dims = build_dimensions(&batch.records, now);
    let keyed = warehouse.write_dimensions(dims, mode).await?;

    let facts = load_facts(&batch.records, &keyed);
    let facts_loaded = facts.facts.len();
    let listing_ids = warehouse.append_facts(facts.facts).await?;

    let summary = LoadSummary {
        source: source.to_string(),
        malformed_rows: parsed.malformed_rows,
        normalize: batch.report,
        locations: keyed.locations.len(),
        property_types: keyed.property_types.len(),
        dates: keyed.dates.len(),
        facts_loaded,
        listing_ids,
        join_stats: facts.join_stats,
    };
    info!("{}", summary);

    Ok(summary)
}

/// Handle an object-finalized event. Returns `None` for non-CSV objects.
pub async fn process_object<W: Warehouse, S: ObjectStore>(
    warehouse: &W,
    store: &S,
    bucket: &str,
    name: &str,
    mode: DimensionWriteMode,
) -> Result<Option<LoadSummary>> {
    if !is_csv_object(name) {
        warn!("Skipping non-CSV object {}/{}", bucket, name);
        return Ok(None);
    }

    let raw = fetch_object(store, bucket, name).await?;
    let text = read_text(raw).await?;
    let source = store.uri(bucket, name);

    process_upload(warehouse, &source, &text, mode).await.map(Some)
}

/// Load a local path or an http(s) URL
pub async fn process_source<W: Warehouse>(
    warehouse: &W,
    source: &str,
    mode: DimensionWriteMode,
) -> Result<LoadSummary> {
    let raw = fetch_source(source).await?;
    let text = read_text(raw).await?;
    process_upload(warehouse, source, &text, mode).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::ingestion::types::ForeignKey;
    use crate::storage::LocalObjectStore;
    use crate::warehouse::MemoryWarehouse;
    use tempfile::tempdir;

    const HEADER: &str = "list_date,location,property_type,price,bedrooms,bathrooms,sqft,lot_size,listing_status";

    fn csv(rows: &[&str]) -> String {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text.push('\n');
        text
    }

    fn first_upload() -> String {
        csv(&[
            r#"2024-01-15,"  dubai marina, dubai ",apartment,800000,2,2,1200,,Active"#,
            "2024-01-16,Sharjah,villa,1500000,4,3,3000,5000,Pending",
            "2024-01-18,Sharjah,apartment,600000,1,1,800,,",
        ])
    }

    fn second_upload() -> String {
        csv(&[
            r#"2024-02-01,"Al Barsha, Dubai",townhouse,2100000,3,3,2400,2600,Active"#,
            "2024-02-02,Sharjah,Penthouse Suite,4500000,4,5,4000,,Active",
            r#"2024-02-03,"Dubai Marina, Dubai",Apartment,950000,2,2,1300,,Sold"#,
        ])
    }

    #[tokio::test]
    async fn test_process_upload_end_to_end() {
        let warehouse = MemoryWarehouse::new();

        let summary = process_upload(
            &warehouse,
            "first.csv",
            &first_upload(),
            DimensionWriteMode::Merge,
        )
        .await
        .unwrap();

        assert_eq!(summary.facts_loaded, 3);
        assert_eq!(summary.listing_ids, 1..4);
        assert_eq!(summary.locations, 2);
        assert_eq!(summary.property_types, 2);
        // 2024-01-15 through 2024-01-18
        assert_eq!(summary.dates, 4);
        assert_eq!(summary.join_stats.unresolved(), 0);

        let tables = warehouse.snapshot().unwrap();
        let marina = &tables.dim_location[0];
        assert_eq!(marina.location, "Dubai Marina, Dubai");
        assert_eq!(marina.city, "Dubai Marina");
        assert_eq!(tables.dim_location[1].state, None);

        let first = &tables.fact_listings[0];
        assert_eq!(first.price_per_sqft, 666.67);
        assert_eq!(first.listing_status, "Active");
        assert_eq!(tables.fact_listings[2].listing_status, "Active");
        assert_eq!(tables.fact_listings[1].lot_size, Some(5000.0));
    }

    #[tokio::test]
    async fn test_successive_batches_keep_keys() {
        let warehouse = MemoryWarehouse::new();

        let first = process_upload(&warehouse, "a.csv", &first_upload(), DimensionWriteMode::Merge)
            .await
            .unwrap();
        let second =
            process_upload(&warehouse, "b.csv", &second_upload(), DimensionWriteMode::Merge)
                .await
                .unwrap();

        assert_eq!(first.listing_ids, 1..4);
        assert_eq!(second.listing_ids, 4..7);

        let tables = warehouse.snapshot().unwrap();
        assert_eq!(tables.dim_location.len(), 3);
        assert_eq!(tables.dim_property_type.len(), 4);

        // Sharjah was id 2 in the first batch and still is
        let sharjah = tables
            .dim_location
            .iter()
            .find(|l| l.location == "Sharjah")
            .unwrap();
        assert_eq!(sharjah.location_id, 2);
        assert_eq!(tables.fact_listings[4].location_id, ForeignKey::Resolved(2));

        // And the first batch's facts still resolve
        for fact in &tables.fact_listings {
            let id = fact.location_id.id().unwrap();
            assert!(tables.dim_location.iter().any(|l| l.location_id == id));
        }
    }

    #[tokio::test]
    async fn test_replace_mode_rebuilds_dimensions() {
        let warehouse = MemoryWarehouse::new();

        process_upload(&warehouse, "a.csv", &first_upload(), DimensionWriteMode::Replace)
            .await
            .unwrap();
        let second =
            process_upload(&warehouse, "b.csv", &second_upload(), DimensionWriteMode::Replace)
                .await
                .unwrap();

        let tables = warehouse.snapshot().unwrap();
        assert_eq!(tables.dim_location.len(), 3);
        assert_eq!(tables.dim_location[0].location, "Al Barsha, Dubai");
        // Facts are never replaced
        assert_eq!(tables.fact_listings.len(), 6);
        assert_eq!(second.listing_ids, 4..7);
    }

    #[tokio::test]
    async fn test_no_partial_load_when_every_row_is_dropped() {
        let warehouse = MemoryWarehouse::new();
        let text = csv(&[
            "2024-01-15,Sharjah,villa,0,3,2,2000,,",
            "2024-01-16,Sharjah,villa,-5,3,2,2000,,",
        ]);

        let err = process_upload(&warehouse, "bad.csv", &text, DimensionWriteMode::Merge)
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::Data(_)));
        assert!(err.is_rejection());

        let tables = warehouse.snapshot().unwrap();
        assert!(tables.dim_location.is_empty());
        assert!(tables.dim_date.is_empty());
        assert!(tables.fact_listings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_columns_rejected() {
        let warehouse = MemoryWarehouse::new();
        let text = "list_date,location,price\n2024-01-15,Sharjah,900000\n";

        let err = process_upload(&warehouse, "bad.csv", text, DimensionWriteMode::Merge)
            .await
            .unwrap_err();

        match err {
            EtlError::Schema { missing } => {
                assert_eq!(
                    missing,
                    vec!["property_type", "bedrooms", "bathrooms", "sqft"]
                );
            }
            other => panic!("Expected schema error, got {other}"),
        }
        assert!(warehouse.snapshot().unwrap().fact_listings.is_empty());
    }

    #[tokio::test]
    async fn test_process_object() {
        let temp = tempdir().unwrap();
        let store = LocalObjectStore::new(temp.path());
        let warehouse = MemoryWarehouse::new();
        store
            .put("landing", "uploads/listings.csv", first_upload().into_bytes())
            .await
            .unwrap();

        let skipped = process_object(
            &warehouse,
            &store,
            "landing",
            "uploads/readme.txt",
            DimensionWriteMode::Merge,
        )
        .await
        .unwrap();
        assert!(skipped.is_none());

        let summary = process_object(
            &warehouse,
            &store,
            "landing",
            "uploads/listings.csv",
            DimensionWriteMode::Merge,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(summary.facts_loaded, 3);
        assert!(summary.source.ends_with("listings.csv"));
    }

    #[tokio::test]
    async fn test_process_source_from_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("listings.csv");
        std::fs::write(&path, second_upload()).unwrap();
        let warehouse = MemoryWarehouse::new();

        let summary = process_source(
            &warehouse,
            path.to_str().unwrap(),
            DimensionWriteMode::Merge,
        )
        .await
        .unwrap();

        assert_eq!(summary.facts_loaded, 3);
        assert_eq!(summary.malformed_rows, 0);
    }
}
