//! Postgres warehouse - persist the star schema inside one schema per dataset

use crate::analytics::{
    BedroomBucket, LocationPerformance, MonthlyTrend, PriceBracketShare, PriceCorrelations,
    PropertyTypeShare, ReportQueries, SummaryStats, TopListing,
};
use crate::error::WarehouseError;
use crate::ingestion::types::{DateDim, DimensionTables, FactListing, LocationDim, PropertyTypeDim};
use crate::warehouse::{validate_identifier, DimensionWriteMode, Warehouse};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool};
use std::ops::Range;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
    schema: String,
}

impl PgWarehouse {
    pub fn new(pool: PgPool, schema: &str) -> Result<Self, WarehouseError> {
        Ok(Self {
            pool,
            schema: validate_identifier(schema)?.to_string(),
        })
    }

    pub async fn connect(
        database_url: &str,
        schema: &str,
        max_connections: u32,
    ) -> Result<Self, WarehouseError> {
        validate_identifier(schema)?;
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Database connected successfully");
        Self::new(pool, schema)
    }

    /// Create the schema and tables if they don't exist yet
    pub async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        for statement in schema_statements(&self.schema) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!("Warehouse schema {} ready", self.schema);
        Ok(())
    }

    fn table(&self, name: &str) -> String {
        qualified(&self.schema, name)
    }

    async fn fetch_rows<T>(&self, sql: &str) -> Result<Vec<T>, WarehouseError>
    where
        T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        Ok(sqlx::query_as::<_, T>(sql).fetch_all(&self.pool).await?)
    }
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

/// DDL for the warehouse, one statement per entry. Foreign keys are plain
/// columns so unresolved joins can be stored as NULL.
pub fn schema_statements(schema: &str) -> Vec<String> {
    let t = |name: &str| qualified(schema, name);
    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", schema),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                location_id BIGINT PRIMARY KEY,
                location TEXT NOT NULL UNIQUE,
                city TEXT NOT NULL,
                state TEXT,
                zip_code TEXT,
                region TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            t("dim_location")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                property_type_id BIGINT PRIMARY KEY,
                property_type TEXT NOT NULL UNIQUE,
                type_name TEXT NOT NULL,
                category TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            t("dim_property_type")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                date_id BIGINT PRIMARY KEY,
                full_date DATE NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                month_name TEXT NOT NULL,
                quarter INTEGER NOT NULL,
                day_of_week INTEGER NOT NULL,
                day_name TEXT NOT NULL,
                is_weekend BOOLEAN NOT NULL
            )
            "#,
            t("dim_date")
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                listing_id BIGINT PRIMARY KEY,
                location_id BIGINT,
                property_type_id BIGINT,
                date_id BIGINT,
                list_date DATE NOT NULL,
                listing_status TEXT NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                bedrooms INTEGER NOT NULL,
                bathrooms DOUBLE PRECISION NOT NULL,
                sqft DOUBLE PRECISION NOT NULL,
                lot_size DOUBLE PRECISION,
                price_per_sqft DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            t("fact_listings")
        ),
    ]
}

/// Serialize id allocation against concurrent uploads until commit
async fn lock_table(conn: &mut PgConnection, table: &str) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("LOCK TABLE {} IN SHARE ROW EXCLUSIVE MODE", table))
        .execute(conn)
        .await?;
    Ok(())
}

async fn max_id(conn: &mut PgConnection, table: &str, column: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COALESCE(MAX({}), 0)::bigint FROM {}",
        column, table
    ))
    .fetch_one(conn)
    .await
}

async fn insert_location(
    conn: &mut PgConnection,
    table: &str,
    row: &LocationDim,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (location_id, location, city, state, zip_code, region, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        table
    ))
    .bind(row.location_id)
    .bind(&row.location)
    .bind(&row.city)
    .bind(&row.state)
    .bind(&row.zip_code)
    .bind(&row.region)
    .bind(row.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_property_type(
    conn: &mut PgConnection,
    table: &str,
    row: &PropertyTypeDim,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (property_type_id, property_type, type_name, category, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
        table
    ))
    .bind(row.property_type_id)
    .bind(&row.property_type)
    .bind(&row.type_name)
    .bind(row.category.as_str())
    .bind(row.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Date ids are natural keys, so an existing row is simply kept
async fn insert_date(
    conn: &mut PgConnection,
    table: &str,
    row: &DateDim,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (
            date_id, full_date, year, month, month_name, quarter,
            day_of_week, day_name, is_weekend
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (date_id) DO NOTHING
        "#,
        table
    ))
    .bind(row.date_id)
    .bind(row.full_date)
    .bind(row.year)
    .bind(row.month as i32)
    .bind(&row.month_name)
    .bind(row.quarter as i32)
    .bind(row.day_of_week as i32)
    .bind(&row.day_name)
    .bind(row.is_weekend)
    .execute(conn)
    .await?;
    Ok(())
}

async fn merge_locations(
    conn: &mut PgConnection,
    table: &str,
    rows: Vec<LocationDim>,
) -> Result<Vec<LocationDim>, sqlx::Error> {
    lock_table(conn, table).await?;
    let mut next = max_id(conn, table, "location_id").await? + 1;
    let mut merged = Vec::with_capacity(rows.len());

    for mut row in rows {
        let existing = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT location_id FROM {} WHERE location = $1",
            table
        ))
        .bind(&row.location)
        .fetch_optional(&mut *conn)
        .await?;

        match existing {
            Some(id) => row.location_id = id,
            None => {
                row.location_id = next;
                next += 1;
                insert_location(conn, table, &row).await?;
                debug!("Inserted location {} (id: {})", row.location, row.location_id);
            }
        }
        merged.push(row);
    }

    Ok(merged)
}

async fn merge_property_types(
    conn: &mut PgConnection,
    table: &str,
    rows: Vec<PropertyTypeDim>,
) -> Result<Vec<PropertyTypeDim>, sqlx::Error> {
    lock_table(conn, table).await?;
    let mut next = max_id(conn, table, "property_type_id").await? + 1;
    let mut merged = Vec::with_capacity(rows.len());

    for mut row in rows {
        let existing = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT property_type_id FROM {} WHERE property_type = $1",
            table
        ))
        .bind(&row.property_type)
        .fetch_optional(&mut *conn)
        .await?;

        match existing {
            Some(id) => row.property_type_id = id,
            None => {
                row.property_type_id = next;
                next += 1;
                insert_property_type(conn, table, &row).await?;
                debug!(
                    "Inserted property type {} (id: {})",
                    row.property_type, row.property_type_id
                );
            }
        }
        merged.push(row);
    }

    Ok(merged)
}

impl Warehouse for PgWarehouse {
    async fn write_dimensions(
        &self,
        dims: DimensionTables,
        mode: DimensionWriteMode,
    ) -> Result<DimensionTables, WarehouseError> {
        let locations = self.table("dim_location");
        let property_types = self.table("dim_property_type");
        let dates = self.table("dim_date");

        let mut tx = self.pool.begin().await?;

        let keyed = match mode {
            DimensionWriteMode::Replace => {
                info!("Replacing dimension tables in {}", self.schema);
                sqlx::query(&format!(
                    "TRUNCATE TABLE {}, {}, {}",
                    locations, property_types, dates
                ))
                .execute(&mut *tx)
                .await?;

                for row in &dims.locations {
                    insert_location(&mut *tx, &locations, row).await?;
                }
                for row in &dims.property_types {
                    insert_property_type(&mut *tx, &property_types, row).await?;
                }
                for row in &dims.dates {
                    insert_date(&mut *tx, &dates, row).await?;
                }
                dims
            }
            DimensionWriteMode::Merge => {
                info!("Merging dimension tables in {}", self.schema);
                let merged_locations = merge_locations(&mut *tx, &locations, dims.locations).await?;
                let merged_types =
                    merge_property_types(&mut *tx, &property_types, dims.property_types).await?;
                for row in &dims.dates {
                    insert_date(&mut *tx, &dates, row).await?;
                }
                DimensionTables {
                    locations: merged_locations,
                    property_types: merged_types,
                    dates: dims.dates,
                }
            }
        };

        tx.commit().await?;

        info!(
            "Wrote {} locations, {} property types, {} dates",
            keyed.locations.len(),
            keyed.property_types.len(),
            keyed.dates.len()
        );
        Ok(keyed)
    }

    async fn append_facts(&self, facts: Vec<FactListing>) -> Result<Range<i64>, WarehouseError> {
        let table = self.table("fact_listings");
        let mut tx = self.pool.begin().await?;

        lock_table(&mut *tx, &table).await?;
        let offset = max_id(&mut *tx, &table, "listing_id").await?;
        let count = facts.len() as i64;

        let sql = format!(
            r#"
            INSERT INTO {} (
                listing_id, location_id, property_type_id, date_id, list_date,
                listing_status, price, bedrooms, bathrooms, sqft, lot_size,
                price_per_sqft, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
            table
        );

        for fact in &facts {
            sqlx::query(&sql)
                .bind(fact.listing_id + offset)
                .bind(fact.location_id.id())
                .bind(fact.property_type_id.id())
                .bind(fact.date_id.id())
                .bind(fact.list_date)
                .bind(&fact.listing_status)
                .bind(fact.price)
                .bind(fact.bedrooms)
                .bind(fact.bathrooms)
                .bind(fact.sqft)
                .bind(fact.lot_size)
                .bind(fact.price_per_sqft)
                .bind(fact.created_at)
                .bind(fact.updated_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!("Appended {} facts after listing id {}", count, offset);
        Ok((offset + 1)..(offset + count + 1))
    }
}

impl ReportQueries for PgWarehouse {
    async fn summary_stats(&self) -> Result<Vec<SummaryStats>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                COUNT(*)::bigint AS total_listings,
                ROUND(AVG(price)::numeric, 2)::float8 AS avg_price,
                ROUND(MIN(price)::numeric, 2)::float8 AS min_price,
                ROUND(MAX(price)::numeric, 2)::float8 AS max_price,
                ROUND(AVG(price_per_sqft)::numeric, 2)::float8 AS avg_price_per_sqft,
                ROUND(AVG(sqft)::numeric, 0)::float8 AS avg_sqft,
                ROUND(AVG(bedrooms)::numeric, 1)::float8 AS avg_bedrooms
            FROM {}
            "#,
            self.table("fact_listings")
        ))
        .await
    }

    async fn monthly_trends(&self) -> Result<Vec<MonthlyTrend>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                d.year,
                d.month,
                d.month_name,
                COUNT(*)::bigint AS listing_count,
                ROUND(AVG(f.price)::numeric, 2)::float8 AS avg_price,
                ROUND(AVG(f.price_per_sqft)::numeric, 2)::float8 AS avg_price_per_sqft
            FROM {fact} f
            JOIN {date} d ON f.date_id = d.date_id
            GROUP BY d.year, d.month, d.month_name
            ORDER BY d.year DESC, d.month DESC
            "#,
            fact = self.table("fact_listings"),
            date = self.table("dim_date")
        ))
        .await
    }

    async fn location_analysis(&self) -> Result<Vec<LocationPerformance>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                l.city,
                COUNT(*)::bigint AS listing_count,
                ROUND(AVG(f.price)::numeric, 2)::float8 AS avg_price,
                ROUND(AVG(f.bedrooms)::numeric, 1)::float8 AS avg_bedrooms,
                ROUND(AVG(f.sqft)::numeric, 0)::float8 AS avg_sqft,
                ROUND(AVG(f.price_per_sqft)::numeric, 2)::float8 AS avg_price_per_sqft
            FROM {fact} f
            JOIN {loc} l ON f.location_id = l.location_id
            GROUP BY l.city
            ORDER BY avg_price DESC
            "#,
            fact = self.table("fact_listings"),
            loc = self.table("dim_location")
        ))
        .await
    }

    async fn property_type_distribution(&self) -> Result<Vec<PropertyTypeShare>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                p.type_name,
                COUNT(*)::bigint AS listing_count,
                ROUND((COUNT(*) * 100.0 / SUM(COUNT(*)) OVER ())::numeric, 2)::float8 AS pct_of_total,
                ROUND(AVG(f.price)::numeric, 2)::float8 AS avg_price,
                ROUND(AVG(f.bedrooms)::numeric, 1)::float8 AS avg_bedrooms
            FROM {fact} f
            JOIN {pt} p ON f.property_type_id = p.property_type_id
            GROUP BY p.type_name
            ORDER BY listing_count DESC
            "#,
            fact = self.table("fact_listings"),
            pt = self.table("dim_property_type")
        ))
        .await
    }

    async fn price_correlations(&self) -> Result<Vec<PriceCorrelations>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                ROUND(CORR(price, sqft)::numeric, 4)::float8 AS price_sqft_correlation,
                ROUND(CORR(price, bedrooms::float8)::numeric, 4)::float8 AS price_bedrooms_correlation,
                ROUND(CORR(price, bathrooms)::numeric, 4)::float8 AS price_bathrooms_correlation
            FROM {}
            "#,
            self.table("fact_listings")
        ))
        .await
    }

    async fn top_10_expensive(&self) -> Result<Vec<TopListing>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                f.listing_id,
                l.city,
                p.type_name,
                f.bedrooms,
                f.bathrooms,
                f.sqft,
                ROUND(f.price::numeric, 2)::float8 AS price,
                ROUND(f.price_per_sqft::numeric, 2)::float8 AS price_per_sqft
            FROM {fact} f
            JOIN {loc} l ON f.location_id = l.location_id
            JOIN {pt} p ON f.property_type_id = p.property_type_id
            ORDER BY f.price DESC
            LIMIT 10
            "#,
            fact = self.table("fact_listings"),
            loc = self.table("dim_location"),
            pt = self.table("dim_property_type")
        ))
        .await
    }

    async fn bedroom_distribution(&self) -> Result<Vec<BedroomBucket>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            SELECT
                bedrooms,
                COUNT(*)::bigint AS listing_count,
                ROUND(AVG(price)::numeric, 2)::float8 AS avg_price,
                ROUND(AVG(sqft)::numeric, 0)::float8 AS avg_sqft
            FROM {}
            GROUP BY bedrooms
            ORDER BY bedrooms
            "#,
            self.table("fact_listings")
        ))
        .await
    }

    async fn price_brackets(&self) -> Result<Vec<PriceBracketShare>, WarehouseError> {
        self.fetch_rows(&format!(
            r#"
            WITH bracketed AS (
                SELECT
                    price,
                    CASE
                        WHEN price < 500000 THEN 'Budget (<500K)'
                        WHEN price < 1000000 THEN 'Mid-Range (500K-1M)'
                        WHEN price < 2000000 THEN 'Premium (1M-2M)'
                        WHEN price < 5000000 THEN 'Luxury (2M-5M)'
                        ELSE 'Ultra-Luxury (5M+)'
                    END AS price_bracket,
                    CASE
                        WHEN price < 500000 THEN 1
                        WHEN price < 1000000 THEN 2
                        WHEN price < 2000000 THEN 3
                        WHEN price < 5000000 THEN 4
                        ELSE 5
                    END AS bracket_rank
                FROM {}
            )
            SELECT
                price_bracket,
                bracket_rank,
                COUNT(*)::bigint AS listing_count,
                ROUND((COUNT(*) * 100.0 / SUM(COUNT(*)) OVER ())::numeric, 2)::float8 AS pct_of_total,
                ROUND(AVG(price)::numeric, 2)::float8 AS avg_price
            FROM bracketed
            GROUP BY price_bracket, bracket_rank
            ORDER BY bracket_rank
            "#,
            self.table("fact_listings")
        ))
        .await
    }
}
