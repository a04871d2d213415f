//! Analytics over the listing warehouse
//!
//! A fixed battery of eight read-only queries. Each query fails on its own:
//! an error is recorded against that query and the others still run.

pub mod html;
pub mod report;

use crate::error::WarehouseError;
use serde::Serialize;
use std::future::Future;
use tracing::{error, info};

/// Names of the queries, in report order
pub const QUERY_NAMES: [&str; 8] = [
    "summary_stats",
    "monthly_trends",
    "location_analysis",
    "property_type_distribution",
    "price_correlations",
    "top_10_expensive",
    "bedroom_distribution",
    "price_brackets",
];

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SummaryStats {
    pub total_listings: i64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price_per_sqft: Option<f64>,
    pub avg_sqft: Option<f64>,
    pub avg_bedrooms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct MonthlyTrend {
    pub year: i32,
    pub month: i32,
    pub month_name: String,
    pub listing_count: i64,
    pub avg_price: f64,
    pub avg_price_per_sqft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LocationPerformance {
    pub city: String,
    pub listing_count: i64,
    pub avg_price: f64,
    pub avg_bedrooms: f64,
    pub avg_sqft: f64,
    pub avg_price_per_sqft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PropertyTypeShare {
    pub type_name: String,
    pub listing_count: i64,
    pub pct_of_total: f64,
    pub avg_price: f64,
    pub avg_bedrooms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PriceCorrelations {
    pub price_sqft_correlation: Option<f64>,
    pub price_bedrooms_correlation: Option<f64>,
    pub price_bathrooms_correlation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TopListing {
    pub listing_id: i64,
    pub city: String,
    pub type_name: String,
    pub bedrooms: i32,
    pub bathrooms: f64,
    pub sqft: f64,
    pub price: f64,
    pub price_per_sqft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BedroomBucket {
    pub bedrooms: i32,
    pub listing_count: i64,
    pub avg_price: f64,
    pub avg_sqft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PriceBracketShare {
    pub price_bracket: String,
    pub bracket_rank: i32,
    pub listing_count: i64,
    pub pct_of_total: f64,
    pub avg_price: f64,
}

/// Fixed market segments by list price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceBracket {
    Budget,
    MidRange,
    Premium,
    Luxury,
    UltraLuxury,
}

impl PriceBracket {
    pub fn from_price(price: f64) -> Self {
        if price < 500_000.0 {
            PriceBracket::Budget
        } else if price < 1_000_000.0 {
            PriceBracket::MidRange
        } else if price < 2_000_000.0 {
            PriceBracket::Premium
        } else if price < 5_000_000.0 {
            PriceBracket::Luxury
        } else {
            PriceBracket::UltraLuxury
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceBracket::Budget => "Budget (<500K)",
            PriceBracket::MidRange => "Mid-Range (500K-1M)",
            PriceBracket::Premium => "Premium (1M-2M)",
            PriceBracket::Luxury => "Luxury (2M-5M)",
            PriceBracket::UltraLuxury => "Ultra-Luxury (5M+)",
        }
    }

    /// Display order, 1 = cheapest
    pub fn rank(&self) -> i32 {
        match self {
            PriceBracket::Budget => 1,
            PriceBracket::MidRange => 2,
            PriceBracket::Premium => 3,
            PriceBracket::Luxury => 4,
            PriceBracket::UltraLuxury => 5,
        }
    }
}

/// Read side of the warehouse, one method per report query
pub trait ReportQueries: Send + Sync {
    fn summary_stats(
        &self,
    ) -> impl Future<Output = Result<Vec<SummaryStats>, WarehouseError>> + Send;

    fn monthly_trends(
        &self,
    ) -> impl Future<Output = Result<Vec<MonthlyTrend>, WarehouseError>> + Send;

    fn location_analysis(
        &self,
    ) -> impl Future<Output = Result<Vec<LocationPerformance>, WarehouseError>> + Send;

    fn property_type_distribution(
        &self,
    ) -> impl Future<Output = Result<Vec<PropertyTypeShare>, WarehouseError>> + Send;

    fn price_correlations(
        &self,
    ) -> impl Future<Output = Result<Vec<PriceCorrelations>, WarehouseError>> + Send;

    fn top_10_expensive(
        &self,
    ) -> impl Future<Output = Result<Vec<TopListing>, WarehouseError>> + Send;

    fn bedroom_distribution(
        &self,
    ) -> impl Future<Output = Result<Vec<BedroomBucket>, WarehouseError>> + Send;

    fn price_brackets(
        &self,
    ) -> impl Future<Output = Result<Vec<PriceBracketShare>, WarehouseError>> + Send;
}

/// Rows of one query, or the reason it failed.
/// Serializes as the row array or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult<T> {
    Rows(Vec<T>),
    Failed { error: String },
}

impl<T> QueryResult<T> {
    pub fn rows(&self) -> Option<&[T]> {
        match self {
            QueryResult::Rows(rows) => Some(rows.as_slice()),
            QueryResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryResult::Rows(_) => None,
            QueryResult::Failed { error } => Some(error),
        }
    }
}

/// Results of all eight queries; field names match `QUERY_NAMES`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResults {
    pub summary_stats: QueryResult<SummaryStats>,
    pub monthly_trends: QueryResult<MonthlyTrend>,
    pub location_analysis: QueryResult<LocationPerformance>,
    pub property_type_distribution: QueryResult<PropertyTypeShare>,
    pub price_correlations: QueryResult<PriceCorrelations>,
    pub top_10_expensive: QueryResult<TopListing>,
    pub bedroom_distribution: QueryResult<BedroomBucket>,
    pub price_brackets: QueryResult<PriceBracketShare>,
}

impl ReportResults {
    /// Names of the queries that failed
    pub fn failed(&self) -> Vec<&'static str> {
        let errors = [
            self.summary_stats.error().is_some(),
            self.monthly_trends.error().is_some(),
            self.location_analysis.error().is_some(),
            self.property_type_distribution.error().is_some(),
            self.price_correlations.error().is_some(),
            self.top_10_expensive.error().is_some(),
            self.bedroom_distribution.error().is_some(),
            self.price_brackets.error().is_some(),
        ];
        QUERY_NAMES
            .iter()
            .zip(errors)
            .filter(|(_, failed)| *failed)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Run every query concurrently; never fails as a whole
pub async fn run_queries<Q: ReportQueries>(queries: &Q) -> ReportResults {
    let (
        summary_stats,
        monthly_trends,
        location_analysis,
        property_type_distribution,
        price_correlations,
        top_10_expensive,
        bedroom_distribution,
        price_brackets,
    ) = tokio::join!(
        execute("summary_stats", queries.summary_stats()),
        execute("monthly_trends", queries.monthly_trends()),
        execute("location_analysis", queries.location_analysis()),
        execute(
            "property_type_distribution",
            queries.property_type_distribution()
        ),
        execute("price_correlations", queries.price_correlations()),
        execute("top_10_expensive", queries.top_10_expensive()),
        execute("bedroom_distribution", queries.bedroom_distribution()),
        execute("price_brackets", queries.price_brackets()),
    );

    ReportResults {
        summary_stats,
        monthly_trends,
        location_analysis,
        property_type_distribution,
        price_correlations,
        top_10_expensive,
        bedroom_distribution,
        price_brackets,
    }
}

async fn execute<T>(
    name: &'static str,
    query: impl Future<Output = Result<Vec<T>, WarehouseError>>,
) -> QueryResult<T> {
    info!("Executing: {}", name);
    match query.await {
        Ok(rows) => {
            info!("{}: {} rows", name, rows.len());
            QueryResult::Rows(rows)
        }
        Err(e) => {
            error!("Error in {}: {}", name, e);
            QueryResult::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Round half away from zero, matching SQL `ROUND`
pub fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bracket_edges() {
        assert_eq!(PriceBracket::from_price(499_999.0), PriceBracket::Budget);
        assert_eq!(PriceBracket::from_price(500_000.0), PriceBracket::MidRange);
        assert_eq!(PriceBracket::from_price(1_000_000.0), PriceBracket::Premium);
        assert_eq!(PriceBracket::from_price(2_000_000.0), PriceBracket::Luxury);
        assert_eq!(PriceBracket::from_price(5_000_000.0), PriceBracket::UltraLuxury);
    }

    #[test]
    fn test_price_bracket_rank_order() {
        let mut brackets = vec![
            PriceBracket::UltraLuxury,
            PriceBracket::Budget,
            PriceBracket::Luxury,
            PriceBracket::MidRange,
            PriceBracket::Premium,
        ];
        brackets.sort_by_key(|b| b.rank());

        let labels: Vec<&str> = brackets.iter().map(|b| b.label()).collect();
        assert_eq!(
            labels,
            vec![
                "Budget (<500K)",
                "Mid-Range (500K-1M)",
                "Premium (1M-2M)",
                "Luxury (2M-5M)",
                "Ultra-Luxury (5M+)",
            ]
        );
    }

    #[test]
    fn test_query_result_serialization() {
        let ok: QueryResult<BedroomBucket> = QueryResult::Rows(vec![BedroomBucket {
            bedrooms: 2,
            listing_count: 4,
            avg_price: 900_000.0,
            avg_sqft: 1_100.0,
        }]);
        let failed: QueryResult<BedroomBucket> = QueryResult::Failed {
            error: "boom".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!([{
                "bedrooms": 2,
                "listing_count": 4,
                "avg_price": 900000.0,
                "avg_sqft": 1100.0
            }])
        );
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({ "error": "boom" })
        );
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.345, 1), 2.3);
        assert_eq!(round_to(1234.5, 0), 1235.0);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }
}
