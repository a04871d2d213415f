// Library module for the listing warehouse pipeline

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod storage;
pub mod warehouse;

use ingestion::utils::round_half_even;

/// Calculate price per square foot
/// Formula: price / sqft, rounded half-to-even at 2 decimals
pub fn calculate_price_per_sqft(price: f64, sqft: f64) -> Option<f64> {
    if sqft <= 0.0 || !price.is_finite() || !sqft.is_finite() {
        return None;
    }
    Some(round_half_even(price / sqft, 2))
}
