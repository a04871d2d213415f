//! Listing ingestion - functional pipeline from uploaded CSV to star schema

pub mod batch;
pub mod dimensions;
pub mod facts;
pub mod fetch;
pub mod normalize;
pub mod parse;
pub mod types;
pub mod utils;

pub use types::*;
