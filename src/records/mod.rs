//! Normalized hotel and rate records
//!
//! A pure transform from the raw backend payload to the typed records the
//! store persists. No I/O happens here.

mod models;
mod normalizer;

pub use models::{HotelRecord, HotelSummary, RatePricing, RateRecord, SearchContext};
pub use normalizer::build_hotel_and_rate_records;
