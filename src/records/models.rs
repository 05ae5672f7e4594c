use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// Search provenance attached to every persisted record
#[derive(Debug, Clone, Serialize)]
pub struct SearchContext {
    pub destination_key: String,
    pub destination_group: String,
    pub destination_name: String,
    pub location_id: String,
    pub location_label: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub rooms: u32,
    pub total_adults: u32,
    pub total_children: u32,
    pub request_id: Option<String>,
}

/// Property-level fields extracted from the backend summary
#[derive(Debug, Clone, Serialize, Default)]
pub struct HotelSummary {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub brand_name: Option<String>,
    pub chain_name: Option<String>,
    pub star_rating: Option<f64>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_postal_code: Option<String>,
    pub address_country_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_miles: Option<f64>,
    pub distance_unit: Option<String>,
    pub loyalty_valid: bool,
    pub user_rating: Option<f64>,
    pub user_rating_count: Option<i64>,
    pub hero_image: Option<String>,
    pub location_teaser: Option<String>,
    pub renovation_closure_notice: Option<String>,
    pub check_in_start: Option<String>,
    pub check_in_end: Option<String>,
    pub check_out_time: Option<String>,
    pub amenities: Vec<String>,
    pub program_codes: Vec<String>,
}

/// One hotel as persisted per run
#[derive(Debug, Clone)]
pub struct HotelRecord {
    pub property_id: String,
    pub supplier_id: Option<String>,
    pub summary: HotelSummary,
    pub search: SearchContext,
    pub raw: Value,
}

/// Pricing block of one rate offer
#[derive(Debug, Clone, Serialize, Default)]
pub struct RatePricing {
    pub currency: Option<String>,
    pub base: Option<f64>,
    pub total: Option<f64>,
    pub total_inclusive: Option<f64>,
    pub total_fees: Option<f64>,
    pub total_taxes: Option<f64>,
    pub average_nightly_rate: Option<f64>,
    pub payment_model: Option<String>,
    pub nightly_actual_rates: Vec<f64>,
    pub nightly_inclusive_rates: Vec<f64>,
    /// Raw fee components, persisted individually by the store
    pub fees: Vec<Value>,
    /// Raw tax components, persisted individually by the store
    pub taxes: Vec<Value>,
}

/// One rate offer (property x room type x rate plan) as persisted per run
#[derive(Debug, Clone)]
pub struct RateRecord {
    pub property_id: String,
    pub room_type_id: Option<String>,
    pub room_type_name: Option<String>,
    pub rate_id: Option<String>,
    pub hotel_collection: Option<String>,
    pub available: Option<i64>,
    pub is_breakfast_included: bool,
    pub is_free_cancellation: bool,
    pub is_parking_included: bool,
    pub occupancy_adults: u32,
    pub occupancy_children: u32,
    pub room_count: u32,
    pub pricing: RatePricing,
    pub amenities: Vec<String>,
    pub bed_groups: Value,
    pub room_allocations: Option<Value>,
    pub special_offer: Option<Value>,
    pub search: SearchContext,
}
