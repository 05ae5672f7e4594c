use crate::catalog::Destination;
use crate::records::models::{HotelRecord, HotelSummary, RatePricing, RateRecord, SearchContext};
use crate::search::SearchParams;
use serde_json::Value;

/// Transforms a raw properties payload into persistable hotel and rate
/// records. Entries without a property id are skipped.
pub fn build_hotel_and_rate_records(
    payload: &Value,
    destination: &Destination,
    params: &SearchParams,
) -> (Vec<HotelRecord>, Vec<RateRecord>) {
    let request_id = payload
        .get("context")
        .and_then(|ctx| ctx.get("requestId"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let search = build_search_context(destination, params, request_id);

    let hotels_raw = payload
        .get("hotels")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut hotels = Vec::new();
    let mut rates = Vec::new();
    for hotel in hotels_raw {
        let Some(property_id) = property_id_of(&hotel) else {
            continue;
        };
        hotels.push(build_hotel_record(&hotel, &property_id, &search));
        rates.extend(build_rate_records(&hotel, &property_id, &search));
    }
    (hotels, rates)
}

fn build_search_context(
    destination: &Destination,
    params: &SearchParams,
    request_id: Option<String>,
) -> SearchContext {
    SearchContext {
        destination_key: destination.key.clone(),
        destination_group: destination.group.clone(),
        destination_name: destination.name.clone(),
        location_id: params.location_id.clone(),
        location_label: params.location_label.clone(),
        check_in: params.check_in,
        check_out: params.check_out,
        nights: params.nights(),
        rooms: params.rooms.len() as u32,
        total_adults: params.total_adults(),
        total_children: params.total_children(),
        request_id,
    }
}

fn build_hotel_record(hotel: &Value, property_id: &str, search: &SearchContext) -> HotelRecord {
    let address = hotel.get("address");
    let geo = hotel.get("geoLocation");
    let distance = hotel.get("distance");
    let user_rating = hotel.get("userRating");
    let check_in_policy = hotel.get("checkInPolicy");

    let summary = HotelSummary {
        name: str_of(hotel, "name"),
        kind: str_of(hotel, "type"),
        brand_name: str_of(hotel, "brandName"),
        chain_name: str_of(hotel, "chainName"),
        star_rating: f64_of(hotel, "starRating"),
        phone: str_of(hotel, "phone"),
        address_line1: address.and_then(|a| str_of(a, "line1")),
        address_city: address.and_then(|a| str_of(a, "city")),
        address_state: address.and_then(|a| str_of(a, "state")),
        address_postal_code: address.and_then(|a| str_of(a, "postalCode")),
        address_country_code: address.and_then(|a| str_of(a, "countryCode")),
        latitude: geo.and_then(|g| f64_of(g, "latitude")),
        longitude: geo.and_then(|g| f64_of(g, "longitude")),
        distance_miles: distance.and_then(|d| f64_of(d, "value")),
        distance_unit: distance.and_then(|d| str_of(d, "unit")),
        loyalty_valid: hotel
            .get("loyaltyValid")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        user_rating: user_rating.and_then(|r| f64_of(r, "score")),
        user_rating_count: user_rating.and_then(|r| r.get("count")).and_then(Value::as_i64),
        hero_image: select_hero_image(hotel.get("images")),
        location_teaser: str_of(hotel, "locationTeaser"),
        renovation_closure_notice: normalize_notice(hotel.get("renovationNotice")),
        check_in_start: check_in_policy.and_then(|p| str_of(p, "start")),
        check_in_end: check_in_policy.and_then(|p| str_of(p, "end")),
        check_out_time: check_in_policy.and_then(|p| str_of(p, "checkOutTime")),
        amenities: string_list(hotel.get("amenities")),
        program_codes: string_list(hotel.get("programCodes")),
    };

    HotelRecord {
        property_id: property_id.to_string(),
        supplier_id: str_of(hotel, "supplierId"),
        summary,
        search: search.clone(),
        raw: hotel.clone(),
    }
}

fn build_rate_records(hotel: &Value, property_id: &str, search: &SearchContext) -> Vec<RateRecord> {
    let mut records = Vec::new();
    let room_types = hotel
        .get("roomTypes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for room_type in room_types {
        let room_type_id = str_of(&room_type, "id");
        let room_type_name = str_of(&room_type, "name");
        let amenities = string_list(room_type.get("amenities"));
        let bed_groups = room_type
            .get("bedGroups")
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        let rates = room_type
            .get("rates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for rate in rates {
            let occupancy = rate.get("occupancy");
            records.push(RateRecord {
                property_id: property_id.to_string(),
                room_type_id: room_type_id.clone(),
                room_type_name: room_type_name.clone(),
                rate_id: str_of(&rate, "id"),
                hotel_collection: str_of(&rate, "hotelCollection"),
                available: rate.get("available").and_then(Value::as_i64),
                is_breakfast_included: bool_of(&rate, "breakfastIncluded"),
                is_free_cancellation: bool_of(&rate, "freeCancellation"),
                is_parking_included: bool_of(&rate, "parkingIncluded"),
                occupancy_adults: occupancy
                    .and_then(|o| o.get("adults"))
                    .and_then(Value::as_u64)
                    .unwrap_or(search.total_adults as u64) as u32,
                occupancy_children: occupancy
                    .and_then(|o| o.get("children"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                room_count: rate
                    .get("roomCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(search.rooms as u64) as u32,
                pricing: build_pricing(rate.get("pricing")),
                amenities: amenities.clone(),
                bed_groups: bed_groups.clone(),
                room_allocations: rate.get("roomAllocations").cloned(),
                special_offer: rate.get("specialOffer").filter(|v| v.is_object()).cloned(),
                search: search.clone(),
            });
        }
    }
    records
}

fn build_pricing(pricing: Option<&Value>) -> RatePricing {
    let Some(pricing) = pricing else {
        return RatePricing::default();
    };
    RatePricing {
        currency: str_of(pricing, "currency"),
        base: f64_of(pricing, "base"),
        total: f64_of(pricing, "total"),
        total_inclusive: f64_of(pricing, "totalInclusive"),
        total_fees: f64_of(pricing, "totalFees"),
        total_taxes: f64_of(pricing, "totalTaxes"),
        average_nightly_rate: f64_of(pricing, "averageNightlyRate"),
        payment_model: str_of(pricing, "paymentModel"),
        nightly_actual_rates: f64_list(pricing.get("nightlyActualRates")),
        nightly_inclusive_rates: f64_list(pricing.get("nightlyInclusiveRates")),
        fees: value_list(pricing.get("fees")),
        taxes: value_list(pricing.get("taxes")),
    }
}

fn property_id_of(hotel: &Value) -> Option<String> {
    str_of(hotel, "id")
        .or_else(|| str_of(hotel, "propertyId"))
        .filter(|id| !id.is_empty())
}

/// Picks the explicit hero image, falling back to the first image with a
/// large rendition
fn select_hero_image(images: Option<&Value>) -> Option<String> {
    let images = images?.as_array()?;
    let mut first: Option<String> = None;
    for image in images {
        let Some(large) = str_of(image, "large") else {
            continue;
        };
        if image.get("isHero").and_then(Value::as_bool).unwrap_or(false) {
            return Some(large);
        }
        if first.is_none() {
            first = Some(large);
        }
    }
    first
}

/// Notices arrive as a string or a list of fragments; fragments are joined
/// line-by-line and blank results dropped
fn normalize_notice(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        _ => None,
    }
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn f64_of(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn bool_of(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn f64_list(value: Option<&Value>) -> Vec<f64> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn value_list(value: Option<&Value>) -> Vec<Value> {
    value.and_then(Value::as_array).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::RoomRequest;
    use chrono::NaiveDate;
    use serde_json::json;

    fn destination() -> Destination {
        Destination {
            key: "tokyo".to_string(),
            group: "Asia".to_string(),
            name: "Tokyo (and vicinity), Japan".to_string(),
            location_id: Some("ZMETRO-1001".to_string()),
            latitude: Some(35.6762),
            longitude: Some(139.6503),
        }
    }

    fn params() -> SearchParams {
        SearchParams::new(
            "ZMETRO-1001",
            "Tokyo (and vicinity), Japan",
            35.6762,
            139.6503,
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 18).unwrap(),
            vec![RoomRequest::adults(2)],
        )
    }

    fn sample_payload() -> Value {
        json!({
            "context": { "requestId": "req-123", "pagination": { "hasNext": false } },
            "hotels": [
                {
                    "id": "hotel-1",
                    "supplierId": "supplier-1",
                    "name": "Hotel Test",
                    "type": "Hotel",
                    "brandName": "Testmark",
                    "starRating": 4.5,
                    "address": { "line1": "1 Test St", "city": "Tokyo", "countryCode": "JP" },
                    "geoLocation": { "latitude": 35.68, "longitude": 139.65 },
                    "distance": { "value": 1.2, "unit": "MILES" },
                    "loyaltyValid": true,
                    "userRating": { "score": 9.1, "count": 412 },
                    "images": [
                        { "large": "https://img.example/a.jpg", "isHero": false },
                        { "large": "https://img.example/b.jpg", "isHero": true }
                    ],
                    "renovationNotice": ["Lobby closed", "", "Pool open"],
                    "amenities": ["Free WiFi", "Spa"],
                    "programCodes": ["FHR"],
                    "roomTypes": [
                        {
                            "id": "room-1",
                            "name": "Suite",
                            "amenities": ["WiFi"],
                            "bedGroups": [{ "description": "1 King Bed" }],
                            "rates": [
                                {
                                    "id": "rate-1",
                                    "hotelCollection": "FHR",
                                    "available": 3,
                                    "breakfastIncluded": true,
                                    "freeCancellation": true,
                                    "occupancy": { "adults": 2, "children": 0 },
                                    "roomCount": 1,
                                    "pricing": {
                                        "currency": "USD",
                                        "base": 300.0,
                                        "total": 360.0,
                                        "totalInclusive": 360.0,
                                        "totalFees": 30.0,
                                        "totalTaxes": 30.0,
                                        "averageNightlyRate": 100.0,
                                        "paymentModel": "PAY_NOW",
                                        "nightlyActualRates": [100.0, 100.0, 100.0],
                                        "nightlyInclusiveRates": [120.0, 120.0, 120.0],
                                        "fees": [{ "type": "PROPERTY_FEE", "value": 30.0, "currency": "USD", "isIncluded": true }],
                                        "taxes": []
                                    },
                                    "specialOffer": { "promotionCode": "FHR123", "type": "SPECIAL_OFFER" }
                                },
                                {
                                    "hotelCollection": "FHR",
                                    "pricing": { "currency": "USD", "total": 400.0 }
                                }
                            ]
                        }
                    ]
                },
                { "name": "No id, skipped" }
            ]
        })
    }

    #[test]
    fn test_hotels_extracted_and_idless_skipped() {
        let (hotels, rates) =
            build_hotel_and_rate_records(&sample_payload(), &destination(), &params());

        assert_eq!(hotels.len(), 1);
        assert_eq!(rates.len(), 2);

        let hotel = &hotels[0];
        assert_eq!(hotel.property_id, "hotel-1");
        assert_eq!(hotel.summary.name.as_deref(), Some("Hotel Test"));
        assert_eq!(hotel.summary.star_rating, Some(4.5));
        assert_eq!(hotel.summary.address_city.as_deref(), Some("Tokyo"));
        assert!(hotel.summary.loyalty_valid);
        assert_eq!(hotel.summary.user_rating_count, Some(412));
        assert_eq!(hotel.search.request_id.as_deref(), Some("req-123"));
        assert_eq!(hotel.search.nights, 3);
    }

    #[test]
    fn test_hero_image_prefers_is_hero() {
        let (hotels, _) =
            build_hotel_and_rate_records(&sample_payload(), &destination(), &params());
        assert_eq!(
            hotels[0].summary.hero_image.as_deref(),
            Some("https://img.example/b.jpg")
        );
    }

    #[test]
    fn test_notice_fragments_joined() {
        let (hotels, _) =
            build_hotel_and_rate_records(&sample_payload(), &destination(), &params());
        assert_eq!(
            hotels[0].summary.renovation_closure_notice.as_deref(),
            Some("Lobby closed\nPool open")
        );
    }

    #[test]
    fn test_rate_fields_and_defaults() {
        let (_, rates) =
            build_hotel_and_rate_records(&sample_payload(), &destination(), &params());

        let full = &rates[0];
        assert_eq!(full.rate_id.as_deref(), Some("rate-1"));
        assert_eq!(full.room_type_id.as_deref(), Some("room-1"));
        assert!(full.is_breakfast_included);
        assert_eq!(full.pricing.nightly_actual_rates.len(), 3);
        assert_eq!(full.pricing.fees.len(), 1);
        assert!(full.special_offer.is_some());

        // Missing occupancy falls back to the searched occupancy.
        let sparse = &rates[1];
        assert!(sparse.rate_id.is_none());
        assert_eq!(sparse.occupancy_adults, 2);
        assert_eq!(sparse.room_count, 1);
        assert_eq!(sparse.pricing.total, Some(400.0));
    }

    #[test]
    fn test_empty_payload() {
        let (hotels, rates) =
            build_hotel_and_rate_records(&json!({}), &destination(), &params());
        assert!(hotels.is_empty());
        assert!(rates.is_empty());
    }
}
