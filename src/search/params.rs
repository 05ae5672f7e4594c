use chrono::NaiveDate;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Occupancy request for one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRequest {
    pub adults: u32,
    /// Ages of accompanying children
    pub children: Vec<u8>,
}

impl RoomRequest {
    pub fn adults(adults: u32) -> Self {
        Self {
            adults,
            children: Vec::new(),
        }
    }
}

/// Immutable parameters for one property search
///
/// One value is built per SearchUnit and passed explicitly through the call
/// chain; nothing here is shared or mutated between units.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub location_id: String,
    pub location_label: String,
    pub latitude: f64,
    pub longitude: f64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: Vec<RoomRequest>,
    pub page: u32,
    pub page_size: u32,
    pub sort_option: String,
    pub sort_direction: String,
    pub program_filter: Vec<String>,
}

impl SearchParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        location_id: impl Into<String>,
        location_label: impl Into<String>,
        latitude: f64,
        longitude: f64,
        check_in: NaiveDate,
        check_out: NaiveDate,
        rooms: Vec<RoomRequest>,
    ) -> Self {
        Self {
            location_id: location_id.into(),
            location_label: location_label.into(),
            latitude,
            longitude,
            check_in,
            check_out,
            rooms,
            page: 1,
            page_size: 50,
            sort_option: "RECOMMENDED".to_string(),
            sort_direction: "DESC".to_string(),
            program_filter: Vec::new(),
        }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn total_adults(&self) -> u32 {
        self.rooms.iter().map(|room| room.adults).sum()
    }

    pub fn total_children(&self) -> u32 {
        self.rooms.iter().map(|room| room.children.len() as u32).sum()
    }

    /// Returns a copy targeting a different result page
    pub fn with_page(&self, page: u32) -> Self {
        let mut params = self.clone();
        params.page = page;
        params
    }

    /// Renders the JSON body of the properties request
    pub fn to_payload(&self) -> Value {
        let rooms: Vec<Value> = self
            .rooms
            .iter()
            .map(|room| {
                if room.children.is_empty() {
                    json!({ "adults": room.adults })
                } else {
                    json!({ "adults": room.adults, "children": room.children })
                }
            })
            .collect();

        let mut payload = json!({
            "pagination": { "page": self.page, "pageSize": self.page_size },
            "sortOptions": [{ "direction": self.sort_direction, "option": self.sort_option }],
            "checkIn": self.check_in.format("%Y-%m-%d").to_string(),
            "checkOut": self.check_out.format("%Y-%m-%d").to_string(),
            "location": self.location_id,
            "locationType": "LOCATION_ID",
            "rooms": rooms,
        });

        if !self.program_filter.is_empty() {
            payload["filters"] = json!({ "clientProgramFilter": self.program_filter });
        }

        payload
    }

    /// Deterministic hash identifying "the same logical search" across
    /// repeated attempts
    ///
    /// Covers destination key, label, dates, room and adult counts, and the
    /// sorted program filter; page and sort order deliberately excluded.
    pub fn signature(&self, destination_key: &str, label: Option<&str>) -> String {
        let mut programs: Vec<&str> = self.program_filter.iter().map(String::as_str).collect();
        programs.sort_unstable();

        let payload = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            destination_key,
            label.unwrap_or(""),
            self.check_in.format("%Y-%m-%d"),
            self.check_out.format("%Y-%m-%d"),
            self.rooms.len(),
            self.total_adults(),
            programs.join(",")
        );

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params() -> SearchParams {
        SearchParams::new(
            "ZMETRO-1001",
            "Tokyo (and vicinity), Japan",
            35.6762,
            139.6503,
            day(2026, 1, 15),
            day(2026, 1, 18),
            vec![RoomRequest::adults(2)],
        )
    }

    #[test]
    fn test_payload_shape() {
        let mut p = params();
        p.program_filter = vec!["FHR".to_string()];
        let payload = p.to_payload();

        assert_eq!(payload["location"], "ZMETRO-1001");
        assert_eq!(payload["locationType"], "LOCATION_ID");
        assert_eq!(payload["checkIn"], "2026-01-15");
        assert_eq!(payload["checkOut"], "2026-01-18");
        assert_eq!(payload["pagination"]["page"], 1);
        assert_eq!(payload["rooms"][0]["adults"], 2);
        assert!(payload["rooms"][0].get("children").is_none());
        assert_eq!(payload["filters"]["clientProgramFilter"][0], "FHR");
    }

    #[test]
    fn test_payload_omits_filters_when_empty() {
        let payload = params().to_payload();
        assert!(payload.get("filters").is_none());
    }

    #[test]
    fn test_children_included_when_present() {
        let mut p = params();
        p.rooms = vec![RoomRequest {
            adults: 2,
            children: vec![4, 9],
        }];
        let payload = p.to_payload();
        assert_eq!(payload["rooms"][0]["children"][1], 9);
    }

    #[test]
    fn test_signature_stable_across_page_and_sort() {
        let p = params();
        let base = p.signature("tokyo", Some("2026-01-15"));

        let mut paged = p.with_page(4);
        paged.sort_option = "PRICE".to_string();
        assert_eq!(base, paged.signature("tokyo", Some("2026-01-15")));
    }

    #[test]
    fn test_signature_sorts_program_filter() {
        let mut a = params();
        a.program_filter = vec!["THC".to_string(), "FHR".to_string()];
        let mut b = params();
        b.program_filter = vec!["FHR".to_string(), "THC".to_string()];

        assert_eq!(a.signature("tokyo", None), b.signature("tokyo", None));
    }

    #[test]
    fn test_signature_differs_by_label_and_dates() {
        let p = params();
        let a = p.signature("tokyo", Some("a"));
        let b = p.signature("tokyo", Some("b"));
        assert_ne!(a, b);

        let mut later = p.clone();
        later.check_in = day(2026, 2, 1);
        assert_ne!(
            p.signature("tokyo", None),
            later.signature("tokyo", None)
        );
    }

    #[test]
    fn test_nights_and_occupancy() {
        let p = params();
        assert_eq!(p.nights(), 3);
        assert_eq!(p.total_adults(), 2);
        assert_eq!(p.total_children(), 0);
    }
}
