use crate::catalog::Destination;
use crate::records::{HotelRecord, RateRecord};
use crate::search::SearchParams;
use crate::store::schema::apply_migrations;
use crate::store::{DurabilityOptions, RunStatus, SearchRunRecord, StorageResult};
use chrono::{Duration, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

/// Upper bound on SQL parameters per query, kept under SQLite's default
/// host-parameter ceiling
const SQLITE_PARAMETER_LIMIT: usize = 900;

const FAILURE_REASON_LIMIT: usize = 512;
const SUPERSEDED_REASON: &str = "Superseded by new run";

const RUN_COLUMNS: &str = "id, destination_key, destination_name, destination_group, label, \
     status, started_at, updated_at, completed_at, failure_reason, total_hotels, total_rates, \
     search_signature";

fn utc_now() -> String {
    Utc::now().to_rfc3339()
}

fn truncate_reason(reason: &str) -> &str {
    match reason.char_indices().nth(FAILURE_REASON_LIMIT) {
        Some((idx, _)) => &reason[..idx],
        None => reason,
    }
}

fn short_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// SQLite-backed run store
///
/// One logical writer at a time: every operation takes the connection lock
/// for its whole transaction.
pub struct RunStore {
    conn: Mutex<Connection>,
}

impl RunStore {
    /// Opens (or creates) the database, applies the durability pragmas and
    /// any outstanding schema migrations
    pub fn open(path: &Path, durability: &DurabilityOptions) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(conn, durability)
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, &DurabilityOptions::default())
    }

    fn configure(conn: Connection, durability: &DurabilityOptions) -> StorageResult<Self> {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};
             PRAGMA journal_mode = {};
             PRAGMA synchronous = {};",
            durability.busy_timeout_ms,
            durability.journal_mode.as_sql(),
            durability.synchronous.as_sql(),
        ))?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ===== Run orchestration =====

    /// Records a new destination/date attempt and returns its identifier
    ///
    /// Upserts the destination snapshot, demotes any stale running row
    /// sharing the signature to failed ("superseded"), then inserts the
    /// fresh running row. Safe to call after a crashed prior attempt: no
    /// orphaned running row ever blocks a retry.
    pub fn begin_run(
        &self,
        destination: &Destination,
        params: &SearchParams,
        label: Option<&str>,
    ) -> StorageResult<i64> {
        let signature = params.signature(&destination.key, label);
        let programs = serde_json::to_string(&sorted_programs(params))?;
        let now = utc_now();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO destinations(key, group_name, name, location_id, latitude, longitude, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(key) DO UPDATE SET
                 group_name=excluded.group_name,
                 name=excluded.name,
                 location_id=excluded.location_id,
                 latitude=excluded.latitude,
                 longitude=excluded.longitude,
                 updated_at=excluded.updated_at",
            params![
                destination.key,
                destination.group,
                destination.name,
                destination.location_id,
                destination.latitude,
                destination.longitude,
                now,
            ],
        )?;

        tx.execute(
            "UPDATE search_runs
             SET status='failed', failure_reason=?1, updated_at=?2
             WHERE search_signature=?3 AND status='running'",
            params![SUPERSEDED_REASON, now, signature],
        )?;

        tx.execute(
            "INSERT INTO search_runs(
                destination_key, destination_group, destination_name, label,
                check_in, check_out, nights, adults, children, rooms,
                program_filter, status, started_at, created_at, updated_at,
                search_signature
             ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'running', ?12, ?12, ?12, ?13)",
            params![
                destination.key,
                destination.group,
                destination.name,
                label,
                params.check_in.format("%Y-%m-%d").to_string(),
                params.check_out.format("%Y-%m-%d").to_string(),
                params.nights(),
                params.total_adults(),
                params.total_children(),
                params.rooms.len() as i64,
                programs,
                now,
                signature,
            ],
        )?;
        let run_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(run_id)
    }

    /// Transitions a run to complete with its aggregate counts
    ///
    /// Only rows still in `running` transition; a run demoted by a newer
    /// attempt stays failed.
    pub fn finalize_run(
        &self,
        run_id: i64,
        total_hotels: u32,
        total_rates: u32,
        request_id: Option<&str>,
        context: Option<&Value>,
    ) -> StorageResult<()> {
        let context_json = context.map(serde_json::to_string).transpose()?;
        let now = utc_now();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE search_runs
             SET status='complete', completed_at=?1, updated_at=?1,
                 total_hotels=?2, total_rates=?3, request_id=?4, raw_context=?5
             WHERE id=?6 AND status='running'",
            params![now, total_hotels, total_rates, request_id, context_json, run_id],
        )?;
        Ok(())
    }

    /// Transitions a run to failed with a truncated reason string
    ///
    /// A no-op for rows already terminal; never throws for that case.
    pub fn mark_run_failed(&self, run_id: i64, reason: &str) -> StorageResult<()> {
        let now = utc_now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE search_runs
             SET status='failed', completed_at=?1, updated_at=?1, failure_reason=?2
             WHERE id=?3 AND status='running'",
            params![now, truncate_reason(reason), run_id],
        )?;
        Ok(())
    }

    /// Stamps the backend request id and raw context onto a run
    pub fn store_run_payload(
        &self,
        run_id: i64,
        request_id: Option<&str>,
        context: Option<&Value>,
    ) -> StorageResult<()> {
        let context_json = context.map(serde_json::to_string).transpose()?;
        let now = utc_now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE search_runs SET request_id=?1, raw_context=?2, updated_at=?3 WHERE id=?4",
            params![request_id, context_json, now, run_id],
        )?;
        Ok(())
    }

    /// Returns the most-recently-started attempt for a signature
    pub fn fetch_latest_run(
        &self,
        destination: &Destination,
        params: &SearchParams,
        label: Option<&str>,
    ) -> StorageResult<Option<SearchRunRecord>> {
        let signature = params.signature(&destination.key, label);
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM search_runs
                     WHERE search_signature=?1
                     ORDER BY id DESC LIMIT 1"
                ),
                params![signature],
                row_to_run,
            )
            .optional()?;
        Ok(record)
    }

    /// Fetches the latest run record for many destinations at once
    ///
    /// Signatures are deduplicated before querying and the IN lists are
    /// chunked under the parameter ceiling; the result maps destination
    /// key to its most-recently-started attempt.
    pub fn fetch_latest_runs_bulk(
        &self,
        pairs: &[(&Destination, &SearchParams)],
        label: Option<&str>,
    ) -> StorageResult<HashMap<String, SearchRunRecord>> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }

        let mut signature_to_key: HashMap<String, String> = HashMap::new();
        let mut ordered_unique: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (destination, params) in pairs {
            let signature = params.signature(&destination.key, label);
            signature_to_key
                .entry(signature.clone())
                .or_insert_with(|| destination.key.clone());
            if seen.insert(signature.clone()) {
                ordered_unique.push(signature);
            }
        }

        let conn = self.conn.lock().unwrap();
        let mut records: HashMap<String, SearchRunRecord> = HashMap::new();
        for chunk in ordered_unique.chunks(SQLITE_PARAMETER_LIMIT) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {RUN_COLUMNS} FROM search_runs sr
                 WHERE sr.id IN (
                     SELECT MAX(id) FROM search_runs
                     WHERE search_signature IN ({placeholders})
                     GROUP BY search_signature
                 )"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), row_to_run)?;
            for row in rows {
                let record = row?;
                if let Some(key) = signature_to_key.get(&record.search_signature) {
                    records.entry(key.clone()).or_insert(record);
                }
            }
        }
        Ok(records)
    }

    // ===== Hotel persistence =====

    /// Upserts hotel snapshots by property id
    pub fn save_hotels(&self, _run_id: i64, records: &[HotelRecord]) -> StorageResult<()> {
        let now = utc_now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for record in records {
            if record.property_id.is_empty() {
                continue;
            }
            let summary = &record.summary;
            tx.execute(
                "INSERT INTO hotels(
                    property_id, supplier_id, name, type, brand_name, chain_name,
                    star_rating, phone, address_line1, address_city, address_state,
                    address_postal_code, address_country_code, latitude, longitude,
                    distance_miles, distance_unit, loyalty_valid, user_rating,
                    user_rating_count, hero_image, location_teaser,
                    renovation_closure_notice, check_in_start, check_in_end,
                    check_out_time, summary_json, search_context_json, raw_json,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                           ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                           ?30, ?30)
                 ON CONFLICT(property_id) DO UPDATE SET
                    supplier_id=excluded.supplier_id,
                    name=excluded.name,
                    type=excluded.type,
                    brand_name=excluded.brand_name,
                    chain_name=excluded.chain_name,
                    star_rating=excluded.star_rating,
                    phone=excluded.phone,
                    address_line1=excluded.address_line1,
                    address_city=excluded.address_city,
                    address_state=excluded.address_state,
                    address_postal_code=excluded.address_postal_code,
                    address_country_code=excluded.address_country_code,
                    latitude=excluded.latitude,
                    longitude=excluded.longitude,
                    distance_miles=excluded.distance_miles,
                    distance_unit=excluded.distance_unit,
                    loyalty_valid=excluded.loyalty_valid,
                    user_rating=excluded.user_rating,
                    user_rating_count=excluded.user_rating_count,
                    hero_image=excluded.hero_image,
                    location_teaser=excluded.location_teaser,
                    renovation_closure_notice=excluded.renovation_closure_notice,
                    check_in_start=excluded.check_in_start,
                    check_in_end=excluded.check_in_end,
                    check_out_time=excluded.check_out_time,
                    summary_json=excluded.summary_json,
                    search_context_json=excluded.search_context_json,
                    raw_json=excluded.raw_json,
                    updated_at=excluded.updated_at",
                params![
                    record.property_id,
                    record.supplier_id,
                    summary.name,
                    summary.kind,
                    summary.brand_name,
                    summary.chain_name,
                    summary.star_rating,
                    summary.phone,
                    summary.address_line1,
                    summary.address_city,
                    summary.address_state,
                    summary.address_postal_code,
                    summary.address_country_code,
                    summary.latitude,
                    summary.longitude,
                    summary.distance_miles,
                    summary.distance_unit,
                    summary.loyalty_valid as i64,
                    summary.user_rating,
                    summary.user_rating_count,
                    summary.hero_image,
                    summary.location_teaser,
                    summary.renovation_closure_notice,
                    summary.check_in_start,
                    summary.check_in_end,
                    summary.check_out_time,
                    serde_json::to_string(summary)?,
                    serde_json::to_string(&record.search)?,
                    serde_json::to_string(&record.raw)?,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ===== Rate persistence =====

    /// Persists rate snapshots for a run
    ///
    /// Snapshots for the run are cleared first, so a retried run holds
    /// exactly the latest set rather than accumulating duplicates. Room
    /// types and promotions are upserted across runs.
    pub fn save_rates(&self, run_id: i64, records: &[RateRecord]) -> StorageResult<()> {
        let now = utc_now();

        let mut room_types: BTreeMap<(String, String), RoomTypeMeta> = BTreeMap::new();
        let mut promotions: BTreeMap<(String, String), PromotionRow> = BTreeMap::new();
        let mut seen_snapshots: HashSet<(String, String, String)> = HashSet::new();
        let mut entries: Vec<SnapshotEntry> = Vec::new();

        for record in records {
            if record.property_id.is_empty() {
                continue;
            }
            let room_type_id = resolve_room_type_id(record);
            let rate_id = resolve_rate_id(record, &room_type_id);

            let meta = room_types
                .entry((record.property_id.clone(), room_type_id.clone()))
                .or_insert_with(|| RoomTypeMeta {
                    name: record.room_type_name.clone(),
                    amenities: BTreeSet::new(),
                    bed_groups: record.bed_groups.clone(),
                });
            meta.amenities.extend(record.amenities.iter().cloned());
            if meta.bed_groups.as_array().map_or(true, |groups| groups.is_empty()) {
                meta.bed_groups = record.bed_groups.clone();
            }

            let snapshot_key = (
                record.property_id.clone(),
                room_type_id.clone(),
                rate_id.clone(),
            );
            if !seen_snapshots.insert(snapshot_key) {
                continue;
            }

            if let Some(offer) = &record.special_offer {
                if let Some(promotion) = extract_promotion(&record.property_id, offer) {
                    promotions
                        .entry((promotion.property_id.clone(), promotion.code.clone()))
                        .or_insert(promotion);
                }
            }

            entries.push(SnapshotEntry {
                room_type_id,
                rate_id,
                record: record.clone(),
            });
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for ((property_id, room_type_id), meta) in &room_types {
            tx.execute(
                "INSERT INTO room_types(
                    property_id, room_type_id, name, amenities_json, bed_groups_json,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(property_id, room_type_id) DO UPDATE SET
                    name=excluded.name,
                    amenities_json=excluded.amenities_json,
                    bed_groups_json=excluded.bed_groups_json,
                    updated_at=excluded.updated_at",
                params![
                    property_id,
                    room_type_id,
                    meta.name,
                    serde_json::to_string(&meta.amenities)?,
                    serde_json::to_string(&meta.bed_groups)?,
                    now,
                ],
            )?;
        }

        // Replace snapshots for this execution before inserting fresh rows.
        tx.execute(
            "DELETE FROM rate_snapshots WHERE run_id=?1",
            params![run_id],
        )?;

        for entry in &entries {
            let record = &entry.record;
            let pricing = &record.pricing;
            tx.execute(
                "INSERT INTO rate_snapshots(
                    run_id, property_id, room_type_id, rate_id, hotel_collection,
                    available, is_breakfast_included, is_free_cancellation,
                    is_parking_included, occupancy_adults, occupancy_children,
                    room_count, pricing_currency, pricing_base, pricing_total,
                    pricing_total_inclusive, pricing_total_fees, pricing_total_taxes,
                    average_nightly_rate, payment_model, room_allocations_json,
                    special_offer_json, search_context_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                           ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
                params![
                    run_id,
                    record.property_id,
                    entry.room_type_id,
                    entry.rate_id,
                    record.hotel_collection,
                    record.available,
                    record.is_breakfast_included as i64,
                    record.is_free_cancellation as i64,
                    record.is_parking_included as i64,
                    record.occupancy_adults,
                    record.occupancy_children,
                    record.room_count,
                    pricing.currency,
                    pricing.base,
                    pricing.total,
                    pricing.total_inclusive,
                    pricing.total_fees,
                    pricing.total_taxes,
                    pricing.average_nightly_rate,
                    pricing.payment_model,
                    record
                        .room_allocations
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    record
                        .special_offer
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    serde_json::to_string(&record.search)?,
                    now,
                ],
            )?;
            let snapshot_id = tx.last_insert_rowid();
            insert_nightly_prices(&tx, snapshot_id, record)?;
            insert_components(&tx, snapshot_id, "fee", &pricing.fees)?;
            insert_components(&tx, snapshot_id, "tax", &pricing.taxes)?;
        }

        for promotion in promotions.values() {
            upsert_promotion(&tx, promotion, &now)?;
        }

        tx.commit()?;
        Ok(())
    }

    // ===== Test support =====

    #[cfg(test)]
    pub(crate) fn count_runs_for_signature(&self, signature: &str) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM search_runs WHERE search_signature=?1",
            params![signature],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn count_rows(&self, sql: &str, run_id: i64) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(sql, params![run_id], |row| row.get(0)).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn run_status(&self, run_id: i64) -> Option<(String, Option<String>)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT status, failure_reason FROM search_runs WHERE id=?1",
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .unwrap_or(None)
    }
}

struct RoomTypeMeta {
    name: Option<String>,
    amenities: BTreeSet<String>,
    bed_groups: Value,
}

struct SnapshotEntry {
    room_type_id: String,
    rate_id: String,
    record: RateRecord,
}

struct PromotionRow {
    property_id: String,
    code: String,
    promotion_type: Option<String>,
    title: Option<String>,
    description: Option<String>,
    min_nights: Option<i64>,
    max_nights: Option<i64>,
    booking_start: Option<String>,
    booking_end: Option<String>,
    stay_start: Option<String>,
    stay_end: Option<String>,
    blackout_dates_json: Option<String>,
    card_types_json: Option<String>,
    raw_json: String,
}

fn sorted_programs(params: &SearchParams) -> Vec<String> {
    let mut programs = params.program_filter.clone();
    programs.sort_unstable();
    programs
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<SearchRunRecord> {
    let status_str: String = row.get(5)?;
    Ok(SearchRunRecord {
        id: row.get(0)?,
        destination_key: row.get(1)?,
        destination_name: row.get(2)?,
        destination_group: row.get(3)?,
        label: row.get(4)?,
        status: RunStatus::from_db_string(&status_str).unwrap_or(RunStatus::Failed),
        started_at: row.get(6)?,
        updated_at: row.get(7)?,
        completed_at: row.get(8)?,
        failure_reason: row.get(9)?,
        total_hotels: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        total_rates: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
        search_signature: row.get(12)?,
    })
}

/// Synthesizes a stable room-type id when the backend omits one
fn resolve_room_type_id(record: &RateRecord) -> String {
    if let Some(id) = record.room_type_id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    let payload = format!(
        "{}|{}|{}",
        record.property_id,
        record.room_type_name.as_deref().unwrap_or(""),
        serde_json::to_string(&record.bed_groups).unwrap_or_default(),
    );
    format!("anon_{}", short_hash(&payload))
}

/// Synthesizes a stable rate id when the backend omits one
fn resolve_rate_id(record: &RateRecord, room_type_id: &str) -> String {
    if let Some(id) = record.rate_id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    let payload = format!(
        "{}|{}|{}",
        record.property_id,
        room_type_id,
        serde_json::to_string(&record.pricing).unwrap_or_default(),
    );
    format!("rate_{}", short_hash(&payload))
}

fn insert_nightly_prices(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    record: &RateRecord,
) -> StorageResult<()> {
    let actual = &record.pricing.nightly_actual_rates;
    let inclusive = &record.pricing.nightly_inclusive_rates;
    let nights = actual.len().max(inclusive.len());
    for idx in 0..nights {
        let night_date = (record.search.check_in + Duration::days(idx as i64))
            .format("%Y-%m-%d")
            .to_string();
        tx.execute(
            "INSERT INTO rate_nightly_prices(
                rate_snapshot_id, night_index, night_date, actual_rate, inclusive_rate
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot_id,
                idx as i64,
                night_date,
                actual.get(idx),
                inclusive.get(idx),
            ],
        )?;
    }
    Ok(())
}

fn insert_components(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    kind: &str,
    components: &[Value],
) -> StorageResult<()> {
    for component in components {
        let label = component
            .get("description")
            .or_else(|| component.get("label"))
            .or_else(|| component.get("name"))
            .and_then(Value::as_str);
        let amount = component
            .get("value")
            .or_else(|| component.get("amount"))
            .and_then(Value::as_f64);
        let is_included = component
            .get("isIncluded")
            .or_else(|| component.get("is_included"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let pay_locally = component
            .get("payLocally")
            .or_else(|| component.get("pay_locally"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        tx.execute(
            "INSERT INTO rate_components(
                rate_snapshot_id, component_type, code, label, amount, currency,
                is_included, pay_locally, details_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot_id,
                kind,
                component.get("type").and_then(Value::as_str),
                label,
                amount,
                component.get("currency").and_then(Value::as_str),
                is_included as i64,
                pay_locally as i64,
                serde_json::to_string(component)?,
            ],
        )?;
    }
    Ok(())
}

/// Builds a promotion row from a special-offer payload, preferring the
/// English description entry
fn extract_promotion(property_id: &str, offer: &Value) -> Option<PromotionRow> {
    let code = offer
        .get("promotionCode")
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty())?;

    let descriptions = offer.get("descriptions").and_then(Value::as_array);
    let preferred = descriptions.and_then(|entries| {
        entries
            .iter()
            .find(|entry| {
                entry
                    .get("locale")
                    .and_then(Value::as_str)
                    .map(|locale| locale.to_ascii_lowercase().starts_with("en"))
                    .unwrap_or(false)
            })
            .or_else(|| entries.first())
    });
    let title_text = preferred
        .and_then(|entry| entry.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let description_text = preferred
        .and_then(|entry| entry.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(PromotionRow {
        property_id: property_id.to_string(),
        code: code.to_string(),
        promotion_type: offer.get("type").and_then(Value::as_str).map(str::to_string),
        title: offer
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(title_text),
        description: description_text,
        min_nights: offer.get("minNights").and_then(Value::as_i64),
        max_nights: offer.get("maxNights").and_then(Value::as_i64),
        booking_start: offer
            .get("bookingStartDate")
            .and_then(Value::as_str)
            .map(str::to_string),
        booking_end: offer
            .get("bookingEndDate")
            .and_then(Value::as_str)
            .map(str::to_string),
        stay_start: offer
            .get("stayStartDate")
            .and_then(Value::as_str)
            .map(str::to_string),
        stay_end: offer
            .get("stayEndDate")
            .and_then(Value::as_str)
            .map(str::to_string),
        blackout_dates_json: offer
            .get("blackoutDates")
            .map(|v| serde_json::to_string(v).unwrap_or_default()),
        card_types_json: offer
            .get("cardTypes")
            .map(|v| serde_json::to_string(v).unwrap_or_default()),
        raw_json: serde_json::to_string(offer).unwrap_or_else(|_| "{}".to_string()),
    })
}

fn upsert_promotion(
    tx: &Transaction<'_>,
    promotion: &PromotionRow,
    now: &str,
) -> StorageResult<()> {
    tx.execute(
        "INSERT INTO hotel_promotions(
            property_id, promotion_code, promotion_type, title, description,
            min_nights, max_nights, booking_start, booking_end, stay_start,
            stay_end, blackout_dates_json, card_types_json, raw_json,
            first_seen, last_seen
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
         ON CONFLICT(property_id, promotion_code) DO UPDATE SET
            promotion_type=excluded.promotion_type,
            title=COALESCE(excluded.title, hotel_promotions.title),
            description=COALESCE(excluded.description, hotel_promotions.description),
            min_nights=excluded.min_nights,
            max_nights=excluded.max_nights,
            booking_start=excluded.booking_start,
            booking_end=excluded.booking_end,
            stay_start=excluded.stay_start,
            stay_end=excluded.stay_end,
            blackout_dates_json=excluded.blackout_dates_json,
            card_types_json=excluded.card_types_json,
            raw_json=excluded.raw_json,
            last_seen=excluded.last_seen",
        params![
            promotion.property_id,
            promotion.code,
            promotion.promotion_type,
            promotion.title,
            promotion.description,
            promotion.min_nights,
            promotion.max_nights,
            promotion.booking_start,
            promotion.booking_end,
            promotion.stay_start,
            promotion.stay_end,
            promotion.blackout_dates_json,
            promotion.card_types_json,
            promotion.raw_json,
            now,
        ],
    )?;
    Ok(())
}
