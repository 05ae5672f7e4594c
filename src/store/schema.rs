//! Database schema and versioned migrations
//!
//! The store applies an ordered sequence of migrations on open, recording
//! the applied version in the `meta` table, so upgrading the binary against
//! an existing database file is safe and idempotent.

use rusqlite::Connection;

/// Highest schema version this build knows about
pub const SCHEMA_VERSION: u32 = 3;

const MIGRATION_V1: &str = r#"
-- Destination snapshots, upserted at each run start
CREATE TABLE IF NOT EXISTS destinations (
    key TEXT PRIMARY KEY,
    group_name TEXT,
    name TEXT NOT NULL,
    location_id TEXT,
    latitude REAL,
    longitude REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per search attempt; never deleted, enabling full history/audit
CREATE TABLE IF NOT EXISTS search_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    destination_key TEXT NOT NULL REFERENCES destinations(key),
    destination_group TEXT,
    destination_name TEXT,
    label TEXT,
    check_in TEXT NOT NULL,
    check_out TEXT NOT NULL,
    nights INTEGER NOT NULL,
    adults INTEGER NOT NULL,
    children INTEGER NOT NULL,
    rooms INTEGER NOT NULL,
    program_filter TEXT,
    request_id TEXT,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    failure_reason TEXT,
    total_hotels INTEGER DEFAULT 0,
    total_rates INTEGER DEFAULT 0,
    search_signature TEXT NOT NULL,
    raw_context TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_search_runs_signature ON search_runs(search_signature);
CREATE INDEX IF NOT EXISTS idx_search_runs_status ON search_runs(status);

-- Hotels are upserted by property id across runs
CREATE TABLE IF NOT EXISTS hotels (
    property_id TEXT PRIMARY KEY,
    supplier_id TEXT,
    name TEXT,
    type TEXT,
    brand_name TEXT,
    chain_name TEXT,
    star_rating REAL,
    phone TEXT,
    address_line1 TEXT,
    address_city TEXT,
    address_state TEXT,
    address_postal_code TEXT,
    address_country_code TEXT,
    latitude REAL,
    longitude REAL,
    distance_miles REAL,
    distance_unit TEXT,
    loyalty_valid INTEGER,
    user_rating REAL,
    user_rating_count INTEGER,
    hero_image TEXT,
    location_teaser TEXT,
    check_in_start TEXT,
    check_in_end TEXT,
    check_out_time TEXT,
    summary_json TEXT,
    search_context_json TEXT,
    raw_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS room_types (
    property_id TEXT NOT NULL REFERENCES hotels(property_id) ON DELETE CASCADE,
    room_type_id TEXT NOT NULL,
    name TEXT,
    amenities_json TEXT,
    bed_groups_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (property_id, room_type_id)
);

-- Rate snapshots are scoped to a run: a retried run clears and reinserts
CREATE TABLE IF NOT EXISTS rate_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES search_runs(id) ON DELETE CASCADE,
    property_id TEXT NOT NULL REFERENCES hotels(property_id) ON DELETE CASCADE,
    room_type_id TEXT NOT NULL,
    rate_id TEXT NOT NULL,
    hotel_collection TEXT,
    available INTEGER,
    is_breakfast_included INTEGER,
    is_free_cancellation INTEGER,
    is_parking_included INTEGER,
    occupancy_adults INTEGER,
    occupancy_children INTEGER,
    room_count INTEGER,
    pricing_currency TEXT,
    pricing_base REAL,
    pricing_total REAL,
    pricing_total_inclusive REAL,
    pricing_total_fees REAL,
    pricing_total_taxes REAL,
    average_nightly_rate REAL,
    payment_model TEXT,
    room_allocations_json TEXT,
    special_offer_json TEXT,
    search_context_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(run_id, property_id, room_type_id, rate_id)
);
CREATE INDEX IF NOT EXISTS idx_rate_snapshots_run ON rate_snapshots(run_id);
CREATE INDEX IF NOT EXISTS idx_rate_snapshots_property ON rate_snapshots(property_id);

CREATE TABLE IF NOT EXISTS rate_nightly_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rate_snapshot_id INTEGER NOT NULL REFERENCES rate_snapshots(id) ON DELETE CASCADE,
    night_index INTEGER NOT NULL,
    night_date TEXT,
    actual_rate REAL,
    inclusive_rate REAL
);

CREATE TABLE IF NOT EXISTS rate_components (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rate_snapshot_id INTEGER NOT NULL REFERENCES rate_snapshots(id) ON DELETE CASCADE,
    component_type TEXT NOT NULL,
    code TEXT,
    label TEXT,
    amount REAL,
    currency TEXT,
    is_included INTEGER,
    pay_locally INTEGER,
    details_json TEXT
);
"#;

const MIGRATION_V2: &str = r#"
-- Promotions keyed by (property, promotion code), tracked across runs
CREATE TABLE IF NOT EXISTS hotel_promotions (
    property_id TEXT NOT NULL REFERENCES hotels(property_id) ON DELETE CASCADE,
    promotion_code TEXT NOT NULL,
    promotion_type TEXT,
    title TEXT,
    description TEXT,
    min_nights INTEGER,
    max_nights INTEGER,
    booking_start TEXT,
    booking_end TEXT,
    stay_start TEXT,
    stay_end TEXT,
    blackout_dates_json TEXT,
    card_types_json TEXT,
    raw_json TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    PRIMARY KEY (property_id, promotion_code)
);
CREATE INDEX IF NOT EXISTS idx_hotel_promotions_type ON hotel_promotions(promotion_type);
"#;

const MIGRATION_V3: &str = r#"
ALTER TABLE hotels ADD COLUMN renovation_closure_notice TEXT;
"#;

/// Ordered migration sequence; new versions append here
const MIGRATIONS: [(u32, &str); 3] = [
    (1, MIGRATION_V1),
    (2, MIGRATION_V2),
    (3, MIGRATION_V3),
];

/// Applies every outstanding migration and records the reached version
pub fn apply_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    let current = get_schema_version(conn)?;

    for (version, script) in MIGRATIONS {
        if version <= current {
            continue;
        }
        tracing::debug!("Applying schema migration v{}", version);
        conn.execute_batch(script)?;
        conn.execute(
            "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [version.to_string()],
        )?;
    }
    Ok(())
}

/// Reads the recorded schema version; 0 when the database is fresh
pub fn get_schema_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get(0),
        )
        .ok();
    Ok(version.and_then(|v| v.parse().ok()).unwrap_or(0))
}
