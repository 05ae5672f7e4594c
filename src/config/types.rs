use serde::Deserialize;

/// Top-level run configuration for ratesweep
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Human label used for logging
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default)]
    pub search: SearchSection,

    /// Optional series of check-in dates to iterate
    #[serde(rename = "date-range", default)]
    pub date_range: Option<DateRangeSection>,

    #[serde(default)]
    pub sweep: SweepSection,

    pub session: SessionSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub catalog: CatalogSection,

    /// Fallback destination used when no catalog keys are requested
    #[serde(rename = "manual-destination", default)]
    pub manual_destination: Option<ManualDestinationSection>,
}

fn default_profile() -> String {
    "default".to_string()
}

/// Search parameters shared by every unit of a run
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchSection {
    /// Catalog keys, `group:<name>` filters, or `all`
    #[serde(default)]
    pub destinations: Vec<String>,

    /// ISO 8601 date or relative offset such as `+14d`
    #[serde(rename = "check-in", default)]
    pub check_in: Option<String>,

    /// Length of stay in nights
    #[serde(default = "default_nights")]
    pub nights: u32,

    /// Adults per room
    #[serde(default = "default_adults")]
    pub adults: u32,

    /// Optional program filters (e.g. "FHR", "THC")
    #[serde(rename = "program-filter", default)]
    pub program_filter: Vec<String>,
}

fn default_nights() -> u32 {
    3
}

fn default_adults() -> u32 {
    2
}

/// Defines a series of check-in dates to iterate
#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeSection {
    /// ISO date or relative offset for the first check-in
    pub start: String,

    /// ISO date or relative offset for the final check-in (inclusive)
    #[serde(default)]
    pub end: Option<String>,

    /// Number of iterations when `end` is not provided
    #[serde(default)]
    pub occurrences: Option<u32>,

    /// Days between each check-in
    #[serde(rename = "step-days", default = "default_step_days")]
    pub step_days: u32,

    /// Override stay length (nights) for each iteration
    #[serde(default)]
    pub nights: Option<u32>,
}

fn default_step_days() -> u32 {
    1
}

/// Ordering policy for the destination x sweep matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepPriority {
    /// Complete every destination for sweep 1, then sweep 2, ...
    SweepFirst,
    /// Complete every sweep for destination 1, then destination 2, ...
    DestinationFirst,
}

/// Sweep execution behavior
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSection {
    #[serde(default = "default_priority")]
    pub priority: SweepPriority,

    /// Skip units whose latest run is already complete
    #[serde(rename = "resume-completed", default = "default_true")]
    pub resume_completed: bool,

    /// Pause between destinations, in seconds
    #[serde(rename = "pause-seconds", default)]
    pub pause_seconds: f64,

    /// Abort the sweep after this many back-to-back backend rejections
    #[serde(
        rename = "max-consecutive-backend-failures",
        default = "default_max_failures"
    )]
    pub max_consecutive_backend_failures: u32,

    /// Let the results page issue the search itself before falling back
    /// to a direct API request
    #[serde(rename = "warmup-enabled", default)]
    pub warmup_enabled: bool,
}

fn default_priority() -> SweepPriority {
    SweepPriority::SweepFirst
}

fn default_true() -> bool {
    true
}

fn default_max_failures() -> u32 {
    3
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            resume_completed: true,
            pause_seconds: 0.0,
            max_consecutive_backend_failures: default_max_failures(),
            warmup_enabled: false,
        }
    }
}

/// Remote session and login configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Target base URL for login/search flows
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Primary account username
    #[serde(default)]
    pub username: Option<String>,

    /// Primary account password
    #[serde(default)]
    pub password: Option<String>,

    /// Static one-time code used when the login flow issues a challenge
    #[serde(rename = "otp-code", default)]
    pub otp_code: Option<String>,

    /// Path to the persisted cookie state artifact
    #[serde(rename = "storage-state-path", default)]
    pub storage_state_path: Option<String>,

    /// Maximum seconds to wait for authentication cookies after login
    #[serde(rename = "login-timeout-seconds", default = "default_login_timeout")]
    pub login_timeout_seconds: u64,

    /// Seconds between cookie-marker polls while waiting for login
    #[serde(rename = "poll-interval-seconds", default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn default_login_timeout() -> u64 {
    45
}

fn default_poll_interval() -> u64 {
    2
}

/// SQLite persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Busy-wait before giving up on a database lock, in milliseconds
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,

    /// SQLite journal_mode pragma (e.g. "wal", "delete")
    #[serde(rename = "journal-mode", default = "default_journal_mode")]
    pub journal_mode: String,

    /// SQLite synchronous pragma (e.g. "normal", "full")
    #[serde(default = "default_synchronous")]
    pub synchronous: String,
}

fn default_database_path() -> String {
    "data/hotels.db".to_string()
}

fn default_busy_timeout() -> u32 {
    2000
}

fn default_journal_mode() -> String {
    "wal".to_string()
}

fn default_synchronous() -> String {
    "normal".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
            journal_mode: default_journal_mode(),
            synchronous: default_synchronous(),
        }
    }
}

/// Destination catalog location
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

fn default_catalog_path() -> String {
    "data/destinations.json".to_string()
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Manual destination override used when no catalog keys are requested
#[derive(Debug, Clone, Deserialize)]
pub struct ManualDestinationSection {
    pub name: String,

    #[serde(rename = "location-id")]
    pub location_id: String,

    pub latitude: f64,

    pub longitude: f64,
}
