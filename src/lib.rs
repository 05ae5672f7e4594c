#![recursion_limit = "256"]
//! Ratesweep: a session-resilient hotel availability sweeper
//!
//! This crate drives a matrix of (destination x check-in date) searches
//! against a session-based travel backend, recovers from authentication and
//! transport failures mid-sweep, and persists normalized hotel/rate records
//! with resumability across process restarts.

pub mod catalog;
pub mod config;
pub mod orchestrator;
pub mod records;
pub mod search;
pub mod session;
pub mod store;
pub mod sweep;

use thiserror::Error;

/// Main error type for ratesweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] store::StorageError),

    #[error("Authentication error: {0}")]
    Auth(#[from] session::AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] session::TransportError),

    #[error("Search error: {0}")]
    Search(#[from] search::SearchError),

    #[error("No destinations are ready for search for requested keys/groups: {0}")]
    NoReadyDestinations(String),

    #[error("Unable to recover session while fetching {destination}")]
    SessionRecovery { destination: String },

    #[error("Aborting sweep after {count} back-to-back backend failures")]
    BackendFailureStreak { count: u32 },

    #[error("Search for {destination} failed: {message}")]
    Unit {
        destination: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date expression: {0}")]
    InvalidDate(String),
}

/// Destination-catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Destination catalog not found at {0}")]
    NotFound(String),

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Destination '{key}' not found in catalog. Known keys: {known}")]
    UnknownKey { key: String, known: String },
}

/// Result type alias for ratesweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{Destination, DestinationCatalog};
pub use config::Settings;
pub use search::{SearchClient, SearchError, SearchParams};
pub use session::{SessionContext, SessionSupervisor, TransportError};
pub use store::{RunStore, SearchRunRecord};
pub use sweep::{DateSweep, SearchUnit, SweepBatch};
