//! Persistent run store
//!
//! Durable record of every (destination, date-sweep) search attempt, the
//! normalized hotel/rate snapshots, and the resumability state that lets a
//! restarted process skip completed work. All mutation serializes through
//! the store's single writer lock.

mod schema;
mod sqlite;

pub use sqlite::RunStore;

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Status of one search run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Lightweight view of a search run row
#[derive(Debug, Clone)]
pub struct SearchRunRecord {
    pub id: i64,
    pub destination_key: String,
    pub destination_name: Option<String>,
    pub destination_group: Option<String>,
    pub label: Option<String>,
    pub status: RunStatus,
    pub started_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub failure_reason: Option<String>,
    pub total_hotels: i64,
    pub total_rates: i64,
    pub search_signature: String,
}

/// SQLite journal_mode pragma values accepted by the store
///
/// Unknown values are rejected when the configuration is parsed, before
/// any database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }
}

impl std::str::FromStr for JournalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "truncate" => Ok(Self::Truncate),
            "persist" => Ok(Self::Persist),
            "memory" => Ok(Self::Memory),
            "wal" => Ok(Self::Wal),
            "off" => Ok(Self::Off),
            other => Err(format!(
                "Unsupported SQLite journal_mode '{other}'. Expected one of: delete, truncate, persist, memory, wal, off"
            )),
        }
    }
}

/// SQLite synchronous pragma values accepted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }
}

impl std::str::FromStr for SynchronousMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "normal" => Ok(Self::Normal),
            "full" => Ok(Self::Full),
            "extra" => Ok(Self::Extra),
            other => Err(format!(
                "Unsupported SQLite synchronous mode '{other}'. Expected one of: off, normal, full, extra"
            )),
        }
    }
}

/// Durability knobs applied when the store opens its connection
#[derive(Debug, Clone, Copy)]
pub struct DurabilityOptions {
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
}

impl Default for DurabilityOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 2000,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
        }
    }
}

impl DurabilityOptions {
    /// Builds typed options from the already-validated storage section
    pub fn from_section(section: &crate::config::StorageSection) -> Result<Self, String> {
        Ok(Self {
            busy_timeout_ms: section.busy_timeout_ms,
            journal_mode: section.journal_mode.parse()?,
            synchronous: section.synchronous.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[RunStatus::Running, RunStatus::Complete, RunStatus::Failed] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), RunStatus::from_db_string(db_str));
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("interrupted"), None);
    }

    #[test]
    fn test_journal_mode_parsing() {
        assert_eq!("WAL".parse::<JournalMode>(), Ok(JournalMode::Wal));
        assert_eq!(" delete ".parse::<JournalMode>(), Ok(JournalMode::Delete));
        assert!("ledger".parse::<JournalMode>().is_err());
    }

    #[test]
    fn test_synchronous_mode_parsing() {
        assert_eq!("normal".parse::<SynchronousMode>(), Ok(SynchronousMode::Normal));
        assert_eq!("EXTRA".parse::<SynchronousMode>(), Ok(SynchronousMode::Extra));
        assert!("turbo".parse::<SynchronousMode>().is_err());
    }
}
