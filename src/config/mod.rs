//! Configuration module for ratesweep
//!
//! This module handles loading, parsing, and validating TOML run
//! configuration files.
//!
//! # Example
//!
//! ```no_run
//! use ratesweep::config::load_config;
//! use std::path::Path;
//!
//! let settings = load_config(Path::new("run_config.toml")).unwrap();
//! println!("Stay length: {} nights", settings.search.nights);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CatalogSection, DateRangeSection, ManualDestinationSection, SearchSection, SessionSection,
    Settings, StorageSection, SweepPriority, SweepSection,
};

// Re-export parser functions
pub use parser::load_config;
