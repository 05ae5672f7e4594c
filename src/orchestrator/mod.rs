//! Sweep orchestrator
//!
//! Drives the destination x sweep matrix to completion with minimum
//! redundant work and bounded blast radius per failure. Retry logic
//! consumes only the abstract failure classification from
//! [`backend::UnitError`]; concrete transport errors never reach it.

mod backend;
mod runner;

pub use backend::{LiveBackend, SearchBackend, UnitError};
pub use runner::Orchestrator;

use crate::config::Settings;
use crate::session::SessionSupervisor;
use crate::store::{DurabilityOptions, RunStore};
use crate::sweep::{build_sweep_batches, resolve_destinations, DateSweep};
use crate::{ConfigError, Result};
use std::path::Path;

/// Top-level entry: resolves destinations, opens the store, and runs the
/// full sweep matrix
pub async fn run_sweeps(settings: &Settings, sweeps: Vec<DateSweep>) -> Result<()> {
    let store = if settings.storage.enabled {
        let durability = DurabilityOptions::from_section(&settings.storage)
            .map_err(ConfigError::Validation)?;
        Some(RunStore::open(
            Path::new(&settings.storage.database_path),
            &durability,
        )?)
    } else {
        None
    };

    let destinations = resolve_destinations(settings)?;
    let batches = build_sweep_batches(&destinations, &sweeps, settings)?;

    tracing::info!(
        "Planned {} destinations x {} sweeps",
        destinations.len(),
        batches.len()
    );

    let supervisor = SessionSupervisor::new(settings.session.clone());
    let backend = LiveBackend::new(supervisor, settings.sweep.warmup_enabled);
    let mut orchestrator = Orchestrator::new(settings, store.as_ref(), backend);
    orchestrator.run(&destinations, &batches).await
}
