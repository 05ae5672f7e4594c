use crate::catalog::Destination;
use crate::config::{Settings, SweepPriority};
use crate::orchestrator::backend::{SearchBackend, UnitError};
use crate::records::build_hotel_and_rate_records;
use crate::search::SearchParams;
use crate::store::{RunStatus, RunStore, SearchRunRecord};
use crate::sweep::{build_destination_first_queue, SearchUnit, SweepBatch};
use crate::{Result, SweepError};
use std::collections::HashMap;
use std::time::Duration;

/// Session rebuilds allowed per unit before giving up
const REBUILD_ATTEMPTS: u32 = 2;

type ExistingRuns = HashMap<(String, Option<String>), SearchRunRecord>;

/// Drives the destination x sweep matrix
///
/// All resumability state lives in the store; the orchestrator holds only
/// in-memory scheduling state and the consecutive-backend-failure counter
/// (reset on any success, not persisted across restarts).
pub struct Orchestrator<'a, B: SearchBackend> {
    settings: &'a Settings,
    store: Option<&'a RunStore>,
    backend: B,
    consecutive_backend_failures: u32,
}

impl<'a, B: SearchBackend + Send> Orchestrator<'a, B> {
    pub fn new(settings: &'a Settings, store: Option<&'a RunStore>, backend: B) -> Self {
        Self {
            settings,
            store,
            backend,
            consecutive_backend_failures: 0,
        }
    }

    /// Runs every batch to completion under the configured ordering policy
    pub async fn run(
        &mut self,
        destinations: &[Destination],
        batches: &[SweepBatch],
    ) -> Result<()> {
        let resume = self.settings.sweep.resume_completed && self.store.is_some();
        let existing = if resume {
            self.load_existing_runs(batches)?
        } else {
            ExistingRuns::new()
        };

        match self.settings.sweep.priority {
            SweepPriority::DestinationFirst => {
                if resume && !pending_runs_exist(batches, &existing) {
                    tracing::info!(
                        "Skipping destination-first sweep; all {} destinations already complete for {} sweeps",
                        destinations.len(),
                        batches.len()
                    );
                    return Ok(());
                }
                let queue = build_destination_first_queue(destinations, batches);
                tracing::info!(
                    "Destination-first priority enabled ({} destinations x {} sweeps => {} runs)",
                    destinations.len(),
                    batches.len(),
                    queue.len()
                );
                self.execute_units(&queue, &existing).await?;
            }
            SweepPriority::SweepFirst => {
                for batch in batches {
                    if batch.units.is_empty() {
                        continue;
                    }
                    if resume && batch_complete(batch, &existing) {
                        tracing::info!(
                            "Skipping sweep {}; all {} destinations already complete",
                            batch.label_text(),
                            batch.units.len()
                        );
                        continue;
                    }
                    let nights = batch.units[0].params.nights();
                    tracing::info!("Starting sweep {} ({} nights)", batch.label_text(), nights);
                    self.execute_units(&batch.units, &existing).await?;
                }
            }
        }
        Ok(())
    }

    /// Bulk-loads the latest run per (destination, label) so completed
    /// work can be skipped without per-unit queries
    fn load_existing_runs(&self, batches: &[SweepBatch]) -> Result<ExistingRuns> {
        let Some(store) = self.store else {
            return Ok(ExistingRuns::new());
        };
        let mut mapping = ExistingRuns::new();
        for batch in batches {
            if batch.units.is_empty() {
                continue;
            }
            let pairs: Vec<(&Destination, &SearchParams)> = batch
                .units
                .iter()
                .map(|unit| (&unit.destination, &unit.params))
                .collect();
            let records = store.fetch_latest_runs_bulk(&pairs, batch.label())?;
            for (destination_key, record) in records {
                mapping.insert(
                    (destination_key, batch.label().map(str::to_string)),
                    record,
                );
            }
        }
        Ok(mapping)
    }

    async fn execute_units(
        &mut self,
        units: &[SearchUnit],
        existing: &ExistingRuns,
    ) -> Result<()> {
        for unit in units {
            self.execute_unit(unit, existing).await?;
        }
        Ok(())
    }

    /// Executes one SearchUnit with the inner recovery loop
    async fn execute_unit(&mut self, unit: &SearchUnit, existing: &ExistingRuns) -> Result<()> {
        let destination = &unit.destination;
        tracing::info!(
            "Starting search for destination {} ({}, {})",
            destination.key,
            destination.group,
            destination.name
        );

        if let Some(record) =
            existing.get(&(destination.key.clone(), unit.label.clone()))
        {
            match record.status {
                RunStatus::Complete => {
                    let timestamp = record
                        .completed_at
                        .as_deref()
                        .unwrap_or(record.updated_at.as_str());
                    tracing::info!(
                        "Skipping {}; latest run (id={}) finished at {}",
                        destination.key,
                        record.id,
                        timestamp
                    );
                    return Ok(());
                }
                RunStatus::Failed => {
                    tracing::info!(
                        "Re-running {}; previous attempt (id={}) failed{}",
                        destination.key,
                        record.id,
                        record
                            .failure_reason
                            .as_deref()
                            .map(|reason| format!(" ({reason})"))
                            .unwrap_or_default()
                    );
                }
                // A stale running row means a crashed attempt; retried.
                RunStatus::Running => {}
            }
        }

        self.backend.prepare().await?;

        let mut run_id: Option<i64> = None;
        let mut results = None;
        let mut session_error: Option<String> = None;
        let mut backend_failure: Option<(u16, String)> = None;

        for rebuild_attempt in 0..REBUILD_ATTEMPTS {
            if run_id.is_none() {
                if let Some(store) = self.store {
                    run_id = Some(store.begin_run(
                        destination,
                        &unit.params,
                        unit.label.as_deref(),
                    )?);
                }
            }
            match self.backend.fetch_properties(&unit.params).await {
                Ok(payload) => {
                    results = Some(payload);
                    session_error = None;
                    backend_failure = None;
                    break;
                }
                Err(UnitError::TransportLost(message)) => {
                    tracing::warn!(
                        "Session lost while fetching {} ({}); rebuilding session",
                        destination.key,
                        message
                    );
                    self.rebuild_or_fail(run_id).await?;
                }
                Err(UnitError::SessionRefresh(message)) => {
                    tracing::warn!(
                        "Session refresh failed for {}; rebuilding authentication (attempt {})",
                        destination.key,
                        rebuild_attempt + 1
                    );
                    session_error = Some(message);
                    self.rebuild_or_fail(run_id).await?;
                }
                Err(UnitError::BackendUnavailable { status, body }) => {
                    tracing::warn!(
                        "Hotel properties API unavailable for {} (HTTP {}); skipping destination",
                        destination.key,
                        status
                    );
                    backend_failure = Some((status, body));
                    break;
                }
                Err(UnitError::Other(message)) => {
                    self.record_failure(run_id, &message);
                    return Err(SweepError::Unit {
                        destination: destination.key.clone(),
                        message,
                    });
                }
            }
        }

        // Persistent auth failure indicates a systemic problem, not a
        // per-destination one.
        if let Some(message) = session_error {
            self.record_failure(run_id, &format!("Unable to recover session: {message}"));
            return Err(SweepError::SessionRecovery {
                destination: destination.key.clone(),
            });
        }

        if let Some((status, body)) = backend_failure {
            let reason = format!("Properties API returned HTTP {status}: {body}");
            self.record_failure(run_id, &reason);
            self.consecutive_backend_failures += 1;
            if self.consecutive_backend_failures
                >= self.settings.sweep.max_consecutive_backend_failures
            {
                return Err(SweepError::BackendFailureStreak {
                    count: self.consecutive_backend_failures,
                });
            }
            return Ok(());
        }

        let Some(results) = results else {
            self.record_failure(run_id, "session rebuild attempts exhausted");
            return Err(SweepError::SessionRecovery {
                destination: destination.key.clone(),
            });
        };

        self.consecutive_backend_failures = 0;

        let (hotels, rates) =
            build_hotel_and_rate_records(&results.payload, destination, &unit.params);
        tracing::info!(
            "Fetched {} hotels for {}",
            results.hotels().len(),
            destination.key
        );

        if let (Some(store), Some(id)) = (self.store, run_id) {
            let request_id = results.request_id();
            let persisted = store
                .store_run_payload(id, request_id.as_deref(), results.context())
                .and_then(|()| store.save_hotels(id, &hotels))
                .and_then(|()| store.save_rates(id, &rates))
                .and_then(|()| {
                    store.finalize_run(
                        id,
                        hotels.len() as u32,
                        rates.len() as u32,
                        request_id.as_deref(),
                        results.context(),
                    )
                });
            if let Err(e) = persisted {
                self.record_failure(run_id, &e.to_string());
                return Err(e.into());
            }
        }

        let pause = self.settings.sweep.pause_seconds;
        if pause > 0.0 {
            // pacing between destinations to avoid burst traffic
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }

        Ok(())
    }

    /// Rebuilds the session; a rebuild failure is fatal and the current
    /// run is marked failed before it propagates
    async fn rebuild_or_fail(&mut self, run_id: Option<i64>) -> Result<()> {
        if let Err(e) = self.backend.rebuild_session().await {
            self.record_failure(run_id, &e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Marks the active run failed; bookkeeping errors are logged, never
    /// allowed to mask the primary failure
    fn record_failure(&self, run_id: Option<i64>, reason: &str) {
        if let (Some(store), Some(id)) = (self.store, run_id) {
            if let Err(e) = store.mark_run_failed(id, reason) {
                tracing::warn!("Failed to record run failure for run {}: {}", id, e);
            }
        }
    }
}

fn batch_complete(batch: &SweepBatch, existing: &ExistingRuns) -> bool {
    batch.units.iter().all(|unit| {
        existing
            .get(&(unit.destination.key.clone(), unit.label.clone()))
            .map(|record| record.status == RunStatus::Complete)
            .unwrap_or(false)
    })
}

fn pending_runs_exist(batches: &[SweepBatch], existing: &ExistingRuns) -> bool {
    if existing.is_empty() {
        return true;
    }
    batches.iter().any(|batch| !batch_complete(batch, existing))
}
