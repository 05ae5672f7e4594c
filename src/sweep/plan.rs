use crate::catalog::{Destination, DestinationCatalog};
use crate::config::Settings;
use crate::search::{RoomRequest, SearchParams};
use crate::sweep::DateSweep;
use crate::{CatalogError, Result, SweepError};
use chrono::Duration;
use std::collections::HashSet;
use std::path::Path;

/// One (destination, sweep) pairing: the atomic schedulable item
#[derive(Debug, Clone)]
pub struct SearchUnit {
    pub destination: Destination,
    pub params: SearchParams,
    pub label: Option<String>,
}

impl SearchUnit {
    pub fn signature(&self) -> String {
        self.params
            .signature(&self.destination.key, self.label.as_deref())
    }
}

/// All units sharing one date sweep
#[derive(Debug, Clone)]
pub struct SweepBatch {
    pub sweep: DateSweep,
    pub units: Vec<SearchUnit>,
}

impl SweepBatch {
    pub fn label(&self) -> Option<&str> {
        self.sweep.label.as_deref()
    }

    pub fn label_text(&self) -> String {
        self.sweep.label_text()
    }

    pub fn unit_for(&self, destination_key: &str) -> Option<&SearchUnit> {
        self.units
            .iter()
            .find(|unit| unit.destination.key == destination_key)
    }
}

/// Resolves the configured destination keys/groups against the catalog
///
/// Accepts explicit keys, `group:<name>` filters and `all`/`*`. Unknown
/// keys and groups are logged and skipped; destinations missing metadata
/// are logged and skipped. An empty result is an error: there is nothing
/// to sweep.
pub fn resolve_destinations(settings: &Settings) -> Result<Vec<Destination>> {
    let keys: Vec<&str> = settings
        .search
        .destinations
        .iter()
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .collect();

    if keys.is_empty() {
        let manual = settings.manual_destination.as_ref().ok_or_else(|| {
            SweepError::NoReadyDestinations(
                "none requested and no manual destination configured".to_string(),
            )
        })?;
        return Ok(vec![Destination {
            key: "custom".to_string(),
            group: "Manual".to_string(),
            name: manual.name.clone(),
            location_id: Some(manual.location_id.clone()),
            latitude: Some(manual.latitude),
            longitude: Some(manual.longitude),
        }]);
    }

    let catalog = DestinationCatalog::load(Path::new(&settings.catalog.path))?;
    let all: Vec<Destination> = catalog.values().cloned().collect();

    let mut selected: Vec<Destination> = Vec::new();
    let mut include_all = false;
    let mut group_filters: Vec<&str> = Vec::new();

    for key in &keys {
        let lowered = key.to_ascii_lowercase();
        if lowered == "*" || lowered == "all" {
            include_all = true;
            continue;
        }
        if let Some(group) = key.strip_prefix("group:") {
            group_filters.push(group.trim());
            continue;
        }
        match catalog.get(key) {
            Ok(destination) => selected.push(destination.clone()),
            Err(CatalogError::UnknownKey { .. }) => {
                // Second chance: case-insensitive key match.
                if let Some(found) = all
                    .iter()
                    .find(|dest| dest.key.eq_ignore_ascii_case(key))
                {
                    selected.push(found.clone());
                } else {
                    tracing::warn!(
                        "Destination key '{}' not found in catalog {}",
                        key,
                        catalog.source().display()
                    );
                }
            }
            Err(other) => return Err(other.into()),
        }
    }

    for group in group_filters {
        let matches: Vec<&Destination> = all
            .iter()
            .filter(|dest| dest.group.eq_ignore_ascii_case(group))
            .collect();
        if matches.is_empty() {
            tracing::warn!("No destinations matched group '{}'", group);
        } else {
            selected.extend(matches.into_iter().cloned());
        }
    }

    if include_all {
        selected.extend(all.iter().cloned());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped: Vec<Destination> = Vec::new();
    for destination in selected {
        if seen.insert(destination.key.clone()) {
            deduped.push(destination);
        }
    }

    let mut ready = Vec::new();
    for destination in deduped {
        let missing = destination.missing_fields();
        if missing.is_empty() {
            ready.push(destination);
        } else {
            tracing::warn!(
                "Skipping destination {} ({}); missing metadata fields: {}",
                destination.key,
                destination.name,
                missing.join(", ")
            );
        }
    }

    if ready.is_empty() {
        return Err(SweepError::NoReadyDestinations(keys.join(", ")));
    }

    Ok(ready)
}

/// Builds the (destination x sweep) matrix as per-sweep batches
///
/// Every unit carries its own immutable `SearchParams`; the shared settings
/// are only read here, never mutated during execution.
pub fn build_sweep_batches(
    destinations: &[Destination],
    sweeps: &[DateSweep],
    settings: &Settings,
) -> Result<Vec<SweepBatch>> {
    let mut batches = Vec::with_capacity(sweeps.len());
    for sweep in sweeps {
        let nights = sweep.nights.unwrap_or(settings.search.nights);
        let check_out = sweep.check_in + Duration::days(nights as i64);

        let mut units = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let (location_id, latitude, longitude) = match (
                destination.location_id.as_ref(),
                destination.latitude,
                destination.longitude,
            ) {
                (Some(id), Some(lat), Some(lon)) => (id.clone(), lat, lon),
                _ => {
                    return Err(SweepError::NoReadyDestinations(format!(
                        "destination {} missing metadata despite readiness check",
                        destination.key
                    )))
                }
            };

            let mut params = SearchParams::new(
                location_id,
                destination.name.clone(),
                latitude,
                longitude,
                sweep.check_in,
                check_out,
                vec![RoomRequest::adults(settings.search.adults)],
            );
            params.program_filter = settings.search.program_filter.clone();

            units.push(SearchUnit {
                destination: destination.clone(),
                params,
                label: sweep.label.clone(),
            });
        }
        batches.push(SweepBatch {
            sweep: sweep.clone(),
            units,
        });
    }
    Ok(batches)
}

/// Flattens batches into destination-major order: every sweep for
/// destination 1, then destination 2, ...
pub fn build_destination_first_queue(
    destinations: &[Destination],
    batches: &[SweepBatch],
) -> Vec<SearchUnit> {
    let mut queue = Vec::new();
    for destination in destinations {
        for batch in batches {
            if let Some(unit) = batch.unit_for(&destination.key) {
                queue.push(unit.clone());
            }
        }
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CatalogSection, SearchSection, SessionSection, StorageSection, SweepSection,
    };
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn destination(key: &str, group: &str) -> Destination {
        Destination {
            key: key.to_string(),
            group: group.to_string(),
            name: format!("{key} city"),
            location_id: Some(format!("LOC-{key}")),
            latitude: Some(1.0),
            longitude: Some(2.0),
        }
    }

    fn settings() -> Settings {
        Settings {
            profile: "test".to_string(),
            search: SearchSection {
                destinations: vec![],
                check_in: None,
                nights: 3,
                adults: 2,
                program_filter: vec!["FHR".to_string()],
            },
            date_range: None,
            sweep: SweepSection::default(),
            session: SessionSection {
                base_url: "https://travel.example.com".to_string(),
                username: None,
                password: None,
                otp_code: None,
                storage_state_path: None,
                login_timeout_seconds: 45,
                poll_interval_seconds: 2,
            },
            storage: StorageSection::default(),
            catalog: CatalogSection::default(),
            manual_destination: None,
        }
    }

    fn sweeps() -> Vec<DateSweep> {
        vec![
            DateSweep {
                check_in: day(2026, 1, 15),
                nights: None,
                label: Some("2026-01-15".to_string()),
            },
            DateSweep {
                check_in: day(2026, 1, 22),
                nights: Some(2),
                label: Some("2026-01-22".to_string()),
            },
        ]
    }

    #[test]
    fn test_build_batches_params() {
        let destinations = vec![destination("tokyo", "Asia"), destination("rome", "Europe")];
        let batches = build_sweep_batches(&destinations, &sweeps(), &settings()).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].units.len(), 2);

        let unit = batches[0].unit_for("tokyo").unwrap();
        assert_eq!(unit.params.check_in, day(2026, 1, 15));
        // Global nights setting applies when the sweep has no override.
        assert_eq!(unit.params.check_out, day(2026, 1, 18));
        assert_eq!(unit.params.program_filter, vec!["FHR".to_string()]);
        assert_eq!(unit.params.total_adults(), 2);

        let overridden = batches[1].unit_for("tokyo").unwrap();
        assert_eq!(overridden.params.check_out, day(2026, 1, 24));
    }

    #[test]
    fn test_units_have_distinct_signatures() {
        let destinations = vec![destination("tokyo", "Asia"), destination("rome", "Europe")];
        let batches = build_sweep_batches(&destinations, &sweeps(), &settings()).unwrap();

        let mut signatures = HashSet::new();
        for batch in &batches {
            for unit in &batch.units {
                assert!(signatures.insert(unit.signature()));
            }
        }
        assert_eq!(signatures.len(), 4);
    }

    #[test]
    fn test_destination_first_queue_order() {
        let destinations = vec![destination("tokyo", "Asia"), destination("rome", "Europe")];
        let batches = build_sweep_batches(&destinations, &sweeps(), &settings()).unwrap();
        let queue = build_destination_first_queue(&destinations, &batches);

        let order: Vec<(String, Option<String>)> = queue
            .iter()
            .map(|unit| (unit.destination.key.clone(), unit.label.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("tokyo".to_string(), Some("2026-01-15".to_string())),
                ("tokyo".to_string(), Some("2026-01-22".to_string())),
                ("rome".to_string(), Some("2026-01-15".to_string())),
                ("rome".to_string(), Some("2026-01-22".to_string())),
            ]
        );
    }

    #[test]
    fn test_resolve_uses_manual_destination() {
        let mut settings = settings();
        settings.manual_destination = Some(crate::config::ManualDestinationSection {
            name: "Rome (and vicinity), Lazio, Italy".to_string(),
            location_id: "ZMETRO-1002".to_string(),
            latitude: 41.9,
            longitude: 12.4,
        });
        let destinations = resolve_destinations(&settings).unwrap();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].key, "custom");
        assert!(destinations[0].is_ready());
    }

    #[test]
    fn test_resolve_without_anything_errors() {
        let result = resolve_destinations(&settings());
        assert!(matches!(result, Err(SweepError::NoReadyDestinations(_))));
    }
}
