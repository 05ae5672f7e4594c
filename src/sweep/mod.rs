//! Sweep planning
//!
//! This module turns run configuration into schedulable work: date sweeps
//! generated from a range, destination resolution against the catalog, and
//! the (destination x sweep) unit matrix with its two ordering policies.

mod dates;
mod plan;

pub use dates::{generate_sweeps, parse_date_expr, DateExpr, DateSweep};
pub use plan::{
    build_destination_first_queue, build_sweep_batches, resolve_destinations, SearchUnit,
    SweepBatch,
};
