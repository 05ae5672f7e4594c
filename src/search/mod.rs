//! Property search against the remote backend
//!
//! `SearchParams` renders the backend request payload and owns the search
//! signature used for dedup/resume. `SearchClient` executes one property
//! search per unit of work, handling account-token refresh and pagination.

mod client;
mod params;

pub use client::{SearchClient, SearchError, SearchResults};
pub use params::{RoomRequest, SearchParams};
