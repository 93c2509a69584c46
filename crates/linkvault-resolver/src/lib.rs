//! Lookup and insert path over the cache tiers, the existence filter and
//! the sharded store.

mod background;
mod error;
mod job;
mod service;
mod single_flight;
#[cfg(test)]
mod testing;

pub use background::BackgroundTasks;
pub use error::{LookupError, Result};
pub use job::{JobConfig, MaintenanceJob};
pub use service::{LinkService, MaintenanceReport, ServiceConfig};
pub use single_flight::SingleFlight;
