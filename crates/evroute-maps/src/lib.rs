//! Concrete providers for the evroute planner.

pub mod backoff;
pub mod cache;
pub mod google;
pub mod grid;
pub mod retry;

pub use cache::CachedPlaces;
pub use google::GoogleMapsClient;
pub use grid::{DatasetError, PowerPlant, PowerPlantDataset};
pub use retry::{RetryPolicy, Retrying};
