//! Statistics for publications and the registry

pub mod metrics;

pub use metrics::{PublicationStats, RegistryStats};
