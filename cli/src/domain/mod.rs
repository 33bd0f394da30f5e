//! Domain layer: pure tunnel, load and telemetry types, outcomes,
//! configuration and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod load;
pub mod metrics;
pub mod report;
pub mod telemetry;
pub mod tunnel;

pub use config::{MeshbenchConfig, MonitoringConfig, TimeoutConfig, validate_config};
pub use error::{ConfigError, LoadError, TelemetryError, TunnelError};
pub use load::{LoadConfig, LoadRecord};
pub use metrics::{CollectConfig, Collection, MetricQuery, Series};
pub use report::{FailReason, ForwardFailure, SkipReason, TunnelOutcome, TunnelReport};
pub use telemetry::{DependencyEdge, DependencyGraph, EndpointCheck, TimeWindow};
pub use tunnel::{ClusterForward, ClusterSettings, PortState, RelayIdentity, TunnelSpec};
