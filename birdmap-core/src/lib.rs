//! Core library for the `birdmap` CLI.
//!
//! This crate defines:
//! - Configuration (defaults, TOML file, environment overrides)
//! - Fetching notable observations from eBird
//! - Rendering observations as a static Leaflet map
//! - Publishing the page atomically into an output directory
//!
//! It is used by `birdmap-cli`, but the pipeline can be driven by any binary
//! that supplies an [`ObservationSource`].

pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod retry;
pub mod source;

pub use config::Config;
pub use error::{AuthFailure, ConfigError, FetchError, PipelineError, PublishError};
pub use model::{Coordinate, NotableQuery, Observation, ObservedAt};
pub use pipeline::{RunReport, run};
pub use publish::{Published, Publisher};
pub use render::MapRenderer;
pub use source::{ApiKey, ObservationSource, ebird::EbirdClient};
