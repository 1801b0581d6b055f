//! # openlake-core: assets, transforms and the single-file Parquet store
//!
//! Assets produce tables as [`Frame`]s, either already in memory or as a
//! deferred [`Plan`]. The runner persists each asset's output as exactly one
//! Parquet file per asset, streaming deferred frames batch by batch.

// Foundation
pub mod config;
pub mod error;

// Tables
pub mod frame;
pub mod store;
pub mod transform;

// Pipeline
pub mod assets;
pub mod fetch;
pub mod graph;
pub mod jobs;

// Tooling
pub mod evidence;

// Re-exports
pub use assets::{Asset, AssetContext, AssetKey, AssetSpec, Tier};
pub use config::{LakeConfig, load_config};
pub use error::{LakeError, Result};
pub use fetch::Fetcher;
pub use frame::{Expr, Frame, Plan};
pub use graph::{AssetGraph, AssetSelection};
pub use jobs::{AssetOutcome, AssetStatus, Definitions, JobDefinition, RunReport};
pub use store::{SingleFileParquetStore, WriteReport};
