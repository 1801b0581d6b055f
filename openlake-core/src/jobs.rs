//! Job definitions and the sequential run loop.

use crate::assets::{self, Asset, AssetContext, AssetKey, Tier};
use crate::config::LakeConfig;
use crate::error::{LakeError, Result};
use crate::fetch::Fetcher;
use crate::graph::{AssetGraph, AssetSelection};
use crate::store::SingleFileParquetStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

pub const MATERIALIZE_ALL_JOB: &str = "materialize_all_assets_job";

/// A named selection of assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub name: String,
    pub selection: AssetSelection,
    pub description: Option<String>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, selection: AssetSelection) -> Self {
        Self {
            name: name.into(),
            selection,
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The job that runs the entire graph.
pub fn materialize_all_assets_job() -> JobDefinition {
    JobDefinition::new(MATERIALIZE_ALL_JOB, AssetSelection::All)
        .description("Materialize every registered asset")
}

/// What happened to one asset during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetStatus {
    Written { path: PathBuf, rows: usize, bytes: u64 },
    /// The asset produced no data.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOutcome {
    pub asset: AssetKey,
    pub tier: Tier,
    #[serde(flatten)]
    pub status: AssetStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub assets: Vec<AssetOutcome>,
}

impl RunReport {
    pub fn written(&self) -> usize {
        self.assets
            .iter()
            .filter(|o| matches!(o.status, AssetStatus::Written { .. }))
            .count()
    }
}

/// Assets, stores and jobs wired together.
pub struct Definitions {
    graph: AssetGraph,
    raw: SingleFileParquetStore,
    clean: SingleFileParquetStore,
    fetcher: Fetcher,
    jobs: BTreeMap<String, JobDefinition>,
}

impl Definitions {
    pub fn new(raw: SingleFileParquetStore, clean: SingleFileParquetStore, fetcher: Fetcher) -> Self {
        let mut defs = Self {
            graph: AssetGraph::new(),
            raw,
            clean,
            fetcher,
            jobs: BTreeMap::new(),
        };
        defs.add_job(materialize_all_assets_job());
        defs
    }

    /// Stores, fetcher and the NFL assets built from resolved configuration.
    pub fn from_config(config: &LakeConfig) -> Result<Self> {
        let raw = SingleFileParquetStore::new(&config.paths.raw_dir)
            .with_options(config.storage.clone());
        let clean = SingleFileParquetStore::new(&config.paths.clean_dir)
            .with_options(config.storage.clone());
        let fetcher = Fetcher::new(&config.paths.staging_dir, &config.http)?;

        let mut defs = Self::new(raw, clean, fetcher);
        defs.graph.register_all(assets::nfl::nfl_assets(&config.nfl))?;
        defs.graph.validate()?;
        Ok(defs)
    }

    pub fn with_asset(mut self, asset: Arc<dyn Asset>) -> Result<Self> {
        self.graph.register(asset)?;
        Ok(self)
    }

    pub fn with_job(mut self, job: JobDefinition) -> Self {
        self.add_job(job);
        self
    }

    fn add_job(&mut self, job: JobDefinition) {
        self.jobs.insert(job.name.clone(), job);
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.values()
    }

    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    pub fn store(&self, tier: Tier) -> &SingleFileParquetStore {
        match tier {
            Tier::Raw => &self.raw,
            Tier::Clean => &self.clean,
        }
    }

    pub async fn run_job(&self, name: &str) -> Result<RunReport> {
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| LakeError::UnknownJob(name.to_string()))?;
        info!(job = %job.name, "Running job");
        self.materialize(&job.selection).await
    }

    /// Materialize the selected assets in dependency order.
    ///
    /// The first failure stops the run and is returned.
    pub async fn materialize(&self, selection: &AssetSelection) -> Result<RunReport> {
        let order = self.graph.execution_order(selection)?;
        let started_at = Utc::now();
        info!(assets = order.len(), "Starting run");

        let mut outcomes = Vec::with_capacity(order.len());
        for asset in order {
            let key = asset.spec().key.clone();
            let span = info_span!("asset", name = %key);
            match self.materialize_one(asset).instrument(span).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    error!(asset = %key, error = %err, "Materialization failed");
                    return Err(err);
                }
            }
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            assets: outcomes,
        };
        info!(written = report.written(), total = report.assets.len(), "Run finished");
        Ok(report)
    }

    async fn materialize_one(&self, asset: Arc<dyn Asset>) -> Result<AssetOutcome> {
        let spec = asset.spec();
        let start = Instant::now();
        let ctx = AssetContext::new(
            spec.key.clone(),
            self.raw.clone(),
            self.clean.clone(),
            self.fetcher.clone(),
        );

        let payload = asset.materialize(&ctx).await?;

        let store = self.store(spec.tier).clone();
        let name = spec.name();
        let span = tracing::Span::current();
        let written = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            store.write(&name, payload)
        })
        .await??;

        let status = match written {
            Some(report) => AssetStatus::Written {
                path: report.path,
                rows: report.rows,
                bytes: report.bytes,
            },
            None => AssetStatus::Skipped,
        };
        Ok(AssetOutcome {
            asset: spec.key.clone(),
            tier: spec.tier,
            status,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}
