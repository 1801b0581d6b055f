//! Runner tests with in-process assets and scratch lakes.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tempfile::TempDir;

use openlake_core::config::HttpConfig;
use openlake_core::jobs::MATERIALIZE_ALL_JOB;
use openlake_core::transform::enrich_roles;
use openlake_core::{
    Asset, AssetContext, AssetSelection, AssetSpec, AssetStatus, Definitions, Fetcher, Frame,
    JobDefinition, LakeError, Result, SingleFileParquetStore, Tier,
};

struct Players(AssetSpec);

#[async_trait]
impl Asset for Players {
    fn spec(&self) -> &AssetSpec {
        &self.0
    }

    async fn materialize(&self, _ctx: &AssetContext) -> Result<Option<Frame>> {
        let batch = RecordBatch::try_from_iter(vec![
            ("gsis_id", Arc::new(StringArray::from(vec!["P1", "P2"])) as ArrayRef),
            ("display_name", Arc::new(StringArray::from(vec!["Ann", "Bo"])) as ArrayRef),
            ("position", Arc::new(StringArray::from(vec!["QB", "WR"])) as ArrayRef),
        ])?;
        Ok(Some(batch.into()))
    }
}

struct Plays(AssetSpec);

#[async_trait]
impl Asset for Plays {
    fn spec(&self) -> &AssetSpec {
        &self.0
    }

    async fn materialize(&self, _ctx: &AssetContext) -> Result<Option<Frame>> {
        let batch = RecordBatch::try_from_iter(vec![
            ("play_id", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
            (
                "passer_player_id",
                Arc::new(StringArray::from(vec![Some("P1"), None, Some("P2")])) as ArrayRef,
            ),
        ])?;
        Ok(Some(batch.into()))
    }
}

struct Enriched(AssetSpec);

#[async_trait]
impl Asset for Enriched {
    fn spec(&self) -> &AssetSpec {
        &self.0
    }

    async fn materialize(&self, ctx: &AssetContext) -> Result<Option<Frame>> {
        let plays = ctx.scan_upstream(Tier::Raw, "plays")?;
        let players = ctx.scan_upstream(Tier::Raw, "players")?;
        Ok(Some(enrich_roles(plays.into(), players.into(), &["passer"])?))
    }
}

struct Nothing(AssetSpec);

#[async_trait]
impl Asset for Nothing {
    fn spec(&self) -> &AssetSpec {
        &self.0
    }

    async fn materialize(&self, _ctx: &AssetContext) -> Result<Option<Frame>> {
        Ok(None)
    }
}

struct Broken(AssetSpec);

#[async_trait]
impl Asset for Broken {
    fn spec(&self) -> &AssetSpec {
        &self.0
    }

    async fn materialize(&self, _ctx: &AssetContext) -> Result<Option<Frame>> {
        Err(LakeError::fetch("upstream unavailable"))
    }
}

fn definitions(dir: &TempDir) -> Definitions {
    let raw = SingleFileParquetStore::new(dir.path().join("raw"));
    let clean = SingleFileParquetStore::new(dir.path().join("clean"));
    let fetcher = Fetcher::new(dir.path().join("staging"), &HttpConfig::default()).unwrap();
    Definitions::new(raw, clean, fetcher)
        .with_asset(Arc::new(Enriched(
            AssetSpec::new("plays_enriched", Tier::Clean)
                .group("demo")
                .dep("plays")
                .dep("players"),
        )))
        .unwrap()
        .with_asset(Arc::new(Plays(AssetSpec::new("plays", Tier::Raw).group("demo"))))
        .unwrap()
        .with_asset(Arc::new(Players(AssetSpec::new("players", Tier::Raw).group("demo"))))
        .unwrap()
        .with_asset(Arc::new(Nothing(AssetSpec::new("placeholder", Tier::Clean))))
        .unwrap()
}

#[tokio::test]
async fn materialize_all_runs_in_dependency_order() {
    let dir = TempDir::new().unwrap();
    let defs = definitions(&dir);

    let report = defs.run_job(MATERIALIZE_ALL_JOB).await.unwrap();
    assert_eq!(report.assets.len(), 4);
    assert_eq!(report.written(), 3);

    let position = |name: &str| {
        report
            .assets
            .iter()
            .position(|o| o.asset.to_string() == name)
            .unwrap()
    };
    assert!(position("plays") < position("plays_enriched"));
    assert!(position("players") < position("plays_enriched"));

    let placeholder = &report.assets[position("placeholder")];
    assert_eq!(placeholder.status, AssetStatus::Skipped);
    assert!(!defs.store(Tier::Clean).exists("placeholder"));

    let enriched = defs.store(Tier::Clean).read("plays_enriched").unwrap();
    assert_eq!(enriched.num_rows(), 3);
    assert!(enriched.column_by_name("passer_display_name").is_some());
}

#[tokio::test]
async fn selection_without_upstream_needs_existing_files() {
    let dir = TempDir::new().unwrap();
    let defs = definitions(&dir);

    let err = defs
        .materialize(&AssetSelection::keys(["plays_enriched"]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let report = defs
        .materialize(&AssetSelection::keys(["plays_enriched"]).with_upstream())
        .await
        .unwrap();
    assert_eq!(report.written(), 3);
}

#[tokio::test]
async fn failure_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let defs = definitions(&dir)
        .with_asset(Arc::new(Broken(
            AssetSpec::new("broken", Tier::Raw).dep("placeholder"),
        )))
        .unwrap()
        .with_job(JobDefinition::new(
            "broken_job",
            AssetSelection::keys(["broken"]).with_upstream(),
        ));

    let err = defs.run_job("broken_job").await.unwrap_err();
    assert!(matches!(err, LakeError::Fetch(_)));
    assert!(!defs.store(Tier::Raw).exists("broken"));
}

#[tokio::test]
async fn unknown_job_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = definitions(&dir).run_job("nope").await.unwrap_err();
    assert!(matches!(err, LakeError::UnknownJob(name) if name == "nope"));
}
