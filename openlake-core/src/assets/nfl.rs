//! NFL play-by-play assets built from nflverse release files.

use super::{Asset, AssetContext, AssetSpec, Tier};
use crate::config::NflConfig;
use crate::error::Result;
use crate::frame::{Frame, Plan};
use crate::transform::{concat_reconciled, enrich_roles, players_lookup};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const GROUP: &str = "NFL";
pub const PLAYERS_RAW: &str = "nfl_players_raw";
pub const TEN_YEARS: &str = "nfl_pbp_ten_years";

/// Raw play-by-play asset name for one season.
pub fn season_raw_name(season: u16) -> String {
    format!("nfl_pbp_{season}_raw")
}

/// Enriched play-by-play asset name for one season.
pub fn season_name(season: u16) -> String {
    format!("nfl_pbp_{season}")
}

/// Name of the combined multi-season raw table.
pub fn combined_raw_name(first: u16, last: u16) -> String {
    format!("nfl_pbp_{first}_{last}_raw")
}

/// Every NFL asset, in declaration order.
pub fn nfl_assets(config: &NflConfig) -> Vec<Arc<dyn Asset>> {
    let current = config.current_season;
    let combined = combined_raw_name(config.first_season, current);

    vec![
        Arc::new(ParquetDownload {
            spec: AssetSpec::new(season_raw_name(current), Tier::Raw)
                .group(GROUP)
                .description(format!("Raw {current} play-by-play parquet.")),
            url: config.pbp_url(current),
        }),
        Arc::new(ParquetDownload {
            spec: AssetSpec::new(PLAYERS_RAW, Tier::Raw)
                .group(GROUP)
                .description("Raw player reference table."),
            url: config.players_url.clone(),
        }),
        Arc::new(RoleEnrichment {
            spec: AssetSpec::new(season_name(current), Tier::Clean)
                .group(GROUP)
                .description(format!("{current} PBP enriched with player names & positions."))
                .dep(season_raw_name(current))
                .dep(PLAYERS_RAW)
                .metadata("r2_type", "single"),
            source: (Tier::Raw, season_raw_name(current)),
            roles: config.roles.clone(),
        }),
        Arc::new(SeasonUnion {
            spec: AssetSpec::new(combined.clone(), Tier::Clean)
                .group(GROUP)
                .description(format!(
                    "Combined {}-{current} play-by-play (deferred union).",
                    config.first_season
                ))
                .metadata("r2_type", "single"),
            urls: config.seasons().map(|season| config.pbp_url(season)).collect(),
        }),
        Arc::new(RoleEnrichment {
            spec: AssetSpec::new(TEN_YEARS, Tier::Clean)
                .group(GROUP)
                .description(format!(
                    "{}-{current} PBP enriched with player metadata.",
                    config.first_season
                ))
                .dep(combined.clone())
                .dep(PLAYERS_RAW)
                .metadata("r2_type", "single"),
            source: (Tier::Clean, combined),
            roles: config.roles.clone(),
        }),
    ]
}

/// Downloads one Parquet file and returns it in memory.
pub struct ParquetDownload {
    spec: AssetSpec,
    url: String,
}

#[async_trait]
impl Asset for ParquetDownload {
    fn spec(&self) -> &AssetSpec {
        &self.spec
    }

    async fn materialize(&self, ctx: &AssetContext) -> Result<Option<Frame>> {
        let path = ctx.fetcher().download(&self.url).await?;
        let batch =
            tokio::task::spawn_blocking(move || Plan::scan_parquet(&path)?.collect()).await??;
        Ok(Some(batch.into()))
    }
}

/// Enriches a play-by-play table with player metadata for each role.
pub struct RoleEnrichment {
    spec: AssetSpec,
    source: (Tier, String),
    roles: Vec<String>,
}

#[async_trait]
impl Asset for RoleEnrichment {
    fn spec(&self) -> &AssetSpec {
        &self.spec
    }

    async fn materialize(&self, ctx: &AssetContext) -> Result<Option<Frame>> {
        let (tier, name) = &self.source;
        let pbp = ctx.scan_upstream(*tier, name)?;
        let players = ctx.scan_upstream(Tier::Raw, PLAYERS_RAW)?;
        let lookup = players_lookup(players.into())?;
        let enriched = enrich_roles(pbp.into(), lookup, &self.roles)?;
        info!(asset = %ctx.asset, roles = ?self.roles, "Enrichment plan built lazily");
        Ok(Some(enriched))
    }
}

/// Downloads several seasons and unions them with reconciled schemas.
pub struct SeasonUnion {
    spec: AssetSpec,
    urls: Vec<String>,
}

#[async_trait]
impl Asset for SeasonUnion {
    fn spec(&self) -> &AssetSpec {
        &self.spec
    }

    async fn materialize(&self, ctx: &AssetContext) -> Result<Option<Frame>> {
        let mut paths = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            paths.push(ctx.fetcher().download(url).await?);
        }
        let seasons = paths.len();
        let combined = tokio::task::spawn_blocking(move || {
            let frames = paths
                .iter()
                .map(|path| Plan::scan_parquet(path).map(Frame::from))
                .collect::<Result<Vec<_>>>()?;
            concat_reconciled(frames)
        })
        .await??;
        info!(asset = %ctx.asset, seasons, "Combined play-by-play defined lazily");
        Ok(Some(combined))
    }
}
