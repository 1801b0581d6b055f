//! Asset definitions: named units of data production.
//!
//! An [`Asset`] describes itself with an [`AssetSpec`] and produces an
//! optional [`Frame`] when materialized. The runner persists that frame with
//! the store of the asset's [`Tier`].

pub mod nfl;

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::frame::{Frame, Plan};
use crate::store::SingleFileParquetStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage tier of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Unmodified ingested data.
    Raw,
    /// Derived or enriched data.
    Clean,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Raw => write!(f, "raw"),
            Tier::Clean => write!(f, "clean"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Tier::Raw),
            "clean" => Ok(Tier::Clean),
            other => Err(format!("unknown tier '{other}' (expected raw or clean)")),
        }
    }
}

/// Hierarchical asset key. Single-segment keys are the common case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKey(Vec<String>);

impl AssetKey {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(path.into_iter().map(Into::into).collect())
    }

    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// Name used for the asset's directory and file in a store.
    pub fn to_identifier(&self) -> String {
        self.0.join("__")
    }
}

impl From<&str> for AssetKey {
    fn from(name: &str) -> Self {
        Self(name.split('/').map(str::to_string).collect())
    }
}

impl From<String> for AssetKey {
    fn from(name: String) -> Self {
        AssetKey::from(name.as_str())
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Static description of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub key: AssetKey,
    pub tier: Tier,
    pub group: Option<String>,
    pub description: Option<String>,
    pub deps: Vec<AssetKey>,
    pub metadata: BTreeMap<String, String>,
}

impl AssetSpec {
    pub fn new(key: impl Into<AssetKey>, tier: Tier) -> Self {
        Self {
            key: key.into(),
            tier,
            group: None,
            description: None,
            deps: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn dep(mut self, dep: impl Into<AssetKey>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> String {
        self.key.to_identifier()
    }
}

/// Everything an asset may touch while it materializes.
#[derive(Debug, Clone)]
pub struct AssetContext {
    pub asset: AssetKey,
    raw: SingleFileParquetStore,
    clean: SingleFileParquetStore,
    fetcher: Fetcher,
}

impl AssetContext {
    pub fn new(
        asset: AssetKey,
        raw: SingleFileParquetStore,
        clean: SingleFileParquetStore,
        fetcher: Fetcher,
    ) -> Self {
        Self {
            asset,
            raw,
            clean,
            fetcher,
        }
    }

    pub fn store(&self, tier: Tier) -> &SingleFileParquetStore {
        match tier {
            Tier::Raw => &self.raw,
            Tier::Clean => &self.clean,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Deferred scan of an upstream asset already written to `tier`.
    pub fn scan_upstream(&self, tier: Tier, asset: &str) -> Result<Plan> {
        self.store(tier).scan(asset)
    }
}

/// A materializable asset.
#[async_trait]
pub trait Asset: Send + Sync {
    fn spec(&self) -> &AssetSpec;

    /// Produce the asset's data. `Ok(None)` means there is nothing to write.
    async fn materialize(&self, ctx: &AssetContext) -> Result<Option<Frame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key_display_and_identifier() {
        let key = AssetKey::from("nfl/pbp");
        assert_eq!(key.to_string(), "nfl/pbp");
        assert_eq!(key.to_identifier(), "nfl__pbp");
        assert_eq!(AssetKey::from("nfl_players_raw").to_identifier(), "nfl_players_raw");
    }

    #[test]
    fn test_spec_builder() {
        let spec = AssetSpec::new("nfl_pbp_2024", Tier::Clean)
            .group("NFL")
            .dep("nfl_pbp_2024_raw")
            .metadata("r2_type", "single");
        assert_eq!(spec.name(), "nfl_pbp_2024");
        assert_eq!(spec.deps, vec![AssetKey::from("nfl_pbp_2024_raw")]);
        assert_eq!(spec.metadata.get("r2_type").map(String::as_str), Some("single"));
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("RAW".parse::<Tier>().unwrap(), Tier::Raw);
        assert!("warm".parse::<Tier>().is_err());
    }
}
