//! Configuration system for openlake.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace `openlake.toml` -> explicit file -> environment.

use crate::error::{LakeError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// File name of the workspace-level configuration.
pub const CONFIG_FILE_NAME: &str = "openlake.toml";

/// Prefix of environment overrides (`OPENLAKE_STORAGE__ROW_GROUP_SIZE=...`).
pub const ENV_PREFIX: &str = "OPENLAKE_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LakeConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub nfl: NflConfig,
}

/// Lake directories. Relative paths are resolved against the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Storage root of the raw tier.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    /// Storage root of the clean tier.
    #[serde(default = "default_clean_dir")]
    pub clean_dir: PathBuf,
    /// Download scratch space.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// DuckDB file queried by the SQL layer.
    #[serde(default = "default_warehouse_path")]
    pub warehouse_path: PathBuf,
    /// Directory for JSON run logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// SQL model directory read by the evidence source generator.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Output directory for generated evidence sources.
    #[serde(default = "default_evidence_dir")]
    pub evidence_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            clean_dir: default_clean_dir(),
            staging_dir: default_staging_dir(),
            warehouse_path: default_warehouse_path(),
            log_dir: default_log_dir(),
            models_dir: default_models_dir(),
            evidence_dir: default_evidence_dir(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/opendata/raw")
}

fn default_clean_dir() -> PathBuf {
    PathBuf::from("data/opendata/clean")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_warehouse_path() -> PathBuf {
    PathBuf::from("data/duckdb/data.duckdb")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("transformations/dbt/models")
}

fn default_evidence_dir() -> PathBuf {
    PathBuf::from("app/sources/app")
}

impl PathsConfig {
    /// Copy with every relative path joined onto `workspace`.
    pub fn resolve(&self, workspace: &Path) -> PathsConfig {
        let abs = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace.join(p)
            }
        };
        PathsConfig {
            raw_dir: abs(&self.raw_dir),
            clean_dir: abs(&self.clean_dir),
            staging_dir: abs(&self.staging_dir),
            warehouse_path: abs(&self.warehouse_path),
            log_dir: abs(&self.log_dir),
            models_dir: abs(&self.models_dir),
            evidence_dir: abs(&self.evidence_dir),
        }
    }
}

/// Parquet writer and reader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// ZSTD compression level (1-22).
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Maximum rows per Parquet row group.
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
    /// Rows per batch when scanning.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            row_group_size: default_row_group_size(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_compression_level() -> i32 {
    3
}

fn default_row_group_size() -> usize {
    50_000
}

fn default_batch_size() -> usize {
    crate::frame::DEFAULT_BATCH_SIZE
}

/// HTTP client settings for source downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_user_agent() -> String {
    format!("openlake/{}", env!("CARGO_PKG_VERSION"))
}

/// Sources of the NFL asset family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NflConfig {
    /// Play-by-play URL with a `{year}` placeholder.
    #[serde(default = "default_pbp_url_template")]
    pub pbp_url_template: String,
    #[serde(default = "default_players_url")]
    pub players_url: String,
    /// Season of the single-season assets.
    #[serde(default = "default_current_season")]
    pub current_season: u16,
    /// First season of the multi-season union (inclusive).
    #[serde(default = "default_first_season")]
    pub first_season: u16,
    /// Player roles joined onto play-by-play rows.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
}

impl Default for NflConfig {
    fn default() -> Self {
        Self {
            pbp_url_template: default_pbp_url_template(),
            players_url: default_players_url(),
            current_season: default_current_season(),
            first_season: default_first_season(),
            roles: default_roles(),
        }
    }
}

fn default_pbp_url_template() -> String {
    "https://github.com/nflverse/nflverse-data/releases/download/pbp/play_by_play_{year}.parquet"
        .to_string()
}

fn default_players_url() -> String {
    "https://github.com/nflverse/nflverse-data/releases/download/players/players.parquet"
        .to_string()
}

fn default_current_season() -> u16 {
    2024
}

fn default_first_season() -> u16 {
    2014
}

fn default_roles() -> Vec<String> {
    vec!["passer".into(), "rusher".into(), "receiver".into()]
}

impl NflConfig {
    pub fn pbp_url(&self, season: u16) -> String {
        self.pbp_url_template.replace("{year}", &season.to_string())
    }

    /// Seasons covered by the multi-season union.
    pub fn seasons(&self) -> RangeInclusive<u16> {
        self.first_season..=self.current_season
    }
}

impl LakeConfig {
    /// Reject settings the store and assets cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=22).contains(&self.storage.compression_level) {
            return Err(LakeError::Config(format!(
                "storage.compression_level must be within 1..=22, got {}",
                self.storage.compression_level
            )));
        }
        if self.storage.row_group_size == 0 {
            return Err(LakeError::Config(
                "storage.row_group_size must be positive".into(),
            ));
        }
        if self.storage.batch_size == 0 {
            return Err(LakeError::Config(
                "storage.batch_size must be positive".into(),
            ));
        }
        if self.nfl.first_season > self.nfl.current_season {
            return Err(LakeError::Config(format!(
                "nfl.first_season ({}) is after nfl.current_season ({})",
                self.nfl.first_season, self.nfl.current_season
            )));
        }
        if !self.nfl.pbp_url_template.contains("{year}") {
            return Err(LakeError::Config(
                "nfl.pbp_url_template must contain a {year} placeholder".into(),
            ));
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "openlake", "openlake")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `OPENLAKE_`, `__` separates levels)
/// 2. Explicit config file
/// 3. Workspace config (`openlake.toml`)
/// 4. User config (`~/.config/openlake/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> std::result::Result<LakeConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(LakeConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE_NAME);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment.extract().map_err(Box::new)
}

/// Write the default configuration to `<workspace>/openlake.toml`.
///
/// Returns `Ok(None)` when the file already exists.
pub fn write_default_config(workspace: &Path) -> Result<Option<PathBuf>> {
    let path = workspace.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Ok(None);
    }
    let toml_str = toml::to_string_pretty(&LakeConfig::default())
        .map_err(|e| LakeError::Config(e.to_string()))?;
    std::fs::write(&path, toml_str)?;
    Ok(Some(path))
}
