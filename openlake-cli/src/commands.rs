//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use arrow::util::pretty::pretty_format_batches;
use openlake_core::config::write_default_config;
use openlake_core::evidence::generate_sources;
use openlake_core::{AssetSelection, AssetStatus, Definitions, LakeConfig, RunReport, Tier};
use std::path::Path;
use tracing::{error, info};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config: &LakeConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Materialize {
            job,
            select,
            group,
            with_upstream,
            json,
        } => {
            let selection = match (select.is_empty(), group) {
                (false, _) => AssetSelection::Keys(select),
                (true, Some(group)) => AssetSelection::Group(group),
                (true, None) => AssetSelection::All,
            };
            let selection = if with_upstream {
                selection.with_upstream()
            } else {
                selection
            };
            handle_materialize(job, selection, json, workspace, config).await
        }
        Commands::Assets => handle_assets(workspace, config),
        Commands::Jobs => handle_jobs(workspace, config),
        Commands::Read { asset, tier, limit } => handle_read(&asset, tier, limit, workspace, config),
        Commands::Paths => handle_paths(workspace, config),
        Commands::Config { action } => handle_config(action, workspace, config),
        Commands::Evidence => handle_evidence(workspace, config),
    }
}

fn resolved(config: &LakeConfig, workspace: &Path) -> LakeConfig {
    LakeConfig {
        paths: config.paths.resolve(workspace),
        ..config.clone()
    }
}

fn definitions(workspace: &Path, config: &LakeConfig) -> anyhow::Result<Definitions> {
    Ok(Definitions::from_config(&resolved(config, workspace))?)
}

async fn handle_materialize(
    job: Option<String>,
    selection: AssetSelection,
    json: bool,
    workspace: &Path,
    config: &LakeConfig,
) -> anyhow::Result<()> {
    let defs = definitions(workspace, config)?;
    let result = match &job {
        Some(job) => {
            info!(job = %job, "Materializing job");
            defs.run_job(job).await
        }
        None => {
            info!(?selection, "Materializing selection");
            defs.materialize(&selection).await
        }
    };
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "Materialize failed");
            return Err(err.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for outcome in &report.assets {
        match &outcome.status {
            AssetStatus::Written { path, rows, bytes } => println!(
                "  {:<28} {:>5}  {rows:>10} rows  {bytes:>12} bytes  {}",
                outcome.asset.to_string(),
                outcome.tier.to_string(),
                path.display()
            ),
            AssetStatus::Skipped => println!(
                "  {:<28} {:>5}  skipped (no data)",
                outcome.asset.to_string(),
                outcome.tier.to_string()
            ),
        }
    }
    let elapsed = report.finished_at - report.started_at;
    println!(
        "{} of {} assets written in {:.1}s",
        report.written(),
        report.assets.len(),
        elapsed.num_milliseconds() as f64 / 1000.0
    );
}

fn handle_assets(workspace: &Path, config: &LakeConfig) -> anyhow::Result<()> {
    let defs = definitions(workspace, config)?;
    for asset in defs.graph().execution_order(&AssetSelection::All)? {
        let spec = asset.spec();
        let deps = spec
            .deps
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:<28} {:>5}  {:<6} deps: [{}]",
            spec.key.to_string(),
            spec.tier.to_string(),
            spec.group.as_deref().unwrap_or("-"),
            deps
        );
        if let Some(description) = &spec.description {
            println!("      {description}");
        }
    }
    Ok(())
}

fn handle_jobs(workspace: &Path, config: &LakeConfig) -> anyhow::Result<()> {
    let defs = definitions(workspace, config)?;
    for job in defs.jobs() {
        println!(
            "  {:<32} {}",
            job.name,
            job.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn handle_read(
    asset: &str,
    tier: Tier,
    limit: usize,
    workspace: &Path,
    config: &LakeConfig,
) -> anyhow::Result<()> {
    let defs = definitions(workspace, config)?;
    let batch = defs.store(tier).read(asset)?;
    let total = batch.num_rows();
    let head = batch.slice(0, limit.min(total));
    println!("{}", pretty_format_batches(&[head])?);
    println!("{} of {total} rows", limit.min(total));
    Ok(())
}

fn handle_paths(workspace: &Path, config: &LakeConfig) -> anyhow::Result<()> {
    let defs = definitions(workspace, config)?;
    for spec in defs.graph().specs() {
        let store = defs.store(spec.tier);
        let name = spec.name();
        let marker = if store.exists(&name) { "*" } else { " " };
        println!("{marker} {:<28} {}", name, store.asset_path(&name).display());
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path, config: &LakeConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            match write_default_config(workspace)? {
                Some(path) => println!("Created default configuration at: {}", path.display()),
                None => println!(
                    "Configuration file already exists at: {}",
                    workspace.join(openlake_core::config::CONFIG_FILE_NAME).display()
                ),
            }
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn handle_evidence(workspace: &Path, config: &LakeConfig) -> anyhow::Result<()> {
    let paths = config.paths.resolve(workspace);
    let created = generate_sources(&paths.models_dir, &paths.evidence_dir)?;
    println!("Generated {} evidence source(s)", created.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openlake_core::config::CONFIG_FILE_NAME;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, &LakeConfig::default())
            .await
            .unwrap();

        let content = std::fs::read_to_string(workspace.join(CONFIG_FILE_NAME)).unwrap();
        let parsed: LakeConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, LakeConfig::default());
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        std::fs::write(workspace.join(CONFIG_FILE_NAME), "[storage]\nrow_group_size = 10\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, &LakeConfig::default())
            .await
            .unwrap();

        let content = std::fs::read_to_string(workspace.join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(content, "[storage]\nrow_group_size = 10\n");
    }

    #[tokio::test]
    async fn test_evidence_writes_into_workspace() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let models = workspace.join("transformations/dbt/models");
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(models.join("nfl_summary.sql"), "select 1").unwrap();

        handle_command(Commands::Evidence, workspace, &LakeConfig::default())
            .await
            .unwrap();

        let generated = workspace.join("app/sources/app/nfl_summary.sql");
        assert_eq!(
            std::fs::read_to_string(generated).unwrap(),
            "select * from nfl_summary;\n"
        );
    }

    #[tokio::test]
    async fn test_read_missing_asset_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Read {
            asset: "nfl_players_raw".into(),
            tier: Tier::Raw,
            limit: 5,
        };
        let err = handle_command(command, dir.path(), &LakeConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nfl_players_raw.parquet"));
    }

    #[tokio::test]
    async fn test_materialize_unknown_asset_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Materialize {
            job: None,
            select: vec!["nfl_pbp_1999".into()],
            group: None,
            with_upstream: false,
            json: false,
        };
        let err = handle_command(command, dir.path(), &LakeConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nfl_pbp_1999"));
    }

    #[tokio::test]
    async fn test_listing_commands_succeed() {
        let dir = TempDir::new().unwrap();
        for command in [Commands::Assets, Commands::Jobs, Commands::Paths] {
            handle_command(command, dir.path(), &LakeConfig::default())
                .await
                .unwrap();
        }
    }
}
