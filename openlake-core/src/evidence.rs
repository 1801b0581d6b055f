//! Evidence source generation from dbt model files.

use crate::error::{LakeError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// For every `*.sql` model in `models_dir`, write `out_dir/{file}` containing
/// `select * from {stem};`. Returns the created paths, sorted.
pub fn generate_sources(models_dir: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    if !models_dir.is_dir() {
        return Err(LakeError::not_found(models_dir));
    }
    std::fs::create_dir_all(out_dir)?;

    let mut models: Vec<PathBuf> = std::fs::read_dir(models_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    models.sort();

    let mut created = Vec::with_capacity(models.len());
    for model in models {
        let (Some(file_name), Some(stem)) = (model.file_name(), model.file_stem()) else {
            continue;
        };
        let target = out_dir.join(file_name);
        std::fs::write(&target, format!("select * from {};\n", stem.to_string_lossy()))?;
        info!("Created: {}", target.display());
        created.push(target);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generates_one_source_per_model() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models");
        std::fs::create_dir_all(models.join("staging")).unwrap();
        std::fs::write(models.join("pbp_summary.sql"), "select 1").unwrap();
        std::fs::write(models.join("players.sql"), "select 2").unwrap();
        std::fs::write(models.join("schema.yml"), "version: 2").unwrap();

        let out = dir.path().join("app/sources/app");
        let created = generate_sources(&models, &out).unwrap();

        assert_eq!(created, vec![out.join("pbp_summary.sql"), out.join("players.sql")]);
        assert_eq!(
            std::fs::read_to_string(out.join("players.sql")).unwrap(),
            "select * from players;\n"
        );
    }

    #[test]
    fn test_missing_models_dir_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = generate_sources(&dir.path().join("nope"), dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }
}
