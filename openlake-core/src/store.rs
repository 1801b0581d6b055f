//! Single-file Parquet store: one file per asset under a storage root.
//!
//! Layout: `{base_dir}/{asset}/{asset}.parquet`. Writes go to a temporary
//! sibling and are renamed into place, so readers never see a half-written
//! file. At most one writer per asset is assumed.

use crate::config::StorageConfig;
use crate::error::{LakeError, Result};
use crate::frame::{Frame, Plan};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// File extension of stored assets.
pub const EXTENSION: &str = "parquet";

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: u64,
}

/// Store that keeps exactly one Parquet file per asset.
#[derive(Debug, Clone)]
pub struct SingleFileParquetStore {
    base_dir: PathBuf,
    options: StorageConfig,
}

impl SingleFileParquetStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            options: StorageConfig::default(),
        }
    }

    pub fn with_options(mut self, options: StorageConfig) -> Self {
        self.options = options;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn options(&self) -> &StorageConfig {
        &self.options
    }

    /// Directory holding the asset's file.
    pub fn asset_dir(&self, asset: &str) -> PathBuf {
        self.base_dir.join(asset)
    }

    /// Deterministic file path of the asset.
    pub fn asset_path(&self, asset: &str) -> PathBuf {
        self.asset_dir(asset).join(format!("{asset}.{EXTENSION}"))
    }

    pub fn exists(&self, asset: &str) -> bool {
        self.asset_path(asset).is_file()
    }

    /// Persist `payload` as the asset's file.
    ///
    /// `None` is a no-op and returns `Ok(None)`. Deferred frames are executed
    /// batch by batch straight into the Parquet writer.
    pub fn write(&self, asset: &str, payload: Option<Frame>) -> Result<Option<WriteReport>> {
        let Some(frame) = payload else {
            info!(asset, "No data to write (None)");
            return Ok(None);
        };

        std::fs::create_dir_all(self.asset_dir(asset))?;
        let path = self.asset_path(asset);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));

        let rows = match self.write_file(&tmp, frame) {
            Ok(rows) => rows,
            Err(err) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(err);
            }
        };
        std::fs::rename(&tmp, &path)?;
        let bytes = std::fs::metadata(&path)?.len();

        info!(asset, rows, bytes, "Wrote {rows} rows → {}", path.display());
        Ok(Some(WriteReport { path, rows, bytes }))
    }

    fn write_file(&self, path: &Path, frame: Frame) -> Result<usize> {
        let file = File::create(path)?;
        match frame {
            Frame::Materialized(batch) => {
                let mut writer = self.writer(file, batch.schema())?;
                writer.write(&batch)?;
                writer.close()?;
                Ok(batch.num_rows())
            }
            Frame::Deferred(plan) => {
                let (schema, stream) = plan.execute(self.options.batch_size)?;
                let mut writer = self.writer(file, schema)?;
                let mut rows = 0;
                for batch in stream {
                    let batch = batch?;
                    rows += batch.num_rows();
                    writer.write(&batch)?;
                }
                writer.close()?;
                Ok(rows)
            }
        }
    }

    fn writer(&self, file: File, schema: SchemaRef) -> Result<ArrowWriter<File>> {
        let level = ZstdLevel::try_new(self.options.compression_level)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(self.options.row_group_size.max(1))
            .build();
        Ok(ArrowWriter::try_new(file, schema, Some(props))?)
    }

    /// Load the asset's whole file into memory.
    pub fn read(&self, asset: &str) -> Result<RecordBatch> {
        let path = self.asset_path(asset);
        if !path.is_file() {
            return Err(LakeError::not_found(path));
        }
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        let schema = builder.schema().clone();
        let reader = builder.with_batch_size(self.options.batch_size).build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        let batch = concat_batches(&schema, &batches)?;
        info!(asset, rows = batch.num_rows(), "Loaded {} rows ← {}", batch.num_rows(), path.display());
        Ok(batch)
    }

    /// Plan a deferred scan of the asset's file.
    pub fn scan(&self, asset: &str) -> Result<Plan> {
        Plan::scan_parquet(self.asset_path(asset))
    }
}
