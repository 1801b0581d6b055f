//! Deferred computation over record batches.
//!
//! A [`Plan`] describes a computation without running it. Its output schema
//! can be resolved up front (Parquet scans read only the footer), and
//! [`Plan::execute`] turns it into a stream of batches so that sinks can write
//! results without holding the whole table in memory. The right-hand side of a
//! join is the only input that is fully materialized.

use crate::error::{LakeError, Result};
use crate::frame::expr::Expr;
use crate::frame::ops::{self, JoinTable};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Default number of rows per batch when scanning.
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

/// Stream of batches produced by an executing plan.
pub type BatchStream = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// A deferred tabular computation.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Read a Parquet file.
    Scan { path: PathBuf },
    /// An in-memory batch.
    Memory(RecordBatch),
    Select {
        input: Box<Plan>,
        columns: Vec<String>,
    },
    Rename {
        input: Box<Plan>,
        mapping: Vec<(String, String)>,
    },
    WithColumns {
        input: Box<Plan>,
        exprs: Vec<(String, Expr)>,
    },
    /// Left join on a column present on both sides.
    LeftJoin {
        input: Box<Plan>,
        other: Box<Plan>,
        on: String,
    },
    /// Vertical concatenation. Inputs must share column names and types.
    Union(Vec<Plan>),
}

impl Plan {
    /// Plan a scan of the Parquet file at `path`. Fails if the file is absent.
    pub fn scan_parquet(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LakeError::not_found(path));
        }
        Ok(Self::Scan {
            path: path.to_path_buf(),
        })
    }

    pub fn select<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Select {
            input: Box::new(self),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rename(self, mapping: Vec<(String, String)>) -> Self {
        Self::Rename {
            input: Box::new(self),
            mapping,
        }
    }

    pub fn with_columns(self, exprs: Vec<(String, Expr)>) -> Self {
        Self::WithColumns {
            input: Box::new(self),
            exprs,
        }
    }

    pub fn left_join(self, other: Plan, on: impl Into<String>) -> Self {
        Self::LeftJoin {
            input: Box::new(self),
            other: Box::new(other),
            on: on.into(),
        }
    }

    pub fn union(inputs: Vec<Plan>) -> Self {
        Self::Union(inputs)
    }

    /// Resolve the output schema without reading any rows.
    ///
    /// Fails with `ColumnNotFound` if a node references a column its input
    /// lacks, and with `SchemaMismatch` for a union of incompatible inputs.
    pub fn schema(&self) -> Result<SchemaRef> {
        match self {
            Plan::Scan { path } => {
                let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
                Ok(builder.schema().clone())
            }
            Plan::Memory(batch) => Ok(batch.schema()),
            Plan::Select { input, columns } => {
                Ok(ops::select(&empty(input)?, columns)?.schema())
            }
            Plan::Rename { input, mapping } => {
                Ok(ops::rename(&empty(input)?, mapping)?.schema())
            }
            Plan::WithColumns { input, exprs } => {
                Ok(ops::with_columns(&empty(input)?, exprs)?.schema())
            }
            Plan::LeftJoin { input, other, on } => {
                let table = JoinTable::build(&empty(other)?, on)?;
                Ok(table.probe(&empty(input)?)?.schema())
            }
            Plan::Union(inputs) => union_schema(inputs),
        }
    }

    /// Column names of the output, in order.
    pub fn column_names(&self) -> Result<Vec<String>> {
        Ok(self
            .schema()?
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect())
    }

    /// Validate the plan and start executing it.
    ///
    /// Returns the output schema together with the batch stream; every batch
    /// yielded carries exactly that schema.
    pub fn execute(self, batch_size: usize) -> Result<(SchemaRef, BatchStream)> {
        let schema = self.schema()?;
        let stream = self.stream(batch_size.max(1))?;
        Ok((schema, stream))
    }

    /// Execute and gather every batch into one.
    pub fn collect(self) -> Result<RecordBatch> {
        let (schema, stream) = self.execute(DEFAULT_BATCH_SIZE)?;
        let batches = stream.collect::<Result<Vec<_>>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }

    fn stream(self, batch_size: usize) -> Result<BatchStream> {
        match self {
            Plan::Scan { path } => {
                let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
                // Reader batches may drop schema metadata; re-attach the footer schema.
                let schema = builder.schema().clone();
                let reader = builder.with_batch_size(batch_size).build()?;
                Ok(Box::new(reader.map(move |batch| -> Result<RecordBatch> {
                    let batch = batch?;
                    Ok(RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?)
                })))
            }
            Plan::Memory(batch) => Ok(Box::new(std::iter::once(Ok(batch)))),
            Plan::Select { input, columns } => {
                let upstream = input.stream(batch_size)?;
                Ok(Box::new(upstream.map(move |batch| {
                    batch.and_then(|b| ops::select(&b, &columns))
                })))
            }
            Plan::Rename { input, mapping } => {
                let upstream = input.stream(batch_size)?;
                Ok(Box::new(upstream.map(move |batch| {
                    batch.and_then(|b| ops::rename(&b, &mapping))
                })))
            }
            Plan::WithColumns { input, exprs } => {
                let upstream = input.stream(batch_size)?;
                Ok(Box::new(upstream.map(move |batch| {
                    batch.and_then(|b| ops::with_columns(&b, &exprs))
                })))
            }
            Plan::LeftJoin { input, other, on } => {
                let right = other.collect()?;
                let table = JoinTable::build(&right, &on)?;
                tracing::debug!(on = %on, keys = table.len(), "Built join table");
                let upstream = input.stream(batch_size)?;
                Ok(Box::new(
                    upstream.map(move |batch| batch.and_then(|b| table.probe(&b))),
                ))
            }
            Plan::Union(inputs) => {
                let schema = union_schema(&inputs)?;
                let streams = inputs.into_iter().map(move |plan| -> BatchStream {
                    match plan.stream(batch_size) {
                        Ok(stream) => stream,
                        Err(err) => Box::new(std::iter::once(Err(err))),
                    }
                });
                Ok(Box::new(streams.flatten().map(move |batch| {
                    batch.and_then(|b| ops::conform(&b, &schema))
                })))
            }
        }
    }
}

fn empty(plan: &Plan) -> Result<RecordBatch> {
    Ok(RecordBatch::new_empty(plan.schema()?))
}

fn union_schema(inputs: &[Plan]) -> Result<SchemaRef> {
    let (first, rest) = inputs
        .split_first()
        .ok_or_else(|| LakeError::invalid_input("cannot union zero inputs"))?;
    let reference = first.schema()?;
    for (i, plan) in rest.iter().enumerate() {
        let schema = plan.schema()?;
        if !ops::same_columns(&reference, &schema) {
            return Err(LakeError::schema_mismatch(format!(
                "union input {} has columns [{}], expected [{}]",
                i + 1,
                describe(&schema),
                describe(&reference)
            )));
        }
    }
    Ok(ops::nullable_schema(&reference))
}

fn describe(schema: &arrow::datatypes::Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
