//! Tabular frames: eager record batches or deferred plans.

pub mod expr;
pub mod ops;
pub mod plan;

pub use expr::{Expr, FormatPart};
pub use plan::{BatchStream, DEFAULT_BATCH_SIZE, Plan};

use crate::error::{LakeError, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

/// A table that is either already in memory or still a plan.
///
/// Operations keep the variant: eager frames are transformed immediately,
/// deferred frames grow their plan.
#[derive(Debug, Clone)]
pub enum Frame {
    Materialized(RecordBatch),
    Deferred(Plan),
}

impl From<RecordBatch> for Frame {
    fn from(batch: RecordBatch) -> Self {
        Frame::Materialized(batch)
    }
}

impl From<Plan> for Frame {
    fn from(plan: Plan) -> Self {
        Frame::Deferred(plan)
    }
}

impl Frame {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Frame::Deferred(_))
    }

    pub fn schema(&self) -> Result<SchemaRef> {
        match self {
            Frame::Materialized(batch) => Ok(batch.schema()),
            Frame::Deferred(plan) => plan.schema(),
        }
    }

    /// Column names without evaluating a deferred frame.
    pub fn column_names(&self) -> Result<Vec<String>> {
        Ok(self
            .schema()?
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect())
    }

    /// Row count of an eager frame; `None` for a deferred one.
    pub fn num_rows(&self) -> Option<usize> {
        match self {
            Frame::Materialized(batch) => Some(batch.num_rows()),
            Frame::Deferred(_) => None,
        }
    }

    pub fn select<I, S>(self, columns: I) -> Result<Frame>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        match self {
            Frame::Materialized(batch) => Ok(ops::select(&batch, &columns)?.into()),
            Frame::Deferred(plan) => Ok(plan.select(columns).into()),
        }
    }

    /// Rename columns; names missing from the frame are skipped.
    pub fn rename(self, mapping: Vec<(String, String)>) -> Result<Frame> {
        match self {
            Frame::Materialized(batch) => Ok(ops::rename(&batch, &mapping)?.into()),
            Frame::Deferred(plan) => Ok(plan.rename(mapping).into()),
        }
    }

    pub fn with_columns(self, exprs: Vec<(String, Expr)>) -> Result<Frame> {
        match self {
            Frame::Materialized(batch) => Ok(ops::with_columns(&batch, &exprs)?.into()),
            Frame::Deferred(plan) => Ok(plan.with_columns(exprs).into()),
        }
    }

    pub fn with_column(self, name: impl Into<String>, expr: Expr) -> Result<Frame> {
        self.with_columns(vec![(name.into(), expr)])
    }

    /// Left join on `on`. The result is eager only when both sides are.
    pub fn left_join(self, other: Frame, on: &str) -> Result<Frame> {
        match (self, other) {
            (Frame::Materialized(left), Frame::Materialized(right)) => {
                let table = ops::JoinTable::build(&right, on)?;
                Ok(table.probe(&left)?.into())
            }
            (left, right) => Ok(left.lazy().left_join(right.lazy(), on).into()),
        }
    }

    /// The frame as a plan, wrapping eager data in a memory node.
    pub fn lazy(self) -> Plan {
        match self {
            Frame::Materialized(batch) => Plan::Memory(batch),
            Frame::Deferred(plan) => plan,
        }
    }

    /// Evaluate into a single batch.
    pub fn collect(self) -> Result<RecordBatch> {
        match self {
            Frame::Materialized(batch) => Ok(batch),
            Frame::Deferred(plan) => plan.collect(),
        }
    }

    /// Vertical concatenation. Column names and types must match in order;
    /// see [`crate::transform::concat_reconciled`] for the padding variant.
    pub fn concat(frames: Vec<Frame>) -> Result<Frame> {
        if frames.is_empty() {
            return Err(LakeError::invalid_input("cannot concatenate zero frames"));
        }
        let eager = frames.iter().all(|f| !f.is_deferred());
        let plan = Plan::union(frames.into_iter().map(Frame::lazy).collect());
        if eager {
            return Ok(plan.collect()?.into());
        }
        Ok(plan.into())
    }
}
