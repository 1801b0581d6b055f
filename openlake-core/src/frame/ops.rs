//! Batch-level kernels shared by eager frames and plan execution.
//!
//! Every kernel takes a batch and returns a new one; an empty batch yields the
//! output schema, which is how plans resolve their schema without data.

use crate::error::{LakeError, Result};
use crate::frame::expr::{Expr, column};
use arrow::array::{ArrayRef, AsArray, UInt32Array, new_null_array};
use arrow::compute::{can_cast_types, cast, take};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Suffix appended to right-hand columns that collide with left-hand names.
pub const JOIN_SUFFIX: &str = "_right";

fn assemble(fields: Vec<FieldRef>, columns: Vec<ArrayRef>, rows: usize) -> Result<RecordBatch> {
    let mut seen = HashSet::new();
    for field in &fields {
        if !seen.insert(field.name().as_str()) {
            return Err(LakeError::schema_mismatch(format!(
                "duplicate column name: {}",
                field.name()
            )));
        }
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &options,
    )?)
}

/// Keep only `columns`, in the given order.
pub fn select(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for name in columns {
        let (idx, field) = schema.column_with_name(name).ok_or_else(|| {
            LakeError::column_not_found(name, schema.fields().iter().map(|f| f.name().as_str()))
        })?;
        fields.push(Arc::new(field.clone()));
        arrays.push(batch.column(idx).clone());
    }
    assemble(fields, arrays, batch.num_rows())
}

/// Rename columns per `mapping`. Names not present in the batch are ignored.
pub fn rename(batch: &RecordBatch, mapping: &[(String, String)]) -> Result<RecordBatch> {
    let lookup: HashMap<&str, &str> = mapping
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    let fields = batch
        .schema_ref()
        .fields()
        .iter()
        .map(|field| match lookup.get(field.name().as_str()) {
            Some(to) => Arc::new(field.as_ref().clone().with_name(*to)),
            None => field.clone(),
        })
        .collect();
    assemble(fields, batch.columns().to_vec(), batch.num_rows())
}

/// Add or replace columns. A replaced column keeps its position; new columns
/// are appended in order.
pub fn with_columns(batch: &RecordBatch, exprs: &[(String, Expr)]) -> Result<RecordBatch> {
    let mut fields: Vec<FieldRef> = batch.schema_ref().fields().iter().cloned().collect();
    let mut arrays = batch.columns().to_vec();
    for (name, expr) in exprs {
        let array = expr.evaluate(batch)?;
        let field = Arc::new(Field::new(name, array.data_type().clone(), true));
        match fields.iter().position(|f| f.name() == name) {
            Some(idx) => {
                fields[idx] = field;
                arrays[idx] = array;
            }
            None => {
                fields.push(field);
                arrays.push(array);
            }
        }
    }
    assemble(fields, arrays, batch.num_rows())
}

/// Shape `batch` to `target`: columns are reordered to match, missing ones are
/// filled with typed nulls, differing types are cast (columns with no cast
/// to the target type become null), and extra columns are dropped.
pub fn conform(batch: &RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let mut arrays = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        let array = match batch.column_by_name(field.name()) {
            Some(array) if array.data_type() == field.data_type() => array.clone(),
            Some(array) if can_cast_types(array.data_type(), field.data_type()) => {
                cast(array, field.data_type())?
            }
            _ => new_null_array(field.data_type(), rows),
        };
        arrays.push(array);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        target.clone(),
        arrays,
        &options,
    )?)
}

/// `schema` with every field nullable and metadata dropped.
pub fn nullable_schema(schema: &Schema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), f.data_type().clone(), true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Whether two schemas carry the same column names and types in the same
/// order. Nullability and metadata are ignored.
pub fn same_columns(a: &Schema, b: &Schema) -> bool {
    a.fields().len() == b.fields().len()
        && a.fields()
            .iter()
            .zip(b.fields().iter())
            .all(|(x, y)| x.name() == y.name() && x.data_type() == y.data_type())
}

/// Hash table over the right-hand side of a left join.
///
/// Keys are compared on their string rendering; null keys never match.
#[derive(Debug, Clone)]
pub struct JoinTable {
    on: String,
    payload: RecordBatch,
    index: HashMap<String, Vec<u32>>,
}

impl JoinTable {
    pub fn build(right: &RecordBatch, on: &str) -> Result<Self> {
        let keys = cast(column(right, on)?, &DataType::Utf8)?;
        let mut index: HashMap<String, Vec<u32>> = HashMap::new();
        for (row, key) in keys.as_string::<i32>().iter().enumerate() {
            if let Some(key) = key {
                index.entry(key.to_string()).or_default().push(row as u32);
            }
        }

        let payload_columns: Vec<String> = right
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|name| name != on)
            .collect();
        let payload = select(right, &payload_columns)?;

        Ok(Self {
            on: on.to_string(),
            payload,
            index,
        })
    }

    /// Number of distinct non-null keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Left-join `left` against the table. Every left row appears at least
    /// once; a left row with `n > 1` matches appears `n` times.
    pub fn probe(&self, left: &RecordBatch) -> Result<RecordBatch> {
        let keys = cast(column(left, &self.on)?, &DataType::Utf8)?;
        let mut left_rows: Vec<u32> = Vec::with_capacity(left.num_rows());
        let mut right_rows: Vec<Option<u32>> = Vec::with_capacity(left.num_rows());
        for (row, key) in keys.as_string::<i32>().iter().enumerate() {
            match key.and_then(|k| self.index.get(k)) {
                Some(matches) => {
                    for m in matches {
                        left_rows.push(row as u32);
                        right_rows.push(Some(*m));
                    }
                }
                None => {
                    left_rows.push(row as u32);
                    right_rows.push(None);
                }
            }
        }
        let left_rows = UInt32Array::from(left_rows);
        let right_rows = UInt32Array::from(right_rows);
        let rows = left_rows.len();

        let mut fields: Vec<FieldRef> = left.schema_ref().fields().iter().cloned().collect();
        let mut arrays = Vec::with_capacity(fields.len() + self.payload.num_columns());
        for array in left.columns() {
            arrays.push(take(array.as_ref(), &left_rows, None)?);
        }

        let left_names: HashSet<&str> = left
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        let mut right_fields = Vec::with_capacity(self.payload.num_columns());
        for field in self.payload.schema_ref().fields() {
            let name = if left_names.contains(field.name().as_str()) {
                format!("{}{JOIN_SUFFIX}", field.name())
            } else {
                field.name().clone()
            };
            right_fields.push(Arc::new(Field::new(name, field.data_type().clone(), true)));
        }
        for array in self.payload.columns() {
            arrays.push(take(array.as_ref(), &right_rows, None)?);
        }
        fields.extend(right_fields);

        assemble(fields, arrays, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use pretty_assertions::assert_eq;

    fn names(batch: &RecordBatch) -> Vec<String> {
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    fn people() -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            ("id", Arc::new(StringArray::from(vec!["a", "b", "c"])) as ArrayRef),
            ("age", Arc::new(Int64Array::from(vec![30, 40, 50])) as ArrayRef),
        ])
        .unwrap()
    }

    #[test]
    fn test_select_reorders() {
        let out = select(&people(), &["age".into(), "id".into()]).unwrap();
        assert_eq!(names(&out), vec!["age", "id"]);
    }

    #[test]
    fn test_select_all_columns_away_keeps_row_count() {
        let out = select(&people(), &[]).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.num_columns(), 0);
    }

    #[test]
    fn test_rename_ignores_absent_names() {
        let mapping = vec![
            ("id".to_string(), "person_id".to_string()),
            ("nope".to_string(), "x".to_string()),
        ];
        let out = rename(&people(), &mapping).unwrap();
        assert_eq!(names(&out), vec!["person_id", "age"]);
    }

    #[test]
    fn test_rename_into_existing_name_is_rejected() {
        let mapping = vec![("id".to_string(), "age".to_string())];
        assert!(rename(&people(), &mapping).is_err());
    }

    #[test]
    fn test_with_columns_replaces_in_place() {
        let exprs = vec![
            ("age".to_string(), Expr::cast("age", DataType::Utf8, true)),
            ("copy".to_string(), Expr::col("id")),
        ];
        let out = with_columns(&people(), &exprs).unwrap();
        assert_eq!(names(&out), vec!["id", "age", "copy"]);
        assert_eq!(out.column(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_conform_pads_and_drops() {
        let target = Arc::new(Schema::new(vec![
            Field::new("age", DataType::Int64, true),
            Field::new("city", DataType::Utf8, true),
        ]));
        let out = conform(&people(), &target).unwrap();
        assert_eq!(names(&out), vec!["age", "city"]);
        assert_eq!(out.column(1).null_count(), 3);
    }

    #[test]
    fn test_probe_keeps_unmatched_rows() {
        let right = RecordBatch::try_from_iter(vec![
            ("id", Arc::new(StringArray::from(vec!["a", "c"])) as ArrayRef),
            ("age", Arc::new(Int64Array::from(vec![1, 3])) as ArrayRef),
        ])
        .unwrap();
        let table = JoinTable::build(&right, "id").unwrap();
        assert_eq!(table.len(), 2);

        let out = table.probe(&people()).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(names(&out), vec!["id", "age", "age_right"]);
        let joined = out
            .column(2)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(joined.iter().collect::<Vec<_>>(), vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn test_probe_duplicates_on_repeated_keys() {
        let right = RecordBatch::try_from_iter(vec![
            ("id", Arc::new(StringArray::from(vec!["a", "a"])) as ArrayRef),
            ("tag", Arc::new(StringArray::from(vec!["x", "y"])) as ArrayRef),
        ])
        .unwrap();
        let out = JoinTable::build(&right, "id")
            .unwrap()
            .probe(&people())
            .unwrap();
        assert_eq!(out.num_rows(), 4);
    }
}
