//! Column expressions evaluated against a record batch.

use crate::error::{LakeError, Result};
use arrow::array::{Array, ArrayRef, AsArray, StringBuilder, TimestampMicrosecondArray, new_null_array};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// A deferred column computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Copy of an existing column.
    Column(String),
    /// All-null column of the given type.
    Null(DataType),
    /// Type cast. Non-strict casts turn unconvertible values into nulls.
    Cast {
        column: String,
        to: DataType,
        strict: bool,
    },
    /// String-cast the column, then parse timestamps trying `formats` in order
    /// for every value. The first format that parses wins; values no format
    /// accepts become null.
    ParseDatetime {
        column: String,
        formats: Vec<String>,
    },
    /// String template built from literals and zero-padded column values.
    Format(Vec<FormatPart>),
}

/// One piece of an [`Expr::Format`] template.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPart {
    Literal(String),
    /// Column value rendered as a string, left-padded with `0` to `width`.
    Column { name: String, width: usize },
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn null(dtype: DataType) -> Self {
        Self::Null(dtype)
    }

    pub fn cast(column: impl Into<String>, to: DataType, strict: bool) -> Self {
        Self::Cast {
            column: column.into(),
            to,
            strict,
        }
    }

    /// Evaluate against `batch`, producing one value per row.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        match self {
            Expr::Column(name) => Ok(column(batch, name)?.clone()),
            Expr::Null(dtype) => Ok(new_null_array(dtype, batch.num_rows())),
            Expr::Cast { column: name, to, strict } => {
                let options = CastOptions {
                    safe: !strict,
                    ..Default::default()
                };
                Ok(cast_with_options(column(batch, name)?, to, &options)?)
            }
            Expr::ParseDatetime { column: name, formats } => {
                parse_datetimes(column(batch, name)?, formats)
            }
            Expr::Format(parts) => format_columns(batch, parts),
        }
    }
}

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| {
        LakeError::column_not_found(
            name,
            batch.schema_ref().fields().iter().map(|f| f.name().as_str()),
        )
    })
}

fn utf8(array: &ArrayRef) -> Result<ArrayRef> {
    Ok(cast_with_options(
        array,
        &DataType::Utf8,
        &CastOptions::default(),
    )?)
}

/// Parse `value` with a single chrono format. Date-only formats yield midnight.
pub fn parse_timestamp(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format).ok().or_else(|| {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}

fn parse_datetimes(array: &ArrayRef, formats: &[String]) -> Result<ArrayRef> {
    let strings = utf8(array)?;
    let strings = strings
        .as_string_opt::<i32>()
        .ok_or_else(|| LakeError::invalid_input("string cast did not produce Utf8"))?;

    let micros: TimestampMicrosecondArray = strings
        .iter()
        .map(|value| {
            let value = value?;
            formats
                .iter()
                .find_map(|format| parse_timestamp(value, format))
                .map(|ts| ts.and_utc().timestamp_micros())
        })
        .collect();
    Ok(Arc::new(micros))
}

fn format_columns(batch: &RecordBatch, parts: &[FormatPart]) -> Result<ArrayRef> {
    let mut rendered = Vec::with_capacity(parts.len());
    for part in parts {
        if let FormatPart::Column { name, .. } = part {
            rendered.push(utf8(column(batch, name)?)?);
        }
    }

    let mut builder = StringBuilder::with_capacity(batch.num_rows(), batch.num_rows() * 16);
    'rows: for row in 0..batch.num_rows() {
        let mut out = String::new();
        let mut next_column = 0;
        for part in parts {
            match part {
                FormatPart::Literal(text) => out.push_str(text),
                FormatPart::Column { width, .. } => {
                    let values = rendered[next_column].as_string::<i32>();
                    next_column += 1;
                    if values.is_null(row) {
                        builder.append_null();
                        continue 'rows;
                    }
                    out.push_str(&format!("{:0>width$}", values.value(row), width = *width));
                }
            }
        }
        builder.append_value(out);
    }
    Ok(Arc::new(builder.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        RecordBatch::try_new(
            Arc::new(Schema::new(fields)),
            columns.into_iter().map(|(_, a)| a).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_timestamp_date_only_is_midnight() {
        let ts = parse_timestamp("2024-09-05", "%Y-%m-%d").unwrap();
        assert_eq!(ts.to_string(), "2024-09-05 00:00:00");
        assert!(parse_timestamp("2024-09-05", "%Y%m%d").is_none());
    }

    #[test]
    fn test_non_strict_cast_nulls_bad_values() {
        let b = batch(vec![(
            "n",
            Arc::new(StringArray::from(vec![Some("7"), Some("x"), None])) as ArrayRef,
        )]);
        let out = Expr::cast("n", DataType::Int64, false).evaluate(&b).unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![Some(7), None, None]);
    }

    #[test]
    fn test_strict_cast_fails_on_bad_values() {
        let b = batch(vec![(
            "n",
            Arc::new(StringArray::from(vec!["7", "x"])) as ArrayRef,
        )]);
        assert!(Expr::cast("n", DataType::Int64, true).evaluate(&b).is_err());
    }

    #[test]
    fn test_missing_column_is_reported() {
        let b = batch(vec![("a", Arc::new(Int64Array::from(vec![1])) as ArrayRef)]);
        let err = Expr::col("b").evaluate(&b).unwrap_err();
        assert!(matches!(err, LakeError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_format_pads_and_propagates_nulls() {
        let b = batch(vec![
            ("block", Arc::new(Int64Array::from(vec![Some(12), None])) as ArrayRef),
            ("lot", Arc::new(Int64Array::from(vec![Some(3), Some(4)])) as ArrayRef),
        ]);
        let expr = Expr::Format(vec![
            FormatPart::Literal("b_".into()),
            FormatPart::Column {
                name: "block".into(),
                width: 5,
            },
            FormatPart::Literal("_".into()),
            FormatPart::Column {
                name: "lot".into(),
                width: 4,
            },
        ]);
        let out = expr.evaluate(&b).unwrap();
        let out = out.as_string::<i32>();
        assert_eq!(out.value(0), "b_00012_0003");
        assert!(out.is_null(1));
    }

    #[test]
    fn test_parse_datetime_does_not_trim_whitespace() {
        let b = batch(vec![(
            "d",
            Arc::new(StringArray::from(vec![" 2024-09-05 ", "2024-09-05"])) as ArrayRef,
        )]);
        let expr = Expr::ParseDatetime {
            column: "d".into(),
            formats: vec!["%Y-%m-%d".into()],
        };
        let out = expr.evaluate(&b).unwrap();
        assert!(out.is_null(0));
        assert!(out.is_valid(1));
    }
}
