//! Tabular transform helpers shared by asset definitions.
//!
//! Every helper accepts an eager or deferred [`Frame`] and returns a new frame
//! of the same kind; inputs are never mutated.

use crate::error::{LakeError, Result};
use crate::frame::ops;
use crate::frame::{Expr, FormatPart, Frame};
use arrow::compute::can_cast_types;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Timestamp formats tried by [`multi_parse_date`], in priority order.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d",
    "%Y%m%d",
];

/// Columns kept from a players reference table.
pub const PLAYER_LOOKUP_COLUMNS: [&str; 3] = ["gsis_id", "display_name", "position"];

/// Lower-case a column name and turn spaces and hyphens into underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase().replace([' ', '-'], "_")
}

/// Apply [`normalize_column_name`] to every column.
pub fn to_snake_case(frame: Frame) -> Result<Frame> {
    let mapping = frame
        .column_names()?
        .into_iter()
        .map(|name| {
            let normalized = normalize_column_name(&name);
            (name, normalized)
        })
        .filter(|(from, to)| from != to)
        .collect();
    frame.rename(mapping)
}

/// Rename the columns named in `mapping` that exist in the frame. Entries for
/// absent columns are skipped without error.
pub fn safe_rename(frame: Frame, mapping: &HashMap<String, String>) -> Result<Frame> {
    let names = frame.column_names()?;
    let present: Vec<(String, String)> = names
        .into_iter()
        .filter_map(|name| mapping.get(&name).map(|to| (name, to.clone())))
        .collect();
    if present.len() < mapping.len() {
        debug!(
            skipped = mapping.len() - present.len(),
            "Rename mapping references absent columns"
        );
    }
    frame.rename(present)
}

/// Parse `column` as a timestamp with [`DEFAULT_DATE_FORMATS`].
pub fn multi_parse_date(column: &str) -> Expr {
    multi_parse_date_with(column, DEFAULT_DATE_FORMATS)
}

/// Parse `column` as a timestamp, trying `formats` in order for each value.
///
/// The column is cast to string first (non-strict), so null-typed or numeric
/// columns don't fail. A later format is only consulted for values every
/// earlier format rejected.
pub fn multi_parse_date_with(column: &str, formats: &[&str]) -> Expr {
    Expr::ParseDatetime {
        column: column.to_string(),
        formats: formats.iter().map(|f| f.to_string()).collect(),
    }
}

/// Non-strict cast to 64-bit integers.
pub fn safe_int(column: &str) -> Expr {
    Expr::cast(column, DataType::Int64, false)
}

/// Strict cast to string.
pub fn as_utf8(column: &str) -> Expr {
    Expr::cast(column, DataType::Utf8, true)
}

/// Add a `bbl` (borough-block-lot) key when the parts are present.
///
/// Uses `borough`, falling back to `boro`; block is zero-padded to five digits
/// and lot to four. Frames without the parts are returned unchanged.
pub fn add_bbl(frame: Frame) -> Result<Frame> {
    let names = frame.column_names()?;
    let has = |c: &str| names.iter().any(|n| n == c);
    if !(has("block") && has("lot")) {
        return Ok(frame);
    }
    let borough = match ["borough", "boro"].into_iter().find(|c| has(*c)) {
        Some(borough) => borough,
        None => return Ok(frame),
    };
    let expr = Expr::Format(vec![
        FormatPart::Literal("bbl_".into()),
        FormatPart::Column {
            name: borough.into(),
            width: 0,
        },
        FormatPart::Literal("_".into()),
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
    frame.with_column("bbl", expr)
}

/// The frame as a deferred frame.
pub fn ensure_lazy(frame: Frame) -> Frame {
    Frame::Deferred(frame.lazy())
}

/// Project a players table to its lookup columns.
pub fn players_lookup(players: Frame) -> Result<Frame> {
    players.select(PLAYER_LOOKUP_COLUMNS)
}

/// Left-join player metadata for one role (e.g. `passer`).
///
/// The lookup's `gsis_id`, `display_name` and `position` become
/// `{role}_player_id`, `{role}_display_name` and `{role}_position`, and the
/// join runs on `{role}_player_id`. Every row of `primary` is kept.
pub fn enrich_with_role(primary: Frame, lookup: Frame, role: &str) -> Result<Frame> {
    let key = format!("{role}_player_id");
    let renamed = lookup.rename(vec![
        ("gsis_id".into(), key.clone()),
        ("display_name".into(), format!("{role}_display_name")),
        ("position".into(), format!("{role}_position")),
    ])?;
    primary.left_join(renamed, &key)
}

/// Apply [`enrich_with_role`] for each role in order.
pub fn enrich_roles<S: AsRef<str>>(primary: Frame, lookup: Frame, roles: &[S]) -> Result<Frame> {
    roles.iter().try_fold(primary, |frame, role| {
        enrich_with_role(frame, lookup.clone(), role.as_ref())
    })
}

/// Shape every frame to the first frame's columns: missing columns are added
/// as typed nulls, extra columns are dropped, order follows the first frame.
///
/// A reference column typed `Null` takes the first concrete type any later
/// input has for it. Columns that cannot be cast to the reference type are
/// replaced with typed nulls.
pub fn reconcile_schemas(frames: Vec<Frame>) -> Result<Vec<Frame>> {
    let schemas = frames
        .iter()
        .map(Frame::schema)
        .collect::<Result<Vec<SchemaRef>>>()?;
    let Some(reference) = reference_schema(&schemas) else {
        return Ok(frames);
    };

    let mut out = Vec::with_capacity(frames.len());
    for (i, (frame, schema)) in frames.into_iter().zip(schemas).enumerate() {
        if ops::same_columns(&reference, &schema) {
            out.push(frame);
            continue;
        }

        let mut exprs = Vec::new();
        for field in reference.fields() {
            let target = field.data_type();
            match schema.field_with_name(field.name()) {
                Ok(existing) if existing.data_type() == target => {}
                Ok(existing) if can_cast_types(existing.data_type(), target) => {
                    warn!(
                        input = i,
                        column = %field.name(),
                        from = %existing.data_type(),
                        to = %target,
                        "Casting column to reference type"
                    );
                    exprs.push((field.name().clone(), Expr::cast(field.name(), target.clone(), false)));
                }
                Ok(existing) => {
                    warn!(
                        input = i,
                        column = %field.name(),
                        from = %existing.data_type(),
                        to = %target,
                        "No cast to reference type, replacing column with nulls"
                    );
                    exprs.push((field.name().clone(), Expr::null(target.clone())));
                }
                Err(_) => {
                    warn!(input = i, column = %field.name(), "Padding missing column with nulls");
                    exprs.push((field.name().clone(), Expr::null(target.clone())));
                }
            }
        }
        let columns: Vec<String> = reference.fields().iter().map(|f| f.name().clone()).collect();
        out.push(frame.with_columns(exprs)?.select(columns)?);
    }
    Ok(out)
}

/// The first schema, nullable, with `Null` columns promoted to the first
/// concrete type found in a later schema.
fn reference_schema(schemas: &[SchemaRef]) -> Option<SchemaRef> {
    let (first, rest) = schemas.split_first()?;
    let fields: Vec<Field> = first
        .fields()
        .iter()
        .map(|field| {
            let dtype = match field.data_type() {
                DataType::Null => rest
                    .iter()
                    .filter_map(|schema| schema.field_with_name(field.name()).ok())
                    .map(|f| f.data_type())
                    .find(|dtype| **dtype != DataType::Null)
                    .unwrap_or(&DataType::Null)
                    .clone(),
                dtype => dtype.clone(),
            };
            Field::new(field.name(), dtype, true)
        })
        .collect();
    Some(Arc::new(Schema::new(fields)))
}

/// Reconcile schemas, then concatenate vertically.
pub fn concat_reconciled(frames: Vec<Frame>) -> Result<Frame> {
    if frames.is_empty() {
        return Err(LakeError::invalid_input("cannot concatenate zero frames"));
    }
    Frame::concat(reconcile_schemas(frames)?)
}
