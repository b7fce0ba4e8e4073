use crate::journal::record::{
    ActivityItem, DailyRecord, TIMESTAMP_FORMAT, parse_date_key, total_units,
};
use crate::journal::schema::{ColumnKind, Schema};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("row has no Date column")]
    MissingDate,
    #[error("row date is not YYYY-MM-DD: {0:?}")]
    InvalidDate(String),
}

/// Flatten `record` into cells in schema order.
///
/// The total is taken from the items, never from `record.total_units`.
pub fn encode(record: &DailyRecord, schema: &Schema) -> Vec<String> {
    schema
        .columns()
        .iter()
        .map(|column| match column.kind {
            ColumnKind::Date => record.date_key(),
            ColumnKind::Text(key) => record.field(key).to_string(),
            ColumnKind::Items => encode_items(&record.items),
            ColumnKind::TotalUnits => record.computed_total_units().to_string(),
            ColumnKind::RecordedAt => record
                .recorded_at
                .map(|timestamp| timestamp.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
        })
        .collect()
}

pub fn encode_items(items: &[ActivityItem]) -> String {
    if items.is_empty() {
        return String::new();
    }
    // Serializing plain structs of strings and integers cannot fail.
    serde_json::to_string(items).unwrap_or_default()
}

/// Rebuild a record from `row`, naming cells by position through `header`.
///
/// Cells past the end of a short row read as empty, and an unreadable items
/// cell reads as no items. Only a missing or malformed date rejects the row.
pub fn decode(
    row: &[String],
    header: &[String],
    schema: &Schema,
) -> Result<DailyRecord, DecodeError> {
    let cell = |position: usize| row.get(position).map(String::as_str).unwrap_or_default();

    let mut date = None;
    let mut fields = BTreeMap::new();
    let mut items = Vec::new();
    let mut recorded_at = None;

    for (position, name) in header.iter().enumerate() {
        let Some(kind) = schema.kind_of(name) else {
            continue;
        };
        let value = cell(position);

        match kind {
            ColumnKind::Date => {
                let parsed = parse_date_key(value)
                    .ok_or_else(|| DecodeError::InvalidDate(value.to_string()))?;
                date = Some(parsed);
            }
            ColumnKind::Text(key) => {
                if !value.trim().is_empty() {
                    fields.insert(key.to_string(), value.to_string());
                }
            }
            ColumnKind::Items => {
                items = decode_items(value, row.first().map(String::as_str).unwrap_or_default());
            }
            ColumnKind::TotalUnits => {}
            ColumnKind::RecordedAt => {
                recorded_at = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok();
            }
        }
    }

    let date = date.ok_or(DecodeError::MissingDate)?;
    let total_units = total_units(&items);

    Ok(DailyRecord {
        date,
        fields,
        items,
        recorded_at,
        total_units,
    })
}

fn decode_items(raw: &str, row_date: &str) -> Vec<ActivityItem> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    serde_json::from_str(raw).unwrap_or_else(|error| {
        warn!(date = row_date, error = %error, "unreadable ItemsJSON cell, treating as no items");
        Vec::new()
    })
}
