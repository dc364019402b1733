//! dBASE tables (`.dbf`).
//!
//! Field names and types come from the table header; records are iterated
//! for length statistics and loading.

use std::path::Path;

use dbase::{FieldInfo, FieldType, FieldValue};

use super::{IngestError, RawColumn};

/// Read the table, handing each record to `on_row`. Column metadata comes
/// from the file header rather than a header record.
pub(crate) fn read(
    path: &Path,
    on_row: &mut dyn FnMut(Vec<String>) -> Result<(), IngestError>,
) -> Result<Vec<RawColumn>, IngestError> {
    let mut reader =
        dbase::Reader::from_path(path).map_err(|e| IngestError::Parse(e.to_string()))?;

    let fields: Vec<(String, String)> = reader
        .fields()
        .iter()
        .map(|f: &FieldInfo| (f.name().to_string(), type_name(f.field_type()).to_string()))
        .collect();

    for record in reader.iter_records() {
        let record = record.map_err(|e| IngestError::Parse(e.to_string()))?;
        let row = fields
            .iter()
            .map(|(name, _)| {
                record
                    .get(name)
                    .map(render_value)
                    .unwrap_or_default()
            })
            .collect();
        on_row(row)?;
    }

    Ok(fields
        .into_iter()
        .map(|(name, type_name)| RawColumn { name, type_name })
        .collect())
}

fn type_name(ft: FieldType) -> &'static str {
    match ft {
        FieldType::Character => "CHARACTER",
        FieldType::Numeric => "NUMERIC",
        FieldType::Float => "FLOAT",
        FieldType::Integer => "INTEGER",
        FieldType::Logical => "LOGICAL",
        FieldType::Date => "DATE",
        FieldType::DateTime => "DATETIME",
        FieldType::Double => "DOUBLE",
        FieldType::Currency => "CURRENCY",
        FieldType::Memo => "MEMO",
    }
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Character(opt) => opt.clone().unwrap_or_default(),
        FieldValue::Numeric(opt) => opt.map(render_float).unwrap_or_default(),
        FieldValue::Float(opt) => opt.map(|f| render_float(f as f64)).unwrap_or_default(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Logical(opt) => opt
            .map(|b| if b { "TRUE" } else { "FALSE" }.to_string())
            .unwrap_or_default(),
        FieldValue::Date(opt) => opt
            .map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
            .unwrap_or_default(),
        FieldValue::DateTime(dt) => format!("{dt:?}"),
        FieldValue::Double(d) => render_float(*d),
        FieldValue::Currency(c) => c.to_string(),
        FieldValue::Memo(s) => s.clone(),
    }
}

/// Whole-number values print without a fractional part.
fn render_float(f: f64) -> String {
    if f.is_finite() && f == f.floor() && f.abs() < 9.2e18 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_numeric() {
        assert_eq!(render_value(&FieldValue::Numeric(Some(7.0))), "7");
        assert_eq!(render_value(&FieldValue::Numeric(Some(7.25))), "7.25");
        assert_eq!(render_value(&FieldValue::Numeric(None)), "");
    }

    #[test]
    fn test_render_character_and_logical() {
        assert_eq!(
            render_value(&FieldValue::Character(Some("abc".to_string()))),
            "abc"
        );
        assert_eq!(render_value(&FieldValue::Character(None)), "");
        assert_eq!(render_value(&FieldValue::Logical(Some(true))), "TRUE");
    }
}
