//! Excel workbooks (`.xls`, `.xlsx`).
//!
//! Cells come back through calamine with formula results already cached by
//! the spreadsheet; rendering follows the loader conventions: whole-number
//! floats print as integers, date cells as ISO local dates, booleans as
//! TRUE/FALSE, error cells fall back to their formatted text.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::{IngestError, RawColumn};

const EXCEL_TYPE: &str = "VARCHAR";

/// Read one worksheet, handing each data record to `on_row`. The first
/// worksheet row is the header.
pub(crate) fn read(
    path: &Path,
    sheet: &str,
    on_row: &mut dyn FnMut(Vec<String>) -> Result<(), IngestError>,
) -> Result<Vec<RawColumn>, IngestError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| IngestError::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| IngestError::Parse(format!("worksheet '{sheet}': {e}")))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| RawColumn {
                name: render_cell(cell),
                type_name: EXCEL_TYPE.to_string(),
            })
            .collect(),
        None => Vec::new(),
    };

    for row in rows {
        on_row(row.iter().map(render_cell).collect())?;
    }

    Ok(headers)
}

/// Render a cell the way the bulk loader expects its text form.
pub(crate) fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.is_finite() && *f == f.floor() && f.abs() < 9.2e18 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) if ndt.time() == chrono::NaiveTime::MIN => ndt.date().to_string(),
            Some(ndt) => ndt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_numeric_cells() {
        assert_eq!(render_cell(&Data::Int(42)), "42");
        assert_eq!(render_cell(&Data::Float(42.0)), "42");
        assert_eq!(render_cell(&Data::Float(-3.0)), "-3");
        assert_eq!(render_cell(&Data::Float(2.5)), "2.5");
    }

    #[test]
    fn test_render_bool_and_empty() {
        assert_eq!(render_cell(&Data::Bool(true)), "TRUE");
        assert_eq!(render_cell(&Data::Bool(false)), "FALSE");
        assert_eq!(render_cell(&Data::Empty), "");
    }

    #[test]
    fn test_render_iso_passthrough() {
        assert_eq!(
            render_cell(&Data::DateTimeIso("2024-03-01".to_string())),
            "2024-03-01"
        );
    }

    #[test]
    fn test_render_error_uses_formatted_text() {
        let rendered = render_cell(&Data::Error(calamine::CellErrorType::Div0));
        assert_eq!(rendered, "#DIV/0!");
    }
}
