//! Access databases (`.mdb`, `.accdb`).
//!
//! Read-only access through the MDBTools ODBC driver. Sub-tables are
//! addressed by name; column types map from the driver's type codes to
//! their symbolic names.

use std::path::Path;

use odbc_api::buffers::TextRowSet;
use odbc_api::{ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};

use super::{IngestError, RawColumn};

/// Rows fetched per ODBC round trip.
const BATCH_ROWS: usize = 5000;
/// Upper bound on a single text cell, in bytes.
const MAX_CELL_BYTES: usize = 8192;

fn odbc_err(e: impl std::fmt::Display) -> IngestError {
    IngestError::Parse(format!("odbc: {e}"))
}

/// Read one sub-table, handing each record to `on_row`.
pub(crate) fn read(
    path: &Path,
    sub_table: &str,
    on_row: &mut dyn FnMut(Vec<String>) -> Result<(), IngestError>,
) -> Result<Vec<RawColumn>, IngestError> {
    let environment = Environment::new().map_err(odbc_err)?;
    let connection_string = format!("Driver={{MDBTools}};DBQ={};", path.display());
    let connection = environment
        .connect_with_connection_string(&connection_string, ConnectionOptions::default())
        .map_err(odbc_err)?;

    let query = format!("SELECT * FROM \"{}\"", sub_table.replace('"', "\"\""));
    let mut cursor = connection
        .execute(&query, (), None)
        .map_err(odbc_err)?
        .ok_or_else(|| {
            IngestError::Parse(format!("sub table '{sub_table}' returned no result set"))
        })?;

    let names: Vec<String> = cursor
        .column_names()
        .map_err(odbc_err)?
        .collect::<Result<_, _>>()
        .map_err(odbc_err)?;

    let mut headers = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let data_type = cursor.col_data_type((i + 1) as u16).map_err(odbc_err)?;
        headers.push(RawColumn {
            name: name.clone(),
            type_name: type_name(data_type).to_string(),
        });
    }

    let mut buffers = TextRowSet::for_cursor(BATCH_ROWS, &mut cursor, Some(MAX_CELL_BYTES))
        .map_err(odbc_err)?;
    let mut row_set = cursor.bind_buffer(&mut buffers).map_err(odbc_err)?;

    while let Some(batch) = row_set.fetch().map_err(odbc_err)? {
        for row in 0..batch.num_rows() {
            let record = (0..batch.num_cols())
                .map(|col| {
                    batch
                        .at(col, row)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                        .unwrap_or_default()
                })
                .collect();
            on_row(record)?;
        }
    }

    Ok(headers)
}

/// Symbolic name for an ODBC data type code.
fn type_name(dt: DataType) -> &'static str {
    match dt {
        DataType::Char { .. } | DataType::WChar { .. } => "CHAR",
        DataType::Varchar { .. } | DataType::WVarchar { .. } | DataType::LongVarchar { .. } => {
            "VARCHAR"
        }
        DataType::TinyInt => "TINYINT",
        DataType::SmallInt => "SMALLINT",
        DataType::Integer => "INTEGER",
        DataType::BigInt => "BIGINT",
        DataType::Real => "REAL",
        DataType::Float { .. } => "FLOAT",
        DataType::Double => "DOUBLE",
        DataType::Decimal { .. } => "DECIMAL",
        DataType::Numeric { .. } => "NUMERIC",
        DataType::Date => "DATE",
        DataType::Time { .. } => "TIME",
        DataType::Timestamp { .. } => "TIMESTAMP",
        DataType::Bit => "BIT",
        DataType::Binary { .. }
        | DataType::Varbinary { .. }
        | DataType::LongVarbinary { .. } => "BINARY",
        _ => "OTHER",
    }
}
