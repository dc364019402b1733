//! Pre-ingestion analysis: column statistics and record counts.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::columns::ChunkFolder;
use super::{columns, dbf, excel, flat, mdb, validate_file, IngestError, RawColumn};
use crate::models::LoaderType;

/// One table to analyze. Excel/MDB descriptors carry a sub-table; flat
/// descriptors carry the delimiter and quoting flag.
#[derive(Debug, Clone)]
pub struct AnalyzeDescriptor {
    pub st_oid: i64,
    pub table_name: String,
    pub sub_table: Option<String>,
    pub delimiter: Option<char>,
    pub qualified: bool,
}

/// Statistics for one analyzed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnStat {
    pub name: String,
    pub type_name: String,
    pub min_length: i32,
    pub max_length: i32,
    pub index: i32,
}

/// Analysis output for one table.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResult {
    pub st_oid: i64,
    pub table_name: String,
    pub record_count: i64,
    pub columns: Vec<ColumnStat>,
}

/// Analyze a file against a list of descriptors.
///
/// Validation (existence, regular file, descriptor list, extension) happens
/// before any record I/O; parsing itself runs on the blocking executor.
pub async fn analyze_file(
    path: PathBuf,
    descriptors: Vec<AnalyzeDescriptor>,
) -> Result<Vec<AnalyzeResult>, IngestError> {
    let loader = validate_file(&path)?;
    if descriptors.is_empty() {
        return Err(IngestError::NoDescriptors("analyze"));
    }

    tokio::task::spawn_blocking(move || {
        descriptors
            .iter()
            .map(|d| analyze_one(&path, loader, d))
            .collect()
    })
    .await
    .map_err(|e| IngestError::Reader(e.to_string()))?
}

fn analyze_one(
    path: &Path,
    loader: LoaderType,
    descriptor: &AnalyzeDescriptor,
) -> Result<AnalyzeResult, IngestError> {
    // The reader callback sees rows before the header width is known, so
    // fold into a growing accumulator and fix the width afterwards.
    let mut folder: Option<ChunkFolder> = None;
    let mut width = 0usize;
    let mut record_count = 0i64;

    let mut on_row = |row: Vec<String>| -> Result<(), IngestError> {
        width = width.max(row.len());
        folder
            .get_or_insert_with(|| ChunkFolder::new(row.len()))
            .push(row);
        record_count += 1;
        Ok(())
    };

    let headers = read_rows(path, loader, descriptor, &mut on_row)?;
    let width = headers.len().max(width);

    let stats = match folder {
        Some(f) => f.finish(),
        None => columns::stats_for_chunk(&[], width),
    };

    Ok(assemble(descriptor, headers, width, record_count, stats))
}

fn read_rows(
    path: &Path,
    loader: LoaderType,
    descriptor: &AnalyzeDescriptor,
    on_row: &mut dyn FnMut(Vec<String>) -> Result<(), IngestError>,
) -> Result<Vec<RawColumn>, IngestError> {
    match loader {
        LoaderType::Flat => {
            let delimiter = descriptor
                .delimiter
                .ok_or_else(|| IngestError::MissingDelimiter(descriptor.table_name.clone()))?;
            flat::read(path, delimiter, descriptor.qualified, on_row)
        }
        LoaderType::Excel => {
            let sheet = descriptor
                .sub_table
                .as_deref()
                .ok_or_else(|| IngestError::MissingSubTable(descriptor.table_name.clone()))?;
            excel::read(path, sheet, on_row)
        }
        LoaderType::Mdb => {
            let sub_table = descriptor
                .sub_table
                .as_deref()
                .ok_or_else(|| IngestError::MissingSubTable(descriptor.table_name.clone()))?;
            mdb::read(path, sub_table, on_row)
        }
        LoaderType::Dbf => dbf::read(path, on_row),
    }
}

fn assemble(
    descriptor: &AnalyzeDescriptor,
    headers: Vec<RawColumn>,
    width: usize,
    record_count: i64,
    stats: columns::ChunkStats,
) -> AnalyzeResult {
    let mut names = Vec::with_capacity(width);
    let mut types = Vec::with_capacity(width);
    for i in 0..width {
        match headers.get(i) {
            Some(raw) => {
                names.push(columns::normalize_column_name(&raw.name));
                types.push(raw.type_name.clone());
            }
            None => {
                // Ragged rows wider than the header get synthetic names.
                names.push(format!("COLUMN_{}", i + 1));
                types.push("VARCHAR".to_string());
            }
        }
    }
    let names = columns::dedup_column_names(&names);

    let cols = names
        .into_iter()
        .zip(types)
        .enumerate()
        .map(|(i, (name, type_name))| ColumnStat {
            name,
            type_name,
            min_length: stats.lengths.get(i).map(|l| l.min).unwrap_or(0),
            max_length: stats.lengths.get(i).map(|l| l.max).unwrap_or(0),
            index: i as i32,
        })
        .collect();

    AnalyzeResult {
        st_oid: descriptor.st_oid,
        table_name: descriptor.table_name.clone(),
        record_count,
        columns: cols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn descriptor(name: &str) -> AnalyzeDescriptor {
        AnalyzeDescriptor {
            st_oid: 1,
            table_name: name.to_string(),
            sub_table: None,
            delimiter: Some(','),
            qualified: true,
        }
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[tokio::test]
    async fn test_analyze_duplicate_headers() {
        let f = write_csv("ID,Name,ID\n1,A,2\n22,BB,3\n");
        let results = analyze_file(f.path().to_path_buf(), vec![descriptor("T")])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.record_count, 2);

        let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ID_1", "NAME", "ID"]);

        assert_eq!(result.columns[0].min_length, 1);
        assert_eq!(result.columns[0].max_length, 2);
        assert_eq!(result.columns[1].min_length, 1);
        assert_eq!(result.columns[1].max_length, 2);
        assert_eq!(result.columns[2].min_length, 1);
        assert_eq!(result.columns[2].max_length, 1);
    }

    #[tokio::test]
    async fn test_analyze_header_only_file() {
        let f = write_csv("ID,NAME\n");
        let results = analyze_file(f.path().to_path_buf(), vec![descriptor("T")])
            .await
            .unwrap();
        assert_eq!(results[0].record_count, 0);
        assert_eq!(results[0].columns.len(), 2);
        assert_eq!(results[0].columns[0].max_length, 0);
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let err = analyze_file(PathBuf::from("/nonexistent/f.csv"), vec![descriptor("T")])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_analyze_unsupported_extension() {
        let mut f = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        f.write_all(b"x").unwrap();
        let err = analyze_file(f.path().to_path_buf(), vec![descriptor("T")])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedExtension(_)));
    }

    #[tokio::test]
    async fn test_analyze_empty_descriptors() {
        let f = write_csv("ID\n1\n");
        let err = analyze_file(f.path().to_path_buf(), vec![]).await.unwrap_err();
        assert!(matches!(err, IngestError::NoDescriptors("analyze")));
    }
}
