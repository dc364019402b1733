//! File-ingestion engine.
//!
//! Two verbs on a source file: **analyze** (column statistics and record
//! counts, no inserts) and **load** (stream records into the database via
//! COPY). Four loader types share the pipeline: delimited text, Excel
//! workbooks, Access databases, and dBASE tables.
//!
//! File parsing is blocking and runs on the blocking executor; parsed bytes
//! reach the async COPY sink through a bounded channel.

mod analyze;
mod columns;
mod copy;
mod dbf;
mod encode;
mod excel;
mod flat;
mod load;
mod mdb;

pub use analyze::{analyze_file, AnalyzeDescriptor, AnalyzeResult, ColumnStat};
pub use columns::{dedup_column_names, normalize_column_name};
pub use load::{build_create_statement, load_file, LoadDescriptor, LoadResult};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::LoaderType;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("no tables selected for {0}")]
    NoDescriptors(&'static str),
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("sub table required for {0}")]
    MissingSubTable(String),
    #[error("delimiter required for flat file table {0}")]
    MissingDelimiter(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("copy failed: {0}")]
    Copy(#[from] tokio_postgres::Error),
    #[error("reader task failed: {0}")]
    Reader(String),
}

/// A raw column as the format reader sees it, before normalization.
#[derive(Debug, Clone)]
pub(crate) struct RawColumn {
    pub name: String,
    pub type_name: String,
}

/// Validate the file path and derive the loader type, before any I/O.
pub(crate) fn validate_file(path: &Path) -> Result<LoaderType, IngestError> {
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(IngestError::NotAFile(path.to_path_buf()));
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    LoaderType::from_file_name(name)
        .ok_or_else(|| IngestError::UnsupportedExtension(name.to_string()))
}
