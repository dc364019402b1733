//! Bulk loading: create the destination table, stream records through COPY.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_postgres::NoTls;

use super::copy::{copy_from_reader, copy_statement, CopyOptions};
use super::encode::encode_csv_row;
use super::{dbf, excel, flat, mdb, validate_file, IngestError};
use crate::models::{LoaderType, SourceTableColumn};

/// Encoded-row buffer size before a frame is pushed to the sink.
const FRAME_BYTES: usize = 64 * 1024;

/// One table to load.
#[derive(Debug, Clone)]
pub struct LoadDescriptor {
    pub st_oid: i64,
    pub table_name: String,
    pub sub_table: Option<String>,
    pub delimiter: Option<char>,
    pub qualified: bool,
    pub encoding: String,
    pub columns: Vec<String>,
    pub create_statement: String,
}

/// Outcome of loading one table.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub st_oid: i64,
    pub table_name: String,
    pub record_count: u64,
}

/// Synthesize the staging DDL from analyzed column statistics. Every column
/// lands as VARCHAR sized to the observed maximum.
pub fn build_create_statement(table_name: &str, columns: &[SourceTableColumn]) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("\"{}\" VARCHAR({})", c.name, c.max_length.max(1)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("DROP TABLE IF EXISTS \"{table_name}\"; CREATE TABLE \"{table_name}\" ({cols})")
}

/// Load a file's tables into the database.
///
/// For each descriptor: execute its `create_statement`, then COPY records
/// in, both inside one transaction. A failing descriptor rolls its
/// transaction back and aborts the remaining descriptors.
pub async fn load_file(
    database_url: &str,
    path: PathBuf,
    descriptors: Vec<LoadDescriptor>,
) -> Result<Vec<LoadResult>, IngestError> {
    let loader = validate_file(&path)?;
    if descriptors.is_empty() {
        return Err(IngestError::NoDescriptors("load"));
    }

    let (mut client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "copy connection error");
        }
    });

    let mut results = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let count = load_one(&mut client, loader, &path, &descriptor).await?;
        tracing::info!(
            table = %descriptor.table_name,
            records = count,
            "loaded source table"
        );
        results.push(LoadResult {
            st_oid: descriptor.st_oid,
            table_name: descriptor.table_name,
            record_count: count,
        });
    }

    drop(client);
    let _ = driver.await;
    Ok(results)
}

async fn load_one(
    client: &mut tokio_postgres::Client,
    loader: LoaderType,
    path: &Path,
    descriptor: &LoadDescriptor,
) -> Result<u64, IngestError> {
    let options = match loader {
        LoaderType::Flat => CopyOptions {
            delimiter: descriptor
                .delimiter
                .ok_or_else(|| IngestError::MissingDelimiter(descriptor.table_name.clone()))?,
            header: true,
            qualified: descriptor.qualified,
            encoding: Some(descriptor.encoding.clone()),
        },
        // Re-encoded rows: always comma-delimited, fully quoted, no header.
        _ => CopyOptions {
            delimiter: ',',
            header: false,
            qualified: false,
            encoding: None,
        },
    };
    let statement = copy_statement(&descriptor.table_name, &descriptor.columns, &options);

    let tx = client.transaction().await?;
    tx.batch_execute(&descriptor.create_statement).await?;

    let file = path.to_path_buf();
    let count = match loader {
        LoaderType::Flat => {
            copy_from_reader(&tx, &statement, move |frames| {
                flat::stream_bytes(&file, &mut |chunk| {
                    frames
                        .blocking_send(chunk)
                        .map_err(|e| IngestError::Reader(e.to_string()))
                })
            })
            .await?
        }
        LoaderType::Excel => {
            let sheet = descriptor
                .sub_table
                .clone()
                .ok_or_else(|| IngestError::MissingSubTable(descriptor.table_name.clone()))?;
            copy_from_reader(&tx, &statement, move |frames| {
                let mut buffer = FrameBuffer::new(frames);
                excel::read(&file, &sheet, &mut |row| buffer.push_row(&row))?;
                buffer.flush()
            })
            .await?
        }
        LoaderType::Mdb => {
            let sub_table = descriptor
                .sub_table
                .clone()
                .ok_or_else(|| IngestError::MissingSubTable(descriptor.table_name.clone()))?;
            copy_from_reader(&tx, &statement, move |frames| {
                let mut buffer = FrameBuffer::new(frames);
                mdb::read(&file, &sub_table, &mut |row| buffer.push_row(&row))?;
                buffer.flush()
            })
            .await?
        }
        LoaderType::Dbf => {
            copy_from_reader(&tx, &statement, move |frames| {
                let mut buffer = FrameBuffer::new(frames);
                dbf::read(&file, &mut |row| buffer.push_row(&row))?;
                buffer.flush()
            })
            .await?
        }
    };

    tx.commit().await?;
    Ok(count)
}

/// Accumulates encoded CSV rows and ships them as COPY frames.
struct FrameBuffer {
    frames: mpsc::Sender<Bytes>,
    buffer: String,
}

impl FrameBuffer {
    fn new(frames: mpsc::Sender<Bytes>) -> Self {
        Self {
            frames,
            buffer: String::with_capacity(FRAME_BYTES + 1024),
        }
    }

    fn push_row(&mut self, row: &[String]) -> Result<(), IngestError> {
        self.buffer.push_str(&encode_csv_row(row));
        if self.buffer.len() >= FRAME_BYTES {
            self.send()?;
        }
        Ok(())
    }

    fn send(&mut self) -> Result<(), IngestError> {
        let frame = Bytes::from(std::mem::take(&mut self.buffer));
        self.frames
            .blocking_send(frame)
            .map_err(|e| IngestError::Reader(e.to_string()))
    }

    fn flush(mut self) -> Result<(), IngestError> {
        if !self.buffer.is_empty() {
            self.send()?;
        }
        Ok(())
    }
}
