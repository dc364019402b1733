//! Delimited text files.
//!
//! Analysis parses records with the declared delimiter and quoting. The
//! load path never re-parses: the file's own bytes stream straight into
//! COPY (HEADER true, source delimiter and quote).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bytes::Bytes;

use super::{IngestError, RawColumn};

/// Flat columns carry no declared type; staging typing comes from lengths.
const FLAT_TYPE: &str = "VARCHAR";

/// COPY send chunk size for raw byte streaming.
const SEND_CHUNK_BYTES: usize = 64 * 1024;

/// Parse the file, handing each data record to `on_row`. Returns the raw
/// header columns. The first record is the header.
pub(crate) fn read(
    path: &Path,
    delimiter: char,
    qualified: bool,
    on_row: &mut dyn FnMut(Vec<String>) -> Result<(), IngestError>,
) -> Result<Vec<RawColumn>, IngestError> {
    let mut delim_buf = [0u8; 4];
    let delim_byte = *delimiter.encode_utf8(&mut delim_buf).as_bytes().first().unwrap_or(&b',');

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delim_byte)
        .quoting(qualified)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| IngestError::Parse(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| IngestError::Parse(e.to_string()))?
        .iter()
        .map(|h| RawColumn {
            name: h.to_string(),
            type_name: FLAT_TYPE.to_string(),
        })
        .collect();

    for record in reader.records() {
        let record = record.map_err(|e| IngestError::Parse(e.to_string()))?;
        on_row(record.iter().map(|f| f.to_string()).collect())?;
    }

    Ok(headers)
}

/// Stream the file's bytes line-by-line in COPY-sized chunks, preserving
/// the original delimiter, quoting, and header line.
pub(crate) fn stream_bytes(
    path: &Path,
    send: &mut dyn FnMut(Bytes) -> Result<(), IngestError>,
) -> Result<(), IngestError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::with_capacity(SEND_CHUNK_BYTES + 1024);
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&line);
        if buf.len() >= SEND_CHUNK_BYTES {
            send(Bytes::from(std::mem::take(&mut buf)))?;
        }
    }
    if !buf.is_empty() {
        send(Bytes::from(buf))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_read_headers_and_rows() {
        let f = write_temp("ID,Name\n1,A\n22,BB\n");
        let mut rows = Vec::new();
        let headers = read(f.path(), ',', true, &mut |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name, "ID");
        assert_eq!(rows, vec![vec!["1", "A"], vec!["22", "BB"]]);
    }

    #[test]
    fn test_read_pipe_delimited_unquoted() {
        let f = write_temp("a|b\n\"x|y\n");
        let mut rows = Vec::new();
        read(f.path(), '|', false, &mut |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        // quoting disabled: the quote character is data
        assert_eq!(rows, vec![vec!["\"x", "y"]]);
    }

    #[test]
    fn test_stream_bytes_preserves_content() {
        let content = "ID,Name\n1,\"A,B\"\n";
        let f = write_temp(content);
        let mut out = Vec::new();
        stream_bytes(f.path(), &mut |chunk| {
            out.extend_from_slice(&chunk);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, content.as_bytes());
    }
}
