//! COPY FROM STDIN sink.
//!
//! Shapes the COPY statement and bridges a blocking format reader to the
//! async sink through a bounded channel of byte frames.

use bytes::Bytes;
use futures_util::{pin_mut, SinkExt};
use tokio::sync::mpsc;
use tokio_postgres::Transaction;

use super::IngestError;

/// Bounded depth of the reader-to-sink channel; keeps a fast reader from
/// buffering the whole file in memory.
const CHANNEL_FRAMES: usize = 8;

/// Options shaping the COPY statement.
#[derive(Debug, Clone)]
pub(crate) struct CopyOptions {
    pub delimiter: char,
    pub header: bool,
    pub qualified: bool,
    pub encoding: Option<String>,
}

/// Build the COPY statement:
///
/// ```text
/// COPY <table>(<cols>) FROM STDIN WITH (
///   FORMAT csv, DELIMITER '<d>', HEADER <bool>
///   [, QUOTE '"', ESCAPE '"']
///   [, ENCODING '<enc>']
/// )
/// ```
pub(crate) fn copy_statement(table: &str, columns: &[String], options: &CopyOptions) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let delim = if options.delimiter == '\'' {
        "''".to_string()
    } else {
        options.delimiter.to_string()
    };

    let mut with = format!(
        "FORMAT csv, DELIMITER '{}', HEADER {}",
        delim, options.header
    );
    if options.qualified {
        with.push_str(", QUOTE '\"', ESCAPE '\"'");
    }
    if let Some(encoding) = &options.encoding {
        with.push_str(&format!(", ENCODING '{encoding}'"));
    }

    format!("COPY \"{table}\"({cols}) FROM STDIN WITH ({with})")
}

/// Stream frames produced by a blocking reader into the transaction's COPY
/// sink. Returns the row count reported by the database.
///
/// `read` runs on the blocking executor and pushes frames through the
/// channel; a reader error aborts the sink and propagates, rolling back
/// whatever the surrounding transaction had staged.
pub(crate) async fn copy_from_reader<F>(
    tx: &Transaction<'_>,
    statement: &str,
    read: F,
) -> Result<u64, IngestError>
where
    F: FnOnce(mpsc::Sender<Bytes>) -> Result<(), IngestError> + Send + 'static,
{
    let sink = tx.copy_in::<_, Bytes>(statement).await?;
    pin_mut!(sink);

    let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(CHANNEL_FRAMES);
    let reader = tokio::task::spawn_blocking(move || read(frame_tx));

    while let Some(frame) = frame_rx.recv().await {
        sink.send(frame).await?;
    }

    // Reader finished (or failed) once the channel closes.
    match reader.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(e) => return Err(IngestError::Reader(e.to_string())),
    }

    Ok(sink.finish().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(delimiter: char, header: bool, qualified: bool) -> CopyOptions {
        CopyOptions {
            delimiter,
            header,
            qualified,
            encoding: None,
        }
    }

    #[test]
    fn test_statement_flat_qualified() {
        let stmt = copy_statement(
            "ACCOUNTS",
            &["ID".to_string(), "NAME".to_string()],
            &options('|', true, true),
        );
        assert_eq!(
            stmt,
            "COPY \"ACCOUNTS\"(\"ID\", \"NAME\") FROM STDIN WITH \
             (FORMAT csv, DELIMITER '|', HEADER true, QUOTE '\"', ESCAPE '\"')"
        );
    }

    #[test]
    fn test_statement_reencoded() {
        let stmt = copy_statement("T", &["A".to_string()], &options(',', false, false));
        assert_eq!(
            stmt,
            "COPY \"T\"(\"A\") FROM STDIN WITH (FORMAT csv, DELIMITER ',', HEADER false)"
        );
    }

    #[test]
    fn test_statement_with_encoding() {
        let mut opts = options(',', true, false);
        opts.encoding = Some("LATIN1".to_string());
        let stmt = copy_statement("T", &["A".to_string()], &opts);
        assert!(stmt.ends_with(", ENCODING 'LATIN1')"));
    }
}
