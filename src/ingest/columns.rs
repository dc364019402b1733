//! Column-name normalization and chunked length statistics.

/// Maximum length of a normalized column name.
const MAX_NAME_LEN: usize = 60;

/// Analysis chunk size, in records.
pub(crate) const CHUNK_RECORDS: usize = 10_000;

/// Normalize a raw column name into a database-safe identifier:
/// uppercased, whitespace collapsed to underscores, `#` spelled out as
/// `NUM`, everything else non-alphanumeric stripped, a leading digit
/// shielded with an underscore, truncated to 60 characters.
///
/// The result always matches `^[A-Z_][A-Z0-9_]*$` and the function is
/// idempotent.
pub fn normalize_column_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            out.push('_');
        } else if c == '#' {
            out.push_str("NUM");
        } else if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_uppercase());
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out.truncate(MAX_NAME_LEN);
    out
}

/// De-duplicate names within one table by suffixing `_N` in reverse
/// occurrence order: the last duplicate keeps the bare name, earlier ones
/// get `_1`, `_2`, ... counting backwards.
pub fn dedup_column_names(names: &[String]) -> Vec<String> {
    use std::collections::HashMap;

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out = names.to_vec();
    for i in (0..names.len()).rev() {
        let count = seen.entry(names[i].as_str()).or_insert(0);
        if *count > 0 {
            out[i] = format!("{}_{}", names[i], count);
        }
        *count += 1;
    }
    out
}

/// Element-wise length bounds for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ColumnLengths {
    pub min: i32,
    pub max: i32,
}

/// Statistics for one chunk of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkStats {
    pub record_count: i64,
    pub lengths: Vec<ColumnLengths>,
}

/// Compute length statistics for a chunk. Rows shorter than `width` count
/// the missing cells as empty.
pub(crate) fn stats_for_chunk(rows: &[Vec<String>], width: usize) -> ChunkStats {
    let mut lengths = vec![
        ColumnLengths {
            min: i32::MAX,
            max: 0
        };
        width
    ];
    for row in rows {
        for (i, bounds) in lengths.iter_mut().enumerate() {
            let len = row.get(i).map(|v| v.chars().count() as i32).unwrap_or(0);
            bounds.min = bounds.min.min(len);
            bounds.max = bounds.max.max(len);
        }
    }
    if rows.is_empty() {
        for bounds in &mut lengths {
            bounds.min = 0;
        }
    }
    ChunkStats {
        record_count: rows.len() as i64,
        lengths,
    }
}

/// Merge two chunk results: counts sum, lengths take element-wise min/max.
/// Commutative and associative, so any partition of the record stream merges
/// to the same totals.
pub(crate) fn merge_stats(a: ChunkStats, b: &ChunkStats) -> ChunkStats {
    debug_assert_eq!(a.lengths.len(), b.lengths.len());
    let lengths = a
        .lengths
        .iter()
        .zip(&b.lengths)
        .map(|(x, y)| ColumnLengths {
            min: x.min.min(y.min),
            max: x.max.max(y.max),
        })
        .collect();
    ChunkStats {
        record_count: a.record_count + b.record_count,
        lengths,
    }
}

/// Folds a record stream into merged chunk statistics, cutting a chunk
/// every `CHUNK_RECORDS` records.
pub(crate) struct ChunkFolder {
    width: usize,
    chunk: Vec<Vec<String>>,
    merged: Option<ChunkStats>,
}

impl ChunkFolder {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            chunk: Vec::new(),
            merged: None,
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.chunk.push(row);
        if self.chunk.len() >= CHUNK_RECORDS {
            self.cut();
        }
    }

    fn cut(&mut self) {
        let stats = stats_for_chunk(&self.chunk, self.width);
        self.chunk.clear();
        self.merged = Some(match self.merged.take() {
            Some(acc) => merge_stats(acc, &stats),
            None => stats,
        });
    }

    pub fn finish(mut self) -> ChunkStats {
        self.cut();
        // cut() leaves merged populated even for an empty stream
        self.merged.unwrap_or_else(|| stats_for_chunk(&[], self.width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_column_name("First Name"), "FIRST_NAME");
        assert_eq!(normalize_column_name("acct#"), "ACCTNUM");
        assert_eq!(normalize_column_name("Total ($)"), "TOTAL_");
        assert_eq!(normalize_column_name("2024 volume"), "_2024_VOLUME");
        assert_eq!(normalize_column_name(""), "_");
    }

    #[test]
    fn test_normalize_truncates() {
        let long = "x".repeat(90);
        let normalized = normalize_column_name(&long);
        assert_eq!(normalized.len(), 60);
        assert!(normalized.chars().all(|c| c == 'X'));
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in [
            "First Name",
            "acct#",
            "2024 volume",
            "  padded  ",
            "weird!!chars??",
            "",
            &"Ab 9#".repeat(30),
        ] {
            let once = normalize_column_name(raw);
            assert_eq!(normalize_column_name(&once), once, "input {raw:?}");
            assert!(
                once.chars().next().map(|c| c == '_' || c.is_ascii_uppercase()) == Some(true)
                    && once
                        .chars()
                        .all(|c| c == '_' || c.is_ascii_uppercase() || c.is_ascii_digit()),
                "pattern violated for {once:?}"
            );
            assert!(once.len() <= 60);
        }
    }

    #[test]
    fn test_dedup_reverse_order() {
        let names: Vec<String> = ["ID", "NAME", "ID"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedup_column_names(&names), vec!["ID_1", "NAME", "ID"]);

        let names: Vec<String> = ["A", "A", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedup_column_names(&names), vec!["A_2", "A_1", "A"]);
    }

    #[test]
    fn test_dedup_no_duplicates_untouched() {
        let names: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedup_column_names(&names), names);
    }

    #[test]
    fn test_chunk_stats() {
        let rows = vec![
            vec!["1".to_string(), "abc".to_string()],
            vec!["22".to_string(), "d".to_string()],
        ];
        let stats = stats_for_chunk(&rows, 2);
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.lengths[0], ColumnLengths { min: 1, max: 2 });
        assert_eq!(stats.lengths[1], ColumnLengths { min: 1, max: 3 });
    }

    #[test]
    fn test_ragged_rows_count_empty() {
        let rows = vec![vec!["abc".to_string()], vec![]];
        let stats = stats_for_chunk(&rows, 1);
        assert_eq!(stats.lengths[0], ColumnLengths { min: 0, max: 3 });
    }

    #[test]
    fn test_merge_commutes() {
        let a = stats_for_chunk(&[vec!["abcd".to_string()]], 1);
        let b = stats_for_chunk(&[vec!["x".to_string()], vec!["yz".to_string()]], 1);
        let ab = merge_stats(a.clone(), &b);
        let ba = merge_stats(b, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab.record_count, 3);
        assert_eq!(ab.lengths[0], ColumnLengths { min: 1, max: 4 });
    }

    #[test]
    fn test_merge_associative_over_partitions() {
        let rows: Vec<Vec<String>> = (0..7)
            .map(|i| vec!["v".repeat(i + 1), i.to_string()])
            .collect();

        // one partition: whole stream
        let whole = stats_for_chunk(&rows, 2);

        // another partition: (0..3), (3..5), (5..7), merged left-to-right
        let p1 = stats_for_chunk(&rows[0..3], 2);
        let p2 = stats_for_chunk(&rows[3..5], 2);
        let p3 = stats_for_chunk(&rows[5..7], 2);
        let merged = merge_stats(merge_stats(p1.clone(), &p2), &p3);
        assert_eq!(merged, whole);

        // and right-to-left
        let merged_rev = merge_stats(merge_stats(p3, &p2), &p1);
        assert_eq!(merged_rev, whole);
    }

    #[test]
    fn test_chunk_folder_small_stream() {
        let mut folder = ChunkFolder::new(1);
        folder.push(vec!["ab".to_string()]);
        folder.push(vec!["abcd".to_string()]);
        let stats = folder.finish();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.lengths[0], ColumnLengths { min: 2, max: 4 });
    }

    #[test]
    fn test_chunk_folder_empty_stream() {
        let folder = ChunkFolder::new(3);
        let stats = folder.finish();
        assert_eq!(stats.record_count, 0);
        assert_eq!(stats.lengths.len(), 3);
        assert_eq!(stats.lengths[0], ColumnLengths { min: 0, max: 0 });
    }
}
