//! System task implementations, executed by the worker pool.

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;

use super::{TaskContext, TaskFuture, VALIDATE_RECORD_COUNTS};
use crate::error::CoreError;
use crate::ingest::{analyze_file, build_create_statement, load_file, AnalyzeDescriptor, LoadDescriptor};
use crate::models::{LoaderType, PipelineRunTask, SourceTable};
use crate::repository::source_tables::Flag;
use crate::repository::{tasks as task_queries, SourceTableRepository};

/// Verify the run folder exists and every declared source file is present.
pub(super) fn scan_source_folder<'a>(
    ctx: &'a TaskContext,
    task: &'a PipelineRunTask,
) -> TaskFuture<'a> {
    Box::pin(async move {
        let run_dir = ctx.settings.run_dir(task.run_id);
        if !run_dir.is_dir() {
            bail!("run folder {} does not exist", run_dir.display());
        }

        let repo = SourceTableRepository::new(ctx.pool.clone());
        let tables = repo.list(task.run_id).await?;
        let missing: Vec<&str> = tables
            .iter()
            .filter(|t| !run_dir.join(&t.file_name).is_file())
            .map(|t| t.file_name.as_str())
            .collect();
        if !missing.is_empty() {
            bail!("missing source files: {}", missing.join(", "));
        }

        Ok(Some(format!("{} source files present", tables.len())))
    })
}

/// Analyze every table flagged for analysis, one pass per source file.
pub(super) fn analyze_files<'a>(
    ctx: &'a TaskContext,
    task: &'a PipelineRunTask,
) -> TaskFuture<'a> {
    Box::pin(async move {
        let repo = SourceTableRepository::new(ctx.pool.clone());
        let tables = repo.flagged(task.run_id, Flag::Analyze).await?;
        if tables.is_empty() {
            return Ok(Some("no tables flagged for analysis".to_string()));
        }

        let run_dir = ctx.settings.run_dir(task.run_id);
        let mut analyzed = 0usize;

        for (file_name, group) in group_by_file(&tables) {
            let descriptors = group
                .iter()
                .map(|t| {
                    Ok(AnalyzeDescriptor {
                        st_oid: t.st_oid,
                        table_name: t.table_name.clone(),
                        sub_table: t.sub_table.clone(),
                        delimiter: table_delimiter(t)?,
                        qualified: t.qualified,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let results = analyze_file(run_dir.join(file_name), descriptors)
                .await
                .with_context(|| format!("analyzing {file_name}"))?;

            let mut conn = ctx.pool.get().await?;
            let repo_ref = &repo;
            conn.transaction::<_, CoreError, _>(|conn| {
                async move {
                    for result in &results {
                        let stats: Vec<_> = result
                            .columns
                            .iter()
                            .map(|c| crate::repository::NewColumnStat {
                                name: c.name.clone(),
                                column_type: c.type_name.clone(),
                                min_length: c.min_length,
                                max_length: c.max_length,
                                label: c.name.clone(),
                                column_index: c.index,
                            })
                            .collect();
                        repo_ref
                            .store_analysis(conn, result.st_oid, result.record_count, &stats)
                            .await?;
                    }
                    Ok(())
                }
                .scope_boxed()
            })
            .await?;

            analyzed += group.len();
        }

        Ok(Some(format!("analyzed {analyzed} tables")))
    })
}

/// Create staging tables and bulk-load every table flagged for load, then
/// spawn the record-count validation child task.
pub(super) fn load_files<'a>(
    ctx: &'a TaskContext,
    task: &'a PipelineRunTask,
) -> TaskFuture<'a> {
    Box::pin(async move {
        let repo = SourceTableRepository::new(ctx.pool.clone());
        let tables = repo.flagged(task.run_id, Flag::Load).await?;
        if tables.is_empty() {
            return Ok(Some("no tables flagged for load".to_string()));
        }

        let run_dir = ctx.settings.run_dir(task.run_id);
        let mut loaded = 0usize;
        let mut records = 0u64;

        for (file_name, group) in group_by_file(&tables) {
            let mut descriptors = Vec::with_capacity(group.len());
            for t in &group {
                let columns = repo.columns(t.st_oid).await?;
                if columns.is_empty() {
                    bail!("table {} has not been analyzed", t.table_name);
                }
                descriptors.push(LoadDescriptor {
                    st_oid: t.st_oid,
                    table_name: t.table_name.clone(),
                    sub_table: t.sub_table.clone(),
                    delimiter: table_delimiter(t)?,
                    qualified: t.qualified,
                    encoding: t.encoding.clone(),
                    columns: columns.iter().map(|c| c.name.clone()).collect(),
                    create_statement: build_create_statement(&t.table_name, &columns),
                });
            }

            let results = load_file(
                ctx.pool.database_url(),
                run_dir.join(file_name),
                descriptors,
            )
            .await
            .with_context(|| format!("loading {file_name}"))?;

            for result in results {
                repo.set_record_count(result.st_oid, result.record_count as i64)
                    .await?;
                loaded += 1;
                records += result.record_count;
            }
        }

        let mut conn = ctx.pool.get().await?;
        task_queries::insert_child_in(&mut conn, task, VALIDATE_RECORD_COUNTS).await?;

        Ok(Some(format!("loaded {loaded} tables ({records} records)")))
    })
}

/// Re-count every loaded staging table and compare against the persisted
/// record counts.
pub(super) fn validate_record_counts<'a>(
    ctx: &'a TaskContext,
    task: &'a PipelineRunTask,
) -> TaskFuture<'a> {
    Box::pin(async move {
        use diesel_async::RunQueryDsl;

        #[derive(diesel::QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            n: i64,
        }

        let repo = SourceTableRepository::new(ctx.pool.clone());
        let tables = repo.flagged(task.run_id, Flag::Load).await?;

        let mut conn = ctx.pool.get().await?;
        let mut mismatched = Vec::new();
        for t in &tables {
            // table_name is validated to alnum+underscore at CRUD time
            let row: CountRow =
                diesel::sql_query(format!("SELECT count(*) AS n FROM \"{}\"", t.table_name))
                    .get_result(&mut conn)
                    .await?;
            if row.n != t.record_count {
                mismatched.push(format!(
                    "{} (loaded {}, expected {})",
                    t.table_name, row.n, t.record_count
                ));
            }
        }

        if !mismatched.is_empty() {
            bail!("record count mismatch: {}", mismatched.join(", "));
        }
        Ok(Some(format!(
            "record counts verified for {} tables",
            tables.len()
        )))
    })
}

/// Group tables by source file, preserving name order.
fn group_by_file(tables: &[SourceTable]) -> BTreeMap<&str, Vec<&SourceTable>> {
    let mut groups: BTreeMap<&str, Vec<&SourceTable>> = BTreeMap::new();
    for t in tables {
        groups.entry(t.file_name.as_str()).or_default().push(t);
    }
    groups
}

/// The stored delimiter, validated as a single character for flat tables.
fn table_delimiter(table: &SourceTable) -> anyhow::Result<Option<char>> {
    match (&table.loader_type, &table.delimiter) {
        (LoaderType::Flat, Some(d)) => {
            let mut chars = d.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(c)),
                _ => bail!(
                    "table {} delimiter '{}' must be a single character",
                    table.table_name,
                    d
                ),
            }
        }
        (LoaderType::Flat, None) => {
            bail!("table {} has no delimiter", table.table_name)
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectType, LoaderType};

    fn table(name: &str, file: &str, delimiter: Option<&str>) -> SourceTable {
        SourceTable {
            st_oid: 1,
            run_id: 1,
            table_name: name.to_string(),
            file_id: "F1".to_string(),
            file_name: file.to_string(),
            loader_type: LoaderType::Flat,
            sub_table: None,
            delimiter: delimiter.map(|d| d.to_string()),
            qualified: false,
            encoding: "UTF8".to_string(),
            collect_type: CollectType::Download,
            analyze: true,
            load: true,
            record_count: 0,
            url: None,
            comments: None,
        }
    }

    #[test]
    fn test_group_by_file() {
        let tables = vec![
            table("A", "one.csv", Some(",")),
            table("B", "two.csv", Some(",")),
            table("C", "one.csv", Some(",")),
        ];
        let groups = group_by_file(&tables);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["one.csv"].len(), 2);
        assert_eq!(groups["two.csv"].len(), 1);
    }

    #[test]
    fn test_delimiter_must_be_single_char() {
        assert_eq!(
            table_delimiter(&table("A", "a.csv", Some("|"))).unwrap(),
            Some('|')
        );
        assert!(table_delimiter(&table("A", "a.csv", Some("||"))).is_err());
        assert!(table_delimiter(&table("A", "a.csv", None)).is_err());
    }
}
