//! Source table CRUD and column statistics persistence.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::PgPool;
use crate::error::CoreError;
use crate::models::{SourceTable, SourceTableColumn, SourceTableForm};
use crate::schema::{source_table_columns, source_tables};

/// Column statistics produced by the analyze task, keyed by table.
#[derive(Debug, Clone)]
pub struct NewColumnStat {
    pub name: String,
    pub column_type: String,
    pub min_length: i32,
    pub max_length: i32,
    pub label: String,
    pub column_index: i32,
}

#[derive(Clone)]
pub struct SourceTableRepository {
    pool: PgPool,
}

impl SourceTableRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, run_id: i64) -> Result<Vec<SourceTable>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(source_tables::table
            .filter(source_tables::run_id.eq(run_id))
            .order(source_tables::table_name.asc())
            .load::<SourceTable>(&mut conn)
            .await?)
    }

    pub async fn get(&self, st_oid: i64) -> Result<Option<SourceTable>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(source_tables::table
            .find(st_oid)
            .first::<SourceTable>(&mut conn)
            .await
            .optional()?)
    }

    /// Insert a new source table; returns `(st_oid, rows_affected)`.
    pub async fn insert(
        &self,
        run_id: i64,
        form: &SourceTableForm,
    ) -> Result<(i64, usize), CoreError> {
        let mut conn = self.pool.get().await?;
        let st_oid: i64 = diesel::insert_into(source_tables::table)
            .values((
                source_tables::run_id.eq(run_id),
                source_tables::table_name.eq(&form.table_name),
                source_tables::file_id.eq(&form.file_id),
                source_tables::file_name.eq(&form.file_name),
                source_tables::loader_type.eq(form.loader_type),
                source_tables::sub_table.eq(form.sub_table.as_deref()),
                source_tables::delimiter.eq(form.delimiter.as_deref()),
                source_tables::qualified.eq(form.qualified),
                source_tables::encoding.eq(&form.encoding),
                source_tables::collect_type.eq(form.collect_type),
                source_tables::analyze.eq(form.analyze),
                source_tables::load.eq(form.load),
                source_tables::url.eq(form.url.as_deref()),
                source_tables::comments.eq(form.comments.as_deref()),
            ))
            .returning(source_tables::st_oid)
            .get_result(&mut conn)
            .await
            .map_err(unique_to_conflict)?;
        Ok((st_oid, 1))
    }

    /// Update an existing source table scoped to its run.
    pub async fn update(
        &self,
        st_oid: i64,
        run_id: i64,
        form: &SourceTableForm,
    ) -> Result<(i64, usize), CoreError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            source_tables::table
                .find(st_oid)
                .filter(source_tables::run_id.eq(run_id)),
        )
        .set((
            source_tables::table_name.eq(&form.table_name),
            source_tables::file_id.eq(&form.file_id),
            source_tables::file_name.eq(&form.file_name),
            source_tables::loader_type.eq(form.loader_type),
            source_tables::sub_table.eq(form.sub_table.as_deref()),
            source_tables::delimiter.eq(form.delimiter.as_deref()),
            source_tables::qualified.eq(form.qualified),
            source_tables::encoding.eq(&form.encoding),
            source_tables::collect_type.eq(form.collect_type),
            source_tables::analyze.eq(form.analyze),
            source_tables::load.eq(form.load),
            source_tables::url.eq(form.url.as_deref()),
            source_tables::comments.eq(form.comments.as_deref()),
        ))
        .execute(&mut conn)
        .await
        .map_err(unique_to_conflict)?;

        if rows == 0 {
            return Err(CoreError::not_found(format!(
                "source table {st_oid} not found in run {run_id}"
            )));
        }
        Ok((st_oid, rows))
    }

    /// Delete a source table (columns cascade).
    pub async fn delete(&self, st_oid: i64, run_id: i64) -> Result<(i64, usize), CoreError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::delete(
            source_tables::table
                .find(st_oid)
                .filter(source_tables::run_id.eq(run_id)),
        )
        .execute(&mut conn)
        .await?;
        if rows == 0 {
            return Err(CoreError::not_found(format!(
                "source table {st_oid} not found in run {run_id}"
            )));
        }
        Ok((st_oid, rows))
    }

    /// Tables flagged for the given verb, in name order.
    pub async fn flagged(&self, run_id: i64, verb: Flag) -> Result<Vec<SourceTable>, CoreError> {
        let mut conn = self.pool.get().await?;
        let base = source_tables::table
            .filter(source_tables::run_id.eq(run_id))
            .order(source_tables::table_name.asc());
        let rows = match verb {
            Flag::Analyze => {
                base.filter(source_tables::analyze.eq(true))
                    .load::<SourceTable>(&mut conn)
                    .await?
            }
            Flag::Load => {
                base.filter(source_tables::load.eq(true))
                    .load::<SourceTable>(&mut conn)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn columns(&self, st_oid: i64) -> Result<Vec<SourceTableColumn>, CoreError> {
        let mut conn = self.pool.get().await?;
        Ok(source_table_columns::table
            .filter(source_table_columns::st_oid.eq(st_oid))
            .order(source_table_columns::column_index.asc())
            .load::<SourceTableColumn>(&mut conn)
            .await?)
    }

    /// Replace the analyze output for a table: previous stats are dropped,
    /// new ones inserted, and `record_count` updated, atomically.
    pub async fn store_analysis(
        &self,
        conn: &mut AsyncPgConnection,
        st_oid: i64,
        record_count: i64,
        columns: &[NewColumnStat],
    ) -> Result<(), CoreError> {
        diesel::delete(
            source_table_columns::table.filter(source_table_columns::st_oid.eq(st_oid)),
        )
        .execute(conn)
        .await?;

        for col in columns {
            diesel::insert_into(source_table_columns::table)
                .values((
                    source_table_columns::st_oid.eq(st_oid),
                    source_table_columns::name.eq(&col.name),
                    source_table_columns::column_type.eq(&col.column_type),
                    source_table_columns::max_length.eq(col.max_length),
                    source_table_columns::min_length.eq(col.min_length),
                    source_table_columns::label.eq(&col.label),
                    source_table_columns::column_index.eq(col.column_index),
                ))
                .execute(conn)
                .await?;
        }

        diesel::update(source_tables::table.find(st_oid))
            .set(source_tables::record_count.eq(record_count))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn set_record_count(&self, st_oid: i64, count: i64) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await?;
        diesel::update(source_tables::table.find(st_oid))
            .set(source_tables::record_count.eq(count))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

/// Which ingestion verb a table is flagged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Analyze,
    Load,
}

/// Unique-violation on `(run_id, file_id)` / `(run_id, table_name)` is a
/// caller mistake, not a storage fault.
fn unique_to_conflict(err: diesel::result::Error) -> CoreError {
    match &err {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            info,
        ) => CoreError::conflict(format!("duplicate source table: {}", info.message())),
        _ => CoreError::Storage(err),
    }
}
