//! Schema bootstrap.
//!
//! An explicit registry of schema objects, ordered by a topological sort of
//! their declared dependencies: enums, constraint functions, tables, seed
//! rows (bulk-copied), the notification trigger, and table functions. Run
//! once against a fresh database by the `init-db` command; the core never
//! modifies schema after boot.

mod objects;

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use futures_util::{pin_mut, SinkExt};
use thiserror::Error;
use tokio_postgres::NoTls;

pub(crate) use objects::{registry, BuildAction, DbObject};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("dependency cycle involving {0}")]
    Cycle(String),
    #[error("unknown dependency {0} declared by {1}")]
    UnknownDependency(String, String),
}

/// Create every schema object and load the seed rows.
pub async fn build(database_url: &str) -> Result<(), BuildError> {
    let objects = sort_by_dependency(registry())?;

    let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "bootstrap connection error");
        }
    });

    for object in &objects {
        tracing::info!(object = object.name, "creating schema object");
        match &object.action {
            BuildAction::Execute(sql) => client.batch_execute(sql).await?,
            BuildAction::CopySeed {
                table,
                columns,
                csv,
            } => copy_seed(&client, table, columns, Bytes::from_static(csv.as_bytes())).await?,
            BuildAction::SeedTasks => {
                let csv = task_catalog_csv();
                copy_seed(
                    &client,
                    "tasks",
                    &["task_id", "name", "description", "run_type"],
                    Bytes::from(csv),
                )
                .await?;
            }
        }
    }

    drop(client);
    let _ = driver.await;
    tracing::info!(count = objects.len(), "schema bootstrap complete");
    Ok(())
}

/// Bulk-copy one seed CSV (header row included) into its table.
async fn copy_seed(
    client: &tokio_postgres::Client,
    table: &str,
    columns: &[&str],
    csv: Bytes,
) -> Result<(), BuildError> {
    let cols = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let statement =
        format!("COPY \"{table}\"({cols}) FROM STDIN WITH (FORMAT csv, HEADER true)");
    let sink = client.copy_in::<_, Bytes>(statement.as_str()).await?;
    pin_mut!(sink);
    sink.send(csv).await?;
    sink.finish().await?;
    Ok(())
}

/// The `tasks` table mirrors the compiled catalog.
fn task_catalog_csv() -> String {
    let mut csv = String::from("task_id,name,description,run_type\n");
    for def in crate::registry::catalog() {
        csv.push_str(&format!(
            "{},\"{}\",\"{}\",{}\n",
            def.task_id,
            def.name,
            def.description,
            def.run_type().as_str()
        ));
    }
    csv
}

/// Kahn's algorithm over the declared dependencies; ties keep registry
/// order so the output is deterministic.
fn sort_by_dependency(objects: Vec<DbObject>) -> Result<Vec<DbObject>, BuildError> {
    let index: HashMap<&str, usize> = objects
        .iter()
        .enumerate()
        .map(|(i, o)| (o.name, i))
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); objects.len()];
    let mut in_degree = vec![0usize; objects.len()];
    for (i, object) in objects.iter().enumerate() {
        for dep in object.depends_on {
            let Some(&d) = index.get(dep) else {
                return Err(BuildError::UnknownDependency(
                    dep.to_string(),
                    object.name.to_string(),
                ));
            };
            dependents[d].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: VecDeque<usize> = (0..objects.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(objects.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &j in &dependents[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push_back(j);
            }
        }
    }

    if order.len() != objects.len() {
        let stuck = objects
            .iter()
            .enumerate()
            .find(|(i, _)| in_degree[*i] > 0)
            .map(|(_, o)| o.name.to_string())
            .unwrap_or_default();
        return Err(BuildError::Cycle(stuck));
    }

    let mut by_index: Vec<Option<DbObject>> = objects.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| by_index[i].take())
        .collect())
}
