//! The schema object registry.
//!
//! Declaration order is readable top-to-bottom; the executor re-orders by
//! the declared dependencies, so entries may reference objects declared
//! later.

/// How the executor materializes one object.
pub(crate) enum BuildAction {
    /// Run raw DDL.
    Execute(&'static str),
    /// Bulk-copy an embedded seed CSV.
    CopySeed {
        table: &'static str,
        columns: &'static [&'static str],
        csv: &'static str,
    },
    /// Bulk-copy the compiled task catalog.
    SeedTasks,
}

pub(crate) struct DbObject {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub action: BuildAction,
}

pub(crate) fn registry() -> Vec<DbObject> {
    vec![
        // enums
        DbObject {
            name: "operation_state",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TYPE operation_state AS ENUM ('ready', 'active')",
            ),
        },
        DbObject {
            name: "task_status",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TYPE task_status AS ENUM \
                 ('waiting', 'scheduled', 'running', 'complete', 'failed')",
            ),
        },
        DbObject {
            name: "task_run_type",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TYPE task_run_type AS ENUM ('user', 'system')",
            ),
        },
        DbObject {
            name: "loader_type",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TYPE loader_type AS ENUM ('flat', 'excel', 'mdb', 'dbf')",
            ),
        },
        DbObject {
            name: "collect_type",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TYPE collect_type AS ENUM \
                 ('download', 'email', 'foia', 'scrape', 'manual', 'other')",
            ),
        },
        // constraint functions
        DbObject {
            name: "file_id_ok",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE FUNCTION file_id_ok(value text) RETURNS boolean \
                 LANGUAGE sql IMMUTABLE \
                 AS $$ SELECT value ~ '^F[0-9]+$' $$",
            ),
        },
        DbObject {
            name: "table_name_ok",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE FUNCTION table_name_ok(value text) RETURNS boolean \
                 LANGUAGE sql IMMUTABLE \
                 AS $$ SELECT value ~ '^[A-Z_][A-Z0-9_]*$' $$",
            ),
        },
        // tables
        DbObject {
            name: "roles",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TABLE roles ( \
                     name text PRIMARY KEY, \
                     description text NOT NULL \
                 )",
            ),
        },
        DbObject {
            name: "users",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TABLE users ( \
                     user_id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     username text NOT NULL UNIQUE, \
                     password_hash text NOT NULL, \
                     full_name text NOT NULL, \
                     is_active boolean NOT NULL DEFAULT true \
                 )",
            ),
        },
        DbObject {
            name: "user_roles",
            depends_on: &["users", "roles"],
            action: BuildAction::Execute(
                "CREATE TABLE user_roles ( \
                     user_id bigint NOT NULL REFERENCES users(user_id), \
                     role text NOT NULL REFERENCES roles(name), \
                     PRIMARY KEY (user_id, role) \
                 )",
            ),
        },
        DbObject {
            name: "workflow_operations",
            depends_on: &["roles"],
            action: BuildAction::Execute(
                "CREATE TABLE workflow_operations ( \
                     code text PRIMARY KEY, \
                     href text NOT NULL, \
                     role text NOT NULL REFERENCES roles(name), \
                     rank integer NOT NULL \
                 )",
            ),
        },
        DbObject {
            name: "actions",
            depends_on: &["roles"],
            action: BuildAction::Execute(
                "CREATE TABLE actions ( \
                     action_id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     role text NOT NULL REFERENCES roles(name), \
                     operation_state text NOT NULL, \
                     href text NOT NULL, \
                     label text NOT NULL \
                 )",
            ),
        },
        DbObject {
            name: "pipeline_runs",
            depends_on: &["workflow_operations", "users", "operation_state"],
            action: BuildAction::Execute(
                "CREATE TABLE pipeline_runs ( \
                     run_id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     data_source_id bigint NOT NULL, \
                     record_date date NOT NULL, \
                     workflow_operation text NOT NULL REFERENCES workflow_operations(code), \
                     operation_state operation_state NOT NULL DEFAULT 'ready', \
                     collection_user_id bigint REFERENCES users(user_id), \
                     load_user_id bigint REFERENCES users(user_id), \
                     check_user_id bigint REFERENCES users(user_id), \
                     qa_user_id bigint REFERENCES users(user_id) \
                 )",
            ),
        },
        DbObject {
            name: "tasks",
            depends_on: &["task_run_type"],
            action: BuildAction::Execute(
                "CREATE TABLE tasks ( \
                     task_id bigint PRIMARY KEY, \
                     name text NOT NULL, \
                     description text NOT NULL, \
                     run_type task_run_type NOT NULL \
                 )",
            ),
        },
        DbObject {
            name: "pipeline_run_tasks",
            depends_on: &["pipeline_runs", "tasks", "task_status"],
            action: BuildAction::Execute(
                "CREATE TABLE pipeline_run_tasks ( \
                     pr_task_id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     run_id bigint NOT NULL REFERENCES pipeline_runs(run_id) ON DELETE CASCADE, \
                     task_id bigint NOT NULL REFERENCES tasks(task_id), \
                     task_order integer NOT NULL, \
                     task_status task_status NOT NULL DEFAULT 'waiting', \
                     task_running boolean NOT NULL DEFAULT false, \
                     task_complete boolean NOT NULL DEFAULT false, \
                     task_start timestamptz, \
                     task_completed timestamptz, \
                     task_message text, \
                     parent_pr_task_id bigint \
                         REFERENCES pipeline_run_tasks(pr_task_id) ON DELETE CASCADE \
                 )",
            ),
        },
        DbObject {
            name: "source_tables",
            depends_on: &[
                "pipeline_runs",
                "loader_type",
                "collect_type",
                "file_id_ok",
                "table_name_ok",
            ],
            action: BuildAction::Execute(
                "CREATE TABLE source_tables ( \
                     st_oid bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     run_id bigint NOT NULL REFERENCES pipeline_runs(run_id) ON DELETE CASCADE, \
                     table_name text NOT NULL CHECK (table_name_ok(table_name)), \
                     file_id text NOT NULL CHECK (file_id_ok(file_id)), \
                     file_name text NOT NULL, \
                     loader_type loader_type NOT NULL, \
                     sub_table text, \
                     delimiter text, \
                     qualified boolean NOT NULL DEFAULT false, \
                     encoding text NOT NULL DEFAULT 'UTF8', \
                     collect_type collect_type NOT NULL, \
                     \"analyze\" boolean NOT NULL DEFAULT false, \
                     \"load\" boolean NOT NULL DEFAULT false, \
                     record_count bigint NOT NULL DEFAULT 0, \
                     url text, \
                     comments text, \
                     UNIQUE (run_id, file_id), \
                     UNIQUE (run_id, table_name) \
                 )",
            ),
        },
        DbObject {
            name: "source_table_columns",
            depends_on: &["source_tables"],
            action: BuildAction::Execute(
                "CREATE TABLE source_table_columns ( \
                     stc_oid bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     st_oid bigint NOT NULL REFERENCES source_tables(st_oid) ON DELETE CASCADE, \
                     name text NOT NULL, \
                     column_type text NOT NULL, \
                     max_length integer NOT NULL, \
                     min_length integer NOT NULL, \
                     label text NOT NULL, \
                     column_index integer NOT NULL, \
                     UNIQUE (st_oid, name) \
                 )",
            ),
        },
        DbObject {
            name: "background_jobs",
            depends_on: &[],
            action: BuildAction::Execute(
                "CREATE TABLE background_jobs ( \
                     job_id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
                     job_type text NOT NULL, \
                     payload jsonb NOT NULL, \
                     scheduled_at timestamptz NOT NULL DEFAULT now(), \
                     attempt_count integer NOT NULL DEFAULT 0, \
                     lease_holder uuid, \
                     lease_expires timestamptz \
                 )",
            ),
        },
        // seed rows
        DbObject {
            name: "roles_seed",
            depends_on: &["roles"],
            action: BuildAction::CopySeed {
                table: "roles",
                columns: &["name", "description"],
                csv: include_str!("seeds/roles.csv"),
            },
        },
        DbObject {
            name: "workflow_operations_seed",
            depends_on: &["workflow_operations", "roles_seed"],
            action: BuildAction::CopySeed {
                table: "workflow_operations",
                columns: &["code", "href", "role", "rank"],
                csv: include_str!("seeds/workflow_operations.csv"),
            },
        },
        DbObject {
            name: "actions_seed",
            depends_on: &["actions", "roles_seed"],
            action: BuildAction::CopySeed {
                table: "actions",
                columns: &["role", "operation_state", "href", "label"],
                csv: include_str!("seeds/actions.csv"),
            },
        },
        DbObject {
            name: "tasks_seed",
            depends_on: &["tasks"],
            action: BuildAction::SeedTasks,
        },
        // notification trigger
        DbObject {
            name: "notify_pipeline_run_task",
            depends_on: &["pipeline_run_tasks"],
            action: BuildAction::Execute(
                "CREATE FUNCTION notify_pipeline_run_task() RETURNS trigger \
                 LANGUAGE plpgsql AS $$ \
                 BEGIN \
                     PERFORM pg_notify('pipeline_run_tasks', NEW.run_id::text); \
                     RETURN NEW; \
                 END $$",
            ),
        },
        DbObject {
            name: "pipeline_run_tasks_notify",
            depends_on: &["notify_pipeline_run_task"],
            action: BuildAction::Execute(
                "CREATE TRIGGER pipeline_run_tasks_notify \
                 AFTER INSERT OR UPDATE OF task_status ON pipeline_run_tasks \
                 FOR EACH ROW EXECUTE FUNCTION notify_pipeline_run_task()",
            ),
        },
        // table functions
        DbObject {
            name: "pipeline_run_task_counts",
            depends_on: &["pipeline_run_tasks"],
            action: BuildAction::Execute(
                "CREATE FUNCTION pipeline_run_task_counts(p_run_id bigint) \
                 RETURNS TABLE (status task_status, task_count bigint) \
                 LANGUAGE sql STABLE \
                 AS $$ \
                     SELECT task_status, count(*) FROM pipeline_run_tasks \
                     WHERE run_id = p_run_id GROUP BY task_status \
                 $$",
            ),
        },
    ]
}
