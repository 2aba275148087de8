use super::SqliteChainStore;
use crate::error::Result;

impl SqliteChainStore {
    /// Create catalog and journal tables
    pub(super) async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chains (
                chain_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL UNIQUE,
                chain_name TEXT NOT NULL,
                run_at_reboot BOOLEAN NOT NULL DEFAULT FALSE,
                interval_secs INTEGER,
                live BOOLEAN NOT NULL DEFAULT TRUE,
                self_destruct BOOLEAN NOT NULL DEFAULT FALSE,
                exclusive_execution BOOLEAN NOT NULL DEFAULT FALSE,
                max_instances INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.catalog)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chain_tasks (
                command_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                kind TEXT NOT NULL,
                script TEXT NOT NULL,
                command_name TEXT NOT NULL DEFAULT '',
                ignore_error BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.catalog)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_parameters (
                command_id INTEGER NOT NULL,
                order_id INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (command_id, order_id),
                FOREIGN KEY (command_id) REFERENCES chain_tasks(command_id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.catalog)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chain_tasks_task ON chain_tasks(task_id, position)",
        )
        .execute(&self.catalog)
        .await?;

        // Journal: never written inside a chain transaction. Signals and the
        // interval schedule live here so they stay writable while a chain runs.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chain_signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_id INTEGER NOT NULL,
                command TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.journal)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chain_schedule (
                chain_id INTEGER PRIMARY KEY,
                next_run_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.journal)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chain_runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                chain_id INTEGER NOT NULL,
                task_id INTEGER NOT NULL,
                started_at TIMESTAMP NOT NULL,
                finished_at TIMESTAMP,
                status TEXT
            )
            "#,
        )
        .execute(&self.journal)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                chain_id INTEGER NOT NULL,
                task_id INTEGER NOT NULL,
                command_id INTEGER,
                status TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.journal)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chain_id INTEGER NOT NULL,
                task_id INTEGER NOT NULL,
                command_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                script TEXT NOT NULL,
                started_at TIMESTAMP,
                duration_us INTEGER NOT NULL,
                returncode INTEGER NOT NULL,
                output TEXT NOT NULL,
                logged_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.journal)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chain_runs_open ON chain_runs(chain_id, finished_at)",
        )
        .execute(&self.journal)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_run_status_chain ON run_status(chain_id)")
            .execute(&self.journal)
            .await?;

        Ok(())
    }
}
