use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{FromRow, Sqlite, Transaction};

use crate::error::{ChainError, Result};
use crate::scheduler::{ChainElement, TaskKind};
use crate::store::StoreTransaction;

/// Catalog transaction held by one chain run
pub(super) struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTransaction {
    pub(super) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }
}

#[derive(FromRow)]
struct ElementRow {
    command_id: i64,
    task_id: i64,
    kind: String,
    script: String,
    command_name: String,
    ignore_error: bool,
}

impl TryFrom<ElementRow> for ChainElement {
    type Error = ChainError;

    fn try_from(row: ElementRow) -> Result<Self> {
        let kind: TaskKind = row.kind.parse()?;
        let mut element = ChainElement::new(row.command_id, row.task_id, kind, row.script)
            .with_ignore_error(row.ignore_error);
        if !row.command_name.is_empty() {
            element.command_name = row.command_name;
        }
        Ok(element)
    }
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s),
        other => query.bind(other.to_string()),
    }
}

/// Parse one parameter value into positional bind values
fn parse_bind_values(raw: &str) -> Result<Vec<Value>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(values) => Ok(values),
        single => Ok(vec![single]),
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn fetch_elements(&mut self, task_id: i64) -> Result<Vec<ChainElement>> {
        let rows: Vec<ElementRow> = sqlx::query_as(
            r#"
            SELECT command_id, task_id, kind, script, command_name, ignore_error
            FROM chain_tasks
            WHERE task_id = ?
            ORDER BY position ASC, command_id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn fetch_param_values(&mut self, element: &ChainElement) -> Result<Vec<String>> {
        let values: Vec<String> = sqlx::query_scalar(
            "SELECT value FROM task_parameters WHERE command_id = ? ORDER BY order_id ASC",
        )
        .bind(element.command_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(values)
    }

    async fn execute_statement(
        &mut self,
        element: &ChainElement,
        params: &[String],
    ) -> Result<String> {
        if params.is_empty() {
            let result = sqlx::query(&element.script)
                .execute(&mut *self.tx)
                .await?;
            return Ok(format!("{} row(s) affected", result.rows_affected()));
        }

        let mut outputs = Vec::with_capacity(params.len());
        for raw in params {
            let mut query = sqlx::query(&element.script);
            for value in parse_bind_values(raw)? {
                query = bind_json(query, value);
            }
            let result = query.execute(&mut *self.tx).await?;
            outputs.push(format!("{} row(s) affected", result.rows_affected()));
        }
        Ok(outputs.join("\n"))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
