// crates/db/src/ops.rs
//! Generic typed operations: equality-condition CRUD, stored-function calls,
//! and parameterized complex queries with three fetch modes.
//!
//! Every operation is wrapped in the 30-second adapter budget and is
//! cancellable: dropping the caller's future releases the borrowed
//! connection back to the pool.

use crate::value::{bind_value, row_to_json, rows_to_json, SqlValue};
use crate::{map_sqlx_err, Database, DbError, DbResult, OPERATION_TIMEOUT};
use serde_json::Value as Json;
use std::future::Future;

/// The twelve tables the system owns. Using an enum keeps identifier
/// interpolation closed over known names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Users,
    Passwords,
    Sessions,
    Words,
    PastWrongWords,
    Questions,
    GameData,
    GameQaHistory,
    GameSessions,
    Tasks,
    UserSettings,
    FlaggedQuestions,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Passwords => "passwords",
            Table::Sessions => "sessions",
            Table::Words => "words",
            Table::PastWrongWords => "past_wrong_words",
            Table::Questions => "questions",
            Table::GameData => "game_data",
            Table::GameQaHistory => "game_qa_history",
            Table::GameSessions => "game_sessions",
            Table::Tasks => "tasks",
            Table::UserSettings => "user_settings",
            Table::FlaggedQuestions => "flagged_questions",
        }
    }
}

/// Fetch mode for [`Database::execute_complex_query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// All rows.
    All,
    /// At most one row.
    One,
    /// No rows; report the affected-row count.
    Affected,
}

/// Output of a complex query, shaped by the fetch mode.
#[derive(Debug)]
pub enum QueryOutput {
    Rows(Vec<Json>),
    Row(Option<Json>),
    Affected(u64),
}

impl QueryOutput {
    pub fn into_rows(self) -> Vec<Json> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Row(row) => row.into_iter().collect(),
            QueryOutput::Affected(_) => Vec::new(),
        }
    }
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn build_insert_sql(table: Table, columns: &[&str], row_count: usize) -> String {
    let mut tuples = Vec::with_capacity(row_count);
    for row in 0..row_count {
        tuples.push(format!("({})", placeholders(row * columns.len() + 1, columns.len())));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {} RETURNING *",
        table.as_str(),
        columns.join(", "),
        tuples.join(", ")
    )
}

fn where_clause(columns: &[&str], first_index: usize) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ${}", first_index + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub(crate) fn build_update_sql(table: Table, set: &[&str], cond: &[&str]) -> String {
    let assignments = set
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ${}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} RETURNING *",
        table.as_str(),
        assignments,
        where_clause(cond, set.len() + 1)
    )
}

pub(crate) fn build_select_sql(table: Table, cond: &[&str], projection: Option<&[&str]>) -> String {
    let cols = projection.map_or_else(|| "*".to_string(), |p| p.join(", "));
    if cond.is_empty() {
        format!("SELECT {cols} FROM {}", table.as_str())
    } else {
        format!(
            "SELECT {cols} FROM {} WHERE {}",
            table.as_str(),
            where_clause(cond, 1)
        )
    }
}

pub(crate) fn build_delete_sql(table: Table, cond: &[&str]) -> String {
    format!(
        "DELETE FROM {} WHERE {} RETURNING *",
        table.as_str(),
        where_clause(cond, 1)
    )
}

pub(crate) fn build_call_sql(name: &str, arg_count: usize) -> String {
    format!("SELECT * FROM {name}({})", placeholders(1, arg_count))
}

pub(crate) fn build_named_call_sql(name: &str, arg_names: &[&str]) -> String {
    let assignments = arg_names
        .iter()
        .enumerate()
        .map(|(i, arg)| format!("{arg} := ${}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT * FROM {name}({assignments})")
}

/// Rewrite `$name`-style parameters to positional `$1..$n`, binding order
/// following the order of `names`. Longer names are substituted first so a
/// parameter like `$word` never clobbers `$word_ids`.
pub(crate) fn rewrite_named_params(query: &str, names: &[&str]) -> String {
    let mut order: Vec<(usize, &str)> = names.iter().copied().enumerate().collect();
    order.sort_by_key(|(_, name)| std::cmp::Reverse(name.len()));
    let mut rewritten = query.to_string();
    for (index, name) in order {
        rewritten = rewritten.replace(&format!("${name}"), &format!("${}", index + 1));
    }
    rewritten
}

impl Database {
    async fn with_timeout<T, F>(&self, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        tokio::time::timeout(OPERATION_TIMEOUT, fut)
            .await
            .map_err(|_| DbError::Timeout("operation exceeded the 30s adapter budget".into()))?
    }

    /// Insert a single row and return it as stored (defaults filled in).
    pub async fn insert(&self, table: Table, row: &[(&str, SqlValue)]) -> DbResult<Json> {
        let inserted = self
            .insert_many(
                table,
                &row.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
                vec![row.iter().map(|(_, v)| v.clone()).collect()],
            )
            .await?;
        inserted
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Query("insert returned no row".into()))
    }

    /// Insert a batch of rows sharing one column set; returns inserted rows
    /// in input order.
    pub async fn insert_many(
        &self,
        table: Table,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> DbResult<Vec<Json>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if rows.iter().any(|r| r.len() != columns.len()) {
            return Err(DbError::Query(
                "insert rows must match the declared column set".into(),
            ));
        }
        let sql = build_insert_sql(table, columns, rows.len());
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for row in rows {
                for value in row {
                    query = bind_value(query, value);
                }
            }
            let fetched = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
            rows_to_json(&fetched)
        })
        .await
    }

    /// Update rows matching all equality conditions; returns updated rows.
    pub async fn update(
        &self,
        table: Table,
        set: &[(&str, SqlValue)],
        cond: &[(&str, SqlValue)],
    ) -> DbResult<Vec<Json>> {
        if set.is_empty() || cond.is_empty() {
            return Err(DbError::Query("update needs set values and conditions".into()));
        }
        let sql = build_update_sql(
            table,
            &set.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
            &cond.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        );
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for (_, value) in set.iter().chain(cond.iter()) {
                query = bind_value(query, value.clone());
            }
            let fetched = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
            rows_to_json(&fetched)
        })
        .await
    }

    /// Delete rows matching all equality conditions; returns deleted rows.
    pub async fn delete(&self, table: Table, cond: &[(&str, SqlValue)]) -> DbResult<Vec<Json>> {
        if cond.is_empty() {
            return Err(DbError::Query("refusing to delete without conditions".into()));
        }
        let sql = build_delete_sql(table, &cond.iter().map(|(c, _)| *c).collect::<Vec<_>>());
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for (_, value) in cond {
                query = bind_value(query, value.clone());
            }
            let fetched = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
            rows_to_json(&fetched)
        })
        .await
    }

    /// Select rows matching all equality conditions, optionally projecting a
    /// column subset.
    pub async fn select(
        &self,
        table: Table,
        cond: &[(&str, SqlValue)],
        projection: Option<&[&str]>,
    ) -> DbResult<Vec<Json>> {
        let sql = build_select_sql(
            table,
            &cond.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
            projection,
        );
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for (_, value) in cond {
                query = bind_value(query, value.clone());
            }
            let fetched = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
            rows_to_json(&fetched)
        })
        .await
    }

    /// Count rows matching all equality conditions.
    pub async fn count(&self, table: Table, cond: &[(&str, SqlValue)]) -> DbResult<i64> {
        let where_sql = if cond.is_empty() {
            String::new()
        } else {
            format!(
                " WHERE {}",
                where_clause(&cond.iter().map(|(c, _)| *c).collect::<Vec<_>>(), 1)
            )
        };
        let sql = format!("SELECT COUNT(*) FROM {}{}", table.as_str(), where_sql);
        self.with_timeout(async {
            let mut query = sqlx::query_as::<_, (i64,)>(&sql);
            for (_, value) in cond {
                query = crate::value::bind_value_as(query, value.clone());
            }
            let (count,) = query.fetch_one(self.pool()).await.map_err(map_sqlx_err)?;
            Ok(count)
        })
        .await
    }

    /// Call a stored function with positional arguments, returning its
    /// result set (`SELECT * FROM fn($1, ...)`).
    pub async fn call_function(&self, name: &str, args: &[SqlValue]) -> DbResult<Vec<Json>> {
        let sql = build_call_sql(name, args.len());
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for value in args {
                query = bind_value(query, value.clone());
            }
            let fetched = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
            rows_to_json(&fetched)
        })
        .await
    }

    /// Call a stored function with named arguments, returning its result
    /// set (`SELECT * FROM fn(p_a := $1, p_b := $2)`). Argument order is
    /// free; names must match the function's declared parameter names.
    pub async fn call_function_named(
        &self,
        name: &str,
        args: &[(&str, SqlValue)],
    ) -> DbResult<Vec<Json>> {
        let arg_names: Vec<&str> = args.iter().map(|(n, _)| *n).collect();
        let sql = build_named_call_sql(name, &arg_names);
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for (_, value) in args {
                query = bind_value(query, value.clone());
            }
            let fetched = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
            rows_to_json(&fetched)
        })
        .await
    }

    /// Call a stored function that returns a single JSON document
    /// (`SELECT fn($1, ...)`).
    pub async fn call_function_json(&self, name: &str, args: &[SqlValue]) -> DbResult<Json> {
        let sql = format!("SELECT {name}({}) AS result", placeholders(1, args.len()));
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for value in args {
                query = bind_value(query, value.clone());
            }
            let row = query.fetch_one(self.pool()).await.map_err(map_sqlx_err)?;
            let json = row_to_json(&row)?;
            Ok(json
                .get("result")
                .cloned()
                .unwrap_or(Json::Null))
        })
        .await
    }

    /// Execute a parameterized complex query.
    ///
    /// The query text uses `$name` parameters resolved against `params`;
    /// the fetch mode picks between all rows, one row, and affected count.
    pub async fn execute_complex_query(
        &self,
        query_text: &str,
        params: &[(&str, SqlValue)],
        fetch: Fetch,
    ) -> DbResult<QueryOutput> {
        if query_text.trim().is_empty() {
            return Err(DbError::Query("query cannot be empty".into()));
        }
        let names: Vec<&str> = params.iter().map(|(n, _)| *n).collect();
        let sql = rewrite_named_params(query_text, &names);
        self.with_timeout(async {
            let mut query = sqlx::query(&sql);
            for (_, value) in params {
                query = bind_value(query, value.clone());
            }
            match fetch {
                Fetch::All => {
                    let rows = query.fetch_all(self.pool()).await.map_err(map_sqlx_err)?;
                    Ok(QueryOutput::Rows(rows_to_json(&rows)?))
                }
                Fetch::One => {
                    let row = query
                        .fetch_optional(self.pool())
                        .await
                        .map_err(map_sqlx_err)?;
                    Ok(QueryOutput::Row(row.as_ref().map(row_to_json).transpose()?))
                }
                Fetch::Affected => {
                    let done = query.execute(self.pool()).await.map_err(map_sqlx_err)?;
                    Ok(QueryOutput::Affected(done.rows_affected()))
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_insert_single_row() {
        let sql = build_insert_sql(Table::Words, &["word_id", "word"], 1);
        assert_eq!(
            sql,
            "INSERT INTO words (word_id, word) VALUES ($1, $2) RETURNING *"
        );
    }

    #[test]
    fn test_build_insert_multi_row_numbers_continue() {
        let sql = build_insert_sql(Table::Questions, &["a", "b", "c"], 2);
        assert_eq!(
            sql,
            "INSERT INTO questions (a, b, c) VALUES ($1, $2, $3), ($4, $5, $6) RETURNING *"
        );
    }

    #[test]
    fn test_build_update() {
        let sql = build_update_sql(
            Table::PastWrongWords,
            &["wrong_count", "last_wrong_at"],
            &["user_id", "word_id"],
        );
        assert_eq!(
            sql,
            "UPDATE past_wrong_words SET wrong_count = $1, last_wrong_at = $2 \
             WHERE user_id = $3 AND word_id = $4 RETURNING *"
        );
    }

    #[test]
    fn test_build_select_with_projection() {
        let sql = build_select_sql(
            Table::Words,
            &["word_id"],
            Some(&["word_id", "pronunciation_url"]),
        );
        assert_eq!(
            sql,
            "SELECT word_id, pronunciation_url FROM words WHERE word_id = $1"
        );
    }

    #[test]
    fn test_build_select_no_conditions() {
        let sql = build_select_sql(Table::Users, &[], None);
        assert_eq!(sql, "SELECT * FROM users");
    }

    #[test]
    fn test_build_delete() {
        let sql = build_delete_sql(Table::Sessions, &["session_id"]);
        assert_eq!(
            sql,
            "DELETE FROM sessions WHERE session_id = $1 RETURNING *"
        );
    }

    #[test]
    fn test_build_call_sql() {
        assert_eq!(build_call_sql("cleanup_game_sessions", 0), "SELECT * FROM cleanup_game_sessions()");
        assert_eq!(
            build_call_sql("get_random_words", 1),
            "SELECT * FROM get_random_words($1)"
        );
    }

    #[test]
    fn test_build_named_call_sql() {
        let sql = build_named_call_sql(
            "set_task_progress",
            &["p_user_id", "p_task_id", "p_progress"],
        );
        assert_eq!(
            sql,
            "SELECT * FROM set_task_progress(p_user_id := $1, p_task_id := $2, p_progress := $3)"
        );
    }

    #[test]
    fn test_rewrite_named_params_prefix_safe() {
        // `$word` must not clobber the `$word_ids` placeholder.
        let sql = rewrite_named_params(
            "SELECT * FROM questions WHERE target_word_id = ANY($word_ids) AND x = $word",
            &["word", "word_ids"],
        );
        assert_eq!(
            sql,
            "SELECT * FROM questions WHERE target_word_id = ANY($2) AND x = $1"
        );
    }

    #[test]
    fn test_rewrite_named_params_repeated_use() {
        let sql = rewrite_named_params("SELECT $id, $id", &["id"]);
        assert_eq!(sql, "SELECT $1, $1");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::PastWrongWords.as_str(), "past_wrong_words");
        assert_eq!(Table::GameQaHistory.as_str(), "game_qa_history");
        assert_eq!(Table::FlaggedQuestions.as_str(), "flagged_questions");
    }
}
