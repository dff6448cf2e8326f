use anyhow::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::PathBuf;
use tokio::fs;

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let conn = Database::connect(database_url).await?;
    Ok(conn)
}

/// Applies the SQL files in `migrations/` in filename order, once each.
/// Applied filenames are recorded in `schema_migrations` and skipped on
/// later boots, so migration files are not limited to re-runnable
/// `IF NOT EXISTS` statements.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    conn.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS schema_migrations (filename TEXT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())".to_string(),
    ))
    .await?;

    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default();

        let applied = conn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT filename FROM schema_migrations WHERE filename = $1",
                [name.clone().into()],
            ))
            .await?
            .is_some();
        if applied {
            continue;
        }

        let sql = fs::read_to_string(&file).await?;
        for stmt in split_statements(&sql) {
            conn.execute(Statement::from_string(backend, stmt)).await?;
        }

        conn.execute(Statement::from_sql_and_values(
            backend,
            // Tolerate two processes racing through first boot.
            "INSERT INTO schema_migrations (filename) VALUES ($1) ON CONFLICT (filename) DO NOTHING",
            [name.clone().into()],
        ))
        .await?;
        tracing::info!(file = %name, "migration applied");
    }

    Ok(())
}

/// Postgres prepared statements carry one command each, so migration files
/// are split on semicolons. Migration SQL must therefore not contain
/// semicolons inside string literals or function bodies.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(|stmt| format!("{stmt};"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multi_statement_sql_and_drops_blanks() {
        let sql = "CREATE TABLE a (id INT);\n\nCREATE INDEX i ON a(id);\n";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE a (id INT);", "CREATE INDEX i ON a(id);"]
        );
        assert!(split_statements("  \n ; ; \n").is_empty());
    }
}
