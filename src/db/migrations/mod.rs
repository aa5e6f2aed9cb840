use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::error::Error;

/// Schema migrations, applied in order. Every script is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_camera_configs.sql",
        include_str!("sql/001_camera_configs.sql"),
    ),
    ("002_tripwires.sql", include_str!("sql/002_tripwires.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    pool.execute(sql)
        .await
        .map_err(|e| Error::Database(format!("Migration {} failed: {}", name, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_tripwires_cascade() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let (_, tripwires) = MIGRATIONS[1];
        assert!(tripwires.contains("ON DELETE CASCADE"));
    }
}
