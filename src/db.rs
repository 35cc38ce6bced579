use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::errors::{AppError, ResultExt};

/// Direct Postgres access, used only to inspect the live schema.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// `(column_name, data_type)` pairs of a `public` table in ordinal order.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, AppError> {
        sqlx::query_as(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("reading columns of {}", table))
    }

    /// Whether row-level security is enabled on a `public` table. `None` if the table is missing.
    pub async fn rls_enabled(&self, table: &str) -> Result<Option<bool>, AppError> {
        sqlx::query_scalar(
            "SELECT c.relrowsecurity FROM pg_class c \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = 'public' AND c.relname = $1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("reading RLS flag of {}", table))
    }

    /// Names and commands of the RLS policies on a `public` table.
    pub async fn policies(&self, table: &str) -> Result<Vec<(String, String)>, AppError> {
        sqlx::query_as(
            "SELECT policyname::text, cmd::text FROM pg_policies \
             WHERE schemaname = 'public' AND tablename = $1 ORDER BY policyname",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("reading policies of {}", table))
    }
}
