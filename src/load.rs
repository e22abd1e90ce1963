//! Count-guarded, all-or-nothing load of the cleaned record set.
//!
//! The loader writes the transformed rows into the destination table
//! exactly once. A single transaction takes an advisory lock keyed on the
//! table, checks the current row count and, only when the table is empty,
//! inserts every row. A populated table makes the run a logged no-op, so
//! repeating the pipeline never duplicates data. Every insert carries an
//! `ON CONFLICT DO NOTHING` clause on the destination's unique key, which
//! keeps a racing concurrent run harmless as well.

use crate::error::{EtlError, Result};
use crate::schema::{ColumnRole, LISTING_SCHEMA, ListingSchema};
use polars::prelude::*;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use tracing::{info, warn};

/// Result of a load attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LoadOutcome {
    /// All rows were inserted and committed.
    Loaded { rows: usize },
    /// The destination already held data; nothing was written.
    SkippedNonEmpty { existing: i64 },
    /// The load step was not attempted (dry run).
    NotAttempted,
}

/// Whether a load may proceed given the destination's current row count.
pub fn should_load(existing_rows: i64) -> bool {
    existing_rows == 0
}

/// Persists the cleaned record set into the destination table.
pub struct Loader {
    pool: PgPool,
    table: String,
}

impl Loader {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Load `df` into the destination table, once.
    ///
    /// Insert or commit failures abort the transaction; nothing is half
    /// committed. A populated destination is reported as
    /// [`LoadOutcome::SkippedNonEmpty`] and is not an error.
    pub async fn load(&self, df: &DataFrame) -> Result<LoadOutcome> {
        let schema = &*LISTING_SCHEMA;
        let mut tx = self.pool.begin().await.map_err(EtlError::Load)?;

        // Serialize concurrent runs over the count-check-and-insert pair.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&self.table)
            .execute(&mut *tx)
            .await
            .map_err(EtlError::Load)?;

        let existing: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&mut *tx)
            .await
            .map_err(EtlError::Load)?;

        if !should_load(existing) {
            warn!(
                table = %self.table,
                existing,
                "destination table is not empty, no data loaded"
            );
            tx.commit().await.map_err(EtlError::Load)?;
            return Ok(LoadOutcome::SkippedNonEmpty { existing });
        }

        let statement = schema.insert_sql(&self.table);
        let columns = persisted_views(df, schema)?;

        for i in 0..df.height() {
            let mut query = sqlx::query(&statement);
            for view in &columns {
                query = view.bind_value(query, i);
            }
            query.execute(&mut *tx).await.map_err(EtlError::Load)?;
        }

        tx.commit().await.map_err(EtlError::Load)?;
        info!(rows = df.height(), table = %self.table, "load complete");
        Ok(LoadOutcome::Loaded { rows: df.height() })
    }
}

/// Typed view over one persisted column of the cleaned record set.
#[derive(Debug)]
enum ColumnView<'a> {
    Str(&'a StringChunked),
    Int(&'a Int64Chunked),
    Float(&'a Float64Chunked),
}

impl ColumnView<'_> {
    fn bind_value<'q>(
        &self,
        query: Query<'q, sqlx::Postgres, PgArguments>,
        row: usize,
    ) -> Query<'q, sqlx::Postgres, PgArguments> {
        match self {
            Self::Str(ca) => query.bind(ca.get(row).map(str::to_string)),
            Self::Int(ca) => query.bind(ca.get(row)),
            Self::Float(ca) => query.bind(ca.get(row)),
        }
    }
}

/// Resolve the persisted columns of `df` into typed views, in the schema's
/// load order. The transformer guarantees the dtypes; anything else is a
/// contract violation surfaced as a column error.
fn persisted_views<'a>(df: &'a DataFrame, schema: &ListingSchema) -> Result<Vec<ColumnView<'a>>> {
    let mut views = Vec::new();
    for def in schema.load_column_defs() {
        let column = df
            .column(def.name)
            .map_err(|_| EtlError::ColumnNotFound(def.name.to_string()))?;
        let view = match def.role {
            ColumnRole::Identity | ColumnRole::Categorical => ColumnView::Str(column.str()?),
            ColumnRole::Integer | ColumnRole::Flag => ColumnView::Int(column.i64()?),
            ColumnRole::Float => ColumnView::Float(column.f64()?),
        };
        views.push(view);
    }
    Ok(views)
}
