//! Extraction of the wide listing record set from the source relations.
//!
//! The extractor joins the buildings relation against the flats relation
//! with a left outer join on the building identifier and materializes the
//! projected columns into a DataFrame. Buildings without a matching flat
//! survive the join with all flat-side columns null; no validation or
//! cleanup happens here.

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::schema::{ColumnDef, ColumnRole, LISTING_SCHEMA};
use polars::prelude::*;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

/// Reads and joins the source relations into a single wide record set.
pub struct Extractor {
    pool: PgPool,
}

impl Extractor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the extraction query and materialize the result.
    ///
    /// Connection and query errors are fatal for the run.
    pub async fn extract(&self, config: &EtlConfig) -> Result<DataFrame> {
        let sql = LISTING_SCHEMA.select_sql(&config.buildings_table, &config.flats_table);
        debug!(query = %sql, "running extraction query");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(EtlError::Extract)?;

        let df = materialize(&rows)?;
        info!(
            rows = df.height(),
            columns = df.width(),
            "extracted listing record set"
        );
        Ok(df)
    }
}

/// Column buffer matching one schema column's extraction dtype.
enum RawColumn {
    Str(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Flag(Vec<Option<bool>>),
}

impl RawColumn {
    fn for_column(def: &ColumnDef, capacity: usize) -> Self {
        match def.role {
            ColumnRole::Identity | ColumnRole::Categorical => {
                Self::Str(Vec::with_capacity(capacity))
            }
            ColumnRole::Integer => Self::Int(Vec::with_capacity(capacity)),
            ColumnRole::Float => Self::Float(Vec::with_capacity(capacity)),
            ColumnRole::Flag => Self::Flag(Vec::with_capacity(capacity)),
        }
    }

    fn push_from_row(&mut self, row: &PgRow, name: &str) -> sqlx::Result<()> {
        match self {
            Self::Str(values) => values.push(row.try_get::<Option<String>, _>(name)?),
            Self::Int(values) => {
                values.push(row.try_get::<Option<i32>, _>(name)?.map(i64::from))
            }
            Self::Float(values) => values.push(row.try_get::<Option<f64>, _>(name)?),
            Self::Flag(values) => values.push(row.try_get::<Option<bool>, _>(name)?),
        }
        Ok(())
    }

    fn into_series(self, name: &str) -> Series {
        match self {
            Self::Str(values) => Series::new(name.into(), values),
            Self::Int(values) => Series::new(name.into(), values),
            Self::Float(values) => Series::new(name.into(), values),
            Self::Flag(values) => Series::new(name.into(), values),
        }
    }
}

/// Turn the fetched rows into a DataFrame, column by column, with the
/// dtypes declared by the schema.
fn materialize(rows: &[PgRow]) -> Result<DataFrame> {
    let schema = &*LISTING_SCHEMA;
    let mut buffers: Vec<RawColumn> = schema
        .columns()
        .iter()
        .map(|def| RawColumn::for_column(def, rows.len()))
        .collect();

    for row in rows {
        for (def, buffer) in schema.columns().iter().zip(buffers.iter_mut()) {
            buffer
                .push_from_row(row, def.name)
                .map_err(EtlError::Extract)?;
        }
    }

    let columns: Vec<Column> = schema
        .columns()
        .iter()
        .zip(buffers)
        .map(|(def, buffer)| buffer.into_series(def.name).into())
        .collect();

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_column_dtypes_follow_roles() {
        let schema = &*LISTING_SCHEMA;
        for def in schema.columns() {
            let buffer = RawColumn::for_column(def, 0);
            let series = buffer.into_series(def.name);
            let expected = match def.role {
                ColumnRole::Identity | ColumnRole::Categorical => DataType::String,
                ColumnRole::Integer => DataType::Int64,
                ColumnRole::Float => DataType::Float64,
                ColumnRole::Flag => DataType::Boolean,
            };
            assert_eq!(series.dtype(), &expected, "column {}", def.name);
        }
    }

    #[test]
    fn test_materialize_empty_result() {
        let df = materialize(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), LISTING_SCHEMA.columns().len());
    }
}
