//! Transformation of raw extracted listings into load-ready rows.
//!
//! The [`Transformer`] applies a fixed sequence of cleaning steps, each
//! feeding the next:
//!
//! 1. coerce the boolean-like flag columns to 0/1 integers,
//! 2. drop duplicate rows (identity columns ignored, first occurrence kept),
//! 3. drop rows with `price` outside the configured range,
//! 4. drop rows flagged as outliers on any eligible column,
//! 5. prune columns that never reach the destination table.
//!
//! The whole transform is a pure function of its input and configuration;
//! it performs no I/O.

pub mod outliers;

pub use outliers::{AnomalyDetector, IqrBounds, iqr_bounds};

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::schema::{LISTING_SCHEMA, ListingSchema, PRICE};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Separator for rendered row keys during deduplication. A control
/// character keeps string cell contents from colliding with the joint key.
const KEY_SEPARATOR: char = '\u{1f}';

/// Row accounting for one transform run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformSummary {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub out_of_range_removed: usize,
    pub anomalies_removed: usize,
    pub rows_out: usize,
}

/// Converts raw extracted rows into load-ready rows.
pub struct Transformer {
    config: EtlConfig,
    schema: &'static ListingSchema,
}

impl Transformer {
    pub fn new(config: EtlConfig) -> Self {
        Self {
            config,
            schema: &LISTING_SCHEMA,
        }
    }

    /// Run all cleaning steps over `df`.
    pub fn transform(&self, df: DataFrame) -> Result<(DataFrame, TransformSummary)> {
        let mut summary = TransformSummary {
            rows_in: df.height(),
            ..TransformSummary::default()
        };

        let df = self.coerce_flag_columns(df)?;

        let before = df.height();
        let df = self.drop_duplicates(df)?;
        summary.duplicates_removed = before - df.height();

        let before = df.height();
        let df = self.filter_price_range(df)?;
        summary.out_of_range_removed = before - df.height();

        let before = df.height();
        let df = self.drop_anomalies(df)?;
        summary.anomalies_removed = before - df.height();

        let df = self.prune_transient_columns(df);
        summary.rows_out = df.height();

        info!(
            rows_in = summary.rows_in,
            duplicates_removed = summary.duplicates_removed,
            out_of_range_removed = summary.out_of_range_removed,
            anomalies_removed = summary.anomalies_removed,
            rows_out = summary.rows_out,
            "transform complete"
        );

        Ok((df, summary))
    }

    /// Coerce the boolean-like columns to a 64-bit integer representation.
    ///
    /// Nulls survive the cast unchanged; the surrounding system does not
    /// guard against them here (rows without a price are removed by the
    /// range filter either way).
    fn coerce_flag_columns(&self, mut df: DataFrame) -> Result<DataFrame> {
        for name in self.schema.flag_columns() {
            let column = df
                .column(name)
                .map_err(|_| EtlError::ColumnNotFound(name.to_string()))?;
            let coerced = column
                .as_materialized_series()
                .strict_cast(&DataType::Int64)
                .map_err(|e| EtlError::FlagCoercion {
                    column: name.to_string(),
                    reason: e.to_string(),
                })?;
            df.replace(name, coerced)?;
        }
        Ok(df)
    }

    /// Drop duplicate rows, comparing every non-identity column.
    ///
    /// Rows compare equal when each compared column renders the same value;
    /// the first occurrence is kept. Column order does not affect the
    /// comparison because the subset is taken in declared schema order.
    fn drop_duplicates(&self, df: DataFrame) -> Result<DataFrame> {
        let subset = self.schema.dedup_columns();
        let mut compared = Vec::with_capacity(subset.len());
        for name in &subset {
            let column = df
                .column(name)
                .map_err(|_| EtlError::ColumnNotFound(name.to_string()))?;
            compared.push(column.as_materialized_series());
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(df.height());
        let mut first_occurrence = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let mut key = String::new();
            for series in &compared {
                key.push_str(&format!("{}", series.get(i)?));
                key.push(KEY_SEPARATOR);
            }
            first_occurrence.push(seen.insert(key));
        }

        let mask = BooleanChunked::from_slice("first_occurrence".into(), &first_occurrence);
        let deduped = df.filter(&mask)?;
        debug!("deduplication removed {} rows", df.height() - deduped.height());
        Ok(deduped)
    }

    /// Keep rows whose price lies inside the configured inclusive range.
    ///
    /// Rows with a null price fail the range check and are dropped, the
    /// same way an out-of-range value would be.
    fn filter_price_range(&self, df: DataFrame) -> Result<DataFrame> {
        let price = df
            .column(PRICE)
            .map_err(|_| EtlError::ColumnNotFound(PRICE.to_string()))?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let ca = price.f64()?;

        let mut in_range = Vec::with_capacity(ca.len());
        for value in ca.into_iter() {
            in_range.push(match value {
                Some(p) => p >= self.config.price_min && p <= self.config.price_max,
                None => false,
            });
        }

        let mask = BooleanChunked::from_slice("price_in_range".into(), &in_range);
        let filtered = df.filter(&mask)?;
        debug!(
            "price range [{}, {}] removed {} rows",
            self.config.price_min,
            self.config.price_max,
            df.height() - filtered.height()
        );
        Ok(filtered)
    }

    /// Drop every row flagged as an outlier on at least one eligible column.
    fn drop_anomalies(&self, df: DataFrame) -> Result<DataFrame> {
        let eligible = self.schema.anomaly_columns();
        let detector = AnomalyDetector::new(self.config.iqr_threshold);
        let flagged = detector.flag_outliers(&df, &eligible)?;

        let keep: Vec<bool> = flagged.into_iter().map(|v| !v.unwrap_or(false)).collect();
        let mask = BooleanChunked::from_slice("keep".into(), &keep);
        let filtered = df.filter(&mask)?;
        debug!(
            "anomaly removal dropped {} rows",
            df.height() - filtered.height()
        );
        Ok(filtered)
    }

    /// Remove columns that never reach the destination table.
    fn prune_transient_columns(&self, df: DataFrame) -> DataFrame {
        let transient: Vec<PlSmallStr> = self
            .schema
            .transient_columns()
            .iter()
            .map(|s| (*s).into())
            .collect();
        df.drop_many(transient)
    }
}
