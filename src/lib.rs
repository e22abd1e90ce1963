//! Real-Estate Listings ETL Pipeline
//!
//! A small, sequential Extract-Transform-Load pipeline for real-estate
//! listing data, built with Polars and sqlx.
//!
//! # Overview
//!
//! The pipeline reads two source relations (buildings and flats) from
//! Postgres, joins them into one wide record set, cleans it and loads the
//! result into a destination table exactly once:
//!
//! - **Extract**: left outer join of buildings against flats, projected
//!   through a single shared schema descriptor
//! - **Transform**: flag coercion, deduplication (identity columns
//!   ignored), hard price-range filtering, IQR-based multi-column anomaly
//!   removal, column pruning
//! - **Load**: count-guarded transactional insert; re-running against a
//!   populated table writes nothing
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use estate_etl::{DbConfig, EtlConfig, EtlPipeline};
//! use estate_etl::notify::LogNotifier;
//! use std::sync::Arc;
//!
//! let pool = DbConfig::from_env()?.connect().await?;
//!
//! let report = EtlPipeline::builder()
//!     .config(EtlConfig::default())
//!     .pool(pool)
//!     .notifier(Arc::new(LogNotifier))
//!     .build()?
//!     .run()
//!     .await?;
//!
//! println!("loaded rows: {:?}", report.load);
//! ```
//!
//! # Configuration
//!
//! Cleaning parameters are configuration, not constants:
//!
//! ```rust,ignore
//! use estate_etl::EtlConfig;
//!
//! let config = EtlConfig::builder()
//!     .price_range(1e6, 1.5e8)   // inclusive bounds on `price`
//!     .iqr_threshold(1.5)        // outlier bound multiplier
//!     .destination_table("real_estate_listings")
//!     .build()?;
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod notify;
pub mod pipeline;
pub mod schema;
pub mod transform;

// Re-exports for convenient access
pub use config::{ConfigValidationError, DbConfig, EtlConfig, EtlConfigBuilder};
pub use error::{EtlError, PipelineStep, Result};
pub use extract::Extractor;
pub use load::{LoadOutcome, Loader, should_load};
pub use notify::{LogNotifier, Notifier, TelegramNotifier};
pub use pipeline::{EtlPipeline, EtlPipelineBuilder, RunReport};
pub use schema::{ColumnOrigin, ColumnRole, LISTING_SCHEMA, ListingSchema};
pub use transform::{AnomalyDetector, IqrBounds, TransformSummary, Transformer, iqr_bounds};
