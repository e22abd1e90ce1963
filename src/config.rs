//! Configuration for the ETL pipeline.
//!
//! [`EtlConfig`] carries the tunable cleaning parameters with the builder
//! pattern. The anomaly threshold and the hard price bounds are deliberate
//! configuration rather than buried literals; the defaults reproduce the
//! production values.
//!
//! [`DbConfig`] resolves database connection settings from the environment.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default DAG identifier reported to the notification channel.
const DEFAULT_DAG_ID: &str = "real_estate_etl";

/// Default destination table for cleaned listings.
const DEFAULT_DESTINATION_TABLE: &str = "real_estate_listings";

/// Default inclusive price range in source currency units.
const DEFAULT_PRICE_MIN: f64 = 1e6;
const DEFAULT_PRICE_MAX: f64 = 1.5e8;

/// Default IQR multiplier for outlier bounds.
const DEFAULT_IQR_THRESHOLD: f64 = 1.5;

/// Configuration for the ETL pipeline.
///
/// Use [`EtlConfig::builder()`] for fluent construction with validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Pipeline identifier carried by success/failure notifications.
    pub dag_id: String,

    /// Source relation holding one row per building.
    pub buildings_table: String,

    /// Source relation holding one row per flat.
    pub flats_table: String,

    /// Destination relation for cleaned listings.
    pub destination_table: String,

    /// Inclusive lower bound on `price`; cheaper rows are dropped.
    pub price_min: f64,

    /// Inclusive upper bound on `price`; more expensive rows are dropped.
    pub price_max: f64,

    /// Multiplier applied to the IQR when computing outlier bounds.
    pub iqr_threshold: f64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            dag_id: DEFAULT_DAG_ID.to_string(),
            buildings_table: "buildings".to_string(),
            flats_table: "flats".to_string(),
            destination_table: DEFAULT_DESTINATION_TABLE.to_string(),
            price_min: DEFAULT_PRICE_MIN,
            price_max: DEFAULT_PRICE_MAX,
            iqr_threshold: DEFAULT_IQR_THRESHOLD,
        }
    }
}

impl EtlConfig {
    /// Create a new configuration builder.
    pub fn builder() -> EtlConfigBuilder {
        EtlConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !(self.price_min.is_finite() && self.price_max.is_finite())
            || self.price_min <= 0.0
            || self.price_min >= self.price_max
        {
            return Err(ConfigValidationError::InvalidPriceRange {
                min: self.price_min,
                max: self.price_max,
            });
        }

        if !self.iqr_threshold.is_finite() || self.iqr_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidThreshold(self.iqr_threshold));
        }

        for (field, name) in [
            ("buildings_table", &self.buildings_table),
            ("flats_table", &self.flats_table),
            ("destination_table", &self.destination_table),
        ] {
            // Table names are interpolated into SQL statements, so they are
            // restricted to plain identifiers.
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
            {
                return Err(ConfigValidationError::InvalidTableName {
                    field,
                    value: name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid price range: [{min}, {max}] (must be finite, positive and ordered)")]
    InvalidPriceRange { min: f64, max: f64 },

    #[error("invalid IQR threshold: {0} (must be finite and positive)")]
    InvalidThreshold(f64),

    #[error("invalid table name for '{field}': '{value}'")]
    InvalidTableName { field: &'static str, value: String },
}

/// Builder for [`EtlConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct EtlConfigBuilder {
    dag_id: Option<String>,
    buildings_table: Option<String>,
    flats_table: Option<String>,
    destination_table: Option<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    iqr_threshold: Option<f64>,
}

impl EtlConfigBuilder {
    /// Set the pipeline identifier used in notifications.
    pub fn dag_id(mut self, dag_id: impl Into<String>) -> Self {
        self.dag_id = Some(dag_id.into());
        self
    }

    /// Set the buildings source table.
    pub fn buildings_table(mut self, table: impl Into<String>) -> Self {
        self.buildings_table = Some(table.into());
        self
    }

    /// Set the flats source table.
    pub fn flats_table(mut self, table: impl Into<String>) -> Self {
        self.flats_table = Some(table.into());
        self
    }

    /// Set the destination table.
    pub fn destination_table(mut self, table: impl Into<String>) -> Self {
        self.destination_table = Some(table.into());
        self
    }

    /// Set the inclusive price range kept by the range filter.
    pub fn price_range(mut self, min: f64, max: f64) -> Self {
        self.price_min = Some(min);
        self.price_max = Some(max);
        self
    }

    /// Set the IQR multiplier for outlier bounds.
    pub fn iqr_threshold(mut self, threshold: f64) -> Self {
        self.iqr_threshold = Some(threshold);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `EtlConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<EtlConfig, ConfigValidationError> {
        let defaults = EtlConfig::default();
        let config = EtlConfig {
            dag_id: self.dag_id.unwrap_or(defaults.dag_id),
            buildings_table: self.buildings_table.unwrap_or(defaults.buildings_table),
            flats_table: self.flats_table.unwrap_or(defaults.flats_table),
            destination_table: self.destination_table.unwrap_or(defaults.destination_table),
            price_min: self.price_min.unwrap_or(defaults.price_min),
            price_max: self.price_max.unwrap_or(defaults.price_max),
            iqr_threshold: self.iqr_threshold.unwrap_or(defaults.iqr_threshold),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Database connection settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    /// Read connection settings from the environment.
    ///
    /// `DATABASE_URL` wins when set; otherwise the URL is assembled from the
    /// `DB_DESTINATION_HOST/PORT/NAME/USER/PASSWORD` variables used by the
    /// original deployment.
    pub fn from_env() -> Result<Self> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return Ok(Self {
                url,
                max_connections: 5,
            });
        }

        let var = |name: &str| {
            std::env::var(name).map_err(|_| {
                EtlError::InvalidConfig(format!(
                    "neither DATABASE_URL nor {name} is set in the environment"
                ))
            })
        };

        let host = var("DB_DESTINATION_HOST")?;
        let port = var("DB_DESTINATION_PORT")?;
        let db = var("DB_DESTINATION_NAME")?;
        let user = var("DB_DESTINATION_USER")?;
        let password = var("DB_DESTINATION_PASSWORD")?;

        Ok(Self {
            url: format!("postgresql://{user}:{password}@{host}:{port}/{db}"),
            max_connections: 5,
        })
    }

    /// Open a connection pool against the configured database.
    ///
    /// Connection failures are extraction failures from the pipeline's point
    /// of view: nothing has been read yet and the run aborts.
    pub async fn connect(&self) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await
            .map_err(EtlError::Extract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EtlConfig::default();
        assert_eq!(config.price_min, 1e6);
        assert_eq!(config.price_max, 1.5e8);
        assert_eq!(config.iqr_threshold, 1.5);
        assert_eq!(config.destination_table, "real_estate_listings");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = EtlConfig::builder()
            .dag_id("nightly_etl")
            .price_range(5e5, 1e8)
            .iqr_threshold(3.0)
            .destination_table("listings_clean")
            .build()
            .unwrap();

        assert_eq!(config.dag_id, "nightly_etl");
        assert_eq!(config.price_min, 5e5);
        assert_eq!(config.price_max, 1e8);
        assert_eq!(config.iqr_threshold, 3.0);
        assert_eq!(config.destination_table, "listings_clean");
    }

    #[test]
    fn test_validation_rejects_inverted_price_range() {
        let result = EtlConfig::builder().price_range(2e8, 1e6).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidPriceRange { .. }
        ));
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let result = EtlConfig::builder().iqr_threshold(0.0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold(_)
        ));
    }

    #[test]
    fn test_validation_rejects_unsafe_table_name() {
        let result = EtlConfig::builder()
            .destination_table("listings; DROP TABLE listings")
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidTableName { .. }
        ));
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = EtlConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EtlConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.price_min, deserialized.price_min);
        assert_eq!(config.dag_id, deserialized.dag_id);
    }
}
