//! The ETL pipeline orchestrator.
//!
//! [`EtlPipeline`] runs the three steps strictly in sequence — extract,
//! transform, load — over a single database pool, reports the terminal
//! outcome through the configured [`Notifier`] and returns a [`RunReport`]
//! with the row accounting of the run. Nothing is retried here; recovery
//! policy belongs to whatever schedules the runs.

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::extract::Extractor;
use crate::load::{LoadOutcome, Loader};
use crate::notify::Notifier;
use crate::transform::{TransformSummary, Transformer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dag_id: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub rows_extracted: usize,
    pub transform: TransformSummary,
    pub load: LoadOutcome,
}

/// The ETL pipeline.
///
/// Use [`EtlPipeline::builder()`] to assemble one from a configuration,
/// a database pool and an optional notifier.
pub struct EtlPipeline {
    config: EtlConfig,
    pool: PgPool,
    notifier: Option<Arc<dyn Notifier>>,
}

impl std::fmt::Debug for EtlPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlPipeline")
            .field("config", &self.config)
            .field("notifier", &self.notifier.as_ref().map(|_| "<notifier>"))
            .finish()
    }
}

// The pipeline crosses task boundaries when scheduled from a runtime.
static_assertions::assert_impl_all!(EtlPipeline: Send);

impl EtlPipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> EtlPipelineBuilder {
        EtlPipelineBuilder::default()
    }

    /// Execute one full run: extract, transform, load.
    ///
    /// The notifier receives the terminal outcome either way; notification
    /// delivery failures are logged and never override the run result.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        info!(dag_id = %self.config.dag_id, run_id = %run_id, "starting pipeline run");

        match self.run_internal(&run_id, false).await {
            Ok(report) => {
                self.notify_success(&run_id).await;
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %run_id, "pipeline run failed: {e}");
                self.notify_failure(&run_id, &e).await;
                Err(e)
            }
        }
    }

    /// Execute extract and transform only, skipping the load and the
    /// notifications. Useful for previewing what a run would write.
    pub async fn dry_run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        info!(dag_id = %self.config.dag_id, run_id = %run_id, "starting dry run");
        self.run_internal(&run_id, true).await
    }

    async fn run_internal(&self, run_id: &str, skip_load: bool) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        info!("step 1: extracting listings");
        let extractor = Extractor::new(self.pool.clone());
        let df = extractor.extract(&self.config).await?;
        let rows_extracted = df.height();

        info!("step 2: transforming {} rows", rows_extracted);
        let transformer = Transformer::new(self.config.clone());
        let (df, transform) = transformer.transform(df)?;

        let load = if skip_load {
            info!("dry run: load skipped");
            LoadOutcome::NotAttempted
        } else {
            info!("step 3: loading {} rows", df.height());
            let loader = Loader::new(self.pool.clone(), self.config.destination_table.clone());
            loader.load(&df).await?
        };

        Ok(RunReport {
            dag_id: self.config.dag_id.clone(),
            run_id: run_id.to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            rows_extracted,
            transform,
            load,
        })
    }

    async fn notify_success(&self, run_id: &str) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify_success(&self.config.dag_id, run_id).await {
                warn!("success notification not delivered: {e}");
            }
        }
    }

    async fn notify_failure(&self, run_id: &str, error: &EtlError) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier
                .notify_failure(&self.config.dag_id, run_id, error.step())
                .await
            {
                warn!("failure notification not delivered: {e}");
            }
        }
    }
}

/// Builder for [`EtlPipeline`].
#[derive(Default)]
pub struct EtlPipelineBuilder {
    config: Option<EtlConfig>,
    pool: Option<PgPool>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EtlPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`EtlConfig::default`].
    pub fn config(mut self, config: EtlConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the database pool shared by extraction and load. Required.
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the notification channel for terminal outcomes.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the pipeline, validating the configuration.
    pub fn build(self) -> Result<EtlPipeline> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| EtlError::InvalidConfig(e.to_string()))?;

        let pool = self
            .pool
            .ok_or_else(|| EtlError::InvalidConfig("database pool is required".to_string()))?;

        Ok(EtlPipeline {
            config,
            pool,
            notifier: self.notifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_pool() {
        let result = EtlPipeline::builder().build();
        assert!(matches!(result.unwrap_err(), EtlError::InvalidConfig(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        // An invalid config fails before the missing pool is even checked.
        let config = EtlConfig {
            iqr_threshold: -1.0,
            ..EtlConfig::default()
        };
        let result = EtlPipeline::builder().config(config).build();
        assert!(matches!(result.unwrap_err(), EtlError::InvalidConfig(_)));
    }

    #[test]
    fn test_run_report_serialization() {
        let report = RunReport {
            dag_id: "real_estate_etl".to_string(),
            run_id: "run-1".to_string(),
            started_at: Utc::now(),
            duration_ms: 12,
            rows_extracted: 100,
            transform: TransformSummary {
                rows_in: 100,
                duplicates_removed: 5,
                out_of_range_removed: 3,
                anomalies_removed: 2,
                rows_out: 90,
            },
            load: LoadOutcome::Loaded { rows: 90 },
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"rows_extracted\":100"));
        assert!(json.contains("\"duplicates_removed\":5"));
        assert!(json.contains("\"loaded\""));
    }
}
