//! Terminal success/failure notifications.
//!
//! The pipeline reports each run's outcome through a [`Notifier`]: the DAG
//! identifier, the run identifier and, for failures, the failing step.
//! Notification is one-way; delivery failures are logged by the pipeline
//! and never affect the run result.

use crate::error::{EtlError, PipelineStep, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

/// Default Telegram Bot API endpoint.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default timeout for notification requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Channel receiving terminal pipeline outcomes.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report a successfully completed run.
    async fn notify_success(&self, dag_id: &str, run_id: &str) -> Result<()>;

    /// Report a failed run together with the step that aborted it.
    async fn notify_failure(
        &self,
        dag_id: &str,
        run_id: &str,
        step: Option<PipelineStep>,
    ) -> Result<()>;
}

/// Success message text shared by all notifier implementations.
pub fn success_message(dag_id: &str, run_id: &str) -> String {
    format!("Success: pipeline \"{dag_id}\" completed successfully with run_id \"{run_id}\".")
}

/// Failure message text shared by all notifier implementations.
pub fn failure_message(dag_id: &str, run_id: &str, step: Option<PipelineStep>) -> String {
    let step = step.map_or("unknown", |s| s.as_str());
    format!(
        "Failure: pipeline \"{dag_id}\" failed with run_id \"{run_id}\". Failed step: \"{step}\"."
    )
}

/// Notifier posting messages to a Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| EtlError::Notify(e.to_string()))?;

        Ok(Self {
            client,
            token: token.into(),
            chat_id: chat_id.into(),
            base_url: TELEGRAM_API_BASE.to_string(),
        })
    }

    /// Build a notifier from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`.
    ///
    /// Returns `None` when either variable is absent, letting the caller
    /// fall back to log-only notification.
    pub fn from_env() -> Result<Option<Self>> {
        match (
            std::env::var("TELEGRAM_BOT_TOKEN"),
            std::env::var("TELEGRAM_CHAT_ID"),
        ) {
            (Ok(token), Ok(chat_id)) => Ok(Some(Self::new(token, chat_id)?)),
            _ => Ok(None),
        }
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| EtlError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EtlError::Notify(format!(
                "telegram API returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_success(&self, dag_id: &str, run_id: &str) -> Result<()> {
        self.send_message(&success_message(dag_id, run_id)).await
    }

    async fn notify_failure(
        &self,
        dag_id: &str,
        run_id: &str,
        step: Option<PipelineStep>,
    ) -> Result<()> {
        self.send_message(&failure_message(dag_id, run_id, step))
            .await
    }
}

/// Notifier writing outcomes to the log only. Used when no external
/// channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_success(&self, dag_id: &str, run_id: &str) -> Result<()> {
        info!("{}", success_message(dag_id, run_id));
        Ok(())
    }

    async fn notify_failure(
        &self,
        dag_id: &str,
        run_id: &str,
        step: Option<PipelineStep>,
    ) -> Result<()> {
        error!("{}", failure_message(dag_id, run_id, step));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_message_carries_identifiers() {
        assert_eq!(
            success_message("real_estate_etl", "run-42"),
            "Success: pipeline \"real_estate_etl\" completed successfully with run_id \"run-42\"."
        );
    }

    #[test]
    fn test_failure_message_carries_step() {
        assert_eq!(
            failure_message("real_estate_etl", "run-42", Some(PipelineStep::Load)),
            "Failure: pipeline \"real_estate_etl\" failed with run_id \"run-42\". Failed step: \"load\"."
        );
    }

    #[test]
    fn test_failure_message_without_step() {
        let message = failure_message("real_estate_etl", "run-42", None);
        assert!(message.contains("\"unknown\""));
    }
}
