//! Audit Orchestrator
//!
//! Sequences one audit run: load config, resolve environments, reconcile
//! against web ACLs, notify. Every path ends in a [`RunResult`].

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{error, info, info_span, Instrument, Span};

use crate::aws::{AwsContext, AwsInventory};
use crate::config::{AuditConfig, ConfigLoader};
use crate::error::AuditError;
use crate::inventory::{resolve_environments, InventoryProvider};
use crate::notifier::{NotificationOutcome, Notifier, SlackWebhook, WebhookTransport};
use crate::reconciler::reconcile_live;
use crate::secrets::{ConfigDecryptor, KmsDecryptor, PlaintextDecryptor};

const SUCCESS_MESSAGE: &str = "Everything executed smoothly.";

/// Status/body pair returned by every invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl RunResult {
    /// `{"error": ..}` for status ≥ 300, `{"success": ..}` otherwise
    pub fn new(status_code: u16, message: &str) -> Self {
        let key = if status_code >= 300 { "error" } else { "success" };
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), json!(message));
        Self {
            status_code,
            body: serde_json::Value::Object(body).to_string(),
        }
    }

    pub fn success(message: &str) -> Self {
        Self::new(200, message)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 300
    }
}

impl From<&AuditError> for RunResult {
    fn from(err: &AuditError) -> Self {
        Self::new(err.status_code(), &err.to_string())
    }
}

/// What one run found and did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub monitored: usize,
    pub unprotected: BTreeSet<String>,
    pub notifications: Vec<NotificationOutcome>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl RunReport {
    pub fn delivered_count(&self) -> usize {
        self.notifications.iter().filter(|n| n.delivered()).count()
    }
}

/// How the config blob is decrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DecryptionMode {
    /// AWS KMS Decrypt
    #[default]
    Kms,
    /// Config is stored in plaintext
    #[value(name = "none")]
    Plaintext,
}

/// Process-level settings, resolved from CLI flags and environment
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub config_file: Option<String>,
    pub decryption: DecryptionMode,
    pub aws_profile: Option<String>,
    pub aws_region: Option<String>,
}

/// Core audit over injected collaborators
///
/// `span` is the run's logging context; all events of the run are recorded in it.
pub async fn audit<T: WebhookTransport>(
    config: &AuditConfig,
    inventory: &dyn InventoryProvider,
    notifier: &Notifier<T>,
    span: Span,
) -> Result<RunReport, AuditError> {
    async move {
        let mut monitored: BTreeSet<String> = config.lb_arns.iter().cloned().collect();
        info!(count = monitored.len(), "LBs to watch for WAF association");
        let descriptors: BTreeSet<String> = config.ebstalk_envs.iter().cloned().collect();
        info!(count = descriptors.len(), "ElasticBeanstalk environments to watch");

        if config.resolve_environments && !descriptors.is_empty() {
            let resolved = resolve_environments(inventory, &descriptors)
                .await
                .map_err(AuditError::inventory)?;
            monitored.extend(resolved);
            info!(
                count = monitored.len(),
                "LBs to watch for WAF association after environment resolution"
            );
        }

        let unprotected = reconcile_live(inventory, &monitored)
            .await
            .map_err(AuditError::inventory)?;
        info!(count = unprotected.len(), "LBs without WAF association");

        let notifications = notifier.notify(&config.slack_hooks, &unprotected).await;

        Ok(RunReport {
            monitored: monitored.len(),
            unprotected,
            notifications,
            timestamp: chrono::Utc::now(),
        })
    }
    .instrument(span)
    .await
}

/// Serverless-style entry point; `event` and `context` are only recorded
pub async fn handler(
    event: serde_json::Value,
    context: serde_json::Value,
    settings: &Settings,
) -> RunResult {
    let span = info_span!("audit_run", run_id = %uuid::Uuid::new_v4());
    let result = run(event, context, settings, span.clone())
        .instrument(span)
        .await;

    match result {
        Ok(message) => RunResult::success(&message),
        Err(err) => {
            error!(status = err.status_code(), error = %err, "Audit run failed");
            RunResult::from(&err)
        }
    }
}

async fn run(
    event: serde_json::Value,
    context: serde_json::Value,
    settings: &Settings,
    span: Span,
) -> Result<String, AuditError> {
    info!(event = %event, context = %context, "Audit run starting");

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| AuditError::ConfigFetchFailed(e.to_string()))?;

    let bootstrap_aws = match settings.decryption {
        DecryptionMode::Kms => Some(
            AwsContext::new(settings.aws_profile.as_deref(), settings.aws_region.as_deref()).await,
        ),
        DecryptionMode::Plaintext => None,
    };
    let decryptor: Box<dyn ConfigDecryptor> = match &bootstrap_aws {
        Some(ctx) => Box::new(KmsDecryptor::new(ctx.kms_client())),
        None => Box::new(PlaintextDecryptor),
    };

    let loader = ConfigLoader::new(http_client.clone(), decryptor);
    let config = loader.load(settings.config_file.as_deref()).await?;

    if config.lb_arns.is_empty() && !config.resolve_environments {
        info!("Environment resolution is off and no LBs are listed; nothing to watch.");
        return Ok(SUCCESS_MESSAGE.to_string());
    }

    let profile = settings.aws_profile.as_deref().or(config.aws_profile.as_deref());
    let region = settings.aws_region.as_deref().or(config.aws_region.as_deref());
    let aws = AwsContext::new(profile, region).await;
    info!(aws = ?aws, "Created AWS clients");

    let inventory = AwsInventory::from_context(&aws);
    let notifier = Notifier::new(SlackWebhook::new(http_client));

    let report = audit(&config, &inventory, &notifier, span).await?;
    info!(
        unprotected = report.unprotected.len(),
        delivered = report.delivered_count(),
        targets = report.notifications.len(),
        "Audit run complete"
    );

    Ok(SUCCESS_MESSAGE.to_string())
}
