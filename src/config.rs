//! Audit Configuration
//!
//! Locates the encrypted configuration blob (URL or filesystem path),
//! decrypts it and validates it into an [`AuditConfig`].

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::AuditError;
use crate::secrets::ConfigDecryptor;

/// Decrypted audit configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Load balancer ARNs to watch directly
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lb_arns: Vec<String>,
    /// Elastic Beanstalk environments (id, ARN or name) whose load balancers are watched
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ebstalk_envs: Vec<String>,
    /// Slack incoming webhook URLs
    #[serde(default, deserialize_with = "null_as_empty")]
    pub slack_hooks: Vec<String>,
    /// Resolve `ebstalk_envs` into load balancers
    #[serde(default = "default_resolve_environments")]
    pub resolve_environments: bool,
    /// Named AWS profile
    #[serde(default)]
    pub aws_profile: Option<String>,
    /// AWS region
    #[serde(default)]
    pub aws_region: Option<String>,
}

fn default_resolve_environments() -> bool {
    true
}

/// `null` lists count as absent, so validation can name the field
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl AuditConfig {
    /// Parse decrypted JSON and validate required fields
    pub fn from_json(content: &str) -> Result<Self, AuditError> {
        let config: AuditConfig =
            serde_json::from_str(content).map_err(|e| AuditError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that something is monitored and someone is notified
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.lb_arns.is_empty() && self.ebstalk_envs.is_empty() {
            return Err(AuditError::ConfigFieldMissing(
                "Either `lb_arns` or `ebstalk_envs` fields must be defined in config.".to_string(),
            ));
        }
        if self.slack_hooks.is_empty() {
            return Err(AuditError::ConfigFieldMissing(
                "No `slack_hooks` field defined in config.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the configuration blob lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Url(String),
    File(String),
}

impl ConfigSource {
    /// Classify a `CONFIG_FILE` value; `http://`, `https://` and `ftp://` mean remote
    pub fn parse(value: &str) -> Self {
        if ["http://", "https://", "ftp://"]
            .iter()
            .any(|scheme| value.starts_with(scheme))
        {
            ConfigSource::Url(value.to_string())
        } else {
            ConfigSource::File(value.to_string())
        }
    }
}

/// Fetches, decrypts and validates the audit configuration
pub struct ConfigLoader {
    http_client: reqwest::Client,
    decryptor: Box<dyn ConfigDecryptor>,
}

impl ConfigLoader {
    pub fn new(http_client: reqwest::Client, decryptor: Box<dyn ConfigDecryptor>) -> Self {
        Self {
            http_client,
            decryptor,
        }
    }

    /// Load configuration from the given `CONFIG_FILE` value
    pub async fn load(&self, config_file: Option<&str>) -> Result<AuditConfig, AuditError> {
        let config_file = config_file
            .filter(|v| !v.is_empty())
            .ok_or(AuditError::ConfigMissing)?;

        let ciphertext = match ConfigSource::parse(config_file) {
            ConfigSource::Url(url) => {
                info!("Config file prefix tells program to fetch it online.");
                info!(url = %redact_url(&url), "Fetching config file");
                self.fetch_remote(&url).await?
            }
            ConfigSource::File(path) => {
                info!("Config file prefix tells program to search for it on filesystem.");
                Self::read_local(&path).await?
            }
        };

        debug!(bytes = ciphertext.len(), decryptor = self.decryptor.name(), "Decrypting config");
        let plaintext = self
            .decryptor
            .decrypt(&ciphertext)
            .await
            .map_err(|e| AuditError::ConfigDecryptFailed(format!("{:#}", e)))?;

        let content = String::from_utf8(plaintext)
            .map_err(|e| AuditError::ConfigInvalid(e.to_string()))?;

        AuditConfig::from_json(&content)
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, AuditError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AuditError::ConfigFetchFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(AuditError::ConfigFetchFailed(status.to_string()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuditError::ConfigFetchFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn read_local(path: &str) -> Result<Vec<u8>, AuditError> {
        if !Path::new(path).is_file() {
            return Err(AuditError::ConfigNotFound(path.to_string()));
        }
        tokio::fs::read(path)
            .await
            .map_err(|e| AuditError::ConfigNotFound(format!("{}: {}", path, e)))
    }
}

/// Scheme, host and path only; pre-signed URLs carry credentials in the query
fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            parsed.path()
        ),
        Err(_) => "<unparseable url>".to_string(),
    }
}
