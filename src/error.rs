//! Audit Error Taxonomy
//!
//! Terminal errors for a single audit run. Each kind maps to the status code
//! reported in the run result; webhook failures are not listed here because
//! they never abort a run (see `notifier::DeliveryState`).

use thiserror::Error;

/// Errors that end an audit run
#[derive(Debug, Error)]
pub enum AuditError {
    /// No configuration source was given
    #[error("No CONFIG_FILE environment variable exists.")]
    ConfigMissing,

    /// Remote configuration could not be fetched
    #[error("Could not fetch config file: {0}")]
    ConfigFetchFailed(String),

    /// Local configuration path does not exist
    #[error("No Config file on filesystem: {0}")]
    ConfigNotFound(String),

    /// Ciphertext could not be decrypted
    #[error("Could not decrypt config file: {0}")]
    ConfigDecryptFailed(String),

    /// Decrypted content is not a valid JSON object
    #[error("{0}")]
    ConfigInvalid(String),

    /// A required field is absent or empty
    #[error("{0}")]
    ConfigFieldMissing(String),

    /// An inventory call failed; reconciliation cannot be trusted
    #[error("Inventory lookup failed: {0}")]
    Inventory(String),
}

impl AuditError {
    /// Status code reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuditError::ConfigMissing
            | AuditError::ConfigNotFound(_)
            | AuditError::ConfigFieldMissing(_) => 404,
            AuditError::ConfigFetchFailed(_)
            | AuditError::ConfigDecryptFailed(_)
            | AuditError::ConfigInvalid(_) => 400,
            AuditError::Inventory(_) => 500,
        }
    }

    /// Wrap an adapter error, keeping its context chain in the message
    pub fn inventory(err: anyhow::Error) -> Self {
        AuditError::Inventory(format!("{:#}", err))
    }
}
