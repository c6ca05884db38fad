//! WAF Audit Library
//!
//! Finds AWS load balancers (listed directly or through Elastic Beanstalk
//! environments) that no WAF Regional web ACL protects, and reports them to
//! Slack incoming webhooks.

pub mod aws;
pub mod config;
pub mod error;
pub mod inventory;
pub mod notifier;
pub mod orchestrator;
pub mod reconciler;
pub mod secrets;

pub use config::{AuditConfig, ConfigLoader};
pub use error::AuditError;
pub use inventory::{InventoryProvider, ProtectionPolicy};
pub use notifier::{Notifier, SlackWebhook};
pub use orchestrator::{audit, handler, RunResult, Settings};
pub use reconciler::reconcile;
