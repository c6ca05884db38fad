//! Inventory Provider
//!
//! Trait-based abstraction over the cloud inventory the audit reads:
//! platform environments, web ACLs and live load balancers.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// A platform-managed (Elastic Beanstalk) environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: Option<String>,
    pub arn: Option<String>,
    pub name: Option<String>,
}

impl Environment {
    /// Whether any of the three keys equals a configured descriptor
    pub fn matches_any(&self, descriptors: &BTreeSet<String>) -> bool {
        [&self.id, &self.arn, &self.name]
            .into_iter()
            .flatten()
            .any(|key| descriptors.contains(key))
    }
}

/// One firewall web ACL and the resources it currently covers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionPolicy {
    pub id: String,
    pub resources: BTreeSet<String>,
}

impl ProtectionPolicy {
    pub fn new<I, S>(id: &str, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.to_string(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// Source of live inventory. Every error is fatal for the run.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// All platform environments visible to the caller
    async fn list_environments(&self) -> Result<Vec<Environment>>;

    /// Load balancer identifiers bound to an environment
    async fn environment_load_balancers(&self, environment_id: &str) -> Result<Vec<String>>;

    /// Ids of all web ACLs
    async fn list_web_acls(&self) -> Result<Vec<String>>;

    /// Resources associated with one web ACL
    async fn web_acl_resources(&self, acl_id: &str) -> Result<Vec<String>>;

    /// Identifiers of every load balancer that currently exists
    async fn list_load_balancers(&self) -> Result<Vec<String>>;
}

/// Union the load balancers of every environment matching a descriptor
///
/// Descriptors that match nothing are skipped; the environment may be gone.
pub async fn resolve_environments(
    provider: &dyn InventoryProvider,
    descriptors: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let mut resolved = BTreeSet::new();
    if descriptors.is_empty() {
        return Ok(resolved);
    }

    let environments = provider.list_environments().await?;
    info!(count = environments.len(), "ElasticBeanstalk environments fetched");

    for env in environments.iter().filter(|e| e.matches_any(descriptors)) {
        let Some(env_id) = env.id.as_deref() else {
            debug!(environment = ?env.name, "Matched environment has no id, skipping");
            continue;
        };

        info!(environment = %env_id, "Fetching environment resources");
        let lbs = provider.environment_load_balancers(env_id).await?;
        resolved.extend(lbs.into_iter().filter(|lb| !lb.is_empty()));
    }

    Ok(resolved)
}


#[cfg(test)]
mod tests {
    use super::fake::FakeInventory;
    use super::*;

    fn env(id: &str, name: &str) -> Environment {
        Environment {
            id: Some(id.to_string()),
            arn: Some(format!("arn:aws:elasticbeanstalk:us-east-1:123:environment/app/{}", name)),
            name: Some(name.to_string()),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matches_by_any_key() {
        let e = env("e-abc123", "prod-web");
        assert!(e.matches_any(&set(&["e-abc123"])));
        assert!(e.matches_any(&set(&["prod-web"])));
        assert!(e.matches_any(&set(&[
            "arn:aws:elasticbeanstalk:us-east-1:123:environment/app/prod-web"
        ])));
        assert!(!e.matches_any(&set(&["staging-web"])));
        assert!(!Environment::default().matches_any(&set(&["prod-web"])));
    }

    #[tokio::test]
    async fn test_resolve_unions_matching_environments() {
        let mut inventory = FakeInventory {
            environments: vec![env("e-1", "prod-web"), env("e-2", "prod-api"), env("e-3", "dev")],
            ..Default::default()
        };
        inventory
            .environment_lbs
            .insert("e-1".to_string(), vec!["lb-a".to_string(), "lb-b".to_string()]);
        inventory
            .environment_lbs
            .insert("e-2".to_string(), vec!["lb-b".to_string(), String::new()]);
        inventory
            .environment_lbs
            .insert("e-3".to_string(), vec!["lb-dev".to_string()]);

        let resolved = resolve_environments(&inventory, &set(&["prod-web", "e-2", "removed-env"]))
            .await
            .unwrap();

        assert_eq!(resolved, set(&["lb-a", "lb-b"]));
        assert!(!inventory
            .calls()
            .contains(&"environment_load_balancers:e-3".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_without_descriptors_makes_no_calls() {
        let inventory = FakeInventory::default();
        let resolved = resolve_environments(&inventory, &BTreeSet::new()).await.unwrap();
        assert!(resolved.is_empty());
        assert!(inventory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_fails_when_listing_fails() {
        let inventory = FakeInventory {
            environments: vec![env("e-1", "prod-web")],
            ..Default::default()
        }
        .failing("list_environments");

        let err = resolve_environments(&inventory, &set(&["prod-web"]))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("list_environments throttled"));
    }

    #[tokio::test]
    async fn test_resolve_fails_when_resources_fail() {
        let mut inventory = FakeInventory {
            environments: vec![env("e-1", "prod-web")],
            ..Default::default()
        }
        .failing("environment_load_balancers");
        inventory
            .environment_lbs
            .insert("e-1".to_string(), vec!["lb-a".to_string()]);

        let err = resolve_environments(&inventory, &set(&["prod-web"]))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("environment_load_balancers throttled"));
    }
}
