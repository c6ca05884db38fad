//! WAF Reconciler
//!
//! Computes which monitored load balancers are not covered by any web ACL.
//! Results are `BTreeSet`s so every consumer sees identifiers in lexical order.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::info;

use crate::inventory::{InventoryProvider, ProtectionPolicy};

/// Remove every resource the policy protects from the candidate set
fn subtract_policy(candidates: &mut BTreeSet<String>, resources: &BTreeSet<String>) {
    candidates.retain(|id| !resources.contains(id));
}

/// Monitored resources minus everything protected, restricted to live inventory
///
/// The result is always a subset of `monitored ∩ live` and does not depend on
/// the order of `policies`.
pub fn reconcile(
    monitored: &BTreeSet<String>,
    policies: &[ProtectionPolicy],
    live: &BTreeSet<String>,
) -> BTreeSet<String> {
    if monitored.is_empty() {
        return BTreeSet::new();
    }

    let mut candidates = monitored.clone();
    for policy in policies {
        subtract_policy(&mut candidates, &policy.resources);
        if candidates.is_empty() {
            break;
        }
    }

    candidates.intersection(live).cloned().collect()
}

/// Reconcile against a provider, fetching web ACL resources one at a time
///
/// Stops calling the provider as soon as nothing is left unprotected, and
/// never lists web ACLs when `monitored` is empty.
pub async fn reconcile_live(
    provider: &dyn InventoryProvider,
    monitored: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    if monitored.is_empty() {
        return Ok(BTreeSet::new());
    }

    let acl_ids = provider
        .list_web_acls()
        .await
        .context("Failed to list web ACLs")?;
    info!(count = acl_ids.len(), "Web ACLs fetched");

    let mut candidates = monitored.clone();
    for acl_id in &acl_ids {
        let resources: BTreeSet<String> = provider
            .web_acl_resources(acl_id)
            .await
            .with_context(|| format!("Failed to list resources for web ACL {}", acl_id))?
            .into_iter()
            .collect();

        subtract_policy(&mut candidates, &resources);
        if candidates.is_empty() {
            info!("No LBs remaining to watch.");
            return Ok(candidates);
        }
    }

    info!("Fetching all ELBs from AWS.");
    let live: BTreeSet<String> = provider
        .list_load_balancers()
        .await
        .context("Failed to list load balancers")?
        .into_iter()
        .collect();
    info!(count = live.len(), "Total ELBs fetched from AWS");

    let unprotected: BTreeSet<String> = candidates.intersection(&live).cloned().collect();
    let stale = candidates.len() - unprotected.len();
    if stale > 0 {
        info!(count = stale, "Ignoring monitored LBs that no longer exist");
    }

    Ok(unprotected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::fake::FakeInventory;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stale_and_protected_removed() {
        let monitored = set(&["lb-1", "lb-2", "lb-3"]);
        let live = set(&["lb-1", "lb-2"]);
        let policies = vec![ProtectionPolicy::new("acl-1", ["lb-1"])];

        assert_eq!(reconcile(&monitored, &policies, &live), set(&["lb-2"]));
    }

    #[test]
    fn test_empty_monitored() {
        let policies = vec![ProtectionPolicy::new("acl-1", ["lb-1"])];
        assert!(reconcile(&BTreeSet::new(), &policies, &set(&["lb-1"])).is_empty());
    }

    #[test]
    fn test_policy_order_irrelevant() {
        let monitored = set(&["a", "b", "c", "d", "e"]);
        let live = set(&["a", "b", "c", "d", "e", "f"]);
        let policies = vec![
            ProtectionPolicy::new("acl-1", ["a", "x"]),
            ProtectionPolicy::new("acl-2", ["b", "a"]),
            ProtectionPolicy::new("acl-3", ["d"]),
        ];
        let expected = set(&["c", "e"]);

        let mut reversed = policies.clone();
        reversed.reverse();
        let rotated = vec![policies[1].clone(), policies[2].clone(), policies[0].clone()];

        assert_eq!(reconcile(&monitored, &policies, &live), expected);
        assert_eq!(reconcile(&monitored, &reversed, &live), expected);
        assert_eq!(reconcile(&monitored, &rotated, &live), expected);
    }

    #[test]
    fn test_single_policy_is_enough() {
        let monitored = set(&["lb-1", "lb-2"]);
        let live = monitored.clone();
        let policies = vec![
            ProtectionPolicy::new("acl-1", Vec::<String>::new()),
            ProtectionPolicy::new("acl-2", ["lb-2"]),
            ProtectionPolicy::new("acl-3", ["lb-other"]),
        ];
        assert_eq!(reconcile(&monitored, &policies, &live), set(&["lb-1"]));
    }

    #[test]
    fn test_result_within_monitored_and_live() {
        let monitored = set(&["a", "b", "c"]);
        let live = set(&["b", "c", "z"]);
        let result = reconcile(&monitored, &[], &live);
        assert!(result.is_subset(&monitored));
        assert!(result.is_subset(&live));
        assert_eq!(result, set(&["b", "c"]));
    }

    #[tokio::test]
    async fn test_live_stops_after_everything_protected() {
        let inventory = FakeInventory {
            policies: vec![
                ProtectionPolicy::new("acl-1", ["lb-1"]),
                ProtectionPolicy::new("acl-2", ["lb-2"]),
                ProtectionPolicy::new("acl-3", ["lb-3"]),
            ],
            load_balancers: vec!["lb-1".to_string(), "lb-2".to_string()],
            ..Default::default()
        };

        let result = reconcile_live(&inventory, &set(&["lb-1", "lb-2"])).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(
            inventory.calls(),
            vec![
                "list_web_acls".to_string(),
                "web_acl_resources:acl-1".to_string(),
                "web_acl_resources:acl-2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_live_empty_monitored_makes_no_calls() {
        let inventory = FakeInventory::default();
        let result = reconcile_live(&inventory, &BTreeSet::new()).await.unwrap();
        assert!(result.is_empty());
        assert!(inventory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_live_drops_stale_identifiers() {
        let inventory = FakeInventory {
            policies: vec![ProtectionPolicy::new("acl-1", ["lb-1"])],
            load_balancers: vec!["lb-1".to_string(), "lb-2".to_string()],
            ..Default::default()
        };

        let result = reconcile_live(&inventory, &set(&["lb-1", "lb-2", "lb-3"]))
            .await
            .unwrap();
        assert_eq!(result, set(&["lb-2"]));
    }

    #[tokio::test]
    async fn test_live_inventory_failure_is_fatal() {
        let inventory = FakeInventory {
            load_balancers: vec!["lb-1".to_string()],
            ..Default::default()
        }
        .failing("list_load_balancers");

        let err = reconcile_live(&inventory, &set(&["lb-1"])).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to list load balancers"));
    }

    #[tokio::test]
    async fn test_live_web_acl_listing_failure_is_fatal() {
        let inventory = FakeInventory {
            policies: vec![ProtectionPolicy::new("acl-1", ["lb-1"])],
            ..Default::default()
        }
        .failing("list_web_acls");

        let err = reconcile_live(&inventory, &set(&["lb-1"])).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to list web ACLs"));
        assert_eq!(inventory.calls(), vec!["list_web_acls".to_string()]);
    }

    #[tokio::test]
    async fn test_live_web_acl_resources_failure_is_fatal() {
        let inventory = FakeInventory {
            policies: vec![ProtectionPolicy::new("acl-1", ["lb-1"])],
            load_balancers: vec!["lb-1".to_string(), "lb-2".to_string()],
            ..Default::default()
        }
        .failing("web_acl_resources");

        let err = reconcile_live(&inventory, &set(&["lb-1", "lb-2"]))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to list resources for web ACL acl-1"));
        assert!(!inventory.calls().contains(&"list_load_balancers".to_string()));
    }
}
