//! AWS Inventory Adapter
//!
//! Loads one SDK config (optional named profile and region) and answers the
//! [`InventoryProvider`] queries from Elastic Beanstalk, WAF Regional and ELBv2.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;
use tracing::debug;

use crate::inventory::{Environment, InventoryProvider};

const EB_MAX_RECORDS: i32 = 999;
const WAF_PAGE_LIMIT: i32 = 100;

/// Shared AWS configuration for creating service clients
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    profile: Option<String>,
}

impl AwsContext {
    /// Load credentials and region from the environment, optionally pinned
    /// to a named profile and an explicit region
    pub async fn new(profile: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
            profile: profile.map(str::to_string),
        }
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region().map(|r| r.as_ref())
    }

    pub fn elasticbeanstalk_client(&self) -> aws_sdk_elasticbeanstalk::Client {
        aws_sdk_elasticbeanstalk::Client::new(self.sdk_config())
    }

    pub fn waf_regional_client(&self) -> aws_sdk_wafregional::Client {
        aws_sdk_wafregional::Client::new(self.sdk_config())
    }

    pub fn elbv2_client(&self) -> aws_sdk_elasticloadbalancingv2::Client {
        aws_sdk_elasticloadbalancingv2::Client::new(self.sdk_config())
    }

    pub fn kms_client(&self) -> aws_sdk_kms::Client {
        aws_sdk_kms::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("profile", &self.profile)
            .field("region", &self.region())
            .finish_non_exhaustive()
    }
}

/// [`InventoryProvider`] backed by the AWS APIs
pub struct AwsInventory {
    elasticbeanstalk: aws_sdk_elasticbeanstalk::Client,
    waf: aws_sdk_wafregional::Client,
    elbv2: aws_sdk_elasticloadbalancingv2::Client,
}

impl AwsInventory {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            elasticbeanstalk: ctx.elasticbeanstalk_client(),
            waf: ctx.waf_regional_client(),
            elbv2: ctx.elbv2_client(),
        }
    }
}

#[async_trait]
impl InventoryProvider for AwsInventory {
    async fn list_environments(&self) -> Result<Vec<Environment>> {
        let mut environments = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .elasticbeanstalk
                .describe_environments()
                .max_records(EB_MAX_RECORDS)
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to describe Elastic Beanstalk environments")?;

            environments.extend(response.environments().iter().map(|env| Environment {
                id: env.environment_id().map(str::to_string),
                arn: env.environment_arn().map(str::to_string),
                name: env.environment_name().map(str::to_string),
            }));

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(environments)
    }

    async fn environment_load_balancers(&self, environment_id: &str) -> Result<Vec<String>> {
        let response = self
            .elasticbeanstalk
            .describe_environment_resources()
            .environment_id(environment_id)
            .send()
            .await
            .with_context(|| {
                format!("Failed to describe resources of environment {}", environment_id)
            })?;

        let lbs: Vec<String> = response
            .environment_resources()
            .map(|resources| {
                resources
                    .load_balancers()
                    .iter()
                    .filter_map(|lb| lb.name())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        debug!(environment = %environment_id, count = lbs.len(), "Environment load balancers");
        Ok(lbs)
    }

    async fn list_web_acls(&self) -> Result<Vec<String>> {
        let mut acl_ids = Vec::new();
        let mut next_marker: Option<String> = None;

        loop {
            let response = self
                .waf
                .list_web_acls()
                .limit(WAF_PAGE_LIMIT)
                .set_next_marker(next_marker.take())
                .send()
                .await
                .context("Failed to list WAF Regional web ACLs")?;

            acl_ids.extend(
                response
                    .web_acls()
                    .iter()
                    .map(|acl| acl.web_acl_id().to_string()),
            );

            match response.next_marker() {
                Some(marker) if !marker.is_empty() => next_marker = Some(marker.to_string()),
                _ => break,
            }
        }

        Ok(acl_ids)
    }

    async fn web_acl_resources(&self, acl_id: &str) -> Result<Vec<String>> {
        let response = self
            .waf
            .list_resources_for_web_acl()
            .web_acl_id(acl_id)
            .send()
            .await
            .with_context(|| format!("Failed to list resources for web ACL {}", acl_id))?;

        Ok(response.resource_arns().to_vec())
    }

    async fn list_load_balancers(&self) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .elbv2
                .describe_load_balancers()
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to describe load balancers")?;

            arns.extend(
                response
                    .load_balancers()
                    .iter()
                    .filter_map(|lb| lb.load_balancer_arn())
                    .map(str::to_string),
            );

            match response.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(arns)
    }
}
