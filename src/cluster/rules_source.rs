//! Rule source boundary
//!
//! Rules are external configuration: per-datasource overrides first, then
//! cluster defaults. The loop concatenates both in that order each cycle,
//! so a rule change takes effect on the next snapshot without a restart.

use crate::coordinator::rules::Rule;
use async_trait::async_trait;
use std::collections::HashMap;

/// Ordered rule configuration
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Rules specific to one datasource, in declaration order.
    async fn rules_for(&self, datasource: &str) -> crate::Result<Vec<Rule>>;

    /// Cluster-default rules applied after datasource rules.
    async fn default_rules(&self) -> crate::Result<Vec<Rule>>;
}

/// Rule adapter over the metadata service's HTTP API
pub struct HttpRuleSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRuleSource {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    async fn fetch(&self, url: String) -> crate::Result<Vec<Rule>> {
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::Catalog(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RuleSource for HttpRuleSource {
    async fn rules_for(&self, datasource: &str) -> crate::Result<Vec<Rule>> {
        self.fetch(format!("{}/v1/rules/{}", self.base_url, datasource))
            .await
    }

    async fn default_rules(&self) -> crate::Result<Vec<Rule>> {
        self.fetch(format!("{}/v1/rules", self.base_url)).await
    }
}

/// Fixed in-memory rules; used when rules come from the config file, and by
/// tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    per_datasource: HashMap<String, Vec<Rule>>,
    defaults: Vec<Rule>,
}

impl StaticRuleSource {
    pub fn new(defaults: Vec<Rule>) -> Self {
        Self {
            per_datasource: HashMap::new(),
            defaults,
        }
    }

    pub fn with_datasource_rules(mut self, datasource: impl Into<String>, rules: Vec<Rule>) -> Self {
        self.per_datasource.insert(datasource.into(), rules);
        self
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn rules_for(&self, datasource: &str) -> crate::Result<Vec<Rule>> {
        Ok(self
            .per_datasource
            .get(datasource)
            .cloned()
            .unwrap_or_default())
    }

    async fn default_rules(&self) -> crate::Result<Vec<Rule>> {
        Ok(self.defaults.clone())
    }
}
