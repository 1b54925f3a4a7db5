//! Collection configuration.
//!
//! A collection is addressed through a tenant-scoped alias that points at a
//! versioned physical index. Configurations are immutable values; deriving the
//! configuration for another tenant is a pure function.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration of one tenant-scoped collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Tenant the collection belongs to.
    pub tenant: String,
    /// Logical collection name shared by all tenants.
    pub base_name: String,
    /// Version of the physical index behind the alias.
    #[serde(default)]
    pub version: u32,
    /// Ask the backend to refresh after every write.
    #[serde(default)]
    pub immediate_refresh: bool,
    /// Index settings and mappings used when the index is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Value>,
}

impl ModelConfig {
    /// Create a configuration with version 0 and no refresh.
    ///
    /// # Example
    ///
    /// ```
    /// use search_store_shared::ModelConfig;
    ///
    /// let config = ModelConfig::new("acme", "notes");
    /// assert_eq!(config.alias(), "acme_notes");
    /// assert_eq!(config.index_name(), "acme_notes_v0");
    /// ```
    pub fn new(tenant: impl Into<String>, base_name: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            base_name: base_name.into(),
            version: 0,
            immediate_refresh: false,
            mappings: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_immediate_refresh(mut self, immediate_refresh: bool) -> Self {
        self.immediate_refresh = immediate_refresh;
        self
    }

    pub fn with_mappings(mut self, mappings: Value) -> Self {
        self.mappings = Some(mappings);
        self
    }

    /// The collection address used for every operation.
    pub fn alias(&self) -> String {
        format!("{}_{}", self.tenant, self.base_name)
    }

    /// The physical index behind the alias.
    pub fn index_name(&self) -> String {
        format!("{}_v{}", self.alias(), self.version)
    }

    /// Check naming rules, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        for (field, value) in [("tenant", &self.tenant), ("base_name", &self.base_name)] {
            if value.is_empty() {
                problems.push(format!("{} is required", field));
                continue;
            }
            if value.contains('*') || value.contains(',') {
                problems.push(format!("{} '{}' must not contain '*' or ','", field, value));
            }
            if value.chars().any(|c| c.is_uppercase()) {
                problems.push(format!("{} '{}' must be lowercase", field, value));
            }
            if value.starts_with(['_', '-', '+']) {
                problems.push(format!(
                    "{} '{}' must not start with '_', '-' or '+'",
                    field, value
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Derive the configuration of the same collection for another tenant.
pub fn with_tenant(config: &ModelConfig, tenant: impl Into<String>) -> ModelConfig {
    ModelConfig {
        tenant: tenant.into(),
        ..config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_and_index_name() {
        let config = ModelConfig::new("acme", "notes").with_version(3);
        assert_eq!(config.alias(), "acme_notes");
        assert_eq!(config.index_name(), "acme_notes_v3");
    }

    #[test]
    fn test_with_tenant_is_pure() {
        let base = ModelConfig::new("acme", "notes")
            .with_immediate_refresh(true)
            .with_mappings(json!({ "mappings": {} }));
        let other = with_tenant(&base, "globex");

        assert_eq!(base.tenant, "acme");
        assert_eq!(other.tenant, "globex");
        assert_eq!(other.base_name, "notes");
        assert!(other.immediate_refresh);
        assert_eq!(other.mappings, base.mappings);
        assert_eq!(other.alias(), "globex_notes");
    }

    #[test]
    fn test_validate() {
        assert!(ModelConfig::new("acme", "notes").validate().is_ok());

        let problems = ModelConfig::new("", "No*tes").validate().unwrap_err();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("tenant is required"));

        let problems = ModelConfig::new("_acme", "notes").validate().unwrap_err();
        assert_eq!(problems.len(), 1);
    }
}
