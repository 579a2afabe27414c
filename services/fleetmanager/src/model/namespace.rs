//! Namespace model definitions.
//!
//! # Purpose
//! Namespaces are isolation units within remote clusters. The fleet manager
//! reads them when placing connectors; their lifecycle is managed externally.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NamespacePhase {
    Provisioning,
    Ready,
    Deleting,
}

/// An isolation unit within a cluster that can host deployments.
///
/// A namespace is eligible for a connector when it is `Ready` and its tenancy
/// matches the connector's owner or organisation.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Namespace {
    pub id: String,
    pub cluster_id: String,
    pub tenant_owner: Option<String>,
    pub tenant_organisation: Option<String>,
    pub phase: NamespacePhase,
}

impl Namespace {
    /// Tenancy check used by namespace placement.
    pub fn eligible_for(&self, owner: &str, organisation_id: &str) -> bool {
        self.tenant_owner.as_deref() == Some(owner)
            || self.tenant_organisation.as_deref() == Some(organisation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace(owner: Option<&str>, org: Option<&str>) -> Namespace {
        Namespace {
            id: "ns-1".to_string(),
            cluster_id: "cl-1".to_string(),
            tenant_owner: owner.map(str::to_string),
            tenant_organisation: org.map(str::to_string),
            phase: NamespacePhase::Ready,
        }
    }

    #[test]
    fn eligible_by_owner_or_organisation() {
        assert!(namespace(Some("alice"), None).eligible_for("alice", "org-1"));
        assert!(namespace(None, Some("org-1")).eligible_for("bob", "org-1"));
        assert!(!namespace(Some("alice"), Some("org-2")).eligible_for("bob", "org-1"));
        assert!(!namespace(None, None).eligible_for("alice", "org-1"));
    }
}
