// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of something created on behalf of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Ingress,
    Service,
    Deployment,
    Secret,
    RoleBinding,
    Role,
    Namespace,
    CertificateSigningRequest,
    /// A local file under the state directory
    File,
}

impl ResourceKind {
    /// Position in teardown; lower goes first.
    ///
    /// Namespaced objects precede their namespace, cluster-scoped objects follow
    /// it, and local files go last.
    pub fn teardown_order(&self) -> u8 {
        match self {
            ResourceKind::Ingress => 0,
            ResourceKind::Service => 1,
            ResourceKind::Deployment => 2,
            ResourceKind::Secret => 3,
            ResourceKind::RoleBinding => 4,
            ResourceKind::Role => 5,
            ResourceKind::Namespace => 6,
            ResourceKind::CertificateSigningRequest => 7,
            ResourceKind::File => 8,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One object or file recorded in the registry.
///
/// For files `name` holds the path; `namespace` is only set for namespaced objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn file(path: &std::path::Path) -> Self {
        Self::cluster(ResourceKind::File, &path.to_string_lossy())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Sort resources into teardown order, keeping insertion order within a kind
pub fn teardown_sorted(resources: &[ResourceRef]) -> Vec<ResourceRef> {
    let mut sorted = resources.to_vec();
    sorted.sort_by_key(|r| r.kind.teardown_order());
    sorted
}
