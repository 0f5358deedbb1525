// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes label keys put on every object tenantctl creates
pub mod labels {
    /// Always set to [`super::FIELD_MANAGER`]
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Username of the owning tenant
    pub const TENANT: &str = "tenantctl.io/tenant";
    /// Selector matching every tenant namespace
    pub const MANAGED_SELECTOR: &str = "app.kubernetes.io/managed-by=tenantctl";
}

/// Annotation keys read from the cluster
pub mod annotations {
    /// Marks the cluster's default IngressClass
    pub const DEFAULT_INGRESS_CLASS: &str = "ingressclass.kubernetes.io/is-default-class";
    /// Where a replicated TLS secret was copied from
    pub const REPLICATED_FROM: &str = "tenantctl.io/replicated-from";
}

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "tenantctl";

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Namespaced Role created for the developer role class
pub const DEVELOPER_ROLE_NAME: &str = "developer";

/// Certificate signing defaults
pub mod csr {
    pub const DEFAULT_SIGNER: &str = "kubernetes.io/kube-apiserver-client";
    pub const CLIENT_AUTH_USAGE: &str = "client auth";
    pub const APPROVAL_REASON: &str = "TenantProvisioned";
    /// First poll delay while waiting for issuance, in milliseconds
    pub const POLL_INITIAL_MILLIS: u64 = 250;
    /// Cap for the exponential poll delay, in milliseconds
    pub const POLL_MAX_MILLIS: u64 = 5_000;
}

/// Transient API failure handling
pub mod retry {
    pub const INITIAL_DELAY_MILLIS: u64 = 200;
    pub const MAX_DELAY_MILLIS: u64 = 10_000;
}

/// How long provisioning waits for a terminating namespace to go away, in seconds
pub const NAMESPACE_TERMINATION_WAIT_SECS: u64 = 120;

/// Per-tenant lock serializing provision, rotation and teardown
pub mod lock {
    pub const POLL_INITIAL_MILLIS: u64 = 50;
    pub const POLL_MAX_MILLIS: u64 = 1_000;
    /// How long a run waits for another run on the same tenant, in seconds
    pub const WAIT_SECS: u64 = 600;
}

/// Requeue interval for the drift reconciler after an error, in seconds
pub const RECONCILE_ERROR_REQUEUE_SECS: u64 = 60;
