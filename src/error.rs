// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TenantError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown role '{0}' (expected one of admin, edit, view, developer)")]
    UnknownRole(String),

    #[error("Certificate signing request {csr} was not approved: {reason}")]
    ApprovalDenied { csr: String, reason: String },

    #[error("Certificate for signing request {csr} not issued within {waited:?}")]
    IssuanceTimeout { csr: String, waited: Duration },

    #[error("No usable ingress class found: {0}")]
    NoIngressClass(String),

    #[error("TLS secret '{secret}' not found in any of [{}]", .searched.join(", "))]
    CertificateUnavailable { secret: String, searched: Vec<String> },

    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cluster API unavailable during {operation}: {reason}")]
    ClusterUnavailable { operation: String, reason: String },

    #[error("Kubernetes API error: {}", describe_kube_error(.0))]
    KubeError(#[from] kube::Error),

    #[error("Failed to build kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Certificate handling failed: {0}")]
    PkiError(String),

    #[error("State storage failed: {0}")]
    StorageError(String),

    #[error("step '{step}' failed for tenant '{tenant}': {source}")]
    Step {
        step: &'static str,
        tenant: String,
        #[source]
        source: Box<TenantError>,
    },
}

pub type Result<T> = std::result::Result<T, TenantError>;

impl TenantError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ResourceConflict(msg.into())
    }

    pub fn pki(msg: impl Into<String>) -> Self {
        Self::PkiError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Attach the failing step and tenant. Already-wrapped errors keep their innermost step.
    pub fn in_step(self, step: &'static str, tenant: &str) -> Self {
        match self {
            wrapped @ Self::Step { .. } => wrapped,
            other => Self::Step {
                step,
                tenant: tenant.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any step wrapping removed
    pub fn root(&self) -> &TenantError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound(_) => true,
            Self::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Process exit code for the command line, one per error kind
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Self::InvalidInput(_) => 2,
            Self::UnknownRole(_) => 3,
            Self::ApprovalDenied { .. } => 4,
            Self::IssuanceTimeout { .. } => 5,
            Self::NoIngressClass(_) => 6,
            Self::CertificateUnavailable { .. } => 7,
            Self::ResourceConflict(_) => 8,
            Self::ClusterUnavailable { .. } => 9,
            _ => 1,
        }
    }
}

/// One-line summary of a kube error, without echoing response bodies
fn describe_kube_error(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(resp) => format!("{} ({} {})", resp.message, resp.code, resp.reason),
        other => other.to_string(),
    }
}
