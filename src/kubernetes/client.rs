// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster endpoint and CA discovery for emitted kubeconfigs

use crate::config::ClusterSettings;
use crate::error::{Result, TenantError};
use kube::config::Kubeconfig;
use kube::Config as KConfig;
use std::str::FromStr;
use tracing::{debug, info, instrument};
use url::Url;

const DEFAULT_CLUSTER_NAME: &str = "kubernetes";

/// Replace an API server host as seen by tenantctl with the host clients should use.
///
/// Written as `from=to`, where `to` may carry a port (`127.0.0.1=k8s.example.com:6443`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    pub from: String,
    pub to_host: String,
    pub to_port: Option<u16>,
}

impl FromStr for RewriteRule {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TenantError::invalid_input(format!("invalid endpoint rewrite rule '{}'", s));

        let (from, to) = s.split_once('=').ok_or_else(invalid)?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(invalid());
        }

        let (to_host, to_port) = match to.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') && !host.is_empty() => {
                match port.parse::<u16>() {
                    Ok(port) => (host.to_string(), Some(port)),
                    Err(_) => return Err(invalid()),
                }
            }
            _ => (to.to_string(), None),
        };

        Ok(RewriteRule {
            from: from.to_string(),
            to_host,
            to_port,
        })
    }
}

/// Apply the first rule whose `from` equals the endpoint's host
pub fn rewrite_endpoint(endpoint: &str, rules: &[RewriteRule]) -> Result<String> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        TenantError::KubeconfigError(format!("invalid cluster endpoint '{}': {}", endpoint, e))
    })?;

    let host = url.host_str().unwrap_or_default().to_string();
    if let Some(rule) = rules.iter().find(|r| r.from == host) {
        debug!("Rewriting cluster endpoint host {} to {}", host, rule.to_host);
        url.set_host(Some(&rule.to_host)).map_err(|e| {
            TenantError::KubeconfigError(format!("invalid rewrite host '{}': {}", rule.to_host, e))
        })?;
        if let Some(port) = rule.to_port {
            url.set_port(Some(port)).map_err(|_| {
                TenantError::KubeconfigError(format!("cannot set port on '{}'", endpoint))
            })?;
        }
    }

    let mut rewritten = url.to_string();
    if url.path() == "/" && url.query().is_none() {
        rewritten.truncate(rewritten.trim_end_matches('/').len());
    }
    Ok(rewritten)
}

/// How clients reach the cluster: name, sanitized endpoint and CA bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub endpoint: String,
    pub ca_pem: String,
}

impl ClusterInfo {
    pub fn new(name: &str, endpoint: &str, ca_pem: &str, rules: &[RewriteRule]) -> Result<Self> {
        if ca_pem.trim().is_empty() {
            return Err(TenantError::KubeconfigError(
                "cluster CA bundle is empty".to_string(),
            ));
        }
        Ok(ClusterInfo {
            name: name.to_string(),
            endpoint: rewrite_endpoint(endpoint, rules)?,
            ca_pem: ca_pem.to_string(),
        })
    }

    /// Combine configured overrides with the local client configuration
    #[instrument(skip(settings))]
    pub async fn discover(settings: &ClusterSettings) -> Result<Self> {
        let inferred = match (&settings.endpoint, &settings.ca_file) {
            (Some(_), Some(_)) => None,
            _ => Some(KConfig::infer().await.map_err(|e| {
                TenantError::KubeconfigError(format!("Failed to infer config: {}", e))
            })?),
        };

        let endpoint = settings
            .endpoint
            .clone()
            .or_else(|| inferred.as_ref().map(|c| c.cluster_url.to_string()))
            .unwrap_or_default();

        let ca_pem = match &settings.ca_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                TenantError::KubeconfigError(format!(
                    "Failed to read CA file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => inferred
                .as_ref()
                .and_then(|c| c.root_cert.as_ref())
                .map(|certs| {
                    certs
                        .iter()
                        .map(|der| pem::encode(&pem::Pem::new("CERTIFICATE", der.clone())))
                        .collect::<String>()
                })
                .unwrap_or_default(),
        };

        let name = settings
            .name
            .clone()
            .or_else(current_cluster_name)
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        let info = ClusterInfo::new(&name, &endpoint, &ca_pem, &settings.endpoint_rewrites)?;
        info!("Cluster '{}' reachable at {}", info.name, info.endpoint);
        Ok(info)
    }
}

/// Cluster of the current context in the local kubeconfig, if there is one
fn current_cluster_name() -> Option<String> {
    let kubeconfig = Kubeconfig::read().ok()?;
    let current = kubeconfig.current_context.as_deref()?;
    kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == current)
        .and_then(|c| c.context.as_ref())
        .map(|c| c.cluster.clone())
}
