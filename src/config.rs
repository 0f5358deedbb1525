// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{csr, retry};
use crate::kubernetes::client::RewriteRule;
use crate::kubernetes::retry::RetryPolicy;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the registry and per-tenant credential files
    pub state_dir: PathBuf,
    pub cluster: ClusterSettings,
    pub ingress: IngressSettings,
    pub issuer: IssuerSettings,
    /// Retry and timeout policy applied to every cluster API call
    pub api: RetryPolicy,
}

/// How the cluster is described in emitted kubeconfigs
#[derive(Debug, Clone, Default)]
pub struct ClusterSettings {
    /// Name used for the kubeconfig cluster entry and context suffix
    pub name: Option<String>,
    /// API server URL override; otherwise taken from the client configuration
    pub endpoint: Option<String>,
    /// PEM CA bundle override; otherwise taken from the client configuration
    pub ca_file: Option<PathBuf>,
    pub endpoint_rewrites: Vec<RewriteRule>,
}

#[derive(Debug, Clone)]
pub struct IngressSettings {
    /// Ingress class that must exist; when unset the cluster default is used
    pub class: Option<String>,
    /// Default name of the wildcard TLS secret
    pub cert_secret: String,
    /// Namespaces searched, in order, for the wildcard TLS secret
    pub tls_source_namespaces: Vec<String>,
    pub workload_image: String,
    pub workload_port: u16,
}

#[derive(Debug, Clone)]
pub struct IssuerSettings {
    pub signer_name: String,
    pub validity_days: u32,
    /// Deadline for a signed certificate to appear after approval
    pub issuance_timeout: Duration,
    pub poll_initial: Duration,
    pub poll_max: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let state_dir = PathBuf::from(env_or("TENANT_STATE_DIR", ".tenantctl"));

        let endpoint_rewrites = match env::var("API_ENDPOINT_REWRITE") {
            Ok(raw) => parse_list(&raw)
                .into_iter()
                .map(|rule| rule.parse::<RewriteRule>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("API_ENDPOINT_REWRITE must be a comma-separated list of from=to rules")?,
            Err(_) => Vec::new(),
        };

        let cluster = ClusterSettings {
            name: env::var("CLUSTER_NAME").ok(),
            endpoint: env::var("CLUSTER_ENDPOINT").ok(),
            ca_file: env::var("CLUSTER_CA_FILE").ok().map(PathBuf::from),
            endpoint_rewrites,
        };

        let ingress = IngressSettings {
            class: env::var("INGRESS_CLASS").ok(),
            cert_secret: env_or("WILDCARD_CERT_SECRET", "wildcard-tls"),
            tls_source_namespaces: parse_list(&env_or("TLS_SOURCE_NAMESPACES", "default,cert-manager")),
            workload_image: env_or("TENANT_WORKLOAD_IMAGE", "nginx:stable"),
            workload_port: env_parse("TENANT_WORKLOAD_PORT", 80)?,
        };

        let issuer = IssuerSettings {
            signer_name: env_or("CSR_SIGNER_NAME", csr::DEFAULT_SIGNER),
            validity_days: env_parse("CERT_VALIDITY_DAYS", 365)?,
            issuance_timeout: Duration::from_secs(env_parse("CERT_ISSUANCE_TIMEOUT_SECS", 60)?),
            poll_initial: Duration::from_millis(csr::POLL_INITIAL_MILLIS),
            poll_max: Duration::from_millis(csr::POLL_MAX_MILLIS),
        };

        let api = RetryPolicy {
            max_attempts: env_parse("API_RETRY_ATTEMPTS", 5)?,
            request_timeout: Duration::from_secs(env_parse("API_TIMEOUT_SECS", 30)?),
            initial_delay: Duration::from_millis(retry::INITIAL_DELAY_MILLIS),
            max_delay: Duration::from_millis(retry::MAX_DELAY_MILLIS),
        };

        Ok(Config {
            state_dir,
            cluster,
            ingress,
            issuer,
            api,
        })
    }

    /// Small timeouts and a private state directory, for tests against the fake API server
    #[cfg(test)]
    pub fn for_tests(state_dir: impl Into<PathBuf>) -> Self {
        Config {
            state_dir: state_dir.into(),
            cluster: ClusterSettings {
                name: Some("test-cluster".to_string()),
                endpoint: Some("https://127.0.0.1:6443".to_string()),
                ca_file: None,
                endpoint_rewrites: Vec::new(),
            },
            ingress: IngressSettings {
                class: None,
                cert_secret: "wildcard-tls".to_string(),
                tls_source_namespaces: vec!["default".to_string(), "cert-manager".to_string()],
                workload_image: "nginx:stable".to_string(),
                workload_port: 80,
            },
            issuer: IssuerSettings {
                signer_name: csr::DEFAULT_SIGNER.to_string(),
                validity_days: 365,
                issuance_timeout: Duration::from_millis(300),
                poll_initial: Duration::from_millis(5),
                poll_max: Duration::from_millis(20),
            },
            api: RetryPolicy {
                max_attempts: 2,
                request_timeout: Duration::from_secs(5),
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
