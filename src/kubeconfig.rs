// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubeconfig packaging for tenant credentials

use crate::error::{Result, TenantError};
use crate::kubernetes::client::ClusterInfo;
use crate::pki::Credential;
use crate::types::tenant::Tenant;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use zeroize::Zeroizing;

#[derive(Serialize)]
struct KubeconfigFile<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<Named<'a, ClusterEntry<'a>>>,
    users: Vec<Named<'a, UserEntry>>,
    contexts: Vec<Named<'a, ContextEntry<'a>>>,
    #[serde(rename = "current-context")]
    current_context: &'a str,
}

#[derive(Serialize)]
struct Named<'a, T> {
    name: &'a str,
    #[serde(flatten)]
    entry: T,
}

#[derive(Serialize)]
struct ClusterEntry<'a> {
    cluster: ClusterFields<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterFields<'a> {
    server: &'a str,
    certificate_authority_data: String,
}

#[derive(Serialize)]
struct UserEntry {
    user: UserFields,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct UserFields {
    client_certificate_data: String,
    client_key_data: String,
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    context: ContextFields<'a>,
}

#[derive(Serialize)]
struct ContextFields<'a> {
    cluster: &'a str,
    user: &'a str,
    namespace: &'a str,
}

/// Name of the tenant's kubeconfig context
pub fn context_name(tenant: &Tenant, cluster: &ClusterInfo) -> String {
    format!("{}@{}", tenant.username, cluster.name)
}

/// Render a kubeconfig that logs in as the tenant with its client certificate.
///
/// The output depends only on the arguments, so equal inputs give byte-identical YAML.
pub fn package(tenant: &Tenant, credential: &Credential, cluster: &ClusterInfo) -> Result<Zeroizing<String>> {
    let context = context_name(tenant, cluster);

    let file = KubeconfigFile {
        api_version: "v1",
        kind: "Config",
        clusters: vec![Named {
            name: &cluster.name,
            entry: ClusterEntry {
                cluster: ClusterFields {
                    server: &cluster.endpoint,
                    certificate_authority_data: STANDARD.encode(&cluster.ca_pem),
                },
            },
        }],
        users: vec![Named {
            name: &tenant.username,
            entry: UserEntry {
                user: UserFields {
                    client_certificate_data: STANDARD.encode(&credential.cert_pem),
                    client_key_data: STANDARD.encode(credential.key_pem.as_bytes()),
                },
            },
        }],
        contexts: vec![Named {
            name: &context,
            entry: ContextEntry {
                context: ContextFields {
                    cluster: &cluster.name,
                    user: &tenant.username,
                    namespace: &tenant.namespace,
                },
            },
        }],
        current_context: &context,
    };

    serde_yaml::to_string(&file)
        .map(Zeroizing::new)
        .map_err(|e| TenantError::KubeconfigError(format!("Failed to serialize kubeconfig: {}", e)))
}
