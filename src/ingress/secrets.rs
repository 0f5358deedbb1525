// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Wildcard TLS secret lookup and replication into tenant namespaces

use crate::constants::{annotations, labels};
use crate::error::{Result, TenantError};
use crate::kubernetes::objects;
use crate::kubernetes::retry::RetryPolicy;
use crate::types::tenant::Tenant;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::ObjectMeta, Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

const TLS_KEYS: [&str; 2] = ["tls.crt", "tls.key"];

/// Where the tenant's TLS secret came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSecret {
    pub name: String,
    pub source_namespace: String,
    /// Whether tenantctl wrote the copy in the tenant namespace and must remove it on teardown
    pub replicated: bool,
}

fn has_tls_data(secret: &Secret) -> bool {
    secret
        .data
        .as_ref()
        .is_some_and(|data| TLS_KEYS.iter().all(|k| data.contains_key(*k)))
}

fn replicated_for(secret: &Secret, tenant: &Tenant) -> bool {
    secret.labels().get(labels::TENANT) == Some(&tenant.username)
        && secret.annotations().contains_key(annotations::REPLICATED_FROM)
}

/// Copy of a source secret for the tenant namespace: data and type only, tenant metadata
fn replicate_secret(secret: &Secret, tenant: &Tenant) -> Secret {
    let source = format!("{}/{}", secret.namespace().unwrap_or_default(), secret.name_any());

    Secret {
        metadata: ObjectMeta {
            name: Some(tenant.cert_secret.clone()),
            namespace: Some(tenant.namespace.clone()),
            labels: Some(tenant.labels()),
            annotations: Some(BTreeMap::from([(
                annotations::REPLICATED_FROM.to_string(),
                source,
            )])),
            ..Default::default()
        },
        data: secret.data.clone(),
        type_: secret.type_.clone(),
        ..Default::default()
    }
}

/// Make the tenant's TLS secret available in its namespace.
///
/// Searches the tenant namespace first, then `source_namespaces` in order. A secret
/// found elsewhere is replicated, and an earlier replica is refreshed from its source
/// so renewed certificates reach the tenant. A replica whose source is gone is kept.
/// Missing everywhere is `CertificateUnavailable`.
#[instrument(skip(client, policy, tenant, source_namespaces), fields(tenant = %tenant.username, secret = %tenant.cert_secret))]
pub async fn ensure_tls_secret(
    client: &Client,
    policy: &RetryPolicy,
    tenant: &Tenant,
    source_namespaces: &[String],
) -> Result<TlsSecret> {
    let mut searched = vec![tenant.namespace.clone()];
    searched.extend(
        source_namespaces
            .iter()
            .filter(|ns| **ns != tenant.namespace)
            .cloned(),
    );

    let mut stale_replica = false;
    for namespace in &searched {
        let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
        let Some(secret) = objects::get_opt(&api, policy, &tenant.cert_secret).await? else {
            debug!("No secret {}/{}", namespace, tenant.cert_secret);
            continue;
        };
        if !has_tls_data(&secret) {
            warn!(
                "Secret {}/{} has no tls.crt/tls.key, skipping",
                namespace, tenant.cert_secret
            );
            continue;
        }

        if *namespace == tenant.namespace {
            if !replicated_for(&secret, tenant) {
                return Ok(TlsSecret {
                    name: tenant.cert_secret.clone(),
                    source_namespace: namespace.clone(),
                    replicated: false,
                });
            }
            debug!("Refreshing replica {}/{} from its source", namespace, tenant.cert_secret);
            stale_replica = true;
            continue;
        }

        let target: Api<Secret> = Api::namespaced(client.clone(), &tenant.namespace);
        objects::apply(&target, policy, &replicate_secret(&secret, tenant)).await?;
        info!(
            "Replicated TLS secret {}/{} into {}",
            namespace, tenant.cert_secret, tenant.namespace
        );
        return Ok(TlsSecret {
            name: tenant.cert_secret.clone(),
            source_namespace: namespace.clone(),
            replicated: true,
        });
    }

    if stale_replica {
        warn!(
            "No source left for TLS secret {}, keeping the copy in {}",
            tenant.cert_secret, tenant.namespace
        );
        return Ok(TlsSecret {
            name: tenant.cert_secret.clone(),
            source_namespace: tenant.namespace.clone(),
            replicated: true,
        });
    }

    Err(TenantError::CertificateUnavailable {
        secret: tenant.cert_secret.clone(),
        searched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_utils::{tls_secret_json, FakeCluster};
    use crate::types::tenant::TenantRequest;
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn make_tenant() -> Tenant {
        TenantRequest {
            username: "alice".to_string(),
            domain: "example.com".to_string(),
            role: "view".to_string(),
            ..Default::default()
        }
        .validate(&Config::for_tests("/tmp/unused"))
        .unwrap()
    }

    fn sources() -> Vec<String> {
        vec!["default".to_string(), "cert-manager".to_string()]
    }

    #[test]
    fn test_replica_drops_foreign_metadata() {
        let source: Secret =
            serde_json::from_value(tls_secret_json("cert-manager", "wildcard-tls")).unwrap();

        let copy = replicate_secret(&source, &make_tenant());

        assert_eq!(copy.metadata.namespace.as_deref(), Some("alice"));
        assert!(copy.metadata.uid.is_none());
        assert!(copy.metadata.resource_version.is_none());
        let copied = copy.metadata.annotations.unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(
            copied.get(annotations::REPLICATED_FROM).unwrap(),
            "cert-manager/wildcard-tls"
        );
        assert_eq!(copy.type_.as_deref(), Some("kubernetes.io/tls"));
        assert_eq!(copy.data, source.data);
    }

    #[tokio::test]
    async fn test_secret_in_tenant_namespace_is_used_as_is() {
        let cluster = FakeCluster::new()
            .with_tls_secret("alice", "wildcard-tls")
            .with_tls_secret("default", "wildcard-tls");
        let policy = Config::for_tests("/tmp/unused").api;

        let found = ensure_tls_secret(&cluster.client(), &policy, &make_tenant(), &sources())
            .await
            .unwrap();

        assert_eq!(found.source_namespace, "alice");
        assert!(!found.replicated);
    }

    #[tokio::test]
    async fn test_secret_is_replicated_from_first_source() {
        let cluster = FakeCluster::new()
            .with_namespace("alice")
            .with_tls_secret("cert-manager", "wildcard-tls");
        let policy = Config::for_tests("/tmp/unused").api;

        let found = ensure_tls_secret(&cluster.client(), &policy, &make_tenant(), &sources())
            .await
            .unwrap();

        assert_eq!(found.source_namespace, "cert-manager");
        assert!(found.replicated);
        let copy = cluster
            .get("/api/v1/namespaces/alice/secrets/wildcard-tls")
            .unwrap();
        assert_eq!(copy["metadata"]["labels"][labels::TENANT], "alice");
        assert_eq!(copy["data"]["tls.crt"], tls_secret_json("x", "y")["data"]["tls.crt"]);
    }

    #[tokio::test]
    async fn test_previous_replica_is_refreshed_from_source() {
        let cluster = FakeCluster::new()
            .with_namespace("alice")
            .with_tls_secret("default", "wildcard-tls");
        let policy = Config::for_tests("/tmp/unused").api;
        let tenant = make_tenant();
        ensure_tls_secret(&cluster.client(), &policy, &tenant, &sources())
            .await
            .unwrap();

        let source_path = "/api/v1/namespaces/default/secrets/wildcard-tls";
        let mut renewed = cluster.get(source_path).unwrap();
        renewed["data"]["tls.crt"] = STANDARD.encode("renewed").into();
        let cluster = cluster.with_object(source_path, renewed);

        let again = ensure_tls_secret(&cluster.client(), &policy, &tenant, &sources())
            .await
            .unwrap();

        assert_eq!(again.source_namespace, "default");
        assert!(again.replicated);
        let copy = cluster
            .get("/api/v1/namespaces/alice/secrets/wildcard-tls")
            .unwrap();
        assert_eq!(copy["data"]["tls.crt"], STANDARD.encode("renewed"));
    }

    #[tokio::test]
    async fn test_replica_is_kept_when_source_is_gone() {
        let cluster = FakeCluster::new()
            .with_namespace("alice")
            .with_tls_secret("default", "wildcard-tls");
        let policy = Config::for_tests("/tmp/unused").api;
        let tenant = make_tenant();
        ensure_tls_secret(&cluster.client(), &policy, &tenant, &sources())
            .await
            .unwrap();

        let secrets: Api<Secret> = Api::namespaced(cluster.client(), "default");
        secrets.delete("wildcard-tls", &Default::default()).await.unwrap();

        let again = ensure_tls_secret(&cluster.client(), &policy, &tenant, &sources())
            .await
            .unwrap();

        assert_eq!(again.source_namespace, "alice");
        assert!(again.replicated);
    }

    #[tokio::test]
    async fn test_missing_secret_lists_searched_namespaces() {
        let cluster = FakeCluster::new().with_namespace("alice");
        let policy = Config::for_tests("/tmp/unused").api;

        let err = ensure_tls_secret(&cluster.client(), &policy, &make_tenant(), &sources())
            .await
            .unwrap_err();

        match err {
            TenantError::CertificateUnavailable { secret, searched } => {
                assert_eq!(secret, "wildcard-tls");
                assert_eq!(searched, vec!["alice", "default", "cert-manager"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
