// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tenant namespace management

use crate::constants::{labels, NAMESPACE_TERMINATION_WAIT_SECS};
use crate::error::{Result, TenantError};
use crate::kubernetes::objects::{self, CreateOutcome};
use crate::kubernetes::retry::RetryPolicy;
use crate::types::tenant::Tenant;
use k8s_openapi::api::core::v1::Namespace;
use kube::{api::ObjectMeta, Api, Client, ResourceExt};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

/// What `ensure_tenant_namespace` found or did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantNamespace {
    pub name: String,
    pub uid: Option<String>,
    /// Whether the namespace belongs to the tenant and may be deleted on teardown
    pub owned: bool,
}

fn owner_of(namespace: &Namespace) -> Option<&str> {
    namespace
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(labels::TENANT))
        .map(|s| s.as_str())
}

fn is_terminating(namespace: &Namespace) -> bool {
    namespace.metadata.deletion_timestamp.is_some()
        || namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Terminating")
}

/// Create the tenant namespace, or reuse it if it already exists.
///
/// Creation is a plain POST, so two concurrent provisions of the same tenant
/// serialize on the API server: the loser sees a conflict and inspects the
/// winner's namespace instead of failing. A namespace still terminating from an
/// earlier teardown is waited out with backoff and then created afresh.
#[instrument(skip(client, policy, tenant), fields(tenant = %tenant.username, namespace = %tenant.namespace))]
pub async fn ensure_tenant_namespace(
    client: &Client,
    policy: &RetryPolicy,
    tenant: &Tenant,
) -> Result<TenantNamespace> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(tenant.namespace.clone()),
            labels: Some(tenant.labels()),
            ..Default::default()
        },
        ..Default::default()
    };

    let deadline = Instant::now() + Duration::from_secs(NAMESPACE_TERMINATION_WAIT_SECS);
    let mut delay = policy.initial_delay;

    loop {
        let existing = match objects::create(&namespaces, policy, &ns).await? {
            CreateOutcome::Created(created) => {
                info!("Namespace {} created", tenant.namespace);
                return Ok(TenantNamespace {
                    name: tenant.namespace.clone(),
                    uid: created.uid(),
                    owned: true,
                });
            }
            CreateOutcome::AlreadyExists => {
                objects::get_opt(&namespaces, policy, &tenant.namespace).await?
            }
        };

        match existing {
            Some(existing) if !is_terminating(&existing) => return adopt(tenant, &existing),
            Some(_) => debug!("Namespace {} is terminating, waiting", tenant.namespace),
            // Deleted between create and get
            None => {}
        }

        if Instant::now() + delay > deadline {
            return Err(TenantError::conflict(format!(
                "namespace {} is still terminating after {}s",
                tenant.namespace, NAMESPACE_TERMINATION_WAIT_SECS
            )));
        }
        sleep(delay).await;
        delay = (delay * 2).min(policy.max_delay);
    }
}

/// Decide what an existing, live namespace means for the tenant
fn adopt(tenant: &Tenant, existing: &Namespace) -> Result<TenantNamespace> {
    match owner_of(existing) {
        Some(owner) if owner == tenant.username => {
            debug!("Namespace {} already exists", tenant.namespace);
            Ok(TenantNamespace {
                name: tenant.namespace.clone(),
                uid: existing.uid(),
                owned: true,
            })
        }
        Some(owner) => Err(TenantError::conflict(format!(
            "namespace {} belongs to tenant {}",
            tenant.namespace, owner
        ))),
        None => {
            warn!(
                "Namespace {} exists and is not managed by tenantctl, using it without taking ownership",
                tenant.namespace
            );
            Ok(TenantNamespace {
                name: tenant.namespace.clone(),
                uid: existing.uid(),
                owned: false,
            })
        }
    }
}

/// Delete a namespace; its contents go with it
#[instrument(skip(client, policy))]
pub async fn delete_namespace(client: &Client, policy: &RetryPolicy, namespace: &str) -> Result<bool> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let deleted = objects::delete_if_exists(&namespaces, policy, namespace).await?;
    if deleted {
        info!("Namespace {} deleted", namespace);
    }
    Ok(deleted)
}
