// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tenant reconciler - restores a tenant's Role and RoleBinding when they drift.

use crate::config::Config;
use crate::constants::{labels, RECONCILE_ERROR_REQUEUE_SECS};
use crate::error::{Result, TenantError};
use crate::kubernetes::RetryPolicy;
use crate::rbac::apply_rbac;
use crate::registry::{Registry, TenantPhase};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct TenantReconciler {
    client: Client,
    policy: RetryPolicy,
    registry: Registry,
}

impl TenantReconciler {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            policy: config.api.clone(),
            registry: Registry::new(&config.state_dir),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let bindings: Api<RoleBinding> = Api::all(self.client.clone());
        let roles: Api<Role> = Api::all(self.client.clone());
        let managed = || watcher::Config::default().labels(labels::MANAGED_SELECTOR);
        let context = Arc::new(self);

        info!("Watching tenant namespaces for RBAC drift");

        // RBAC objects map to the namespace they live in
        Controller::new(namespaces, managed())
            .watches(bindings, managed(), |binding: RoleBinding| {
                binding.namespace().map(|ns| ObjectRef::new(&ns))
            })
            .watches(roles, managed(), |role: Role| {
                role.namespace().map(|ns| ObjectRef::new(&ns))
            })
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled namespace: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

pub(crate) async fn reconcile(namespace: Arc<Namespace>, ctx: Arc<TenantReconciler>) -> Result<Action> {
    let name = namespace.name_any();
    let Some(username) = namespace.labels().get(labels::TENANT).cloned() else {
        debug!("Namespace {} carries no tenant label, skipping", name);
        return Ok(Action::await_change());
    };

    let Some(record) = ctx
        .registry
        .lookup(&username)
        .map_err(|e| e.in_step("reconcile", &username))?
    else {
        debug!("Tenant {} is not registered, skipping namespace {}", username, name);
        return Ok(Action::await_change());
    };

    if record.phase != TenantPhase::Ready {
        debug!("Tenant {} is still provisioning, skipping", username);
        return Ok(Action::await_change());
    }
    if record.namespace != name {
        warn!(
            "Namespace {} is labelled for tenant {}, whose namespace is {}",
            name, username, record.namespace
        );
        return Ok(Action::await_change());
    }

    apply_rbac(
        &ctx.client,
        &ctx.policy,
        &record.tenant(),
        namespace.metadata.uid.as_deref(),
    )
    .await
    .map_err(|e| e.in_step("reconcile-rbac", &username))?;

    Ok(Action::await_change())
}

fn error_policy(_namespace: Arc<Namespace>, error: &TenantError, _ctx: Arc<TenantReconciler>) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(RECONCILE_ERROR_REQUEUE_SECS))
}
