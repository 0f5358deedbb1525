// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tenant ingress: class resolution, TLS secret, subdomain ownership and workload manifests

pub mod class;
pub mod manifests;
pub mod secrets;

use crate::config::IngressSettings;
use crate::error::{Result, TenantError};
use crate::kubernetes::objects;
use crate::kubernetes::retry::{call, RetryPolicy};
use crate::types::resource::{ResourceKind, ResourceRef};
use crate::types::tenant::Tenant;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{api::ListParams, Api, Client, ResourceExt};
use tracing::{info, instrument};

pub use class::resolve_ingress_class;
pub use manifests::{render_manifests, ManifestSet};
pub use secrets::{ensure_tls_secret, TlsSecret};

pub struct IngressConfigurator {
    client: Client,
    settings: IngressSettings,
    policy: RetryPolicy,
}

impl IngressConfigurator {
    pub fn new(client: Client, settings: IngressSettings, policy: RetryPolicy) -> Self {
        Self {
            client,
            settings,
            policy,
        }
    }

    /// Wire up ingress for the tenant and return the applied manifests.
    ///
    /// Nothing is written before the ingress class is resolved and the subdomain is
    /// known to be free. `record` is called with each batch of created objects as soon
    /// as it exists.
    #[instrument(skip(self, tenant, record), fields(tenant = %tenant.username, host = %tenant.subdomain()))]
    pub async fn configure<F>(&self, tenant: &Tenant, mut record: F) -> Result<ManifestSet>
    where
        F: FnMut(Vec<ResourceRef>) -> Result<()>,
    {
        let class = resolve_ingress_class(&self.client, &self.policy, self.settings.class.as_deref())
            .await
            .map_err(|e| e.in_step("resolve-ingress-class", &tenant.username))?;

        self.check_subdomain_free(tenant)
            .await
            .map_err(|e| e.in_step("check-subdomain", &tenant.username))?;

        let tls = ensure_tls_secret(
            &self.client,
            &self.policy,
            tenant,
            &self.settings.tls_source_namespaces,
        )
        .await
        .map_err(|e| e.in_step("locate-tls-secret", &tenant.username))?;
        if tls.replicated {
            record(vec![ResourceRef::namespaced(
                ResourceKind::Secret,
                &tenant.namespace,
                &tls.name,
            )])?;
        }

        let set = render_manifests(tenant, &class, &tls.name, &self.settings);
        self.apply(tenant, &set, &mut record)
            .await
            .map_err(|e| e.in_step("apply-ingress-manifests", &tenant.username))?;

        info!(
            "https://{} served through ingress class {} with secret {}",
            tenant.subdomain(),
            class,
            tls.name
        );
        Ok(set)
    }

    /// Fail if another namespace already serves the tenant's subdomain
    async fn check_subdomain_free(&self, tenant: &Tenant) -> Result<()> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        let lp = ListParams::default();
        let ingresses = call(&self.policy, "list Ingress", || api.list(&lp)).await?;

        let host = tenant.subdomain();
        let taken = ingresses.items.iter().find(|ing| {
            ing.namespace().as_deref() != Some(tenant.namespace.as_str())
                && manifests::ingress_hosts(ing).contains(&host)
        });
        match taken {
            Some(ing) => Err(TenantError::conflict(format!(
                "host {} is already served by ingress {}/{}",
                host,
                ing.namespace().unwrap_or_default(),
                ing.name_any()
            ))),
            None => Ok(()),
        }
    }

    async fn apply<F>(&self, tenant: &Tenant, set: &ManifestSet, record: &mut F) -> Result<()>
    where
        F: FnMut(Vec<ResourceRef>) -> Result<()>,
    {
        let ns = &tenant.namespace;
        let name = tenant.workload_name();

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), ns);
        objects::apply(&deployments, &self.policy, &set.deployment).await?;
        record(vec![ResourceRef::namespaced(ResourceKind::Deployment, ns, &name)])?;

        let services: Api<Service> = Api::namespaced(self.client.clone(), ns);
        objects::apply(&services, &self.policy, &set.service).await?;
        record(vec![ResourceRef::namespaced(ResourceKind::Service, ns, &name)])?;

        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), ns);
        objects::apply(&ingresses, &self.policy, &set.ingress).await?;
        record(vec![ResourceRef::namespaced(ResourceKind::Ingress, ns, &name)])?;

        Ok(())
    }
}
