// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ingress class resolution

use crate::constants::annotations;
use crate::error::{Result, TenantError};
use crate::kubernetes::retry::{call, RetryPolicy};
use k8s_openapi::api::networking::v1::IngressClass;
use kube::{api::ListParams, Api, Client, ResourceExt};
use tracing::{debug, instrument};

fn is_default(class: &IngressClass) -> bool {
    class
        .annotations()
        .get(annotations::DEFAULT_INGRESS_CLASS)
        .is_some_and(|v| v == "true")
}

/// Pick the ingress class for tenant ingresses.
///
/// A configured class must exist. Otherwise the one class annotated as default wins,
/// then a sole class. Anything else is ambiguous and fails.
pub fn select_ingress_class(classes: &[IngressClass], configured: Option<&str>) -> Result<String> {
    if let Some(wanted) = configured {
        return classes
            .iter()
            .find(|c| c.name_any() == wanted)
            .map(|c| c.name_any())
            .ok_or_else(|| {
                TenantError::NoIngressClass(format!("configured class '{}' does not exist", wanted))
            });
    }

    let defaults: Vec<&IngressClass> = classes.iter().filter(|c| is_default(c)).collect();
    match (defaults.as_slice(), classes) {
        ([only_default], _) => Ok(only_default.name_any()),
        ([], [only]) => Ok(only.name_any()),
        ([], []) => Err(TenantError::NoIngressClass(
            "the cluster has no ingress classes".to_string(),
        )),
        ([], _) => Err(TenantError::NoIngressClass(format!(
            "{} ingress classes and none marked as default",
            classes.len()
        ))),
        (many, _) => Err(TenantError::NoIngressClass(format!(
            "{} ingress classes are marked as default",
            many.len()
        ))),
    }
}

#[instrument(skip(client, policy))]
pub async fn resolve_ingress_class(
    client: &Client,
    policy: &RetryPolicy,
    configured: Option<&str>,
) -> Result<String> {
    let api: Api<IngressClass> = Api::all(client.clone());
    let lp = ListParams::default();
    let classes = call(policy, "list IngressClass", || api.list(&lp)).await?;

    let selected = select_ingress_class(&classes.items, configured)?;
    debug!("Using ingress class {}", selected);
    Ok(selected)
}
