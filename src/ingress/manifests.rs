// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deployment, Service and Ingress rendered for a tenant

use crate::config::IngressSettings;
use crate::types::tenant::Tenant;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const APP_LABEL: &str = "app.kubernetes.io/name";

/// Everything the ingress controller needs to serve `username.domain`
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSet {
    pub deployment: Deployment,
    pub service: Service,
    pub ingress: Ingress,
}

fn selector(tenant: &Tenant) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), tenant.workload_name())])
}

fn metadata(tenant: &Tenant) -> ObjectMeta {
    let mut labels = tenant.labels();
    labels.extend(selector(tenant));
    ObjectMeta {
        name: Some(tenant.workload_name()),
        namespace: Some(tenant.namespace.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Render the manifests from the tenant, ingress class, TLS secret and workload settings alone
pub fn render_manifests(
    tenant: &Tenant,
    ingress_class: &str,
    tls_secret: &str,
    settings: &IngressSettings,
) -> ManifestSet {
    let port = i32::from(settings.workload_port);
    let name = tenant.workload_name();

    let deployment = Deployment {
        metadata: metadata(tenant),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector(tenant)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(metadata(tenant).labels.unwrap_or_default()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "app".to_string(),
                        image: Some(settings.workload_image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: port,
                            name: Some("http".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let service = Service {
        metadata: metadata(tenant),
        spec: Some(ServiceSpec {
            selector: Some(selector(tenant)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::String("http".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let host = tenant.subdomain();
    let ingress = Ingress {
        metadata: metadata(tenant),
        spec: Some(IngressSpec {
            ingress_class_name: Some(ingress_class.to_string()),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.clone()]),
                secret_name: Some(tls_secret.to_string()),
            }]),
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name,
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    ManifestSet {
        deployment,
        service,
        ingress,
    }
}

/// Hosts an ingress serves, from both its rules and its TLS section
pub fn ingress_hosts(ingress: &Ingress) -> Vec<String> {
    let Some(spec) = &ingress.spec else {
        return Vec::new();
    };
    let from_rules = spec.rules.iter().flatten().filter_map(|r| r.host.clone());
    let from_tls = spec
        .tls
        .iter()
        .flatten()
        .flat_map(|t| t.hosts.clone().unwrap_or_default());
    let mut hosts: Vec<String> = from_rules.chain(from_tls).collect();
    hosts.sort();
    hosts.dedup();
    hosts
}
