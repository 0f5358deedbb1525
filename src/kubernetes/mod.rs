// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for cluster discovery, API calls with retry, and namespace management.

pub mod client;
pub mod namespaces;
pub mod objects;
pub mod retry;

pub use client::{ClusterInfo, RewriteRule};
pub use namespaces::{delete_namespace, ensure_tenant_namespace, TenantNamespace};
pub use retry::RetryPolicy;
