// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod error;
pub mod ingress;
pub mod kubeconfig;
pub mod kubernetes;
pub mod pki;
pub mod provisioner;
pub mod rbac;
pub mod reconcilers;
pub mod registry;
pub mod storage;
pub mod types;

#[cfg(test)]
pub mod test_utils;
