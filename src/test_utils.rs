// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory fake of the Kubernetes API server for tests.
//!
//! Objects are stored as JSON keyed by their API path. Creates conflict on
//! existing names, namespaced writes need their namespace, deleting a namespace
//! removes everything inside it, and CSR approvals are answered according to
//! the configured [`CsrBehavior`].

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, Method, Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, IsCa, Issuer, KeyPair,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// How the fake answers an approval of a CertificateSigningRequest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrBehavior {
    /// Sign with the fake cluster CA as soon as the request is approved
    Sign,
    /// Accept the approval but mark the request Denied
    Deny,
    /// Accept the approval and never issue a certificate
    Ignore,
    /// Reject the approval call itself with 403
    ForbidApproval,
}

struct TestCa {
    cert_pem: String,
    key_pem: String,
}

impl TestCa {
    fn new() -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "fake-cluster-ca");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        }
    }

    fn sign(&self, csr_pem: &str, expiration_seconds: Option<i64>) -> String {
        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem).unwrap();
        let now = time::OffsetDateTime::now_utc();
        csr.params.not_before = now;
        csr.params.not_after = now + time::Duration::seconds(expiration_seconds.unwrap_or(86_400));

        let key = KeyPair::from_pem(&self.key_pem).unwrap();
        let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, &key).unwrap();
        csr.signed_by(&issuer).unwrap().pem()
    }
}

struct State {
    objects: BTreeMap<String, Value>,
    requests: Vec<String>,
    faults: Vec<(Method, String, u16)>,
    csr_behavior: CsrBehavior,
    ca: TestCa,
    next_uid: u64,
    /// GETs a deleted namespace survives in `Terminating`; 0 deletes at once
    termination_polls: u32,
    terminating: BTreeMap<String, u32>,
}

/// Where a request path points
enum Target {
    Collection {
        base: String,
        namespace: Option<String>,
        plural: String,
    },
    Object {
        key: String,
        namespace: Option<String>,
    },
    Subresource {
        key: String,
        name: String,
    },
}

fn parse_path(path: &str) -> Option<Target> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (base, rest) = match segments.first()? {
        &"api" if segments.len() >= 2 => (format!("/api/{}", segments[1]), &segments[2..]),
        &"apis" if segments.len() >= 3 => (
            format!("/apis/{}/{}", segments[1], segments[2]),
            &segments[3..],
        ),
        _ => return None,
    };

    let target = match rest {
        [plural] => Target::Collection {
            base,
            namespace: None,
            plural: plural.to_string(),
        },
        ["namespaces", ns, plural] => Target::Collection {
            base,
            namespace: Some(ns.to_string()),
            plural: plural.to_string(),
        },
        [_, _] => Target::Object {
            key: format!("{}/{}", base, rest.join("/")),
            namespace: None,
        },
        ["namespaces", ns, _, _] => Target::Object {
            key: format!("{}/{}", base, rest.join("/")),
            namespace: Some(ns.to_string()),
        },
        [plural, name, _] => Target::Subresource {
            key: format!("{}/{}/{}", base, plural, name),
            name: name.to_string(),
        },
        ["namespaces", ns, plural, name, _] => Target::Subresource {
            key: format!("{}/namespaces/{}/{}/{}", base, ns, plural, name),
            name: name.to_string(),
        },
        _ => return None,
    };
    Some(target)
}

/// Whether a stored object key belongs to the given collection
fn in_collection(key: &str, base: &str, namespace: Option<&str>, plural: &str) -> bool {
    match parse_path(key) {
        Some(Target::Object {
            key: _,
            namespace: key_ns,
        }) => {
            let Some(rest) = key.strip_prefix(base) else {
                return false;
            };
            let parts: Vec<&str> = rest.trim_start_matches('/').split('/').collect();
            match (namespace, key_ns.as_deref(), parts.as_slice()) {
                (Some(ns), Some(kns), ["namespaces", _, p, _]) => ns == kns && *p == plural,
                (None, _, ["namespaces", _, p, _]) => *p == plural,
                (None, None, [p, _]) => *p == plural,
                _ => false,
            }
        }
        _ => false,
    }
}

/// RFC 7386 JSON merge patch
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (k, v) in p {
                if v.is_null() {
                    t.remove(k);
                } else {
                    merge(t.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

fn status_json(code: u16, reason: &str, message: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

impl State {
    fn namespace_exists(&self, namespace: &str) -> bool {
        self.objects
            .contains_key(&format!("/api/v1/namespaces/{}", namespace))
    }

    /// Count a read of a terminating namespace; true once it is finally gone
    fn finish_termination(&mut self, key: &str) -> bool {
        let Some(ns) = key
            .strip_prefix("/api/v1/namespaces/")
            .filter(|ns| !ns.contains('/'))
        else {
            return false;
        };
        let Some(remaining) = self.terminating.get_mut(ns) else {
            return false;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return false;
        }
        self.terminating.remove(ns);
        self.objects.remove(key);
        true
    }

    /// Why a write into `namespace` is refused, if it is
    fn refuse_write(&self, namespace: &str) -> Option<(u16, String)> {
        if !self.namespace_exists(namespace) {
            return Some((404, status_json(404, "NotFound", &format!("namespace {} not found", namespace))));
        }
        if self.terminating.contains_key(namespace) {
            return Some((
                403,
                status_json(
                    403,
                    "Forbidden",
                    &format!("namespace {} is being terminated", namespace),
                ),
            ));
        }
        None
    }

    fn insert_new(&mut self, key: String, mut object: Value, namespace: Option<&str>) -> Value {
        self.next_uid += 1;
        let meta = object
            .as_object_mut()
            .map(|o| o.entry("metadata").or_insert_with(|| json!({})));
        if let Some(Value::Object(meta)) = meta {
            meta.insert("uid".to_string(), json!(format!("uid-{}", self.next_uid)));
            meta.insert("resourceVersion".to_string(), json!("1"));
            if let Some(ns) = namespace {
                meta.insert("namespace".to_string(), json!(ns));
            }
        }
        self.objects.insert(key, object.clone());
        object
    }

    fn handle(&mut self, method: &Method, path: &str, content_type: &str, body: &[u8]) -> (u16, String) {
        self.requests.push(format!("{} {}", method, path));

        if let Some((_, _, code)) = self
            .faults
            .iter()
            .find(|(m, prefix, _)| m == method && path.starts_with(prefix.as_str()))
        {
            return (*code, status_json(*code, "InternalError", "injected fault"));
        }

        let Some(target) = parse_path(path) else {
            return (404, status_json(404, "NotFound", "unknown path"));
        };
        let payload: Value = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(body) {
                Ok(v) => v,
                Err(e) => return (400, status_json(400, "BadRequest", &e.to_string())),
            }
        };

        match (method.as_str(), target) {
            ("GET", Target::Object { key, .. }) if self.finish_termination(&key) => {
                (404, status_json(404, "NotFound", &format!("{} not found", key)))
            }
            ("GET", Target::Object { key, .. }) => match self.objects.get(&key) {
                Some(obj) => (200, obj.to_string()),
                None => (404, status_json(404, "NotFound", &format!("{} not found", key))),
            },
            ("GET", Target::Collection { base, namespace, plural }) => {
                let items: Vec<Value> = self
                    .objects
                    .iter()
                    .filter(|(k, _)| in_collection(k, &base, namespace.as_deref(), &plural))
                    .map(|(_, v)| v.clone())
                    .collect();
                let list = json!({
                    "apiVersion": "v1",
                    "kind": "List",
                    "metadata": { "resourceVersion": "1" },
                    "items": items
                });
                (200, list.to_string())
            }
            ("POST", Target::Collection { base, namespace, plural }) => {
                let Some(name) = payload["metadata"]["name"].as_str().map(str::to_string) else {
                    return (422, status_json(422, "Invalid", "metadata.name is required"));
                };
                if let Some(refused) = namespace.as_deref().and_then(|ns| self.refuse_write(ns)) {
                    return refused;
                }
                let key = match namespace.as_deref() {
                    Some(ns) => format!("{}/namespaces/{}/{}/{}", base, ns, plural, name),
                    None => format!("{}/{}/{}", base, plural, name),
                };
                if self.objects.contains_key(&key) {
                    return (
                        409,
                        status_json(409, "AlreadyExists", &format!("{} \"{}\" already exists", plural, name)),
                    );
                }
                let created = self.insert_new(key, payload, namespace.as_deref());
                (201, created.to_string())
            }
            ("PATCH", Target::Object { key, namespace }) => {
                if let Some(existing) = self.objects.get_mut(&key) {
                    merge(existing, &payload);
                    return (200, existing.to_string());
                }
                if !content_type.starts_with("application/apply-patch") {
                    return (404, status_json(404, "NotFound", &format!("{} not found", key)));
                }
                if let Some(refused) = namespace.as_deref().and_then(|ns| self.refuse_write(ns)) {
                    return refused;
                }
                let created = self.insert_new(key, payload, namespace.as_deref());
                (201, created.to_string())
            }
            ("PATCH", Target::Subresource { key, name }) => {
                if !self.objects.contains_key(&key) {
                    return (404, status_json(404, "NotFound", &format!("{} not found", key)));
                }
                if path.ends_with("/approval") && self.csr_behavior == CsrBehavior::ForbidApproval {
                    return (
                        403,
                        status_json(403, "Forbidden", &format!("cannot approve {}", name)),
                    );
                }
                let behavior = self.csr_behavior;
                let issued = match self.objects.get(&key) {
                    Some(obj) if path.ends_with("/approval") && behavior == CsrBehavior::Sign => {
                        let request = obj["spec"]["request"].as_str().unwrap_or_default();
                        let pem = String::from_utf8(STANDARD.decode(request).unwrap()).unwrap();
                        let expiration = obj["spec"]["expirationSeconds"].as_i64();
                        Some(self.ca.sign(&pem, expiration))
                    }
                    _ => None,
                };
                let Some(existing) = self.objects.get_mut(&key) else {
                    return (404, status_json(404, "NotFound", &format!("{} not found", key)));
                };
                merge(existing, &payload);
                if path.ends_with("/approval") {
                    match behavior {
                        CsrBehavior::Sign => {
                            if let Some(cert) = issued {
                                existing["status"]["certificate"] = json!(STANDARD.encode(cert));
                            }
                        }
                        CsrBehavior::Deny => {
                            existing["status"]["conditions"] = json!([{
                                "type": "Denied",
                                "status": "True",
                                "reason": "PolicyRejected",
                                "message": "denied by test policy"
                            }]);
                        }
                        CsrBehavior::Ignore | CsrBehavior::ForbidApproval => {}
                    }
                }
                (200, existing.to_string())
            }
            ("DELETE", Target::Object { key, .. }) => {
                let deleted_namespace = key
                    .strip_prefix("/api/v1/namespaces/")
                    .filter(|ns| !ns.contains('/'))
                    .map(str::to_string);
                let keep_terminating = deleted_namespace.is_some() && self.termination_polls > 0;
                let removed = if keep_terminating {
                    self.objects.get_mut(&key).map(|obj| {
                        obj["status"] = json!({ "phase": "Terminating" });
                        obj["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
                        obj.clone()
                    })
                } else {
                    self.objects.remove(&key)
                };
                let Some(obj) = removed else {
                    return (404, status_json(404, "NotFound", &format!("{} not found", key)));
                };
                if let Some(ns) = deleted_namespace {
                    let inside = format!("/namespaces/{}/", ns);
                    self.objects.retain(|k, _| !k.contains(&inside));
                    if keep_terminating {
                        let polls = self.termination_polls;
                        self.terminating.entry(ns).or_insert(polls);
                    }
                }
                (200, obj.to_string())
            }
            _ => (405, status_json(405, "MethodNotAllowed", "not supported by fake")),
        }
    }
}

/// A fake API server that can be turned into a kube `Client`
#[derive(Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                requests: Vec::new(),
                faults: Vec::new(),
                csr_behavior: CsrBehavior::Sign,
                ca: TestCa::new(),
                next_uid: 0,
                termination_polls: 0,
                terminating: BTreeMap::new(),
            })),
        }
    }

    pub fn with_csr_behavior(self, behavior: CsrBehavior) -> Self {
        self.state.lock().unwrap().csr_behavior = behavior;
        self
    }

    /// Keep deleted namespaces in `Terminating` until they have been read `polls` times
    pub fn with_namespace_termination(self, polls: u32) -> Self {
        self.state.lock().unwrap().termination_polls = polls;
        self
    }

    /// Store an object directly at an API path
    pub fn with_object(self, path: &str, object: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(path.to_string(), object);
        self
    }

    pub fn with_namespace(self, name: &str) -> Self {
        self.with_object(
            &format!("/api/v1/namespaces/{}", name),
            namespace_json(name, &[]),
        )
    }

    pub fn with_ingress_class(self, name: &str, default: bool) -> Self {
        self.with_object(
            &format!("/apis/networking.k8s.io/v1/ingressclasses/{}", name),
            ingress_class_json(name, default),
        )
    }

    /// Store a TLS secret, creating its namespace if needed
    pub fn with_tls_secret(self, namespace: &str, name: &str) -> Self {
        let seeded = if self.contains(&format!("/api/v1/namespaces/{}", namespace)) {
            self
        } else {
            self.with_namespace(namespace)
        };
        seeded.with_object(
            &format!("/api/v1/namespaces/{}/secrets/{}", namespace, name),
            tls_secret_json(namespace, name),
        )
    }

    /// Answer every request with `method` whose path starts with `path_prefix` with `status`
    pub fn fail(self, method: Method, path_prefix: &str, status: u16) -> Self {
        self.state
            .lock()
            .unwrap()
            .faults
            .push((method, path_prefix.to_string(), status));
        self
    }

    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }

    /// PEM of the CA that signs approved CSRs
    pub fn ca_pem(&self) -> String {
        self.state.lock().unwrap().ca.cert_pem.clone()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(path)
    }

    /// Paths of every stored object, sorted
    pub fn paths(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    /// Number of requests made with `method` to exactly `path`
    pub fn count(&self, method: &str, path: &str) -> usize {
        let wanted = format!("{} {}", method, path);
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| **r == wanted)
            .count()
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for FakeCluster {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes: Bytes = body.collect().await?.to_bytes();
            let content_type = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let (status, body) = state.lock().unwrap().handle(
                &parts.method,
                parts.uri.path(),
                &content_type,
                &bytes,
            );

            Ok(Response::builder()
                .status(status)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.into_bytes()))?)
        })
    }
}

/// Namespace JSON with the given labels
pub fn namespace_json(name: &str, labels: &[(&str, &str)]) -> Value {
    let labels: BTreeMap<&str, &str> = labels.iter().copied().collect();
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": format!("uid-{}", name),
            "labels": labels
        }
    })
}

pub fn ingress_class_json(name: &str, default: bool) -> Value {
    let annotations = if default {
        json!({ "ingressclass.kubernetes.io/is-default-class": "true" })
    } else {
        json!({})
    };
    json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "IngressClass",
        "metadata": { "name": name, "annotations": annotations },
        "spec": { "controller": format!("example.com/{}", name) }
    })
}

pub fn tls_secret_json(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{}-{}", namespace, name),
            "resourceVersion": "42",
            "annotations": { "cert-manager.io/issuer-name": "letsencrypt" }
        },
        "type": "kubernetes.io/tls",
        "data": {
            "tls.crt": STANDARD.encode("certificate"),
            "tls.key": STANDARD.encode("key")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Namespace, Secret};
    use kube::api::{ListParams, PostParams};
    use kube::Api;

    #[test]
    fn test_parse_path_shapes() {
        assert!(matches!(
            parse_path("/api/v1/namespaces"),
            Some(Target::Collection { namespace: None, .. })
        ));
        assert!(matches!(
            parse_path("/api/v1/namespaces/alice/secrets"),
            Some(Target::Collection { namespace: Some(_), .. })
        ));
        assert!(matches!(
            parse_path("/api/v1/namespaces/alice"),
            Some(Target::Object { namespace: None, .. })
        ));
        assert!(matches!(
            parse_path("/apis/apps/v1/namespaces/alice/deployments/web"),
            Some(Target::Object { namespace: Some(_), .. })
        ));
        assert!(matches!(
            parse_path("/apis/certificates.k8s.io/v1/certificatesigningrequests/alice-csr/approval"),
            Some(Target::Subresource { .. })
        ));
    }

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge(&mut target, &json!({"b": {"c": null, "e": 4}, "f": [1]}));
        assert_eq!(target, json!({"a": 1, "b": {"d": 3, "e": 4}, "f": [1]}));
    }

    #[tokio::test]
    async fn test_namespace_delete_cascades() {
        let cluster = FakeCluster::new()
            .with_namespace("alice")
            .with_tls_secret("alice", "tls")
            .with_tls_secret("other", "tls");
        let namespaces: Api<Namespace> = Api::all(cluster.client());

        namespaces.delete("alice", &Default::default()).await.unwrap();

        assert!(!cluster.contains("/api/v1/namespaces/alice/secrets/tls"));
        assert!(cluster.contains("/api/v1/namespaces/other/secrets/tls"));
    }

    #[tokio::test]
    async fn test_create_in_missing_namespace_fails() {
        let cluster = FakeCluster::new();
        let secrets: Api<Secret> = Api::namespaced(cluster.client(), "ghost");
        let secret = Secret {
            metadata: kube::api::ObjectMeta {
                name: Some("s".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = secrets.create(&PostParams::default(), &secret).await.unwrap_err();
        assert!(matches!(err, kube::Error::Api(resp) if resp.code == 404));
    }

    #[tokio::test]
    async fn test_list_across_namespaces() {
        let cluster = FakeCluster::new()
            .with_tls_secret("a", "one")
            .with_tls_secret("b", "two");
        let secrets: Api<Secret> = Api::all(cluster.client());

        let list = secrets.list(&ListParams::default()).await.unwrap();
        assert_eq!(list.items.len(), 2);
    }
}
