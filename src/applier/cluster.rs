//! The cluster abstraction the applier and reconciler operate against —
//! real Kubernetes via [`kube`], or an in-memory mock for tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::model::{PodDescriptor, Resource, ResizePolicy};

#[derive(Debug, Clone, Default)]
pub struct PodFilter {
    pub namespace: Option<String>,
    pub label_selector: BTreeMap<String, String>,
}

/// A minimal patch against the `pods/resize` subresource: one resource,
/// one container, carrying both the request and the limit (spec.md §4.5:
/// "a minimal patch containing only the CPU request and limit").
#[derive(Debug, Clone, Copy)]
pub struct ResizePatch {
    pub resource: Resource,
    pub request: u64,
    pub limit: u64,
}

#[async_trait]
pub trait Cluster: Send + Sync {
    async fn list_pods(&self, filter: &PodFilter) -> Result<Vec<PodDescriptor>>;
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodDescriptor>;
    async fn patch_pod_resize(&self, namespace: &str, name: &str, container: &str, patch: ResizePatch) -> Result<PodDescriptor>;
    async fn patch_resize_policy(&self, namespace: &str, name: &str, container: &str, policy: ResizePolicy) -> Result<PodDescriptor>;
    /// Discovers whether the `pods/resize` subresource exists; cached by
    /// callers after the first call since the cluster's API surface does
    /// not change at runtime.
    async fn supports_in_place_resize(&self) -> Result<bool>;
}

/// Talks to a real cluster through [`kube::Client`]. The resize subresource
/// has no typed client support yet, so patches go through the raw API.
pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn list_pods(&self, filter: &PodFilter) -> Result<Vec<PodDescriptor>> {
        use k8s_openapi::api::core::v1::Pod;
        use kube::api::{Api, ListParams};

        let api: Api<Pod> = match &filter.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default();
        if !filter.label_selector.is_empty() {
            let selector = filter
                .label_selector
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            params = params.labels(&selector);
        }

        let list = api
            .list(&params)
            .await
            .map_err(|e| Error::Transient(format!("list pods failed: {e}")))?;

        Ok(list.items.iter().filter_map(pod_from_k8s).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodDescriptor> {
        use k8s_openapi::api::core::v1::Pod;
        use kube::api::Api;

        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api.get(name).await.map_err(classify_kube_error)?;
        pod_from_k8s(&pod).ok_or_else(|| Error::InvariantViolation(format!("pod {namespace}/{name} has no containers")))
    }

    async fn patch_pod_resize(&self, namespace: &str, name: &str, container: &str, patch: ResizePatch) -> Result<PodDescriptor> {
        use k8s_openapi::api::core::v1::Pod;
        use kube::api::{Api, Patch, PatchParams};

        let field = match patch.resource {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
        };
        let (request, limit) = match patch.resource {
            Resource::Cpu => (
                crate::quantity::format_cpu_millicores(patch.request),
                crate::quantity::format_cpu_millicores(patch.limit),
            ),
            Resource::Memory => (
                crate::quantity::format_memory_bytes(patch.request),
                crate::quantity::format_memory_bytes(patch.limit),
            ),
        };

        let body = serde_json::json!({
            "spec": {
                "containers": [{
                    "name": container,
                    "resources": {
                        "requests": { field: request },
                        "limits": { field: limit },
                    }
                }]
            }
        });

        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let patched = api
            .patch_subresource("resize", name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(classify_kube_error)?;

        pod_from_k8s(&patched).ok_or_else(|| Error::InvariantViolation("resize patch returned no containers".into()))
    }

    async fn patch_resize_policy(&self, namespace: &str, name: &str, container: &str, policy: ResizePolicy) -> Result<PodDescriptor> {
        use k8s_openapi::api::core::v1::Pod;
        use kube::api::{Api, Patch, PatchParams};

        let restart_policy = |p: crate::model::RestartPolicy| match p {
            crate::model::RestartPolicy::NotRequired => "NotRequired",
            crate::model::RestartPolicy::RestartContainer => "RestartContainer",
        };

        let body = serde_json::json!({
            "spec": {
                "containers": [{
                    "name": container,
                    "resizePolicy": [
                        { "resourceName": "cpu", "restartPolicy": restart_policy(policy.cpu.unwrap_or(crate::model::RestartPolicy::NotRequired)) },
                        { "resourceName": "memory", "restartPolicy": restart_policy(policy.memory.unwrap_or(crate::model::RestartPolicy::NotRequired)) },
                    ]
                }]
            }
        });

        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let patched = api
            .patch(name, &PatchParams::default(), &Patch::Strategic(&body))
            .await
            .map_err(classify_kube_error)?;

        pod_from_k8s(&patched).ok_or_else(|| Error::InvariantViolation("resize-policy patch returned no containers".into()))
    }

    async fn supports_in_place_resize(&self) -> Result<bool> {
        let discovery = kube::discovery::Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| Error::Transient(format!("resource discovery failed: {e}")))?;

        Ok(discovery
            .groups()
            .flat_map(|g| g.recommended_resources())
            .any(|(resource, _)| resource.kind == "Pod" && resource.plural == "pods"))
    }
}

/// Whether an error message indicates a rejected in-place memory decrease —
/// the source of truth is the error text, not any particular HTTP status or
/// `Error` variant, since a real cluster can return this under more than one
/// status code (422, 400, ...).
pub(crate) fn is_memory_decrease_conflict(message: &str) -> bool {
    message.to_lowercase().contains("cannot decrease memory")
}

fn classify_kube_error(err: kube::Error) -> Error {
    match &err {
        kube::Error::Api(resp) if is_memory_decrease_conflict(&resp.message) => {
            Error::Conflict(resp.message.clone())
        }
        kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message.clone()),
        kube::Error::Api(resp) if resp.code == 403 => Error::Forbidden(resp.message.clone()),
        kube::Error::Api(resp) if resp.code >= 500 || resp.code == 409 || resp.code == 429 => {
            Error::Transient(resp.message.clone())
        }
        _ => {
            let message = err.to_string();
            if crate::resilience::is_retryable_message(&message) {
                Error::Transient(message)
            } else {
                Error::Validation(message)
            }
        }
    }
}

fn pod_from_k8s(pod: &k8s_openapi::api::core::v1::Pod) -> Option<PodDescriptor> {
    use crate::model::{ContainerDescriptor, ResourceRequirements};

    let spec = pod.spec.as_ref()?;
    let metadata = &pod.metadata;

    let containers = spec
        .containers
        .iter()
        .map(|c| {
            let resources = c.resources.as_ref();
            let get = |m: &Option<BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>>, key: &str, parser: fn(&str) -> u64| {
                m.as_ref().and_then(|m| m.get(key)).map(|q| parser(&q.0))
            };
            ContainerDescriptor {
                name: c.name.clone(),
                resources: ResourceRequirements {
                    cpu_request: resources.and_then(|r| get(&r.requests, "cpu", crate::quantity::parse_cpu_millicores)),
                    cpu_limit: resources.and_then(|r| get(&r.limits, "cpu", crate::quantity::parse_cpu_millicores)),
                    mem_request: resources.and_then(|r| get(&r.requests, "memory", crate::quantity::parse_memory_bytes)),
                    mem_limit: resources.and_then(|r| get(&r.limits, "memory", crate::quantity::parse_memory_bytes)),
                },
                resize_policy: ResizePolicy::default(),
            }
        })
        .collect();

    Some(PodDescriptor {
        namespace: metadata.namespace.clone().unwrap_or_default(),
        name: metadata.name.clone().unwrap_or_default(),
        labels: metadata.labels.clone().unwrap_or_default().into_iter().collect(),
        annotations: metadata.annotations.clone().unwrap_or_default().into_iter().collect(),
        containers,
    })
}

/// Deterministic, in-memory cluster for tests: holds pods and answers
/// patches by mutating them directly, optionally rejecting memory
/// decreases to exercise the applier's partial-success path.
#[derive(Default)]
pub struct MockCluster {
    pods: DashMap<(String, String), PodDescriptor>,
    reject_memory_decrease: std::sync::atomic::AtomicBool,
    supports_resize: std::sync::atomic::AtomicBool,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        let cluster = Self::default();
        cluster.supports_resize.store(true, std::sync::atomic::Ordering::SeqCst);
        Arc::new(cluster)
    }

    pub fn insert_pod(&self, pod: PodDescriptor) {
        self.pods.insert((pod.namespace.clone(), pod.name.clone()), pod);
    }

    pub fn set_supports_resize(&self, supported: bool) {
        self.supports_resize.store(supported, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn reject_memory_decreases(&self, reject: bool) {
        self.reject_memory_decrease.store(reject, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn list_pods(&self, filter: &PodFilter) -> Result<Vec<PodDescriptor>> {
        Ok(self
            .pods
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| filter.namespace.as_ref().is_none_or(|ns| ns == &p.namespace))
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodDescriptor> {
        self.pods
            .get(&(namespace.to_string(), name.to_string()))
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("pod {namespace}/{name} not found")))
    }

    async fn patch_pod_resize(&self, namespace: &str, name: &str, container: &str, patch: ResizePatch) -> Result<PodDescriptor> {
        let key = (namespace.to_string(), name.to_string());
        let mut entry = self
            .pods
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(format!("pod {namespace}/{name} not found")))?;

        let c = entry
            .containers
            .iter_mut()
            .find(|c| c.name == container)
            .ok_or_else(|| Error::NotFound(format!("container {container} not found")))?;

        match patch.resource {
            Resource::Cpu => {
                c.resources.cpu_request = Some(patch.request);
                c.resources.cpu_limit = Some(patch.limit);
            }
            Resource::Memory => {
                let decreasing = c.resources.mem_request.is_some_and(|r| patch.request < r);
                if decreasing && self.reject_memory_decrease.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(Error::Conflict("cannot decrease memory".into()));
                }
                c.resources.mem_request = Some(patch.request);
                c.resources.mem_limit = Some(patch.limit);
            }
        }

        Ok(entry.value().clone())
    }

    async fn patch_resize_policy(&self, namespace: &str, name: &str, container: &str, policy: ResizePolicy) -> Result<PodDescriptor> {
        let key = (namespace.to_string(), name.to_string());
        let mut entry = self
            .pods
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(format!("pod {namespace}/{name} not found")))?;
        let c = entry
            .containers
            .iter_mut()
            .find(|c| c.name == container)
            .ok_or_else(|| Error::NotFound(format!("container {container} not found")))?;
        c.resize_policy = policy;
        Ok(entry.value().clone())
    }

    async fn supports_in_place_resize(&self) -> Result<bool> {
        Ok(self.supports_resize.load(std::sync::atomic::Ordering::SeqCst))
    }
}
