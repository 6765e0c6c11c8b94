//! C2: pluggable source of "current" resource usage for a pod.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// A single "now" reading for one container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub cpu_milli: f64,
    pub mem_mb: f64,
}

/// Interchangeable metrics backends: metrics-server, Prometheus, mock.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn fetch(&self, namespace: &str, pod: &str, container: &str) -> Result<Usage>;
}

/// Deterministic, in-memory provider for tests and the what-if simulator.
#[derive(Debug, Default)]
pub struct MockProvider {
    fixed: dashmap::DashMap<(String, String, String), Usage>,
    fail: dashmap::DashSet<(String, String, String)>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, namespace: &str, pod: &str, container: &str, usage: Usage) {
        self.fixed
            .insert((namespace.to_string(), pod.to_string(), container.to_string()), usage);
    }

    /// Makes subsequent `fetch` calls for this container return a
    /// transient error, to exercise C12's retry/breaker paths.
    pub fn fail_next(&self, namespace: &str, pod: &str, container: &str) {
        self.fail
            .insert((namespace.to_string(), pod.to_string(), container.to_string()));
    }
}

#[async_trait]
impl MetricsProvider for MockProvider {
    async fn fetch(&self, namespace: &str, pod: &str, container: &str) -> Result<Usage> {
        let id = (namespace.to_string(), pod.to_string(), container.to_string());
        if self.fail.remove(&id).is_some() {
            return Err(Error::Transient(format!(
                "mock provider: connection refused for {namespace}/{pod}/{container}"
            )));
        }
        self.fixed
            .get(&id)
            .map(|u| *u)
            .ok_or_else(|| Error::NotFound(format!("no usage set for {namespace}/{pod}/{container}")))
    }
}

/// Talks to a Kubernetes `metrics.k8s.io` `PodMetrics` endpoint via [`kube`].
pub struct MetricsServerProvider {
    client: kube::Client,
}

impl MetricsServerProvider {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetricsProvider for MetricsServerProvider {
    async fn fetch(&self, namespace: &str, pod: &str, container: &str) -> Result<Usage> {
        let path = format!("/apis/metrics.k8s.io/v1beta1/namespaces/{namespace}/pods/{pod}");
        let request = http::Request::get(path)
            .body(Vec::new())
            .map_err(|e| Error::Transient(e.to_string()))?;
        let response: serde_json::Value = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::Transient(format!("metrics-server request failed: {e}")))?;

        let containers = response["containers"]
            .as_array()
            .ok_or_else(|| Error::Transient("metrics-server response missing containers".into()))?;
        let entry = containers
            .iter()
            .find(|c| c["name"].as_str() == Some(container))
            .ok_or_else(|| Error::NotFound(format!("container {container} not in metrics response")))?;

        let cpu = entry["usage"]["cpu"]
            .as_str()
            .map(crate::quantity::parse_cpu_millicores)
            .unwrap_or(0);
        let mem = entry["usage"]["memory"]
            .as_str()
            .map(crate::quantity::parse_memory_bytes)
            .unwrap_or(0);

        Ok(Usage {
            cpu_milli: cpu as f64,
            mem_mb: mem as f64 / (1024.0 * 1024.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_returns_set_usage() {
        let p = MockProvider::new();
        p.set("ns", "pod", "app", Usage { cpu_milli: 100.0, mem_mb: 256.0 });
        let usage = p.fetch("ns", "pod", "app").await.unwrap();
        assert_eq!(usage.cpu_milli, 100.0);
    }

    #[tokio::test]
    async fn mock_provider_missing_is_not_found() {
        let p = MockProvider::new();
        let err = p.fetch("ns", "pod", "app").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn mock_provider_fail_next_is_transient_and_one_shot() {
        let p = MockProvider::new();
        p.set("ns", "pod", "app", Usage { cpu_milli: 1.0, mem_mb: 1.0 });
        p.fail_next("ns", "pod", "app");
        let err = p.fetch("ns", "pod", "app").await.unwrap_err();
        assert!(err.is_retryable());
        let ok = p.fetch("ns", "pod", "app").await;
        assert!(ok.is_ok());
    }
}
