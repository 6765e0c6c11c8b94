//! C10: the two-step in-place resize protocol (resize-policy patch -> CPU
//! -> memory), QoS preservation, rate limiting, and audit emission.

mod cluster;

pub use cluster::{Cluster, KubeCluster, MockCluster, PodFilter, ResizePatch};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};
use tokio::sync::Semaphore;

use crate::audit::AuditBus;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{AuditEvent, PodDescriptor, Recommendation, Resource, ResizePolicy, SeriesKey};
use crate::resilience::{call_with_resilience, CircuitBreaker, CircuitBreakerConfig, RetryConfig};

const INTER_STEP_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct ApplierConfig {
    pub update_resize_policy: bool,
    pub max_concurrent_resizes: usize,
    pub max_restarts_per_hour: u32,
    pub dry_run: bool,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            update_resize_policy: false,
            max_concurrent_resizes: 10,
            max_restarts_per_hour: 5,
            dry_run: false,
        }
    }
}

/// Result of applying one recommendation to one pod container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub cpu_applied: bool,
    pub mem_applied: bool,
    pub skipped_reason: Option<&'static str>,
}

impl Outcome {
    fn skipped(reason: &'static str) -> Self {
        Self {
            cpu_applied: false,
            mem_applied: false,
            skipped_reason: Some(reason),
        }
    }
}

/// Tracks per-pod restart counts in a sliding hour for the restart-rate
/// limit; a restart is counted whenever a resize-policy patch is applied
/// (step 0), since on most platforms that step can itself trigger one.
#[derive(Default)]
struct RestartTracker {
    recent: DashMap<(String, String), Vec<chrono::DateTime<chrono::Utc>>>,
}

impl RestartTracker {
    fn count_recent(&self, namespace: &str, pod: &str, now: chrono::DateTime<chrono::Utc>) -> usize {
        self.recent
            .get(&(namespace.to_string(), pod.to_string()))
            .map(|v| v.iter().filter(|t| now - **t < chrono::Duration::hours(1)).count())
            .unwrap_or(0)
    }

    fn record(&self, namespace: &str, pod: &str, now: chrono::DateTime<chrono::Utc>) {
        let mut entry = self.recent.entry((namespace.to_string(), pod.to_string())).or_default();
        entry.push(now);
        entry.retain(|t| now - *t < chrono::Duration::hours(1));
    }
}

pub struct Applier {
    cluster: Arc<dyn Cluster>,
    audit: Arc<AuditBus>,
    clock: Arc<dyn Clock>,
    config: ApplierConfig,
    retry_config: RetryConfig,
    breaker: CircuitBreaker,
    semaphore: Semaphore,
    restarts: RestartTracker,
}

impl Applier {
    pub fn new(cluster: Arc<dyn Cluster>, audit: Arc<AuditBus>, clock: Arc<dyn Clock>, config: ApplierConfig) -> Self {
        let semaphore = Semaphore::new(config.max_concurrent_resizes);
        let breaker = CircuitBreaker::new("cluster-patch", CircuitBreakerConfig::default(), clock.clone());
        Self {
            cluster,
            audit,
            clock,
            config,
            retry_config: RetryConfig::default(),
            breaker,
            semaphore,
            restarts: RestartTracker::default(),
        }
    }

    /// Applies `recommendation` to `pod`/`container` via the two-step
    /// protocol. Acquires a global concurrency permit for the duration of
    /// the whole pipeline (both steps), per the "max concurrent resizes
    /// clamps applier parallelism" resource policy.
    pub async fn apply(&self, pod: &PodDescriptor, container: &str, recommendation: &Recommendation) -> Result<Outcome> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Transient("applier semaphore closed".into()))?;

        if !self.cluster.supports_in_place_resize().await? {
            return Ok(Outcome::skipped("unsupported_platform"));
        }

        let now = self.clock.now();
        if self.restarts.count_recent(&pod.namespace, &pod.name, now) >= self.config.max_restarts_per_hour as usize {
            return Ok(Outcome::skipped("restart_rate_limited"));
        }

        if self.config.dry_run {
            info!("dry-run: would resize {}/{}/{}", pod.namespace, pod.name, container);
            return Ok(Outcome {
                cpu_applied: true,
                mem_applied: true,
                skipped_reason: Some("dry_run"),
            });
        }

        let key = SeriesKey::new(&pod.namespace, &pod.name, container);
        let correlation_id = uuid::Uuid::new_v4();

        self.step0_resize_policy(pod, container).await?;

        let cpu_applied = self
            .step1_cpu(&key, pod, container, recommendation, correlation_id)
            .await?;

        let mem_applied = if cpu_applied {
            self.step2_memory(&key, pod, container, recommendation, correlation_id).await?
        } else {
            false
        };

        if self.config.update_resize_policy {
            self.restarts.record(&pod.namespace, &pod.name, now);
        }

        Ok(Outcome {
            cpu_applied,
            mem_applied,
            skipped_reason: None,
        })
    }

    /// Idempotent: skips containers whose resize policy already matches.
    async fn step0_resize_policy(&self, pod: &PodDescriptor, container: &str) -> Result<()> {
        if !self.config.update_resize_policy {
            return Ok(());
        }
        let Some(c) = pod.container(container) else {
            return Err(Error::NotFound(format!("container {container} not found on pod")));
        };
        let target = ResizePolicy::not_required();
        if c.resize_policy.matches(&target) {
            return Ok(());
        }

        let namespace = pod.namespace.clone();
        let name = pod.name.clone();
        let container = container.to_string();
        call_with_resilience(&self.breaker, &self.retry_config, || {
            let namespace = namespace.clone();
            let name = name.clone();
            let container = container.clone();
            async move { self.cluster.patch_resize_policy(&namespace, &name, &container, target).await }
        })
        .await?;
        Ok(())
    }

    async fn step1_cpu(
        &self,
        key: &SeriesKey,
        pod: &PodDescriptor,
        container: &str,
        recommendation: &Recommendation,
        correlation_id: uuid::Uuid,
    ) -> Result<bool> {
        self.audit.publish(AuditEvent::ResizeAttempt {
            correlation_id,
            sequence: self.audit.next_sequence(),
            key: key.clone(),
            resource: Resource::Cpu,
            requested_value: recommendation.cpu_request,
            at: self.clock.now(),
        });

        let namespace = pod.namespace.clone();
        let name = pod.name.clone();
        let container_name = container.to_string();
        let patch = ResizePatch {
            resource: Resource::Cpu,
            request: recommendation.cpu_request,
            limit: recommendation.cpu_limit,
        };

        let result = call_with_resilience(&self.breaker, &self.retry_config, || {
            let namespace = namespace.clone();
            let name = name.clone();
            let container_name = container_name.clone();
            async move { self.cluster.patch_pod_resize(&namespace, &name, &container_name, patch).await }
        })
        .await;

        match result {
            Ok(_) => {
                self.audit.publish(AuditEvent::ResourceChange {
                    correlation_id,
                    sequence: self.audit.next_sequence(),
                    key: key.clone(),
                    resource: Resource::Cpu,
                    old_value: pod.container(container).and_then(|c| c.resources.cpu_request).unwrap_or(0),
                    new_value: recommendation.cpu_request,
                    at: self.clock.now(),
                });
                Ok(true)
            }
            Err(err) if matches!(err, Error::Forbidden(_) | Error::NotFound(_) | Error::Validation(_)) => {
                self.audit.publish(AuditEvent::ResizeFailure {
                    correlation_id,
                    sequence: self.audit.next_sequence(),
                    key: key.clone(),
                    resource: Resource::Cpu,
                    reason: err.to_string(),
                    at: self.clock.now(),
                });
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Only called once Step 1 has committed. A small settle delay runs
    /// before re-reading pod state; a rejected memory decrease downgrades
    /// to a CPU-only outcome rather than failing the whole apply.
    async fn step2_memory(
        &self,
        key: &SeriesKey,
        pod: &PodDescriptor,
        container: &str,
        recommendation: &Recommendation,
        correlation_id: uuid::Uuid,
    ) -> Result<bool> {
        tokio::time::sleep(INTER_STEP_DELAY).await;

        let observed = self.cluster.get_pod(&pod.namespace, &pod.name).await?;
        let cpu_committed = observed
            .container(container)
            .and_then(|c| c.resources.cpu_request)
            .is_some_and(|v| v == recommendation.cpu_request);
        if !cpu_committed {
            warn!("step 2 aborted: CPU change for {key} was not observed after step 1");
            return Ok(false);
        }

        self.audit.publish(AuditEvent::ResizeAttempt {
            correlation_id,
            sequence: self.audit.next_sequence(),
            key: key.clone(),
            resource: Resource::Memory,
            requested_value: recommendation.mem_request,
            at: self.clock.now(),
        });

        let namespace = pod.namespace.clone();
        let name = pod.name.clone();
        let container_name = container.to_string();
        let patch = ResizePatch {
            resource: Resource::Memory,
            request: recommendation.mem_request,
            limit: recommendation.mem_limit,
        };

        let result = call_with_resilience(&self.breaker, &self.retry_config, || {
            let namespace = namespace.clone();
            let name = name.clone();
            let container_name = container_name.clone();
            async move { self.cluster.patch_pod_resize(&namespace, &name, &container_name, patch).await }
        })
        .await;

        match result {
            Ok(_) => {
                self.audit.publish(AuditEvent::ResourceChange {
                    correlation_id,
                    sequence: self.audit.next_sequence(),
                    key: key.clone(),
                    resource: Resource::Memory,
                    old_value: pod.container(container).and_then(|c| c.resources.mem_request).unwrap_or(0),
                    new_value: recommendation.mem_request,
                    at: self.clock.now(),
                });
                Ok(true)
            }
            Err(err) if cluster::is_memory_decrease_conflict(&err.to_string()) => {
                self.audit.publish(AuditEvent::ResizeFailure {
                    correlation_id,
                    sequence: self.audit.next_sequence(),
                    key: key.clone(),
                    resource: Resource::Memory,
                    reason: format!("memory_decrease_unsupported: {err}"),
                    at: self.clock.now(),
                });
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{ContainerDescriptor, ResourceRequirements};

    fn pod() -> PodDescriptor {
        PodDescriptor {
            namespace: "default".into(),
            name: "web-0".into(),
            labels: Default::default(),
            annotations: Default::default(),
            containers: vec![ContainerDescriptor {
                name: "app".into(),
                resources: ResourceRequirements {
                    cpu_request: Some(100),
                    cpu_limit: Some(200),
                    mem_request: Some(256 * 1024 * 1024),
                    mem_limit: Some(512 * 1024 * 1024),
                },
                resize_policy: ResizePolicy::default(),
            }],
        }
    }

    fn setup() -> (Applier, Arc<MockCluster>) {
        let cluster = MockCluster::new();
        cluster.insert_pod(pod());
        let audit = Arc::new(AuditBus::default());
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let applier = Applier::new(cluster.clone(), audit, clock, ApplierConfig::default());
        (applier, cluster)
    }

    #[tokio::test]
    async fn scale_up_cpu_and_memory_succeeds() {
        let (applier, _cluster) = setup();
        let rec = Recommendation::new(300, 600, 400 * 1024 * 1024, 800 * 1024 * 1024, "up".into(), 0.9, vec![]);
        let outcome = applier.apply(&pod(), "app", &rec).await.unwrap();
        assert!(outcome.cpu_applied);
        assert!(outcome.mem_applied);
    }

    #[tokio::test]
    async fn memory_decrease_rejection_yields_cpu_only_outcome() {
        let (applier, cluster) = setup();
        cluster.reject_memory_decreases(true);
        let rec = Recommendation::new(300, 600, 100 * 1024 * 1024, 200 * 1024 * 1024, "down".into(), 0.9, vec![]);
        let outcome = applier.apply(&pod(), "app", &rec).await.unwrap();
        assert!(outcome.cpu_applied);
        assert!(!outcome.mem_applied);
    }

    #[tokio::test]
    async fn unsupported_platform_skips_without_error() {
        let (applier, cluster) = setup();
        cluster.set_supports_resize(false);
        let rec = Recommendation::new(300, 600, 400 * 1024 * 1024, 800 * 1024 * 1024, "up".into(), 0.9, vec![]);
        let outcome = applier.apply(&pod(), "app", &rec).await.unwrap();
        assert_eq!(outcome.skipped_reason, Some("unsupported_platform"));
    }

    #[tokio::test]
    async fn dry_run_never_touches_cluster() {
        let cluster = MockCluster::new();
        cluster.insert_pod(pod());
        let audit = Arc::new(AuditBus::default());
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let config = ApplierConfig {
            dry_run: true,
            ..Default::default()
        };
        let applier = Applier::new(cluster.clone(), audit, clock, config);
        let rec = Recommendation::new(300, 600, 400 * 1024 * 1024, 800 * 1024 * 1024, "up".into(), 0.9, vec![]);
        applier.apply(&pod(), "app", &rec).await.unwrap();
        let observed = cluster.get_pod("default", "web-0").await.unwrap();
        assert_eq!(observed.container("app").unwrap().resources.cpu_request, Some(100));
    }
}
