//! C14: the periodic loop that lists live pods, filters out system
//! namespaces and opted-out pods, then pipelines survivors through policy
//! evaluation, decision, and apply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use log::{info, warn};

use crate::anomaly::{self, AlertManager};
use crate::applier::{Applier, Cluster, PodFilter};
use crate::audit::AuditBus;
use crate::clock::Clock;
use crate::decision::{DecisionEngine, DecisionInputs};
use crate::model::{AlertSource, AuditEvent, PodDescriptor, RecommendOutcome, Resource, Severity, SeriesKey};
use crate::policy::PolicyEvaluator;
use crate::predict::{Observation, PredictionEngine};
use crate::store::MetricStore;

pub const DISABLE_ANNOTATION: &str = "rightsizer.io/disable";
const SYSTEM_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    pub max_concurrent_reconciles: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 3,
        }
    }
}

pub struct Reconciler {
    cluster: Arc<dyn Cluster>,
    store: Arc<MetricStore>,
    policy: Arc<PolicyEvaluator>,
    predictions: Arc<PredictionEngine>,
    decision: Arc<DecisionEngine>,
    applier: Arc<Applier>,
    alerts: Arc<AlertManager>,
    audit: Arc<AuditBus>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster: Arc<dyn Cluster>,
        store: Arc<MetricStore>,
        policy: Arc<PolicyEvaluator>,
        predictions: Arc<PredictionEngine>,
        decision: Arc<DecisionEngine>,
        applier: Arc<Applier>,
        alerts: Arc<AlertManager>,
        audit: Arc<AuditBus>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            cluster,
            store,
            policy,
            predictions,
            decision,
            applier,
            alerts,
            audit,
            clock,
            config,
        }
    }

    fn is_eligible(pod: &PodDescriptor) -> bool {
        if SYSTEM_NAMESPACES.contains(&pod.namespace.as_str()) {
            return false;
        }
        if pod.annotations.get(DISABLE_ANNOTATION).is_some_and(|v| v == "true") {
            return false;
        }
        if pod.labels.get(DISABLE_ANNOTATION).is_some_and(|v| v == "true") {
            return false;
        }
        true
    }

    /// One full pass: list, filter, then reconcile survivors with
    /// `max_concurrent_reconciles` parallelism. Each pod's own pipeline
    /// runs strictly sequentially.
    pub async fn run_once(&self) -> Vec<(SeriesKey, RecommendOutcome)> {
        let pods = match self.cluster.list_pods(&PodFilter::default()).await {
            Ok(pods) => pods,
            Err(err) => {
                warn!("reconciler: list_pods failed: {err}");
                return Vec::new();
            }
        };

        let eligible: Vec<PodDescriptor> = pods.into_iter().filter(Self::is_eligible).collect();
        info!("reconciler: {} eligible pods this pass", eligible.len());

        stream::iter(eligible)
            .map(|pod| self.reconcile_pod(pod))
            .buffer_unordered(self.config.max_concurrent_reconciles)
            .flat_map(stream::iter)
            .collect()
            .await
    }

    async fn reconcile_pod(&self, pod: PodDescriptor) -> Vec<(SeriesKey, RecommendOutcome)> {
        let now = self.clock.now();
        let mut results = Vec::with_capacity(pod.containers.len());

        for container in pod.containers.clone() {
            let key = SeriesKey::new(&pod.namespace, &pod.name, &container.name);
            self.scan_anomalies(&key, now);
            let policy_result = self.policy.evaluate(&pod, &container.name, now);

            if policy_result.skip {
                let outcome = RecommendOutcome::NoChange {
                    reason: "policy rule skip".into(),
                };
                results.push((key, outcome));
                continue;
            }

            let outcome = self.decide(&pod, &container.name, &policy_result, now);
            if let RecommendOutcome::Recommend(recommendation) = &outcome {
                if let Err(err) = self.applier.apply(&pod, &container.name, recommendation).await {
                    warn!("reconciler: apply failed for {key}: {err}");
                }
            }
            results.push((key, outcome));
        }

        results
    }

    /// C8/C9: reads the 1h baseline and 5m recent windows for `key`, runs
    /// Z-score detection on both resources, and raises/audits anything at or
    /// above [`Severity::Warning`].
    fn scan_anomalies(&self, key: &SeriesKey, now: DateTime<Utc>) {
        let Some(baseline) = self.store.query(key, chrono::Duration::hours(1), now) else {
            return;
        };
        let Some(recent) = self.store.query(key, chrono::Duration::minutes(5), now) else {
            return;
        };

        let candidates = [
            (Resource::Cpu, anomaly::detect_cpu(&baseline, &recent), recent.cpu_mean, baseline.cpu_mean),
            (Resource::Memory, anomaly::detect_memory(&baseline, &recent), recent.mem_mean, baseline.mem_mean),
        ];

        for (resource, score, metric_value, threshold) in candidates {
            let Some(score) = score else { continue };
            if score.severity < Severity::Warning {
                continue;
            }

            self.alerts.raise(
                &key.namespace,
                &key.pod,
                resource,
                score.severity,
                AlertSource::Anomaly,
                metric_value,
                threshold,
                Some(score.z_score),
                now,
            );
            self.audit.publish(AuditEvent::AnomalyRaised {
                correlation_id: uuid::Uuid::new_v4(),
                sequence: self.audit.next_sequence(),
                key: key.clone(),
                resource,
                severity: score.severity,
                z_score: score.z_score,
                at: now,
            });
        }
    }

    fn decide(
        &self,
        pod: &PodDescriptor,
        container_name: &str,
        policy_result: &crate::policy::PolicyResult,
        now: DateTime<Utc>,
    ) -> RecommendOutcome {
        let key = SeriesKey::new(&pod.namespace, &pod.name, container_name);
        let window = self.store.query(&key, chrono::Duration::minutes(5), now);
        // Baseline (1h) is part of the DecisionEngine's declared inputs
        // (spec.md §4.4) for context, though only p95/forecast/recent_max
        // feed the target formula itself.
        let _baseline = self.store.query(&key, chrono::Duration::hours(1), now);
        let window_p95 = self
            .store
            .percentile(&key, chrono::Duration::minutes(5), 0.95, now)
            .unwrap_or((0.0, 0.0));

        let Some(container) = pod.container(container_name) else {
            return RecommendOutcome::NoChange {
                reason: "container not found".into(),
            };
        };

        let history: Vec<Observation> = self
            .store
            .all_points(&key)
            .iter()
            .map(|dp| Observation {
                timestamp: dp.timestamp,
                value: dp.cpu_milli,
            })
            .collect();
        let forecast = self.predictions.best(&history, chrono::Duration::hours(1), now).ok();

        let inputs = DecisionInputs {
            current: container.resources,
            qos: pod.qos_class(),
            window_p95,
            recent_max: (
                window.map(|s| s.cpu_max).unwrap_or(0.0),
                window.map(|s| s.mem_max).unwrap_or(0.0),
            ),
            forecast: forecast.as_ref(),
            policy: &policy_result.actions,
            applied_rules: &policy_result.applied_rules,
        };

        self.decision.recommend(&key, &inputs, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::{ApplierConfig, MockCluster};
    use crate::clock::FixedClock;
    use crate::decision::DecisionConfig;
    use crate::model::{ContainerDescriptor, DataPoint, ResizePolicy, ResourceRequirements};
    use std::collections::BTreeMap;

    fn pod(namespace: &str, name: &str, annotations: BTreeMap<String, String>) -> PodDescriptor {
        PodDescriptor {
            namespace: namespace.into(),
            name: name.into(),
            labels: Default::default(),
            annotations,
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

    #[test]
    fn system_namespace_is_not_eligible() {
        assert!(!Reconciler::is_eligible(&pod("kube-system", "p", Default::default())));
    }

    #[test]
    fn disable_annotation_opts_out() {
        let mut annotations = BTreeMap::new();
        annotations.insert(DISABLE_ANNOTATION.to_string(), "true".to_string());
        assert!(!Reconciler::is_eligible(&pod("default", "p", annotations)));
    }

    #[test]
    fn ordinary_pod_is_eligible() {
        assert!(Reconciler::is_eligible(&pod("default", "p", Default::default())));
    }

    fn reconciler() -> (Reconciler, Arc<MockCluster>) {
        let cluster = MockCluster::new();
        let store = Arc::new(MetricStore::new(crate::store::StoreLimits::default()));
        let audit = Arc::new(AuditBus::default());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let applier = Arc::new(Applier::new(cluster.clone(), audit.clone(), clock.clone(), ApplierConfig::default()));
        let r = Reconciler::new(
            cluster.clone(),
            store,
            Arc::new(PolicyEvaluator::new()),
            Arc::new(PredictionEngine::default()),
            Arc::new(DecisionEngine::new(DecisionConfig::default())),
            applier,
            Arc::new(AlertManager::new(chrono::Duration::hours(24))),
            audit,
            clock,
            ReconcilerConfig::default(),
        );
        (r, cluster)
    }

    #[tokio::test]
    async fn run_once_skips_system_namespace_pods() {
        let (r, cluster) = reconciler();
        cluster.insert_pod(pod("kube-system", "p", Default::default()));
        let results = r.run_once().await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn run_once_recommends_scale_up_from_stored_usage() {
        let (r, cluster) = reconciler();
        cluster.insert_pod(pod("default", "web-0", Default::default()));

        let key = SeriesKey::new("default", "web-0", "app");
        let now = Utc::now();
        for i in 0..5 {
            let ts = now - chrono::Duration::seconds(30 * (5 - i));
            r.store.record(&key, DataPoint::new(ts, 900.0, 400.0), ts);
        }

        let results = r.run_once().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, RecommendOutcome::Recommend(_)));
    }
}
