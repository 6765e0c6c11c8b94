//! Cluster-resident control-plane engine that right-sizes container CPU and
//! memory allocations: it observes live usage, predicts near-future
//! demand, decides new allocations subject to policy, and applies them
//! through a cluster's in-place resize interface.
//!
//! This crate is the engine only. Scheduling, packaging, dashboard/gRPC
//! exposition, and narrative generation are external collaborators that
//! consume the types and traits exposed here.

pub mod admission;
pub mod anomaly;
pub mod applier;
pub mod audit;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod model;
pub mod narrative;
pub mod policy;
pub mod predict;
pub mod provider;
pub mod quantity;
pub mod reconciler;
pub mod resilience;
pub mod sampler;
pub mod store;
pub mod whatif;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use admission::{AdmissionConfig, AdmissionMutator};
use anomaly::AlertManager;
use applier::{Applier, ApplierConfig, Cluster};
use clock::Clock;
use config::ConfigHandle;
use decision::{DecisionConfig, DecisionEngine, DecisionInputs};
use error::Result;
use model::{Alert, PodDescriptor, Prediction, RecommendOutcome, Resource, SeriesKey};
use policy::PolicyEvaluator;
use predict::{Observation, PredictionEngine};
use provider::MetricsProvider;
use reconciler::{Reconciler, ReconcilerConfig};
use sampler::Sampler;
use store::MetricStore;
use whatif::{evaluate_batch, ScenarioResult};

/// The engine facade: owns every component and exposes the external
/// interface from the data-flow design as inherent methods. This crate has
/// no network surface of its own — a host process (CLI, operator,
/// dashboard backend) embeds `RightSizer` and drives it.
pub struct RightSizer {
    pub store: Arc<MetricStore>,
    pub sampler: Arc<Sampler>,
    pub predictions: Arc<PredictionEngine>,
    pub policy: Arc<PolicyEvaluator>,
    pub decision: Arc<DecisionEngine>,
    pub alerts: Arc<AlertManager>,
    pub applier: Arc<Applier>,
    pub admission: Arc<AdmissionMutator>,
    pub audit: Arc<audit::AuditBus>,
    pub reconciler: Arc<Reconciler>,
    pub config: Arc<ConfigHandle>,
    pub clock: Arc<dyn Clock>,
}

impl RightSizer {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        provider: Arc<dyn MetricsProvider>,
        clock: Arc<dyn Clock>,
        config: ConfigHandle,
    ) -> Self {
        let settings = config.snapshot();
        let store = Arc::new(MetricStore::new(store::StoreLimits {
            max_samples_per_series: settings.max_samples_per_series,
            retention: chrono::Duration::days(settings.history_retention_days as i64),
        }));
        let audit = Arc::new(audit::AuditBus::default());

        let decision_config = DecisionConfig {
            cpu: decision::ResourceLimits {
                request_multiplier: settings.cpu.request_multiplier,
                request_addition: 0.0,
                limit_multiplier: settings.cpu.limit_multiplier,
                limit_addition: 0.0,
                min_request: settings.cpu.min_request_millicores,
                max_limit: settings.cpu.max_limit_millicores,
            },
            memory: decision::ResourceLimits {
                request_multiplier: settings.memory.request_multiplier,
                request_addition: 0.0,
                limit_multiplier: settings.memory.limit_multiplier,
                limit_addition: 0.0,
                min_request: settings.memory.min_request_bytes,
                max_limit: settings.memory.max_limit_bytes,
            },
            min_change_threshold: settings.min_change_threshold,
            max_change_percentage: settings.max_change_percentage,
            cooldown_period: chrono::Duration::seconds(settings.cooldown_period_secs),
            preserve_guaranteed_qos: settings.preserve_guaranteed_qos,
        };

        let applier_config = ApplierConfig {
            update_resize_policy: settings.update_resize_policy,
            max_concurrent_resizes: settings.max_concurrent_resizes,
            max_restarts_per_hour: settings.max_restarts_per_hour,
            dry_run: settings.dry_run,
        };

        let predictions = Arc::new(PredictionEngine::default());
        let policy = Arc::new(PolicyEvaluator::new());
        let decision = Arc::new(DecisionEngine::new(decision_config));
        let applier = Arc::new(Applier::new(cluster.clone(), audit.clone(), clock.clone(), applier_config));
        let alerts = Arc::new(AlertManager::new(chrono::Duration::hours(24)));

        let reconciler = Arc::new(Reconciler::new(
            cluster,
            store.clone(),
            policy.clone(),
            predictions.clone(),
            decision.clone(),
            applier.clone(),
            alerts.clone(),
            audit.clone(),
            clock.clone(),
            ReconcilerConfig {
                max_concurrent_reconciles: settings.max_concurrent_reconciles,
            },
        ));

        Self {
            sampler: Arc::new(Sampler::new(store.clone(), provider, clock.clone())),
            predictions,
            policy,
            decision,
            alerts,
            applier,
            admission: Arc::new(AdmissionMutator::new(AdmissionConfig {
                update_resize_policy: settings.update_resize_policy,
                min_cpu_request: settings.cpu.min_request_millicores,
                max_cpu_limit: settings.cpu.max_limit_millicores,
                min_mem_request: settings.memory.min_request_bytes,
                max_mem_limit: settings.memory.max_limit_bytes,
            })),
            store,
            audit,
            reconciler,
            config: Arc::new(config),
            clock,
        }
    }

    /// Runs one reconciliation pass over the cluster (§4.12). A host process
    /// drives this on a `resize_interval` ticker; the engine itself owns no
    /// scheduling loop.
    pub async fn reconcile_once(&self) -> Vec<(SeriesKey, RecommendOutcome)> {
        self.reconciler.run_once().await
    }

    /// `Recommend(pod) -> Recommendation | NoChange(reason)`.
    pub fn recommend(&self, pod: &PodDescriptor, container_name: &str) -> RecommendOutcome {
        let now = self.clock.now();
        let key = SeriesKey::new(&pod.namespace, &pod.name, container_name);
        let policy_result = self.policy.evaluate(pod, container_name, now);
        if policy_result.skip {
            return RecommendOutcome::NoChange {
                reason: "policy rule skip".into(),
            };
        }

        let Some(container) = pod.container(container_name) else {
            return RecommendOutcome::NoChange {
                reason: "container not found".into(),
            };
        };

        let window = self.store.query(&key, chrono::Duration::minutes(5), now);
        let window_p95 = self
            .store
            .percentile(&key, chrono::Duration::minutes(5), 0.95, now)
            .unwrap_or((0.0, 0.0));

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

    /// `Apply(pod, Recommendation) -> Outcome`.
    pub async fn apply(&self, pod: &PodDescriptor, container_name: &str, recommendation: &model::Recommendation) -> Result<applier::Outcome> {
        self.applier.apply(pod, container_name, recommendation).await
    }

    /// `Predict(request) -> Prediction[]`.
    pub fn predict(&self, history: &[Observation], horizons: &[chrono::Duration], now: DateTime<Utc>) -> Vec<Prediction> {
        self.predictions.predict_all(history, horizons, now)
    }

    /// `BestPrediction(K, resource, horizon) -> Prediction | error`.
    pub fn best_prediction(&self, key: &SeriesKey, resource: Resource, horizon: chrono::Duration, now: DateTime<Utc>) -> Result<Prediction> {
        let points = self.store.all_points(key);
        let history: Vec<Observation> = points
            .iter()
            .map(|dp| Observation {
                timestamp: dp.timestamp,
                value: match resource {
                    Resource::Cpu => dp.cpu_milli,
                    Resource::Memory => dp.mem_mb,
                },
            })
            .collect();
        self.predictions.best(&history, horizon, now)
    }

    /// `WhatIf(K, resource, current, proposed[]) -> ScenarioResult[]`.
    pub fn what_if(&self, key: &SeriesKey, resource: Resource, current: f64, proposed: &[f64], unit_cost_per_hour: f64, now: DateTime<Utc>) -> Vec<ScenarioResult> {
        let stats = self.store.query(key, chrono::Duration::days(7), now);
        let (p95, observed_max, samples) = match (stats, self.store.percentile(key, chrono::Duration::days(7), 0.95, now)) {
            (Some(s), Some((cpu_p95, mem_p95))) => {
                let (p95, max) = match resource {
                    Resource::Cpu => (cpu_p95, s.cpu_max),
                    Resource::Memory => (mem_p95, s.mem_max),
                };
                (p95, max, s.count)
            }
            _ => (current, current, 0),
        };
        evaluate_batch(current, proposed, p95, observed_max, samples, unit_cost_per_hour)
    }

    /// `Alerts.list(ns?) -> Alert[]`.
    pub fn list_alerts(&self, namespace: Option<&str>) -> Vec<Alert> {
        self.alerts.list(namespace)
    }

    /// `Alerts.resolve(id)`.
    pub fn resolve_alert(&self, id: uuid::Uuid) -> bool {
        self.alerts.resolve(id, self.clock.now())
    }

    /// `AuditBus.subscribe(filter, callback)`: the filter lives in the
    /// callback itself here, since [`audit::AuditBus`] delivers every event
    /// to every subscriber's mailbox and lets the reader filter.
    pub fn subscribe_audit(&self) -> (tokio::sync::mpsc::Receiver<model::AuditEvent>, Arc<std::sync::atomic::AtomicU64>) {
        self.audit.subscribe()
    }
}
