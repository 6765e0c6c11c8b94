//! End-to-end scenarios over the `RightSizer` facade with mock cluster and
//! provider implementations, covering the pipeline from stored usage
//! through to an applied resize.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rightsizer_core::applier::{Cluster, MockCluster};
use rightsizer_core::clock::FixedClock;
use rightsizer_core::config::{ConfigHandle, Settings};
use rightsizer_core::model::{ContainerDescriptor, DataPoint, PodDescriptor, QosClass, RecommendOutcome, ResizePolicy, ResourceRequirements, SeriesKey};
use rightsizer_core::provider::MockProvider;
use rightsizer_core::RightSizer;

fn burstable_pod() -> PodDescriptor {
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

fn guaranteed_pod() -> PodDescriptor {
    PodDescriptor {
        namespace: "default".into(),
        name: "db-0".into(),
        labels: Default::default(),
        annotations: Default::default(),
        containers: vec![ContainerDescriptor {
            name: "app".into(),
            resources: ResourceRequirements {
                cpu_request: Some(100),
                cpu_limit: Some(100),
                mem_request: Some(256 * 1024 * 1024),
                mem_limit: Some(256 * 1024 * 1024),
            },
            resize_policy: ResizePolicy::default(),
        }],
    }
}

fn seed_history(rs: &RightSizer, key: &SeriesKey, start: chrono::DateTime<Utc>, n: i64, cpu: impl Fn(i64) -> f64) {
    for i in 0..n {
        let t = start + Duration::minutes(i);
        rs.store.record(key, DataPoint::new(t, cpu(i), 200.0), t);
    }
}

#[tokio::test]
async fn scale_up_cpu_recommendation_applies_successfully() {
    let cluster = MockCluster::new();
    cluster.insert_pod(burstable_pod());
    let provider = Arc::new(MockProvider::new());
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let rs = RightSizer::new(cluster.clone(), provider, clock, ConfigHandle::new(Settings::default()));

    let pod = burstable_pod();
    let key = SeriesKey::new(&pod.namespace, &pod.name, "app");
    seed_history(&rs, &key, now - Duration::minutes(10), 10, |_| 900.0);

    let outcome = rs.recommend(&pod, "app");
    let RecommendOutcome::Recommend(rec) = outcome else {
        panic!("expected a scale-up recommendation, got {outcome:?}");
    };
    assert!(rec.cpu_request > 100);

    let result = rs.apply(&pod, "app", &rec).await.unwrap();
    assert!(result.cpu_applied);
}

#[tokio::test]
async fn memory_decrease_refusal_downgrades_to_cpu_only() {
    let cluster = MockCluster::new();
    cluster.insert_pod(burstable_pod());
    cluster.reject_memory_decreases(true);
    let provider = Arc::new(MockProvider::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let rs = RightSizer::new(cluster.clone(), provider, clock, ConfigHandle::new(Settings::default()));

    let pod = burstable_pod();
    let rec = rightsizer_core::model::Recommendation::new(
        300,
        600,
        100 * 1024 * 1024,
        200 * 1024 * 1024,
        "scale down memory".into(),
        0.8,
        vec![],
    );

    let outcome = rs.apply(&pod, "app", &rec).await.unwrap();
    assert!(outcome.cpu_applied);
    assert!(!outcome.mem_applied);
}

#[tokio::test]
async fn guaranteed_qos_is_preserved_through_recommend() {
    let cluster = MockCluster::new();
    cluster.insert_pod(guaranteed_pod());
    let provider = Arc::new(MockProvider::new());
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let rs = RightSizer::new(cluster.clone(), provider, clock, ConfigHandle::new(Settings::default()));

    let pod = guaranteed_pod();
    assert_eq!(pod.qos_class(), QosClass::Guaranteed);
    let key = SeriesKey::new(&pod.namespace, &pod.name, "app");
    seed_history(&rs, &key, now - Duration::minutes(10), 10, |_| 900.0);

    let outcome = rs.recommend(&pod, "app");
    if let RecommendOutcome::Recommend(rec) = outcome {
        assert_eq!(rec.cpu_request, rec.cpu_limit);
        assert_eq!(rec.mem_request, rec.mem_limit);
    }
}

#[tokio::test]
async fn anomaly_alert_raised_on_large_deviation() {
    let cluster = MockCluster::new();
    let provider = Arc::new(MockProvider::new());
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let rs = RightSizer::new(cluster, provider, clock, ConfigHandle::new(Settings::default()));

    let alert = rs.alerts.raise(
        "default",
        "web-0",
        rightsizer_core::model::Resource::Cpu,
        rightsizer_core::model::Severity::Critical,
        rightsizer_core::model::AlertSource::Anomaly,
        900.0,
        100.0,
        Some(5.2),
        now,
    );

    let alerts = rs.list_alerts(Some("default"));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, alert.id);
    assert!(rs.resolve_alert(alert.id));
    assert!(rs.list_alerts(None)[0].is_resolved());
}

#[tokio::test]
async fn best_prediction_over_a_week_of_history_selects_a_method() {
    let cluster = MockCluster::new();
    let provider = Arc::new(MockProvider::new());
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let rs = RightSizer::new(cluster, provider, clock, ConfigHandle::new(Settings::default()));

    let key = SeriesKey::new("default", "web-0", "app");
    // 7 days of hourly samples with a daily business-hours pattern.
    for day in 0..7 {
        for hour in 0..24 {
            let t = now - Duration::days(7) + Duration::days(day) + Duration::hours(hour);
            let cpu = if (9..17).contains(&hour) { 400.0 } else { 120.0 };
            rs.store.record(&key, DataPoint::new(t, cpu, 200.0), t);
        }
    }

    let prediction = rs
        .best_prediction(&key, rightsizer_core::model::Resource::Cpu, Duration::hours(1), now)
        .unwrap();
    assert!(prediction.ci_lower <= prediction.value && prediction.value <= prediction.ci_upper);
    assert!((0.0..=1.0).contains(&prediction.confidence));
}

#[tokio::test]
async fn what_if_scale_down_below_peak_is_flagged_high_risk() {
    let cluster = MockCluster::new();
    let provider = Arc::new(MockProvider::new());
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let rs = RightSizer::new(cluster, provider, clock, ConfigHandle::new(Settings::default()));

    let key = SeriesKey::new("default", "web-0", "app");
    for i in 0..200 {
        let t = now - Duration::minutes(i);
        let cpu = if i % 50 == 0 { 950.0 } else { 400.0 };
        rs.store.record(&key, DataPoint::new(t, cpu, 200.0), t);
    }

    let results = rs.what_if(&key, rightsizer_core::model::Resource::Cpu, 1000.0, &[400.0], 0.02, now);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].risk_level, rightsizer_core::whatif::RiskLevel::High);
}

#[tokio::test]
async fn reconcile_once_applies_scale_up_end_to_end() {
    let cluster = MockCluster::new();
    cluster.insert_pod(burstable_pod());
    let provider = Arc::new(MockProvider::new());
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let rs = RightSizer::new(cluster.clone(), provider, clock, ConfigHandle::new(Settings::default()));

    let pod = burstable_pod();
    let key = SeriesKey::new(&pod.namespace, &pod.name, "app");
    seed_history(&rs, &key, now - Duration::minutes(10), 10, |_| 900.0);

    let results = rs.reconcile_once().await;
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].1, RecommendOutcome::Recommend(_)));

    let updated = cluster.get_pod("default", "web-0").await.unwrap();
    let container = updated.container("app").unwrap();
    assert!(container.resources.cpu_request.unwrap() > 100);
}
