use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kubernetes QoS class, derived from request/limit equality across all
/// containers (see `PodDescriptor::qos_class`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

/// A single container's resource requests/limits, in engine-native units.
/// `None` means the field was unset on the pod spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cpu_request: Option<u64>,
    pub cpu_limit: Option<u64>,
    pub mem_request: Option<u64>,
    pub mem_limit: Option<u64>,
}

/// A container's resize-policy directive, per resource: `NotRequired` means
/// no restart is needed to apply a change; this engine only ever *sets*
/// `NotRequired`, never reads the alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RestartPolicy {
    NotRequired,
    RestartContainer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResizePolicy {
    pub cpu: Option<RestartPolicy>,
    pub memory: Option<RestartPolicy>,
}

impl ResizePolicy {
    pub fn not_required() -> Self {
        Self {
            cpu: Some(RestartPolicy::NotRequired),
            memory: Some(RestartPolicy::NotRequired),
        }
    }

    pub fn matches(&self, other: &ResizePolicy) -> bool {
        self.cpu == other.cpu && self.memory == other.memory
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    pub name: String,
    pub resources: ResourceRequirements,
    pub resize_policy: ResizePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodDescriptor {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<ContainerDescriptor>,
}

impl PodDescriptor {
    pub fn container(&self, name: &str) -> Option<&ContainerDescriptor> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Guaranteed iff every container has request == limit for both cpu and
    /// memory, and both are set. Burstable iff at least one resource has any
    /// request or limit set. BestEffort otherwise.
    pub fn qos_class(&self) -> QosClass {
        if self.containers.is_empty() {
            return QosClass::BestEffort;
        }

        let guaranteed = self.containers.iter().all(|c| {
            let r = &c.resources;
            matches!((r.cpu_request, r.cpu_limit), (Some(req), Some(lim)) if req == lim)
                && matches!((r.mem_request, r.mem_limit), (Some(req), Some(lim)) if req == lim)
        });
        if guaranteed {
            return QosClass::Guaranteed;
        }

        let any_set = self.containers.iter().any(|c| {
            let r = &c.resources;
            r.cpu_request.is_some()
                || r.cpu_limit.is_some()
                || r.mem_request.is_some()
                || r.mem_limit.is_some()
        });
        if any_set {
            QosClass::Burstable
        } else {
            QosClass::BestEffort
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(cpu_req: Option<u64>, cpu_lim: Option<u64>, mem_req: Option<u64>, mem_lim: Option<u64>) -> ContainerDescriptor {
        ContainerDescriptor {
            name: "app".into(),
            resources: ResourceRequirements {
                cpu_request: cpu_req,
                cpu_limit: cpu_lim,
                mem_request: mem_req,
                mem_limit: mem_lim,
            },
            resize_policy: ResizePolicy::default(),
        }
    }

    #[test]
    fn guaranteed_when_requests_equal_limits() {
        let pod = PodDescriptor {
            namespace: "ns".into(),
            name: "p".into(),
            labels: Default::default(),
            annotations: Default::default(),
            containers: vec![container(Some(100), Some(100), Some(200), Some(200))],
        };
        assert_eq!(pod.qos_class(), QosClass::Guaranteed);
    }

    #[test]
    fn burstable_when_partially_set() {
        let pod = PodDescriptor {
            namespace: "ns".into(),
            name: "p".into(),
            labels: Default::default(),
            annotations: Default::default(),
            containers: vec![container(Some(100), Some(200), None, None)],
        };
        assert_eq!(pod.qos_class(), QosClass::Burstable);
    }

    #[test]
    fn best_effort_when_nothing_set() {
        let pod = PodDescriptor {
            namespace: "ns".into(),
            name: "p".into(),
            labels: Default::default(),
            annotations: Default::default(),
            containers: vec![container(None, None, None, None)],
        };
        assert_eq!(pod.qos_class(), QosClass::BestEffort);
    }
}
