//! C11: admission-time pod mutation — default resource injection and
//! resize-policy injection, run out-of-band from the reconciler loop.

use crate::error::{Error, Result};
use crate::model::{PodDescriptor, ResizePolicy};

const DEFAULT_CPU_REQUEST_MILLI: u64 = 10;
const DEFAULT_MEM_REQUEST_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
    pub update_resize_policy: bool,
    pub min_cpu_request: u64,
    pub max_cpu_limit: u64,
    pub min_mem_request: u64,
    pub max_mem_limit: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            update_resize_policy: false,
            min_cpu_request: DEFAULT_CPU_REQUEST_MILLI,
            max_cpu_limit: 4000,
            min_mem_request: DEFAULT_MEM_REQUEST_BYTES,
            max_mem_limit: 8192 * 1024 * 1024,
        }
    }
}

pub struct AdmissionMutator {
    config: AdmissionConfig,
}

impl AdmissionMutator {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    /// Patches missing container requests to defaults, optionally injects
    /// `NotRequired` resize policy, then validates the result against
    /// global min/max constraints. Idempotent: a pod already carrying
    /// defaults and the target resize policy is returned unchanged.
    pub fn mutate(&self, mut pod: PodDescriptor) -> Result<PodDescriptor> {
        for container in &mut pod.containers {
            if container.resources.cpu_request.is_none() {
                container.resources.cpu_request = Some(DEFAULT_CPU_REQUEST_MILLI);
            }
            if container.resources.mem_request.is_none() {
                container.resources.mem_request = Some(DEFAULT_MEM_REQUEST_BYTES);
            }
            if self.config.update_resize_policy {
                container.resize_policy = ResizePolicy::not_required();
            }
        }

        self.validate(&pod)?;
        Ok(pod)
    }

    fn validate(&self, pod: &PodDescriptor) -> Result<()> {
        for container in &pod.containers {
            let r = &container.resources;
            if let Some(req) = r.cpu_request {
                if req < self.config.min_cpu_request {
                    return Err(Error::Validation(format!(
                        "container {}: cpu request {req}m below minimum {}m",
                        container.name, self.config.min_cpu_request
                    )));
                }
            }
            if let Some(limit) = r.cpu_limit {
                if limit > self.config.max_cpu_limit {
                    return Err(Error::Validation(format!(
                        "container {}: cpu limit {limit}m exceeds maximum {}m",
                        container.name, self.config.max_cpu_limit
                    )));
                }
            }
            if let Some(req) = r.mem_request {
                if req < self.config.min_mem_request {
                    return Err(Error::Validation(format!(
                        "container {}: memory request {req} below minimum {}",
                        container.name, self.config.min_mem_request
                    )));
                }
            }
            if let Some(limit) = r.mem_limit {
                if limit > self.config.max_mem_limit {
                    return Err(Error::Validation(format!(
                        "container {}: memory limit {limit} exceeds maximum {}",
                        container.name, self.config.max_mem_limit
                    )));
                }
            }
        }
        Ok(())
    }
}
