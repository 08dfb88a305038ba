//! Request types and runtime configuration for control plane operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use fulcrum_core::{AgentId, ServiceGroupId, ServiceTypeId};

/// Request to create a new service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    /// Human-readable name for the service.
    pub name: String,
    /// The group this service belongs to.
    pub group_id: ServiceGroupId,
    /// The service's type, whose schema governs property validation.
    pub service_type_id: ServiceTypeId,
    /// The property bag to apply on create.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    /// Pin the service to a specific agent. Mutually exclusive with `tags`.
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    /// Select any connected, matching agent carrying all of these tags.
    /// Mutually exclusive with `agent_id`.
    #[serde(default)]
    pub agent_tags: Option<Vec<String>>,
}

/// Request to update a stable service's name and/or properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    /// New name, if changing.
    #[serde(default)]
    pub name: Option<String>,
    /// Property delta to merge into the current property bag.
    #[serde(default)]
    pub properties: Option<HashMap<String, serde_json::Value>>,
}

/// Body of a job completion report from an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    /// Opaque handle assigned by the agent, set on `create` completion.
    #[serde(default)]
    pub agent_instance_id: Option<String>,
    /// Opaque resources the agent reports.
    #[serde(default)]
    pub agent_instance_data: Option<serde_json::Value>,
    /// Property write-back; only agent-writable keys are accepted (§4.7).
    #[serde(default)]
    pub properties: Option<HashMap<String, serde_json::Value>>,
}

/// Body of a job failure report from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailJobRequest {
    /// Human-readable failure reason.
    pub error_message: String,
}

/// Runtime configuration for the control plane's business logic: job
/// timeouts, sweeper cadence, and journal batching. HTTP-facing
/// configuration (bind address, page sizes) lives in the gateway crate's
/// `GatewayConfig`.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// How long a job may stay `Processing` before the timeout sweeper
    /// fails it (§4.2).
    pub job_timeout_secs: u64,
    /// How long an agent may go without a heartbeat before the
    /// connectivity sweeper marks it `Disconnected` (§4.3).
    pub heartbeat_timeout_secs: u64,
    /// Interval between background sweeper ticks.
    pub sweep_interval_secs: u64,
    /// Maximum candidates a single sweeper iteration examines, so a large
    /// backlog doesn't hold one transaction-free pass open indefinitely.
    pub sweep_batch_size: usize,
    /// Default lease duration granted by `acquireLease` when the caller
    /// does not specify one.
    pub default_lease_duration_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 600,
            heartbeat_timeout_secs: 90,
            sweep_interval_secs: 30,
            sweep_batch_size: 100,
            default_lease_duration_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.job_timeout_secs, 600);
        assert_eq!(config.heartbeat_timeout_secs, 90);
    }

    #[test]
    fn create_service_request_roundtrips_through_json() {
        let req = CreateServiceRequest {
            name: "s1".into(),
            group_id: ServiceGroupId::generate(),
            service_type_id: ServiceTypeId::generate(),
            properties: HashMap::new(),
            agent_id: None,
            agent_tags: Some(vec!["linux".into(), "gpu".into()]),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: CreateServiceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "s1");
        assert_eq!(back.agent_tags, req.agent_tags);
    }
}
