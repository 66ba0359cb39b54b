// src/types.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ScalerError, ScalerResult};

/// Name shared by a resource's routing rule, selector rule and workload
pub type ResourceName = String;

/// Target replica count (0 = cold, anything else = warm)
pub type Scale = u32;

/// Label set used both as static labels and as a pod selector.
/// Ordered so that formatted selectors are stable.
pub type LabelSet = BTreeMap<String, String>;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Default annotation the routing layer reads to tag forwarded requests
pub const ROUTING_ANNOTATION_KEY: &str = "nginx.ingress.kubernetes.io/configuration-snippet";

/// Routing rule for a resource (e.g. an ingress)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: ResourceName,
    /// Free-form annotations read by the routing layer
    pub annotations: BTreeMap<String, String>,
    /// Store revision this copy was read at, if the store tracks one
    pub resource_version: Option<String>,
}

/// Selector rule for a resource (e.g. a service)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRule {
    pub name: ResourceName,
    /// The resource's own static labels, restored as the selector when warm
    pub labels: LabelSet,
    /// Labels picking which pods receive traffic
    pub selector: LabelSet,
    pub resource_version: Option<String>,
}

/// Workload for a resource (e.g. a deployment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: ResourceName,
    /// Desired replica count
    pub replicas: Scale,
    /// Labels the workload uses to find its pods
    pub selector: LabelSet,
    pub resource_version: Option<String>,
}

/// Lifecycle phase reported for a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse a phase string as reported by the orchestrator; anything
    /// unrecognised maps to `Unknown`
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Phase snapshot for a single pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    pub labels: LabelSet,
    pub phase: PodPhase,
}

/// Stage of a scale transition, in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    Routing,
    Selector,
    Workload,
    Readiness,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Routing => "routing",
            Self::Selector => "selector",
            Self::Workload => "workload",
            Self::Readiness => "readiness",
        };
        f.write_str(s)
    }
}

/// Scaling preferences a scaler may hand back to its host.
/// Hosts fall back to their own defaults for anything left unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScalerConfig {
    /// How long a resource must be idle before the host scales it to zero (seconds)
    pub scale_window_seconds: Option<u64>,
    /// How often the host re-evaluates resources (seconds)
    pub scale_interval_seconds: Option<u64>,
}

/// Main configuration for the resource scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Namespace all resources live in
    pub namespace: String,
    /// Explicit kubeconfig; ambient credentials are used when absent
    pub kubeconfig_path: Option<PathBuf>,
    /// Delay between pod status polls while waiting for readiness (milliseconds)
    pub poll_interval_ms: u64,
    /// Upper bound on the readiness wait (seconds). `None` waits indefinitely.
    pub readiness_timeout_seconds: Option<u64>,
    /// Annotation set on the routing rule
    pub routing_annotation_key: String,
    /// Selector pointing traffic at the shared wake-up workload
    pub diverted_selector: LabelSet,
    /// Field manager name recorded on cluster writes
    pub field_manager: String,
    /// Whether to log transitions at info level
    pub enable_logging: bool,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            kubeconfig_path: None,
            poll_interval_ms: 1000,
            readiness_timeout_seconds: None,
            routing_annotation_key: ROUTING_ANNOTATION_KEY.to_string(),
            diverted_selector: default_diverted_selector(),
            field_manager: "coldstart".to_string(),
            enable_logging: true,
        }
    }
}

/// The `app=scaler,component=dlx` sentinel selector
pub fn default_diverted_selector() -> LabelSet {
    [("app", "scaler"), ("component", "dlx")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl ScalerConfig {
    pub fn builder() -> ScalerConfigBuilder {
        ScalerConfigBuilder::new()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_seconds.map(Duration::from_secs)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> ScalerResult<()> {
        if self.namespace.trim().is_empty() {
            return Err(ScalerError::config("namespace must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ScalerError::config("poll_interval_ms must be greater than zero"));
        }
        if self.routing_annotation_key.trim().is_empty() {
            return Err(ScalerError::config("routing_annotation_key must not be empty"));
        }
        if self.diverted_selector.is_empty() {
            return Err(ScalerError::config(
                "diverted_selector must name at least one label",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> ScalerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML configuration document
    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(text: &str) -> ScalerResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ScalerError::config(format!("invalid TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    #[cfg(feature = "config-toml")]
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> ScalerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Builder for creating scaler configurations easily
#[derive(Debug)]
pub struct ScalerConfigBuilder {
    config: ScalerConfig,
}

impl Default for ScalerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ScalerConfig::default(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.config.namespace = namespace.to_string();
        self
    }

    pub fn kubeconfig_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.kubeconfig_path = Some(path.into());
        self
    }

    pub fn poll_interval_ms(mut self, millis: u64) -> Self {
        self.config.poll_interval_ms = millis;
        self
    }

    pub fn readiness_timeout(mut self, seconds: u64) -> Self {
        self.config.readiness_timeout_seconds = Some(seconds);
        self
    }

    pub fn routing_annotation_key(mut self, key: &str) -> Self {
        self.config.routing_annotation_key = key.to_string();
        self
    }

    pub fn diverted_selector(mut self, selector: LabelSet) -> Self {
        self.config.diverted_selector = selector;
        self
    }

    pub fn field_manager(mut self, name: &str) -> Self {
        self.config.field_manager = name.to_string();
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    pub fn build(self) -> ScalerConfig {
        self.config
    }
}
