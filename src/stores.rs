// src/stores.rs

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ScalerError, ScalerResult, StoreResult};
use crate::types::{LabelSet, PodRecord, RoutingRule, Scale, SelectorRule, Step, WorkloadSpec};

/// Holds one routing rule per resource
///
/// Implement this to let the scaler tag traffic for a resource at the
/// routing layer (an ingress controller, a proxy config store, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Fetch the current routing rule
    ///
    /// # Returns
    /// * `Ok(rule)` - The rule as currently stored
    /// * `Err(StoreError::NotFound)` - No rule with that name
    /// * `Err(error)` - The store could not be read
    async fn get(&self, name: &str) -> StoreResult<RoutingRule>;

    /// Write back a rule previously returned by `get`
    async fn update(&self, rule: &RoutingRule) -> StoreResult<()>;
}

/// Holds one selector rule per resource
///
/// The selector decides which pods receive the resource's traffic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SelectorStore: Send + Sync {
    /// Fetch the current selector rule
    async fn get(&self, name: &str) -> StoreResult<SelectorRule>;

    /// Write back a rule previously returned by `get`
    async fn update(&self, rule: &SelectorRule) -> StoreResult<()>;
}

/// Holds one workload per resource
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Fetch the current workload
    async fn get(&self, name: &str) -> StoreResult<WorkloadSpec>;

    /// Write back a workload previously returned by `get`
    async fn update(&self, workload: &WorkloadSpec) -> StoreResult<()>;

    /// List every workload in scope. A single call returns the complete set.
    async fn list(&self) -> StoreResult<Vec<WorkloadSpec>>;
}

/// Reports pod phases
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PodStatusSource: Send + Sync {
    /// List pods whose labels contain every entry of `selector`
    async fn list(&self, selector: &LabelSet) -> StoreResult<Vec<PodRecord>>;
}

/// Trait for receiving scale transition events
///
/// Implement this to get notified as transitions progress.
/// Useful for logging, metrics, or auditing the write order.
#[async_trait]
pub trait TransitionObserver: Send + Sync {
    /// Called after a step has been written (or, for readiness, confirmed)
    async fn on_step_applied(&self, _resource: &str, _step: Step, _scale: Scale) -> ScalerResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when a transition finished successfully
    async fn on_transition_complete(
        &self,
        _resource: &str,
        _scale: Scale,
        _elapsed: Duration,
    ) -> ScalerResult<()> {
        // Default implementation: do nothing
        Ok(())
    }

    /// Called when a transition stopped on an error
    async fn on_transition_failed(
        &self,
        _resource: &str,
        _scale: Scale,
        _error: &ScalerError,
    ) -> ScalerResult<()> {
        // Default implementation: do nothing
        Ok(())
    }
}

/// Combine all stores into a single struct for easier management
#[derive(Clone)]
pub struct ScalerStores {
    pub routing: Arc<dyn RoutingStore>,
    pub selectors: Arc<dyn SelectorStore>,
    pub workloads: Arc<dyn WorkloadStore>,
    pub pods: Arc<dyn PodStatusSource>,
    pub observers: Vec<Arc<dyn TransitionObserver>>,
}

impl ScalerStores {
    /// Create a new store bundle
    pub fn new(
        routing: Arc<dyn RoutingStore>,
        selectors: Arc<dyn SelectorStore>,
        workloads: Arc<dyn WorkloadStore>,
        pods: Arc<dyn PodStatusSource>,
    ) -> Self {
        Self {
            routing,
            selectors,
            workloads,
            pods,
            observers: Vec::new(),
        }
    }

    /// Add an observer to receive transition events
    pub fn add_observer(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add multiple observers at once
    pub fn add_observers(mut self, observers: Vec<Arc<dyn TransitionObserver>>) -> Self {
        self.observers.extend(observers);
        self
    }
}
