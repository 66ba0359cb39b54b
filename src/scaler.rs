// src/scaler.rs

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ScalerError, ScalerResult};
use crate::readiness::{wait_for_pods_running, Cancellation};
use crate::stores::ScalerStores;
use crate::types::{ResourceName, ResourceScalerConfig, Scale, ScalerConfig, Step};
use crate::utils::routing_directive;

/// Resource name used in errors raised while listing the whole scope
pub const ALL_RESOURCES: &str = "*";

/// Interface the autoscaling host drives
///
/// The host decides when to scale; the scaler decides how.
#[async_trait]
pub trait ResourceScaler: Send + Sync {
    /// Move `resource` to `scale` replicas. Returns once the transition is
    /// applied and, when scaling up, the resource's pods are running.
    async fn set_scale(&self, resource: &str, scale: Scale) -> ScalerResult<()>;

    /// Names of every resource that can be scaled
    async fn list_resources(&self) -> ScalerResult<Vec<ResourceName>>;

    /// Scaling preferences for the host, if the scaler has any
    async fn get_config(&self) -> ScalerResult<Option<ResourceScalerConfig>>;
}

/// Scales applications between zero replicas (traffic diverted to the
/// wake-up workload) and one or more replicas (traffic routed directly).
///
/// Each transition writes routing, then selector, then workload, and never
/// reorders them. There is no rollback: a failed call may leave earlier steps
/// applied, and calling again with the same target converges.
pub struct AppResourceScaler {
    config: ScalerConfig,
    stores: ScalerStores,
}

impl AppResourceScaler {
    /// Create a new scaler over the given stores
    pub fn new(config: ScalerConfig, stores: ScalerStores) -> ScalerResult<Self> {
        config.validate()?;
        Ok(Self { config, stores })
    }

    pub fn config(&self) -> &ScalerConfig {
        &self.config
    }

    /// Scale with the readiness wait bounded by `readiness_timeout` from the
    /// configuration (unbounded when unset)
    pub async fn set_scale(&self, resource: &str, scale: Scale) -> ScalerResult<()> {
        let cancellation = match self.config.readiness_timeout() {
            Some(timeout) => Cancellation::with_timeout(timeout),
            None => Cancellation::none(),
        };
        self.set_scale_until(resource, scale, cancellation).await
    }

    /// Scale with a caller-supplied bound on the readiness wait.
    ///
    /// Cancellation only abandons the wait; the routing, selector and
    /// workload writes already made stay in place.
    pub async fn set_scale_until(
        &self,
        resource: &str,
        scale: Scale,
        cancellation: Cancellation,
    ) -> ScalerResult<()> {
        let started = Instant::now();

        match self.transition(resource, scale, cancellation).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                for observer in &self.stores.observers {
                    if let Err(e) = observer.on_transition_complete(resource, scale, elapsed).await {
                        warn!("Observer error on transition complete: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!(resource = %resource, scale, step = ?e.step(), "Scale transition failed: {}", e);
                for observer in &self.stores.observers {
                    if let Err(err) = observer.on_transition_failed(resource, scale, &e).await {
                        warn!("Observer error on transition failed: {}", err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn transition(
        &self,
        resource: &str,
        scale: Scale,
        cancellation: Cancellation,
    ) -> ScalerResult<()> {
        // routing first, so the routing layer knows how to tag traffic
        // before anything else changes
        let mut routing = self
            .stores
            .routing
            .get(resource)
            .await
            .map_err(|e| ScalerError::retrieval(resource, Step::Routing, e))?;

        routing.annotations.insert(
            self.config.routing_annotation_key.clone(),
            routing_directive(resource),
        );

        self.stores
            .routing
            .update(&routing)
            .await
            .map_err(|e| ScalerError::update(resource, Step::Routing, e))?;
        self.notify_step(resource, Step::Routing, scale).await;

        let mut selector = self
            .stores
            .selectors
            .get(resource)
            .await
            .map_err(|e| ScalerError::retrieval(resource, Step::Selector, e))?;

        if scale == 0 {
            if self.config.enable_logging {
                info!(resource = %resource, "Changing selector to work with the wake-up workload");
            }
            selector.selector = self.config.diverted_selector.clone();
        } else {
            if self.config.enable_logging {
                info!(resource = %resource, "Changing selector back to work with resource");
            }
            selector.selector = selector.labels.clone();
        }

        self.stores
            .selectors
            .update(&selector)
            .await
            .map_err(|e| ScalerError::update(resource, Step::Selector, e))?;
        self.notify_step(resource, Step::Selector, scale).await;

        let mut workload = self
            .stores
            .workloads
            .get(resource)
            .await
            .map_err(|e| ScalerError::retrieval(resource, Step::Workload, e))?;

        workload.replicas = scale;

        self.stores
            .workloads
            .update(&workload)
            .await
            .map_err(|e| ScalerError::update(resource, Step::Workload, e))?;
        self.notify_step(resource, Step::Workload, scale).await;

        if scale != 0 {
            if self.config.enable_logging {
                info!(resource = %resource, scale, "Waiting for pods to be running");
            }
            wait_for_pods_running(
                self.stores.pods.as_ref(),
                resource,
                &selector.selector,
                self.config.poll_interval(),
                cancellation,
            )
            .await?;
            if self.config.enable_logging {
                info!(resource = %resource, scale, "All pods are running");
            }
            self.notify_step(resource, Step::Readiness, scale).await;
        }

        Ok(())
    }

    async fn notify_step(&self, resource: &str, step: Step, scale: Scale) {
        debug!(resource = %resource, step = %step, scale, "Transition step applied");
        for observer in &self.stores.observers {
            if let Err(e) = observer.on_step_applied(resource, step, scale).await {
                warn!("Observer error on step applied: {}", e);
            }
        }
    }

    /// Names of every workload in the namespace
    pub async fn list_resources(&self) -> ScalerResult<Vec<ResourceName>> {
        let workloads = self
            .stores
            .workloads
            .list()
            .await
            .map_err(|e| ScalerError::retrieval(ALL_RESOURCES, Step::Workload, e))?;

        let resources: Vec<ResourceName> = workloads.into_iter().map(|w| w.name).collect();

        debug!(namespace = %self.config.namespace, resources = ?resources, "Found workloads");
        Ok(resources)
    }

    /// No host-side requirements: always `None`
    pub async fn get_config(&self) -> ScalerResult<Option<ResourceScalerConfig>> {
        Ok(None)
    }
}

#[async_trait]
impl ResourceScaler for AppResourceScaler {
    async fn set_scale(&self, resource: &str, scale: Scale) -> ScalerResult<()> {
        AppResourceScaler::set_scale(self, resource, scale).await
    }

    async fn list_resources(&self) -> ScalerResult<Vec<ResourceName>> {
        AppResourceScaler::list_resources(self).await
    }

    async fn get_config(&self) -> ScalerResult<Option<ResourceScalerConfig>> {
        AppResourceScaler::get_config(self).await
    }
}
