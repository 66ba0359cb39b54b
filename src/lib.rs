//! # Coldstart - Scale-to-Zero Resource Scaler
//!
//! Coldstart moves an application between zero replicas (*cold*: traffic is
//! diverted to a shared wake-up workload) and one or more replicas (*warm*:
//! traffic reaches the application directly). An external autoscaler decides
//! *when* to scale and calls into this crate for *how*.
//!
//! ## Transition Protocol
//!
//! A resource name identifies one routing rule, one selector rule and one
//! workload. [`AppResourceScaler::set_scale`] mutates them in a fixed order:
//!
//! ```text
//!   host ──set_scale(name, n)──▶ AppResourceScaler
//!                                   │
//!        1. routing  ◀──────────────┤  annotate: tag traffic for `name`
//!        2. selector ◀──────────────┤  n == 0: wake-up sentinel labels
//!                                   │  n  > 0: resource's own labels
//!        3. workload ◀──────────────┤  replicas = n
//!        4. pods     ◀──────────────┘  n > 0: poll until all running
//! ```
//!
//! There is no rollback. A failed call may leave earlier steps applied;
//! every step is idempotent for a fixed target, so calling again converges.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coldstart::{AppResourceScaler, MemoryCluster, ScalerConfig, utils::label_set};
//!
//! #[tokio::main]
//! async fn main() -> coldstart::ScalerResult<()> {
//!     let cluster = MemoryCluster::new();
//!     cluster.add_resource("svc-a", label_set(&[("app", "svc-a")])).await;
//!
//!     let config = ScalerConfig::builder()
//!         .namespace("apps")
//!         .readiness_timeout(300)
//!         .build();
//!     let scaler = AppResourceScaler::new(config, cluster.stores())?;
//!
//!     scaler.set_scale("svc-a", 0).await?;
//!     for name in scaler.list_resources().await? {
//!         println!("{}", name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! With the `kubernetes` feature, [`AppResourceScaler::connect`] builds the
//! stores over Ingress, Service, Deployment and Pod objects instead.
//!
//! ## Features
//!
//! - `kubernetes`: cluster-backed stores through `kube`
//! - `prometheus-metrics`: a transition observer exporting counters and histograms
//! - `config-toml`: load [`ScalerConfig`] from TOML

pub mod error;
pub mod utils;
pub mod types;
pub mod stores;
pub mod readiness;
pub mod scaler;
pub mod memory;
#[cfg(feature = "kubernetes")]
pub mod kubernetes;
#[cfg(feature = "prometheus-metrics")]
pub mod metrics;

// Re-export common types for convenience
pub use types::{
    ScalerConfig, ScalerConfigBuilder, ResourceScalerConfig,
    ResourceName, Scale, LabelSet, Timestamp, Step,
    RoutingRule, SelectorRule, WorkloadSpec, PodRecord, PodPhase,
    ROUTING_ANNOTATION_KEY,
};

pub use error::{ScalerError, ScalerResult, StoreError, StoreResult};

pub use stores::{
    ScalerStores, RoutingStore, SelectorStore, WorkloadStore,
    PodStatusSource, TransitionObserver,
};

pub use readiness::{wait_for_pods_running, Cancellation};

pub use scaler::{AppResourceScaler, ResourceScaler};

pub use memory::{FailurePoint, MemoryCluster, WriteRecord};

#[cfg(feature = "prometheus-metrics")]
pub use metrics::PrometheusObserver;
