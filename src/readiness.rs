//! Readiness wait: poll pod status until every selected pod is running.
//!
//! The wait re-resolves the pod set on every poll, since pods may be
//! scheduled or replaced while the workload scales up. It has no deadline of
//! its own; callers bound it with a [`Cancellation`].

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ScalerError, ScalerResult};
use crate::stores::PodStatusSource;
use crate::types::{LabelSet, PodPhase};
use crate::utils::format_label_selector;

/// Caller-supplied bound on a readiness wait
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    timeout: Option<Duration>,
    signal: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// Never cancel; wait until the pods run
    pub fn none() -> Self {
        Self::default()
    }

    /// Give up once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            signal: None,
        }
    }

    /// Give up when `true` is sent on the paired `watch::Sender`
    pub fn from_signal(signal: watch::Receiver<bool>) -> Self {
        Self {
            timeout: None,
            signal: Some(signal),
        }
    }

    /// Also give up once `timeout` has elapsed
    pub fn and_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Also give up when `true` is sent on the paired `watch::Sender`
    pub fn and_signal(mut self, signal: watch::Receiver<bool>) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Resolves once the signal fires. Pends forever without a signal, or when
/// the sender is dropped without firing.
async fn signaled(signal: &mut Option<watch::Receiver<bool>>) {
    match signal {
        Some(rx) => {
            let fired = rx.wait_for(|canceled| *canceled).await.is_ok();
            if !fired {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Resolves once `deadline` passes. Pends forever without one.
async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Block until every pod matching `selector` reports `Running`.
///
/// An empty pod set counts as ready. Listing failures abort the wait with
/// [`ScalerError::Readiness`]; a pod set that is not yet running does not.
/// The cancellation bounds each listing as well as the sleeps between them.
pub async fn wait_for_pods_running(
    pods: &dyn PodStatusSource,
    resource: &str,
    selector: &LabelSet,
    poll_interval: Duration,
    cancellation: Cancellation,
) -> ScalerResult<()> {
    let Cancellation { timeout, mut signal } = cancellation;
    let deadline = timeout.map(|t| Instant::now() + t);
    let exceeded = || ScalerError::deadline_exceeded(resource, timeout.unwrap_or_default());
    let selector_str = format_label_selector(selector);

    loop {
        let listed = tokio::select! {
            biased;
            _ = signaled(&mut signal) => return Err(ScalerError::canceled(resource)),
            listed = pods.list(selector) => listed,
            _ = expired(deadline) => return Err(exceeded()),
        };

        let records = listed.map_err(|e| {
            warn!(
                resource = %resource,
                selector = %selector_str,
                "Failed to retrieve pods by labels of selector"
            );
            ScalerError::readiness(resource, e)
        })?;

        let total = records.len();
        let running = records
            .iter()
            .filter(|pod| pod.phase == PodPhase::Running)
            .count();

        if running == total {
            if total == 0 {
                warn!(
                    resource = %resource,
                    selector = %selector_str,
                    "No pods matched selector; treating as ready"
                );
            }
            return Ok(());
        }

        debug!(resource = %resource, running, total, "Pods not yet running");

        tokio::select! {
            biased;
            _ = signaled(&mut signal) => return Err(ScalerError::canceled(resource)),
            _ = expired(deadline) => return Err(exceeded()),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
