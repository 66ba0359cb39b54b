//! Prometheus metrics for scale transitions

use async_trait::async_trait;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::time::Duration;

use crate::error::{ScalerError, ScalerResult};
use crate::stores::TransitionObserver;
use crate::types::{Scale, Step};

fn direction(scale: Scale) -> &'static str {
    if scale == 0 {
        "cold"
    } else {
        "warm"
    }
}

/// Observer exporting transition counters and durations
#[derive(Clone)]
pub struct PrometheusObserver {
    /// Steps applied, by step and direction
    pub steps_total: IntCounterVec,
    /// Finished transitions, by direction and outcome
    pub transitions_total: IntCounterVec,
    /// Wall time of successful transitions, readiness wait included
    pub transition_duration_seconds: HistogramVec,
}

impl PrometheusObserver {
    /// Create the collectors and register them with `registry`
    pub fn new(registry: &Registry) -> ScalerResult<Self> {
        let steps_total = IntCounterVec::new(
            Opts::new("coldstart_steps_total", "Transition steps applied"),
            &["step", "direction"],
        )
        .map_err(metrics_error)?;
        registry
            .register(Box::new(steps_total.clone()))
            .map_err(metrics_error)?;

        let transitions_total = IntCounterVec::new(
            Opts::new("coldstart_transitions_total", "Scale transitions by outcome"),
            &["direction", "outcome"],
        )
        .map_err(metrics_error)?;
        registry
            .register(Box::new(transitions_total.clone()))
            .map_err(metrics_error)?;

        let transition_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "coldstart_transition_duration_seconds",
                "Duration of successful scale transitions",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["direction"],
        )
        .map_err(metrics_error)?;
        registry
            .register(Box::new(transition_duration_seconds.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            steps_total,
            transitions_total,
            transition_duration_seconds,
        })
    }
}

fn metrics_error(e: prometheus::Error) -> ScalerError {
    ScalerError::config(format!("metrics registration failed: {}", e))
}

#[async_trait]
impl TransitionObserver for PrometheusObserver {
    async fn on_step_applied(&self, _resource: &str, step: Step, scale: Scale) -> ScalerResult<()> {
        let step = step.to_string();
        self.steps_total
            .with_label_values(&[step.as_str(), direction(scale)])
            .inc();
        Ok(())
    }

    async fn on_transition_complete(
        &self,
        _resource: &str,
        scale: Scale,
        elapsed: Duration,
    ) -> ScalerResult<()> {
        self.transitions_total
            .with_label_values(&[direction(scale), "success"])
            .inc();
        self.transition_duration_seconds
            .with_label_values(&[direction(scale)])
            .observe(elapsed.as_secs_f64());
        Ok(())
    }

    async fn on_transition_failed(
        &self,
        _resource: &str,
        scale: Scale,
        error: &ScalerError,
    ) -> ScalerResult<()> {
        let outcome = match error {
            ScalerError::Retrieval { .. } => "retrieval_error",
            ScalerError::Update { .. } => "update_error",
            ScalerError::Readiness { .. } => "readiness_error",
            ScalerError::Canceled { .. } => "canceled",
            ScalerError::DeadlineExceeded { .. } => "deadline_exceeded",
            _ => "error",
        };
        self.transitions_total
            .with_label_values(&[direction(scale), outcome])
            .inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_steps_and_outcomes() {
        let registry = Registry::new();
        let observer = PrometheusObserver::new(&registry).unwrap();

        observer.on_step_applied("svc-a", Step::Routing, 0).await.unwrap();
        observer
            .on_transition_complete("svc-a", 0, Duration::from_millis(20))
            .await
            .unwrap();
        observer
            .on_transition_failed("svc-a", 2, &ScalerError::canceled("svc-a"))
            .await
            .unwrap();

        assert_eq!(
            observer.steps_total.with_label_values(&["routing", "cold"]).get(),
            1
        );
        assert_eq!(
            observer
                .transitions_total
                .with_label_values(&["warm", "canceled"])
                .get(),
            1
        );
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_double_registration_is_rejected() {
        let registry = Registry::new();
        PrometheusObserver::new(&registry).unwrap();
        assert!(PrometheusObserver::new(&registry).is_err());
    }
}
