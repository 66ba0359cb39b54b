//! In-memory stores
//!
//! A [`MemoryCluster`] keeps routing rules, selector rules, workloads and pods
//! in process and hands out store views over the shared state. Every
//! successful write is appended to a journal with a sequence number, and
//! failures can be injected per operation. Useful for tests and for hosts
//! that want to dry-run transitions.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::stores::{PodStatusSource, RoutingStore, ScalerStores, SelectorStore, WorkloadStore};
use crate::types::{
    LabelSet, PodPhase, PodRecord, RoutingRule, Scale, SelectorRule, Step, Timestamp,
    WorkloadSpec,
};
use crate::utils::{current_timestamp, selector_matches};

/// A successful write recorded by the in-memory stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Position in the global write order, starting at 1
    pub sequence: u64,
    pub step: Step,
    pub name: String,
    pub timestamp: Timestamp,
}

/// An operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    GetRouting,
    UpdateRouting,
    GetSelector,
    UpdateSelector,
    GetWorkload,
    UpdateWorkload,
    ListWorkloads,
    ListPods,
}

#[derive(Debug, Default)]
struct ClusterState {
    routing: BTreeMap<String, RoutingRule>,
    selectors: BTreeMap<String, SelectorRule>,
    workloads: BTreeMap<String, WorkloadSpec>,
    pods: BTreeMap<String, PodRecord>,
    journal: Vec<WriteRecord>,
    failures: HashSet<FailurePoint>,
    revision: u64,
    pod_lists: u64,
}

impl ClusterState {
    fn check(&self, point: FailurePoint) -> StoreResult<()> {
        if self.failures.contains(&point) {
            return Err(StoreError::unavailable(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn record(&mut self, step: Step, name: &str) {
        let sequence = self.journal.len() as u64 + 1;
        self.journal.push(WriteRecord {
            sequence,
            step,
            name: name.to_string(),
            timestamp: current_timestamp(),
        });
    }
}

/// Rejects a write made from a stale read
fn check_version(
    kind: &str,
    name: &str,
    stored: &Option<String>,
    incoming: &Option<String>,
) -> StoreResult<()> {
    if stored != incoming {
        return Err(StoreError::conflict(
            kind,
            name,
            format!(
                "write based on revision {:?}, current revision is {:?}",
                incoming, stored
            ),
        ));
    }
    Ok(())
}

/// Shared in-memory state behind all four store traits
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<RwLock<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bundle whose every store reads and writes this cluster
    pub fn stores(&self) -> ScalerStores {
        ScalerStores::new(
            Arc::new(MemoryRoutingStore(self.clone())),
            Arc::new(MemorySelectorStore(self.clone())),
            Arc::new(MemoryWorkloadStore(self.clone())),
            Arc::new(MemoryPodSource(self.clone())),
        )
    }

    /// Create a routing rule, a selector rule and a workload named `name`.
    /// The resource starts warm with one replica and `labels` as its selector.
    pub async fn add_resource(&self, name: &str, labels: LabelSet) {
        let mut state = self.state.write().await;
        let version = state.next_revision();
        state.routing.insert(
            name.to_string(),
            RoutingRule {
                name: name.to_string(),
                annotations: BTreeMap::new(),
                resource_version: Some(version.clone()),
            },
        );
        state.selectors.insert(
            name.to_string(),
            SelectorRule {
                name: name.to_string(),
                labels: labels.clone(),
                selector: labels.clone(),
                resource_version: Some(version.clone()),
            },
        );
        state.workloads.insert(
            name.to_string(),
            WorkloadSpec {
                name: name.to_string(),
                replicas: 1,
                selector: labels,
                resource_version: Some(version),
            },
        );
    }

    /// Add only a workload, with no routing or selector rule
    pub async fn add_workload(&self, name: &str, replicas: Scale, selector: LabelSet) {
        let mut state = self.state.write().await;
        let version = state.next_revision();
        state.workloads.insert(
            name.to_string(),
            WorkloadSpec {
                name: name.to_string(),
                replicas,
                selector,
                resource_version: Some(version),
            },
        );
    }

    pub async fn remove_workload(&self, name: &str) {
        self.state.write().await.workloads.remove(name);
    }

    /// Add or replace a pod
    pub async fn add_pod(&self, name: &str, labels: LabelSet, phase: PodPhase) {
        self.state.write().await.pods.insert(
            name.to_string(),
            PodRecord {
                name: name.to_string(),
                labels,
                phase,
            },
        );
    }

    /// Returns false if no such pod exists
    pub async fn set_pod_phase(&self, name: &str, phase: PodPhase) -> bool {
        match self.state.write().await.pods.get_mut(name) {
            Some(pod) => {
                pod.phase = phase;
                true
            }
            None => false,
        }
    }

    pub async fn remove_pod(&self, name: &str) {
        self.state.write().await.pods.remove(name);
    }

    pub async fn fail_on(&self, point: FailurePoint) {
        self.state.write().await.failures.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    pub async fn routing_rule(&self, name: &str) -> Option<RoutingRule> {
        self.state.read().await.routing.get(name).cloned()
    }

    pub async fn selector_rule(&self, name: &str) -> Option<SelectorRule> {
        self.state.read().await.selectors.get(name).cloned()
    }

    pub async fn workload(&self, name: &str) -> Option<WorkloadSpec> {
        self.state.read().await.workloads.get(name).cloned()
    }

    /// Every successful write so far, in order
    pub async fn journal(&self) -> Vec<WriteRecord> {
        self.state.read().await.journal.clone()
    }

    /// How many times pods have been listed
    pub async fn pod_list_count(&self) -> u64 {
        self.state.read().await.pod_lists
    }
}

/// [`RoutingStore`] view over a [`MemoryCluster`]
pub struct MemoryRoutingStore(MemoryCluster);

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn get(&self, name: &str) -> StoreResult<RoutingRule> {
        let state = self.0.state.read().await;
        state.check(FailurePoint::GetRouting)?;
        state
            .routing
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("routing rule", name))
    }

    async fn update(&self, rule: &RoutingRule) -> StoreResult<()> {
        let mut state = self.0.state.write().await;
        state.check(FailurePoint::UpdateRouting)?;
        let stored = state
            .routing
            .get(&rule.name)
            .ok_or_else(|| StoreError::not_found("routing rule", rule.name.as_str()))?;
        check_version("routing rule", &rule.name, &stored.resource_version, &rule.resource_version)?;

        let mut next = rule.clone();
        next.resource_version = Some(state.next_revision());
        state.routing.insert(rule.name.clone(), next);
        state.record(Step::Routing, &rule.name);
        Ok(())
    }
}

/// [`SelectorStore`] view over a [`MemoryCluster`]
pub struct MemorySelectorStore(MemoryCluster);

#[async_trait]
impl SelectorStore for MemorySelectorStore {
    async fn get(&self, name: &str) -> StoreResult<SelectorRule> {
        let state = self.0.state.read().await;
        state.check(FailurePoint::GetSelector)?;
        state
            .selectors
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("selector rule", name))
    }

    async fn update(&self, rule: &SelectorRule) -> StoreResult<()> {
        let mut state = self.0.state.write().await;
        state.check(FailurePoint::UpdateSelector)?;
        let stored = state
            .selectors
            .get(&rule.name)
            .ok_or_else(|| StoreError::not_found("selector rule", rule.name.as_str()))?;
        check_version("selector rule", &rule.name, &stored.resource_version, &rule.resource_version)?;

        let mut next = rule.clone();
        next.resource_version = Some(state.next_revision());
        state.selectors.insert(rule.name.clone(), next);
        state.record(Step::Selector, &rule.name);
        Ok(())
    }
}

/// [`WorkloadStore`] view over a [`MemoryCluster`]
pub struct MemoryWorkloadStore(MemoryCluster);

#[async_trait]
impl WorkloadStore for MemoryWorkloadStore {
    async fn get(&self, name: &str) -> StoreResult<WorkloadSpec> {
        let state = self.0.state.read().await;
        state.check(FailurePoint::GetWorkload)?;
        state
            .workloads
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workload", name))
    }

    async fn update(&self, workload: &WorkloadSpec) -> StoreResult<()> {
        let mut state = self.0.state.write().await;
        state.check(FailurePoint::UpdateWorkload)?;
        let stored = state
            .workloads
            .get(&workload.name)
            .ok_or_else(|| StoreError::not_found("workload", workload.name.as_str()))?;
        check_version("workload", &workload.name, &stored.resource_version, &workload.resource_version)?;

        let mut next = workload.clone();
        next.resource_version = Some(state.next_revision());
        state.workloads.insert(workload.name.clone(), next);
        state.record(Step::Workload, &workload.name);
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<WorkloadSpec>> {
        let state = self.0.state.read().await;
        state.check(FailurePoint::ListWorkloads)?;
        Ok(state.workloads.values().cloned().collect())
    }
}

/// [`PodStatusSource`] view over a [`MemoryCluster`]
pub struct MemoryPodSource(MemoryCluster);

#[async_trait]
impl PodStatusSource for MemoryPodSource {
    async fn list(&self, selector: &LabelSet) -> StoreResult<Vec<PodRecord>> {
        let mut state = self.0.state.write().await;
        state.pod_lists += 1;
        state.check(FailurePoint::ListPods)?;
        Ok(state
            .pods
            .values()
            .filter(|pod| selector_matches(selector, &pod.labels))
            .cloned()
            .collect())
    }
}
