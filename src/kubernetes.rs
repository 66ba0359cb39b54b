//! Kubernetes-backed stores
//!
//! Maps each store onto a namespaced object kind sharing the resource's name:
//! - routing rule: `networking.k8s.io/v1` Ingress (annotations)
//! - selector rule: `v1` Service (`spec.selector`, metadata labels as static labels)
//! - workload: `apps/v1` Deployment (`spec.replicas`, `spec.selector.matchLabels`)
//! - pods: `v1` Pod (`status.phase`)
//!
//! Updates replace the whole object carrying the `resourceVersion` it was
//! read at, so the API server rejects writes based on stale reads.
//!
//! Conversions are plain functions so they can be tested without a cluster.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams, PostParams};
use tracing::{debug, info, warn};

use crate::error::{ScalerError, ScalerResult, StoreError, StoreResult};
use crate::scaler::{AppResourceScaler, ALL_RESOURCES};
use crate::stores::{PodStatusSource, RoutingStore, ScalerStores, SelectorStore, WorkloadStore};
use crate::types::{LabelSet, PodPhase, PodRecord, RoutingRule, ScalerConfig, SelectorRule, WorkloadSpec};
use crate::utils::format_label_selector;

const INGRESS: &str = "ingress";
const SERVICE: &str = "service";
const DEPLOYMENT: &str = "deployment";
const POD: &str = "pod";

/// Translate a client error into a store error
fn store_error(kind: &str, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::not_found(kind, name),
        kube::Error::Api(response) if response.code == 409 => {
            StoreError::conflict(kind, name, response.message)
        }
        kube::Error::Api(response) if response.code == 422 => {
            StoreError::invalid(kind, name, response.message)
        }
        other => StoreError::unavailable(format!("{} '{}': {}", kind, name, other)),
    }
}

fn post_params(field_manager: &str) -> PostParams {
    PostParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Read the routing rule out of an ingress
pub fn ingress_to_rule(ingress: &Ingress) -> StoreResult<RoutingRule> {
    let name = ingress
        .metadata
        .name
        .clone()
        .ok_or_else(|| StoreError::invalid(INGRESS, "<unnamed>", "missing metadata.name"))?;

    Ok(RoutingRule {
        name,
        annotations: ingress.metadata.annotations.clone().unwrap_or_default(),
        resource_version: ingress.metadata.resource_version.clone(),
    })
}

/// Write a routing rule's annotations onto an ingress
pub fn apply_rule_to_ingress(ingress: &mut Ingress, rule: &RoutingRule) {
    ingress.metadata.annotations = Some(rule.annotations.clone());
    ingress.metadata.resource_version = rule.resource_version.clone();
}

/// Read the selector rule out of a service
pub fn service_to_rule(service: &Service) -> StoreResult<SelectorRule> {
    let name = service
        .metadata
        .name
        .clone()
        .ok_or_else(|| StoreError::invalid(SERVICE, "<unnamed>", "missing metadata.name"))?;

    Ok(SelectorRule {
        name,
        labels: service.metadata.labels.clone().unwrap_or_default(),
        selector: service
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.clone())
            .unwrap_or_default(),
        resource_version: service.metadata.resource_version.clone(),
    })
}

/// Write a selector rule's selector onto a service
pub fn apply_rule_to_service(service: &mut Service, rule: &SelectorRule) {
    let spec = service.spec.get_or_insert_with(Default::default);
    spec.selector = Some(rule.selector.clone());
    service.metadata.resource_version = rule.resource_version.clone();
}

/// Read the workload out of a deployment
pub fn deployment_to_workload(deployment: &Deployment) -> StoreResult<WorkloadSpec> {
    let name = deployment
        .metadata
        .name
        .clone()
        .ok_or_else(|| StoreError::invalid(DEPLOYMENT, "<unnamed>", "missing metadata.name"))?;

    let spec = deployment.spec.as_ref();
    // the API server defaults an unset replica count to 1
    let replicas = spec.and_then(|s| s.replicas).unwrap_or(1);
    let replicas = u32::try_from(replicas).map_err(|_| {
        StoreError::invalid(DEPLOYMENT, name.as_str(), format!("negative replica count {}", replicas))
    })?;

    Ok(WorkloadSpec {
        replicas,
        selector: spec
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default(),
        resource_version: deployment.metadata.resource_version.clone(),
        name,
    })
}

/// Read every convertible deployment; the rest are skipped with a warning
/// so one malformed object does not hide the others
pub fn deployments_to_workloads(deployments: &[Deployment]) -> Vec<WorkloadSpec> {
    deployments
        .iter()
        .filter_map(|deployment| match deployment_to_workload(deployment) {
            Ok(workload) => Some(workload),
            Err(e) => {
                warn!("Skipping deployment while listing: {}", e);
                None
            }
        })
        .collect()
}

/// Write a workload's replica count onto a deployment
pub fn apply_workload_to_deployment(
    deployment: &mut Deployment,
    workload: &WorkloadSpec,
) -> StoreResult<()> {
    let replicas = i32::try_from(workload.replicas).map_err(|_| {
        StoreError::invalid(
            DEPLOYMENT,
            workload.name.as_str(),
            format!("replica count {} out of range", workload.replicas),
        )
    })?;

    let spec = deployment.spec.get_or_insert_with(Default::default);
    spec.replicas = Some(replicas);
    deployment.metadata.resource_version = workload.resource_version.clone();
    Ok(())
}

/// Read a pod's phase. A pod without status is still pending.
pub fn pod_to_record(pod: &Pod) -> PodRecord {
    PodRecord {
        name: pod.metadata.name.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        phase: pod
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .map(PodPhase::parse)
            .unwrap_or(PodPhase::Pending),
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Routing rules stored as ingress annotations
pub struct IngressStore {
    api: Api<Ingress>,
    field_manager: String,
}

impl IngressStore {
    pub fn new(client: kube::Client, namespace: &str, field_manager: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            field_manager: field_manager.to_string(),
        }
    }
}

#[async_trait]
impl RoutingStore for IngressStore {
    async fn get(&self, name: &str) -> StoreResult<RoutingRule> {
        let ingress = self.api.get(name).await.map_err(|e| store_error(INGRESS, name, e))?;
        ingress_to_rule(&ingress)
    }

    async fn update(&self, rule: &RoutingRule) -> StoreResult<()> {
        let mut ingress = self
            .api
            .get(&rule.name)
            .await
            .map_err(|e| store_error(INGRESS, &rule.name, e))?;
        apply_rule_to_ingress(&mut ingress, rule);

        self.api
            .replace(&rule.name, &post_params(&self.field_manager), &ingress)
            .await
            .map_err(|e| store_error(INGRESS, &rule.name, e))?;
        Ok(())
    }
}

/// Selector rules stored as service selectors
pub struct ServiceStore {
    api: Api<Service>,
    field_manager: String,
}

impl ServiceStore {
    pub fn new(client: kube::Client, namespace: &str, field_manager: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            field_manager: field_manager.to_string(),
        }
    }
}

#[async_trait]
impl SelectorStore for ServiceStore {
    async fn get(&self, name: &str) -> StoreResult<SelectorRule> {
        let service = self.api.get(name).await.map_err(|e| store_error(SERVICE, name, e))?;
        service_to_rule(&service)
    }

    async fn update(&self, rule: &SelectorRule) -> StoreResult<()> {
        let mut service = self
            .api
            .get(&rule.name)
            .await
            .map_err(|e| store_error(SERVICE, &rule.name, e))?;
        apply_rule_to_service(&mut service, rule);

        self.api
            .replace(&rule.name, &post_params(&self.field_manager), &service)
            .await
            .map_err(|e| store_error(SERVICE, &rule.name, e))?;
        Ok(())
    }
}

/// Workloads stored as deployments
pub struct DeploymentStore {
    api: Api<Deployment>,
    field_manager: String,
}

impl DeploymentStore {
    pub fn new(client: kube::Client, namespace: &str, field_manager: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            field_manager: field_manager.to_string(),
        }
    }
}

#[async_trait]
impl WorkloadStore for DeploymentStore {
    async fn get(&self, name: &str) -> StoreResult<WorkloadSpec> {
        let deployment = self
            .api
            .get(name)
            .await
            .map_err(|e| store_error(DEPLOYMENT, name, e))?;
        deployment_to_workload(&deployment)
    }

    async fn update(&self, workload: &WorkloadSpec) -> StoreResult<()> {
        let mut deployment = self
            .api
            .get(&workload.name)
            .await
            .map_err(|e| store_error(DEPLOYMENT, &workload.name, e))?;
        apply_workload_to_deployment(&mut deployment, workload)?;

        self.api
            .replace(&workload.name, &post_params(&self.field_manager), &deployment)
            .await
            .map_err(|e| store_error(DEPLOYMENT, &workload.name, e))?;
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<WorkloadSpec>> {
        let deployments = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| store_error(DEPLOYMENT, ALL_RESOURCES, e))?;

        Ok(deployments_to_workloads(&deployments.items))
    }
}

/// Pod phases read from the pods API
pub struct PodStore {
    api: Api<Pod>,
}

impl PodStore {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl PodStatusSource for PodStore {
    async fn list(&self, selector: &LabelSet) -> StoreResult<Vec<PodRecord>> {
        let selector_str = format_label_selector(selector);
        let pods = self
            .api
            .list(&ListParams::default().labels(&selector_str))
            .await
            .map_err(|e| {
                warn!(selector = %selector_str, "Failed to list pods by labels");
                store_error(POD, &selector_str, e)
            })?;

        debug!(selector = %selector_str, count = pods.items.len(), "Listed pods");
        Ok(pods.items.iter().map(pod_to_record).collect())
    }
}

/// Build a client from an explicit kubeconfig, or from ambient credentials
/// (in-cluster service account, then the default kubeconfig) when none is set
pub async fn client_from_config(config: &ScalerConfig) -> ScalerResult<kube::Client> {
    let kube_config = match &config.kubeconfig_path {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path).map_err(|e| {
                warn!(kubeconfig_path = %path.display(), "Could not parse kubeconfig from path");
                ScalerError::client(format!(
                    "Failed parsing cluster's kubeconfig from '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &kube::config::KubeConfigOptions::default(),
            )
            .await
            .map_err(|e| ScalerError::client(format!("Failed loading kubeconfig: {}", e)))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| ScalerError::client(format!("Failed inferring cluster config: {}", e)))?,
    };

    kube::Client::try_from(kube_config)
        .map_err(|e| ScalerError::client(format!("Failed creating kube client: {}", e)))
}

/// Store bundle over ingresses, services, deployments and pods in one namespace
pub fn kube_stores(client: kube::Client, namespace: &str, field_manager: &str) -> ScalerStores {
    ScalerStores::new(
        std::sync::Arc::new(IngressStore::new(client.clone(), namespace, field_manager)),
        std::sync::Arc::new(ServiceStore::new(client.clone(), namespace, field_manager)),
        std::sync::Arc::new(DeploymentStore::new(client.clone(), namespace, field_manager)),
        std::sync::Arc::new(PodStore::new(client, namespace)),
    )
}

impl AppResourceScaler {
    /// Connect to the cluster described by `config` and scale resources in
    /// its namespace
    pub async fn connect(config: ScalerConfig) -> ScalerResult<Self> {
        config.validate()?;
        let client = client_from_config(&config).await?;
        let stores = kube_stores(client, &config.namespace, &config.field_manager);
        info!(namespace = %config.namespace, "Connected resource scaler to cluster");
        Self::new(config, stores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{PodStatus, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use crate::utils::label_set;

    fn meta(name: &str, version: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some(version.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_ingress_annotations_round_trip_through_rule() {
        let mut ingress = Ingress {
            metadata: ObjectMeta {
                annotations: Some(label_set(&[("keep", "me")])),
                ..meta("svc-a", "7")
            },
            ..Default::default()
        };

        let mut rule = ingress_to_rule(&ingress).unwrap();
        assert_eq!(rule.resource_version.as_deref(), Some("7"));
        rule.annotations.insert("k".into(), "v".into());
        apply_rule_to_ingress(&mut ingress, &rule);

        let annotations = ingress.metadata.annotations.unwrap();
        assert_eq!(annotations["keep"], "me");
        assert_eq!(annotations["k"], "v");
    }

    #[test]
    fn test_service_rule_uses_metadata_labels_as_static_labels() {
        let service = Service {
            metadata: ObjectMeta {
                labels: Some(label_set(&[("app", "svc-a")])),
                ..meta("svc-a", "3")
            },
            spec: Some(ServiceSpec {
                selector: Some(label_set(&[("app", "scaler"), ("component", "dlx")])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let rule = service_to_rule(&service).unwrap();
        assert_eq!(rule.labels, label_set(&[("app", "svc-a")]));
        assert_eq!(rule.selector.len(), 2);
    }

    #[test]
    fn test_service_selector_is_replaced_not_merged() {
        let mut service = Service {
            metadata: meta("svc-a", "3"),
            spec: Some(ServiceSpec {
                selector: Some(label_set(&[("app", "scaler"), ("component", "dlx")])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut rule = service_to_rule(&service).unwrap();
        rule.selector = label_set(&[("app", "svc-a")]);

        apply_rule_to_service(&mut service, &rule);
        assert_eq!(
            service.spec.unwrap().selector.unwrap(),
            label_set(&[("app", "svc-a")])
        );
    }

    #[test]
    fn test_deployment_replicas_conversion() {
        let mut deployment = Deployment {
            metadata: meta("svc-a", "9"),
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                selector: LabelSelector {
                    match_labels: Some(label_set(&[("app", "svc-a")])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut workload = deployment_to_workload(&deployment).unwrap();
        assert_eq!(workload.replicas, 2);
        assert_eq!(workload.selector, label_set(&[("app", "svc-a")]));

        workload.replicas = 0;
        apply_workload_to_deployment(&mut deployment, &workload).unwrap();
        assert_eq!(deployment.spec.unwrap().replicas, Some(0));
    }

    #[test]
    fn test_replica_count_out_of_range_is_invalid() {
        let mut deployment = Deployment {
            metadata: meta("svc-a", "1"),
            ..Default::default()
        };
        let workload = WorkloadSpec {
            name: "svc-a".into(),
            replicas: u32::MAX,
            selector: LabelSet::new(),
            resource_version: Some("1".into()),
        };
        let err = apply_workload_to_deployment(&mut deployment, &workload).unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }

    #[test]
    fn test_pod_phase_conversion() {
        let running = Pod {
            metadata: meta("svc-a-1", "1"),
            status: Some(PodStatus {
                phase: Some("Running".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(pod_to_record(&running).phase, PodPhase::Running);

        let fresh = Pod {
            metadata: meta("svc-a-2", "1"),
            ..Default::default()
        };
        assert_eq!(pod_to_record(&fresh).phase, PodPhase::Pending);
    }

    #[test]
    fn test_listing_skips_unconvertible_deployments() {
        let healthy = Deployment {
            metadata: meta("svc-a", "1"),
            ..Default::default()
        };
        let negative = Deployment {
            metadata: meta("svc-b", "1"),
            spec: Some(DeploymentSpec {
                replicas: Some(-1),
                ..Default::default()
            }),
            ..Default::default()
        };
        let unnamed = Deployment::default();

        let workloads = deployments_to_workloads(&[healthy, negative, unnamed]);
        let names: Vec<&str> = workloads.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["svc-a"]);
        assert_eq!(workloads[0].replicas, 1);
    }

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "rejected".into(),
            reason: "Test".into(),
            code,
        })
    }

    #[test]
    fn test_list_errors_are_classified_like_other_calls() {
        assert!(matches!(
            store_error(DEPLOYMENT, ALL_RESOURCES, api_error(404)),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            store_error(POD, "app=svc-a", api_error(422)),
            StoreError::Invalid { .. }
        ));
        assert!(matches!(
            store_error(DEPLOYMENT, ALL_RESOURCES, api_error(503)),
            StoreError::Unavailable { .. }
        ));
    }

    #[test]
    fn test_missing_name_is_invalid() {
        let ingress = Ingress::default();
        assert!(matches!(
            ingress_to_rule(&ingress),
            Err(StoreError::Invalid { .. })
        ));
    }
}
