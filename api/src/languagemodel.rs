use crate::condition::{self, Condition};
use crate::{MODEL_LABEL, MODEL_NAMESPACE_LABEL};

use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const API_VERSION: &str = "ai.contrib.fluxcd.io/v1alpha1";
pub const KIND: &str = "LanguageModel";

/*
 * Port the engine serves its OpenAI compatible API on.
 */
pub const ENGINE_PORT: u16 = 8000;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {

    /*
     * Whether the platform has to hand out an external address before the
     * service can be reached from outside the cluster.
     */
    pub fn is_external(&self) -> bool {
	matches!(self, ServiceType::LoadBalancer)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let s = match self {
	    ServiceType::ClusterIP => "ClusterIP",
	    ServiceType::NodePort => "NodePort",
	    ServiceType::LoadBalancer => "LoadBalancer",
	};
	f.write_str(s)
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
	match s {
	    "ClusterIP" => Ok(ServiceType::ClusterIP),
	    "NodePort" => Ok(ServiceType::NodePort),
	    "LoadBalancer" => Ok(ServiceType::LoadBalancer),
	    other => Err(format!("unsupported service type {:?}: valid values are ClusterIP, NodePort, LoadBalancer", other)),
	}
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CrossNamespaceSourceReference {

    pub kind: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineResources {

    // resource name (cpu, memory, ...) to quantity
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineSpec {

    #[serde(default)]
    pub service_type: ServiceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<EngineResources>,
}

/*
 * A running inference engine serving the artifact of one OCIRepository.
 * The lm-controller creates a Deployment and a Service with the same name
 * for it.
 */
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "ai.contrib.fluxcd.io", version = "v1alpha1", kind = "LanguageModel", namespaced)]
#[kube(status = "LanguageModelStatus")]
#[serde(rename_all = "camelCase")]
pub struct LanguageModelSpec {

    pub source_ref: CrossNamespaceSourceReference,

    pub interval: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default)]
    pub prune: bool,

    #[serde(default)]
    pub engine: EngineSpec,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LanguageModelStatus {

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl LanguageModel {

    pub fn is_ready(&self) -> bool {
	match &self.status {
	    Some(status) => condition::is_condition_true(&status.conditions, condition::READY),
	    None => false,
	}
    }
}

/*
 * Returns a LanguageModel serving the model `model_namespace/model_name`
 * with the reconcile intervals the lm-controller expects by default.
 */
pub fn new(namespace: &str, name: &str, model_namespace: &str, model_name: &str, engine: EngineSpec) -> LanguageModel {
    let mut labels = BTreeMap::new();
    labels.insert(MODEL_NAMESPACE_LABEL.to_string(), model_namespace.to_string());
    labels.insert(MODEL_LABEL.to_string(), model_name.to_string());

    let mut lm = LanguageModel::new(name, LanguageModelSpec{
	source_ref: CrossNamespaceSourceReference{
	    kind: String::from("OCIRepository"),
	    name: model_name.to_string(),
	    namespace: Some(model_namespace.to_string()),
	},
	interval: String::from("2m0s"),
	retry_interval: Some(String::from("30s")),
	timeout: Some(String::from("2m0s")),
	prune: true,
	engine: engine,
    });
    lm.metadata.namespace = Some(namespace.to_string());
    lm.metadata.labels = Some(labels);

    lm
}

/*
 * Engine settings with a single replica and a cpu request.
 */
pub fn engine(service_type: ServiceType, cpu: &str) -> EngineSpec {
    let mut requests = BTreeMap::new();
    requests.insert(String::from("cpu"), cpu.to_string());

    EngineSpec{
	service_type: service_type,
	replicas: Some(1),
	resources: Some(EngineResources{
	    requests: requests,
	    limits: BTreeMap::new(),
	}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{READY, STATUS_TRUE, STATUS_FALSE};

    #[test]
    fn new_references_the_model() {
	let lm = new("default", "happy_turing", "weave-ai", "zephyr-7b-beta", engine(ServiceType::LoadBalancer, "4"));

	assert_eq!(lm.metadata.namespace.as_deref(), Some("default"));
	assert_eq!(lm.spec.source_ref.kind, "OCIRepository");
	assert_eq!(lm.spec.source_ref.name, "zephyr-7b-beta");
	assert_eq!(lm.spec.source_ref.namespace.as_deref(), Some("weave-ai"));

	let labels = lm.metadata.labels.clone().unwrap();
	assert_eq!(labels.get(MODEL_LABEL).map(String::as_str), Some("zephyr-7b-beta"));
	assert_eq!(labels.get(MODEL_NAMESPACE_LABEL).map(String::as_str), Some("weave-ai"));
    }

    #[test]
    fn serializes_like_the_controller_expects() {
	let lm = new("default", "my-llm", "weave-ai", "zephyr-7b-beta", engine(ServiceType::ClusterIP, "2"));
	let out = serde_json::to_value(&lm).unwrap();

	assert_eq!(out["apiVersion"], API_VERSION);
	assert_eq!(out["kind"], KIND);
	assert_eq!(out["spec"]["sourceRef"]["kind"], "OCIRepository");
	assert_eq!(out["spec"]["retryInterval"], "30s");
	assert_eq!(out["spec"]["engine"]["serviceType"], "ClusterIP");
	assert_eq!(out["spec"]["engine"]["replicas"], 1);
	assert_eq!(out["spec"]["engine"]["resources"]["requests"]["cpu"], "2");
    }

    #[test]
    fn ready_condition() {
	let mut lm = new("default", "my-llm", "weave-ai", "zephyr-7b-beta", EngineSpec::default());
	assert!(!lm.is_ready());

	lm.status = Some(LanguageModelStatus{
	    conditions: vec![Condition::new(READY, STATUS_FALSE)],
	    observed_generation: None,
	});
	assert!(!lm.is_ready());

	lm.status = Some(LanguageModelStatus{
	    conditions: vec![Condition::new(READY, STATUS_TRUE)],
	    observed_generation: Some(1),
	});
	assert!(lm.is_ready());
    }

    #[test]
    fn service_type_parsing() {
	assert_eq!("LoadBalancer".parse::<ServiceType>().unwrap(), ServiceType::LoadBalancer);
	assert!("LoadBalancer".parse::<ServiceType>().unwrap().is_external());
	assert!(!ServiceType::ClusterIP.is_external());
	assert!("loadbalancer".parse::<ServiceType>().is_err());
    }
}
