use crate::errors::{Error, Result};
use weave_ai_api as api;

use async_trait::async_trait;
use futures::io::AsyncBufRead;
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use k8s_openapi::api::core::v1::Pod as KubePod;
use k8s_openapi::api::core::v1::Service as KubeService;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::ListParams as KubeListParams;
use kube::api::LogParams as KubeLogParams;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use kube::api::PostParams as KubePostParams;
use std::fmt;
use std::pin::Pin;

/*
 * Live bytes of one container's log.
 */
pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

/*
 * Identity of a namespaced object.
 */
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {

    pub fn new(namespace: &str, name: &str) -> Self {
	Self{
	    namespace: namespace.to_string(),
	    name: name.to_string(),
	}
    }

    /*
     * Parses `[namespace/]name`, the namespace defaults to
     * `default_namespace` when there is no '/'.
     */
    pub fn parse(value: &str, default_namespace: &str) -> Result<Self> {
	let (namespace, name) = match value.split_once('/') {
	    Some((namespace, name)) => (namespace, name),
	    None => (default_namespace, value),
	};

	if namespace.is_empty() || name.is_empty() {
	    let errmsg = format!("invalid reference {:?}, expected [namespace/]name", value);
	    return Err(Error::InvalidArgument(errmsg));
	}

	Ok(Self::new(namespace, name))
    }

    /*
     * Reads the identity out of an object's metadata.
     */
    pub fn of<K: kube::Resource>(obj: &K) -> Self {
	let meta = obj.meta();
	Self{
	    namespace: meta.namespace.clone().unwrap_or_default(),
	    name: meta.name.clone().unwrap_or_default(),
	}
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}/{}", self.namespace, self.name)
    }
}

/*
 * ResourceStore is the declarative store the workflows drive: typed reads
 * and writes, nothing cached. Implemented on top of the kubernetes API by
 * KubeStore.
 */
#[async_trait]
pub trait ResourceStore: Send + Sync {

    async fn get_model(&self, model: &ResourceRef) -> Result<api::OCIRepository>;

    /* writes the suspend flag of `model`, guarded by its resourceVersion */
    async fn update_model(&self, model: &api::OCIRepository) -> Result<api::OCIRepository>;

    /* namespace None lists across all namespaces */
    async fn list_models(&self, namespace: Option<&str>, selector: &str) -> Result<Vec<api::OCIRepository>>;

    async fn create_instance(&self, lm: &api::LanguageModel) -> Result<api::LanguageModel>;

    async fn get_instance(&self, lm: &ResourceRef) -> Result<api::LanguageModel>;

    async fn get_service(&self, svc: &ResourceRef) -> Result<KubeService>;

    async fn create_service(&self, svc: &KubeService) -> Result<KubeService>;

    async fn get_deployment(&self, deploy: &ResourceRef) -> Result<KubeDeployment>;

    async fn create_deployment(&self, deploy: &KubeDeployment) -> Result<KubeDeployment>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<KubePod>>;

    /* follows the log of `container` in `pod` */
    async fn open_log_stream(&self, pod: &ResourceRef, container: &str) -> Result<LogStream>;
}

/*
 * ResourceStore backed by a kubernetes API server.
 */
#[derive(Clone)]
pub struct KubeStore {
    kube_client: KubeClient,
}

/*
 * Merge patch carrying only the suspend flag. The resourceVersion turns a
 * concurrent write into a 409 instead of silently winning over it.
 */
pub fn suspend_patch(model: &api::OCIRepository) -> serde_json::Value {
    serde_json::json!({
	"metadata": {
	    "resourceVersion": model.metadata.resource_version,
	},
	"spec": {
	    "suspend": model.spec.suspend,
	},
    })
}

const MODEL_KIND: &str = api::ocirepository::KIND;
const INSTANCE_KIND: &str = "LanguageModel";
const SERVICE_KIND: &str = "Service";
const DEPLOYMENT_KIND: &str = "Deployment";
const POD_KIND: &str = "Pod";

impl KubeStore {

    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    kube_client: kube_client,
	}
    }

    fn namespaced<K>(&self, namespace: &str) -> KubeApi<K>
    where
	K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
	<K as kube::Resource>::DynamicType: Default,
    {
	KubeApi::namespaced(self.kube_client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {

    async fn get_model(&self, model: &ResourceRef) -> Result<api::OCIRepository> {
	let models: KubeApi<api::OCIRepository> = self.namespaced(&model.namespace);
	models.get(&model.name).await
	    .map_err(|err| Error::from_kube(err, MODEL_KIND, &model.to_string()))
    }

    async fn update_model(&self, model: &api::OCIRepository) -> Result<api::OCIRepository> {
	let id = ResourceRef::of(model);
	let models: KubeApi<api::OCIRepository> = self.namespaced(&id.namespace);
	let patch = suspend_patch(model);
	models.patch(&id.name, &KubePatchParams::default(), &KubePatch::Merge(&patch)).await
	    .map_err(|err| Error::from_kube(err, MODEL_KIND, &id.to_string()))
    }

    async fn list_models(&self, namespace: Option<&str>, selector: &str) -> Result<Vec<api::OCIRepository>> {
	let models: KubeApi<api::OCIRepository> = match namespace {
	    Some(ns) => self.namespaced(ns),
	    None => KubeApi::all(self.kube_client.clone()),
	};
	let params = KubeListParams::default().labels(selector);

	let list = models.list(&params).await
	    .map_err(|err| Error::from_kube(err, MODEL_KIND, selector))?;
	Ok(list.items)
    }

    async fn create_instance(&self, lm: &api::LanguageModel) -> Result<api::LanguageModel> {
	let id = ResourceRef::of(lm);
	let lms: KubeApi<api::LanguageModel> = self.namespaced(&id.namespace);
	lms.create(&KubePostParams::default(), lm).await
	    .map_err(|err| Error::from_kube(err, INSTANCE_KIND, &id.to_string()))
    }

    async fn get_instance(&self, lm: &ResourceRef) -> Result<api::LanguageModel> {
	let lms: KubeApi<api::LanguageModel> = self.namespaced(&lm.namespace);
	lms.get(&lm.name).await
	    .map_err(|err| Error::from_kube(err, INSTANCE_KIND, &lm.to_string()))
    }

    async fn get_service(&self, svc: &ResourceRef) -> Result<KubeService> {
	let services: KubeApi<KubeService> = self.namespaced(&svc.namespace);
	services.get(&svc.name).await
	    .map_err(|err| Error::from_kube(err, SERVICE_KIND, &svc.to_string()))
    }

    async fn create_service(&self, svc: &KubeService) -> Result<KubeService> {
	let id = ResourceRef::of(svc);
	let services: KubeApi<KubeService> = self.namespaced(&id.namespace);
	services.create(&KubePostParams::default(), svc).await
	    .map_err(|err| Error::from_kube(err, SERVICE_KIND, &id.to_string()))
    }

    async fn get_deployment(&self, deploy: &ResourceRef) -> Result<KubeDeployment> {
	let deployments: KubeApi<KubeDeployment> = self.namespaced(&deploy.namespace);
	deployments.get(&deploy.name).await
	    .map_err(|err| Error::from_kube(err, DEPLOYMENT_KIND, &deploy.to_string()))
    }

    async fn create_deployment(&self, deploy: &KubeDeployment) -> Result<KubeDeployment> {
	let id = ResourceRef::of(deploy);
	let deployments: KubeApi<KubeDeployment> = self.namespaced(&id.namespace);
	deployments.create(&KubePostParams::default(), deploy).await
	    .map_err(|err| Error::from_kube(err, DEPLOYMENT_KIND, &id.to_string()))
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<KubePod>> {
	let pods: KubeApi<KubePod> = self.namespaced(namespace);
	let params = KubeListParams::default().labels(selector);

	let list = pods.list(&params).await
	    .map_err(|err| Error::from_kube(err, POD_KIND, selector))?;
	Ok(list.items)
    }

    async fn open_log_stream(&self, pod: &ResourceRef, container: &str) -> Result<LogStream> {
	let pods: KubeApi<KubePod> = self.namespaced(&pod.namespace);
	let params = KubeLogParams{
	    container: Some(container.to_string()),
	    follow: true,
	    ..KubeLogParams::default()
	};

	let stream = pods.log_stream(&pod.name, &params).await
	    .map_err(|err| Error::from_kube(err, POD_KIND, &pod.to_string()))?;
	Ok(Box::pin(stream))
    }
}
