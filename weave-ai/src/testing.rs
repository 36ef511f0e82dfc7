/*
 * In-memory ResourceStore for exercising the workflows. Objects are kept
 * in maps, every write is recorded, and "reconcilers" (closures run on
 * each read) stand in for the controllers that would change status
 * between two polls.
 */
use crate::config::{PollConfig, Settings};
use crate::errors::{self, Error, Result};
use crate::store::{LogStream, ResourceRef, ResourceStore};
use weave_ai_api as api;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use k8s_openapi::api::core::v1::Pod as KubePod;
use k8s_openapi::api::core::v1::Service as KubeService;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

type Reconciler<K> = Box<dyn FnMut(&mut K) + Send>;

#[derive(Default)]
struct State {
    models: HashMap<ResourceRef, api::OCIRepository>,
    instances: HashMap<ResourceRef, api::LanguageModel>,
    services: HashMap<ResourceRef, KubeService>,
    deployments: HashMap<ResourceRef, KubeDeployment>,
    pods: Vec<KubePod>,

    model_reconciler: Option<Reconciler<api::OCIRepository>>,
    instance_reconciler: Option<Reconciler<api::LanguageModel>>,
    service_reconciler: Option<Reconciler<KubeService>>,
    deployment_reconciler: Option<Reconciler<KubeDeployment>>,

    /* after `healthy_reads` reads of any kind, the next `failing_reads` fail */
    healthy_reads: u32,
    failing_reads: u32,
    total_reads: u32,
    conflict_on_update: bool,

    /* log stream opens that fail before one succeeds */
    failing_log_opens: u32,
    log_opens: u32,
    log_content: Vec<u8>,

    writes: Vec<String>,
    reads: BTreeMap<&'static str, u32>,
    next_uid: u32,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn transient() -> Error {
    Error::Transport(errors::api_error(503, "ServiceUnavailable"))
}

fn not_found(kind: &'static str, id: &ResourceRef) -> Error {
    Error::NotFound{ kind: kind, name: id.to_string() }
}

impl FakeStore {

    pub fn new() -> Self {
	Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
	self.state.lock().unwrap()
    }

    pub fn with_model(self, model: api::OCIRepository) -> Self {
	let mut model = model;
	model.metadata.resource_version = Some(String::from("1"));
	self.state().models.insert(ResourceRef::of(&model), model);
	self
    }

    pub fn with_service(self, svc: KubeService) -> Self {
	self.state().services.insert(ResourceRef::of(&svc), svc);
	self
    }

    pub fn with_deployment(self, deploy: KubeDeployment) -> Self {
	self.state().deployments.insert(ResourceRef::of(&deploy), deploy);
	self
    }

    pub fn with_pod(self, namespace: &str, name: &str, labels: &[(&str, &str)]) -> Self {
	let labels: BTreeMap<String, String> = labels.iter()
	    .map(|(k, v)| (k.to_string(), v.to_string()))
	    .collect();
	let pod = KubePod{
	    metadata: ObjectMeta{
		name: Some(name.to_string()),
		namespace: Some(namespace.to_string()),
		labels: Some(labels),
		..ObjectMeta::default()
	    },
	    ..KubePod::default()
	};
	self.state().pods.push(pod);
	self
    }

    pub fn reconcile_models(self, reconciler: impl FnMut(&mut api::OCIRepository) + Send + 'static) -> Self {
	self.state().model_reconciler = Some(Box::new(reconciler));
	self
    }

    pub fn reconcile_instances(self, reconciler: impl FnMut(&mut api::LanguageModel) + Send + 'static) -> Self {
	self.state().instance_reconciler = Some(Box::new(reconciler));
	self
    }

    pub fn reconcile_services(self, reconciler: impl FnMut(&mut KubeService) + Send + 'static) -> Self {
	self.state().service_reconciler = Some(Box::new(reconciler));
	self
    }

    pub fn reconcile_deployments(self, reconciler: impl FnMut(&mut KubeDeployment) + Send + 'static) -> Self {
	self.state().deployment_reconciler = Some(Box::new(reconciler));
	self
    }

    pub fn failing_reads(self, count: u32) -> Self {
	self.failing_reads_after(0, count)
    }

    pub fn failing_reads_after(self, healthy: u32, count: u32) -> Self {
	{
	    let mut state = self.state();
	    state.healthy_reads = healthy;
	    state.failing_reads = count;
	}
	self
    }

    pub fn conflict_on_update(self) -> Self {
	self.state().conflict_on_update = true;
	self
    }

    pub fn log_stream(self, failing_opens: u32, content: &[u8]) -> Self {
	{
	    let mut state = self.state();
	    state.failing_log_opens = failing_opens;
	    state.log_content = content.to_vec();
	}
	self
    }

    pub fn writes(&self) -> Vec<String> {
	self.state().writes.clone()
    }

    pub fn reads(&self, kind: &'static str) -> u32 {
	self.state().reads.get(kind).copied().unwrap_or(0)
    }

    pub fn log_opens(&self) -> u32 {
	self.state().log_opens
    }

    pub fn model(&self, id: &ResourceRef) -> Option<api::OCIRepository> {
	self.state().models.get(id).cloned()
    }

    pub fn instance(&self, id: &ResourceRef) -> Option<api::LanguageModel> {
	self.state().instances.get(id).cloned()
    }

    pub fn service(&self, id: &ResourceRef) -> Option<KubeService> {
	self.state().services.get(id).cloned()
    }

    pub fn deployment(&self, id: &ResourceRef) -> Option<KubeDeployment> {
	self.state().deployments.get(id).cloned()
    }
}

impl State {

    fn read(&mut self, kind: &'static str) -> Result<()> {
	*self.reads.entry(kind).or_insert(0) += 1;
	self.total_reads += 1;
	if self.total_reads > self.healthy_reads && self.failing_reads > 0 {
	    self.failing_reads -= 1;
	    return Err(transient());
	}
	Ok(())
    }

    fn uid(&mut self) -> String {
	self.next_uid += 1;
	format!("00000000-0000-0000-0000-{:012}", self.next_uid)
    }
}

#[async_trait]
impl ResourceStore for FakeStore {

    async fn get_model(&self, model: &ResourceRef) -> Result<api::OCIRepository> {
	let mut guard = self.state();
	let state = &mut *guard;
	state.read("OCIRepository")?;

	let stored = state.models.get_mut(model).ok_or_else(|| not_found("OCIRepository", model))?;
	if let Some(reconcile) = state.model_reconciler.as_mut() {
	    reconcile(stored);
	}
	Ok(stored.clone())
    }

    async fn update_model(&self, model: &api::OCIRepository) -> Result<api::OCIRepository> {
	let mut state = self.state();
	let id = ResourceRef::of(model);
	let conflict = Error::Conflict{ kind: "OCIRepository", name: id.to_string() };
	if state.conflict_on_update {
	    return Err(conflict);
	}

	let stored = state.models.get(&id).ok_or_else(|| not_found("OCIRepository", &id))?;
	if stored.metadata.resource_version != model.metadata.resource_version {
	    return Err(conflict);
	}
	let version: u64 = stored.metadata.resource_version.as_deref()
	    .and_then(|v| v.parse().ok())
	    .unwrap_or(0);

	let mut updated = model.clone();
	updated.status = stored.status.clone();
	updated.metadata.resource_version = Some((version + 1).to_string());
	state.models.insert(id.clone(), updated.clone());
	state.writes.push(format!("update OCIRepository {}", id));
	Ok(updated)
    }

    async fn list_models(&self, namespace: Option<&str>, selector: &str) -> Result<Vec<api::OCIRepository>> {
	let mut state = self.state();
	state.read("OCIRepository")?;

	let (key, value) = selector.split_once('=').unwrap_or((selector, ""));
	let mut models: Vec<api::OCIRepository> = state.models.values()
	    .filter(|m| namespace.map_or(true, |ns| m.metadata.namespace.as_deref() == Some(ns)))
	    .filter(|m| m.metadata.labels.as_ref().and_then(|l| l.get(key)).map(String::as_str) == Some(value))
	    .cloned()
	    .collect();
	models.sort_by_key(|m| ResourceRef::of(m).to_string());
	Ok(models)
    }

    async fn create_instance(&self, lm: &api::LanguageModel) -> Result<api::LanguageModel> {
	let mut state = self.state();
	let id = ResourceRef::of(lm);
	if state.instances.contains_key(&id) {
	    return Err(Error::AlreadyExists{ kind: "LanguageModel", name: id.to_string() });
	}

	let mut created = lm.clone();
	created.metadata.uid = Some(state.uid());
	state.instances.insert(id.clone(), created.clone());
	state.writes.push(format!("create LanguageModel {}", id));
	Ok(created)
    }

    async fn get_instance(&self, lm: &ResourceRef) -> Result<api::LanguageModel> {
	let mut guard = self.state();
	let state = &mut *guard;
	state.read("LanguageModel")?;

	let stored = state.instances.get_mut(lm).ok_or_else(|| not_found("LanguageModel", lm))?;
	if let Some(reconcile) = state.instance_reconciler.as_mut() {
	    reconcile(stored);
	}
	Ok(stored.clone())
    }

    async fn get_service(&self, svc: &ResourceRef) -> Result<KubeService> {
	let mut guard = self.state();
	let state = &mut *guard;
	state.read("Service")?;

	let stored = state.services.get_mut(svc).ok_or_else(|| not_found("Service", svc))?;
	if let Some(reconcile) = state.service_reconciler.as_mut() {
	    reconcile(stored);
	}
	Ok(stored.clone())
    }

    async fn create_service(&self, svc: &KubeService) -> Result<KubeService> {
	let mut state = self.state();
	let id = ResourceRef::of(svc);
	if state.services.contains_key(&id) {
	    return Err(Error::AlreadyExists{ kind: "Service", name: id.to_string() });
	}
	state.services.insert(id.clone(), svc.clone());
	state.writes.push(format!("create Service {}", id));
	Ok(svc.clone())
    }

    async fn get_deployment(&self, deploy: &ResourceRef) -> Result<KubeDeployment> {
	let mut guard = self.state();
	let state = &mut *guard;
	state.read("Deployment")?;

	let stored = state.deployments.get_mut(deploy).ok_or_else(|| not_found("Deployment", deploy))?;
	if let Some(reconcile) = state.deployment_reconciler.as_mut() {
	    reconcile(stored);
	}
	Ok(stored.clone())
    }

    async fn create_deployment(&self, deploy: &KubeDeployment) -> Result<KubeDeployment> {
	let mut state = self.state();
	let id = ResourceRef::of(deploy);
	if state.deployments.contains_key(&id) {
	    return Err(Error::AlreadyExists{ kind: "Deployment", name: id.to_string() });
	}
	state.deployments.insert(id.clone(), deploy.clone());
	state.writes.push(format!("create Deployment {}", id));
	Ok(deploy.clone())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<KubePod>> {
	let mut state = self.state();
	state.read("Pod")?;

	let (key, value) = selector.split_once('=').unwrap_or((selector, ""));
	let pods = state.pods.iter()
	    .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
	    .filter(|p| p.metadata.labels.as_ref().and_then(|l| l.get(key)).map(String::as_str) == Some(value))
	    .cloned()
	    .collect();
	Ok(pods)
    }

    async fn open_log_stream(&self, pod: &ResourceRef, _container: &str) -> Result<LogStream> {
	let mut state = self.state();
	state.log_opens += 1;
	if state.log_opens <= state.failing_log_opens {
	    return Err(Error::from_kube(errors::api_error(400, "BadRequest"), "Pod", &pod.to_string()));
	}
	Ok(Box::pin(futures::io::Cursor::new(state.log_content.clone())))
    }
}

/*
 * Settings with a poll interval short enough for tests.
 */
pub fn settings() -> Settings {
    Settings{
	poll: PollConfig{
	    interval: Duration::from_millis(5),
	    timeout: None,
	},
	..Settings::default()
    }
}
