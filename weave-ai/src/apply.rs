/*
 * Server-side apply of multi-document manifests, in dependency order, with
 * an optional wait on each applied object.
 */
use crate::config::PollConfig;
use crate::deadline::Deadline;
use crate::errors::{Error, Result};
use crate::poller::{self, PollOutcome};
use weave_ai_api::condition::{self, Condition};

use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::ApiResource as KubeApiResource;
use kube::api::DynamicObject as KubeDynamicObject;
use kube::core::GroupVersionKind as KubeGroupVersionKind;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use kube::discovery::Discovery as KubeDiscovery;
use kube::discovery::Scope as KubeScope;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

pub const FIELD_MANAGER: &str = "weave-ai";

/*
 * Kinds that never live in a namespace. Anything else gets the install
 * namespace when it doesn't carry one.
 */
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterIssuer",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/*
 * Lower applies first.
 */
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
	"Namespace" => 0,
	"CustomResourceDefinition" => 1,
	"ServiceAccount" => 2,
	"ClusterRole" | "Role" => 3,
	"ClusterRoleBinding" | "RoleBinding" => 4,
	"ConfigMap" | "Secret" => 5,
	"Service" => 6,
	"Deployment" | "DaemonSet" | "StatefulSet" => 7,
	_ => 10,
    }
}

fn str_at<'a>(obj: &'a Value, pointer: &str) -> Option<&'a str> {
    obj.pointer(pointer).and_then(Value::as_str)
}

/*
 * Identity of one manifest object.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjMeta {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjMeta {

    pub fn of(obj: &Value) -> Result<Self> {
	let kind = str_at(obj, "/kind").ok_or_else(|| Error::Other(String::from("manifest object without kind")))?;
	let api_version = str_at(obj, "/apiVersion")
	    .ok_or_else(|| Error::Other(format!("{} without apiVersion", kind)))?;
	let name = str_at(obj, "/metadata/name")
	    .ok_or_else(|| Error::Other(format!("{} without metadata.name", kind)))?;

	Ok(Self{
	    api_version: api_version.to_string(),
	    kind: kind.to_string(),
	    namespace: str_at(obj, "/metadata/namespace").map(String::from),
	    name: name.to_string(),
	})
    }

    pub fn gvk(&self) -> KubeGroupVersionKind {
	let (group, version) = match self.api_version.split_once('/') {
	    Some((group, version)) => (group, version),
	    None => ("", self.api_version.as_str()),
	};
	KubeGroupVersionKind::gvk(group, version, &self.kind)
    }
}

impl fmt::Display for ObjMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match &self.namespace {
	    Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
	    None => write!(f, "{}/{}", self.kind, self.name),
	}
    }
}

/*
 * Splits a multi-document YAML stream into objects, skipping empty
 * documents.
 */
pub fn parse_documents(yaml: &str) -> Result<Vec<Value>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
	let value = Value::deserialize(document)?;
	if value.is_null() {
	    continue;
	}
	objects.push(value);
    }
    Ok(objects)
}

/*
 * Puts every namespaced object into `namespace`, like a kustomization
 * `namespace:` field would. ServiceAccount subjects of (Cluster)RoleBindings
 * follow the ServiceAccounts that moved, so the bindings keep granting
 * them.
 */
pub fn set_namespace(objects: &mut [Value], namespace: &str) {
    let mut moved: HashSet<(Option<String>, String)> = HashSet::new();

    for obj in objects.iter_mut() {
	let kind = str_at(obj, "/kind").unwrap_or("").to_string();
	if is_cluster_scoped(&kind) {
	    continue;
	}
	if kind == "ServiceAccount" {
	    if let Some(name) = str_at(obj, "/metadata/name") {
		moved.insert((str_at(obj, "/metadata/namespace").map(String::from), name.to_string()));
	    }
	}
	if let Some(metadata) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
	    metadata.insert(String::from("namespace"), Value::String(namespace.to_string()));
	}
    }

    for obj in objects.iter_mut() {
	if !matches!(str_at(obj, "/kind"), Some("RoleBinding") | Some("ClusterRoleBinding")) {
	    continue;
	}
	let subjects = match obj.get_mut("subjects").and_then(Value::as_array_mut) {
	    Some(subjects) => subjects,
	    None => continue,
	};
	for subject in subjects.iter_mut() {
	    if str_at(subject, "/kind") != Some("ServiceAccount") {
		continue;
	    }
	    let key = (
		str_at(subject, "/namespace").map(String::from),
		str_at(subject, "/name").unwrap_or("").to_string(),
	    );
	    if !moved.contains(&key) {
		continue;
	    }
	    if let Some(subject) = subject.as_object_mut() {
		subject.insert(String::from("namespace"), Value::String(namespace.to_string()));
	    }
	}
    }
}

pub fn sort_objects(objects: &mut [Value]) {
    objects.sort_by_key(|obj| kind_priority(str_at(obj, "/kind").unwrap_or("")));
}

pub fn to_yaml(objects: &[Value]) -> Result<String> {
    let mut out = String::new();
    for obj in objects {
	out.push_str("---\n");
	out.push_str(&serde_yaml::to_string(obj)?);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyEntry {
    pub object: ObjMeta,
    pub waited: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub entries: Vec<ApplyEntry>,
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	for entry in &self.entries {
	    writeln!(f, "{} configured", entry.object)?;
	}
	Ok(())
    }
}

/*
 * Whether an object reached its usable state: CRDs have to be
 * Established, Deployments Available, anything else just has to exist.
 */
pub fn is_object_ready(kind: &str, obj: &KubeDynamicObject) -> bool {
    let wanted = match kind {
	"CustomResourceDefinition" => condition::ESTABLISHED,
	"Deployment" => condition::AVAILABLE,
	_ => return true,
    };

    let conditions: Vec<Condition> = obj.data.pointer("/status/conditions")
	.cloned()
	.and_then(|conditions| serde_json::from_value(conditions).ok())
	.unwrap_or_default();
    condition::is_condition_true(&conditions, wanted)
}

struct Applied {
    entry: ApplyEntry,
    api: KubeApi<KubeDynamicObject>,
}

pub struct Applier {
    kube_client: KubeClient,
    poll: PollConfig,
    deadline: Deadline,
}

impl Applier {

    pub fn new(kube_client: KubeClient, poll: PollConfig, deadline: Deadline) -> Self {
	Self{
	    kube_client: kube_client,
	    poll: poll,
	    deadline: deadline,
	}
    }

    async fn discover(&self) -> Result<KubeDiscovery> {
	let discovery = KubeDiscovery::new(self.kube_client.clone()).run();
	self.deadline.run("discovering APIs", async { discovery.await.map_err(Error::from) }).await
    }

    async fn apply_one(&self, discovery: &KubeDiscovery, obj: &Value, wait: bool) -> Result<Applied> {
	let meta = ObjMeta::of(obj)?;
	let (resource, caps): (KubeApiResource, _) = discovery.resolve_gvk(&meta.gvk())
	    .ok_or_else(|| Error::Other(format!("unknown resource type {} {}", meta.api_version, meta.kind)))?;

	let api: KubeApi<KubeDynamicObject> = match (&caps.scope, &meta.namespace) {
	    (KubeScope::Namespaced, Some(ns)) => KubeApi::namespaced_with(self.kube_client.clone(), ns, &resource),
	    (KubeScope::Namespaced, None) => KubeApi::default_namespaced_with(self.kube_client.clone(), &resource),
	    (KubeScope::Cluster, _) => KubeApi::all_with(self.kube_client.clone(), &resource),
	};

	let params = KubePatchParams::apply(FIELD_MANAGER).force();
	let what = format!("applying {}", meta);
	self.deadline.run(&what, async {
	    api.patch(&meta.name, &params, &KubePatch::Apply(obj)).await
		.map(|_| ())
		.map_err(|err| Error::Other(format!("unable to apply {}: {}", meta, err)))
	}).await?;
	log::debug!("applied {}", meta);

	Ok(Applied{
	    entry: ApplyEntry{ object: meta, waited: wait },
	    api: api,
	})
    }

    /*
     * apply pushes `objects` with server-side apply: Namespaces and CRDs
     * first, then discovery is refreshed so the new kinds resolve, then the
     * rest. Objects `wait_for` selects are then waited on, and one that
     * doesn't become ready before the deadline fails the apply.
     */
    pub async fn apply<F>(&self, objects: &[Value], wait_for: F) -> Result<ApplyReport>
    where
	F: Fn(&ObjMeta) -> bool,
    {
	let (mut foundational, mut rest): (Vec<&Value>, Vec<&Value>) = objects.iter().partition(|obj| {
	    matches!(str_at(obj, "/kind"), Some("Namespace") | Some("CustomResourceDefinition"))
	});
	foundational.sort_by_key(|obj| kind_priority(str_at(obj, "/kind").unwrap_or("")));
	rest.sort_by_key(|obj| kind_priority(str_at(obj, "/kind").unwrap_or("")));

	let mut applied = Vec::new();
	for batch in [foundational, rest] {
	    if batch.is_empty() {
		continue;
	    }
	    let discovery = self.discover().await?;
	    for obj in batch {
		let wait = ObjMeta::of(obj).map(|meta| wait_for(&meta))?;
		applied.push(self.apply_one(&discovery, obj, wait).await?);
	    }
	}

	for item in applied.iter().filter(|item| item.entry.waited) {
	    let object = &item.entry.object;
	    let what = object.to_string();
	    let outcome = poller::poll_until(
		&self.poll,
		&self.deadline,
		&what,
		|| item.api.get(&object.name),
		|obj| is_object_ready(&object.kind, obj),
	    ).await;

	    match outcome {
		PollOutcome::Ready(_) => log::debug!("{} is ready", object),
		PollOutcome::Pending | PollOutcome::Cancelled => {
		    return Err(Error::NotReady(object.to_string()));
		},
	    }
	}

	Ok(ApplyReport{
	    entries: applied.into_iter().map(|item| item.entry).collect(),
	})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLER: &str = r#"
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: languagemodels.ai.contrib.fluxcd.io
---
# empty document
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: lm-controller
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: lm-controller
  namespace: somewhere-else
spec:
  replicas: 1
"#;

    #[test]
    fn parses_multi_document_yaml() {
	let objects = parse_documents(CONTROLLER).unwrap();
	let kinds: Vec<&str> = objects.iter().map(|obj| str_at(obj, "/kind").unwrap()).collect();

	assert_eq!(kinds, vec!["CustomResourceDefinition", "ServiceAccount", "Deployment"]);
    }

    #[test]
    fn namespaces_only_namespaced_objects() {
	let mut objects = parse_documents(CONTROLLER).unwrap();
	set_namespace(&mut objects, "weave-ai");

	let metas: Vec<ObjMeta> = objects.iter().map(|obj| ObjMeta::of(obj).unwrap()).collect();
	assert_eq!(metas[0].namespace, None);
	assert_eq!(metas[1].namespace.as_deref(), Some("weave-ai"));
	assert_eq!(metas[2].namespace.as_deref(), Some("weave-ai"));
	assert_eq!(metas[2].to_string(), "Deployment/weave-ai/lm-controller");
	assert_eq!(metas[0].to_string(), "CustomResourceDefinition/languagemodels.ai.contrib.fluxcd.io");
    }

    #[test]
    fn binding_subjects_follow_moved_service_accounts() {
	let mut objects = parse_documents(r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: lm-controller
  namespace: flux-system
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: lm-controller
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: lm-controller
subjects:
- kind: ServiceAccount
  name: lm-controller
  namespace: flux-system
- kind: ServiceAccount
  name: source-controller
  namespace: flux-system
- kind: User
  name: lm-controller
"#).unwrap();
	set_namespace(&mut objects, "weave-ai");

	assert_eq!(str_at(&objects[0], "/metadata/namespace"), Some("weave-ai"));
	assert_eq!(str_at(&objects[1], "/metadata/namespace"), None);
	assert_eq!(str_at(&objects[1], "/subjects/0/namespace"), Some("weave-ai"));
	assert_eq!(str_at(&objects[1], "/subjects/1/namespace"), Some("flux-system"));
	assert_eq!(str_at(&objects[1], "/subjects/2/namespace"), None);
    }

    #[test]
    fn orders_by_kind() {
	let mut objects = parse_documents(CONTROLLER).unwrap();
	objects.push(serde_json::json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "weave-ai"}}));
	sort_objects(&mut objects);

	let kinds: Vec<&str> = objects.iter().map(|obj| str_at(obj, "/kind").unwrap()).collect();
	assert_eq!(kinds, vec!["Namespace", "CustomResourceDefinition", "ServiceAccount", "Deployment"]);
    }

    #[test]
    fn group_version_kind() {
	let obj = serde_json::json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "x"}});
	let gvk = ObjMeta::of(&obj).unwrap().gvk();
	assert_eq!((gvk.group.as_str(), gvk.version.as_str(), gvk.kind.as_str()), ("apps", "v1", "Deployment"));

	let obj = serde_json::json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "x"}});
	let gvk = ObjMeta::of(&obj).unwrap().gvk();
	assert_eq!((gvk.group.as_str(), gvk.version.as_str()), ("", "v1"));

	let obj = serde_json::json!({"apiVersion": "v1", "kind": "Service"});
	assert!(ObjMeta::of(&obj).is_err());
    }

    #[test]
    fn readiness_by_kind() {
	let mut deploy: KubeDynamicObject = serde_json::from_value(serde_json::json!({
	    "apiVersion": "apps/v1",
	    "kind": "Deployment",
	    "metadata": {"name": "lm-controller"},
	    "status": {"conditions": [{"type": "Progressing", "status": "True"}]}
	})).unwrap();
	assert!(!is_object_ready("Deployment", &deploy));

	deploy.data = serde_json::json!({"status": {"conditions": [{"type": "Available", "status": "True"}]}});
	assert!(is_object_ready("Deployment", &deploy));

	let crd: KubeDynamicObject = serde_json::from_value(serde_json::json!({
	    "apiVersion": "apiextensions.k8s.io/v1",
	    "kind": "CustomResourceDefinition",
	    "metadata": {"name": "languagemodels.ai.contrib.fluxcd.io"},
	    "status": {"conditions": [{"type": "Established", "status": "True"}]}
	})).unwrap();
	assert!(is_object_ready("CustomResourceDefinition", &crd));
	assert!(is_object_ready("ServiceAccount", &crd));
    }

    #[test]
    fn report_lists_applied_objects() {
	let report = ApplyReport{
	    entries: vec![ApplyEntry{
		object: ObjMeta{
		    api_version: String::from("v1"),
		    kind: String::from("Namespace"),
		    namespace: None,
		    name: String::from("weave-ai"),
		},
		waited: true,
	    }],
	};
	assert_eq!(report.to_string(), "Namespace/weave-ai configured\n");
    }
}
