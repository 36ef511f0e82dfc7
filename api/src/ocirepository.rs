use crate::condition::{self, Condition};

use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const KIND: &str = "OCIRepository";

/*
 * Artifact metadata key holding the model family, e.g. "llama" or "mistral".
 */
pub const FAMILY_ANNOTATION: &str = "ai.contrib.fluxcd.io/family";

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OCIRepositoryRef {

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /* semverFilter, mediaType and whatever later versions add */
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/*
 * A language model published as an OCI artifact. The source-controller
 * pulls it while the object is not suspended, so `suspend` is the dormant
 * flag we flip to activate a model.
 */
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(group = "source.toolkit.fluxcd.io", version = "v1beta2", kind = "OCIRepository", namespaced)]
#[kube(status = "OCIRepositoryStatus")]
#[serde(rename_all = "camelCase")]
pub struct OCIRepositorySpec {

    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<OCIRepositoryRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(default)]
    pub suspend: bool,

    /*
     * Every other field of the upstream spec (layerSelector, secretRef,
     * provider, ...). Kept verbatim so an update never drops them.
     */
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {

    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OCIRepositoryStatus {

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/*
 * What `list-models` prints in its STATUS column.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Inactive,
    NotReady,
    Active,
    Unknown,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let s = match self {
	    ModelStatus::Inactive => "INACTIVE",
	    ModelStatus::NotReady => "NOT READY",
	    ModelStatus::Active => "* ACTIVE",
	    ModelStatus::Unknown => "UNKNOWN",
	};
	f.write_str(s)
    }
}

impl OCIRepository {

    fn conditions(&self) -> &[Condition] {
	match &self.status {
	    Some(status) => &status.conditions,
	    None => &[],
	}
    }

    pub fn artifact(&self) -> Option<&Artifact> {
	self.status.as_ref().and_then(|status| status.artifact.as_ref())
    }

    pub fn ready_condition(&self) -> Option<&Condition> {
	condition::find_condition(self.conditions(), condition::READY)
    }

    /*
     * The source-controller has produced a usable artifact: there is an
     * artifact with a non-empty url and the Ready condition is True.
     */
    pub fn has_usable_artifact(&self) -> bool {
	let has_url = self.artifact().map_or(false, |artifact| !artifact.url.is_empty());
	has_url && condition::is_condition_true(self.conditions(), condition::READY)
    }

    /*
     * A model is active iff it's not suspended and has a usable artifact.
     */
    pub fn is_active(&self) -> bool {
	!self.spec.suspend && self.has_usable_artifact()
    }

    pub fn tag(&self) -> &str {
	self.spec.reference.as_ref()
	    .and_then(|reference| reference.tag.as_deref())
	    .unwrap_or("")
    }

    pub fn family(&self) -> &str {
	self.artifact()
	    .and_then(|artifact| artifact.metadata.get(FAMILY_ANNOTATION))
	    .map(String::as_str)
	    .unwrap_or("")
    }

    pub fn model_status(&self) -> ModelStatus {
	if self.spec.suspend {
	    return ModelStatus::Inactive;
	}

	let artifact = match self.artifact() {
	    Some(artifact) => artifact,
	    None => return ModelStatus::Inactive,
	};

	let ready = match self.ready_condition() {
	    Some(cond) => cond,
	    None => return ModelStatus::Inactive,
	};

	if ready.is_false() {
	    return ModelStatus::NotReady;
	}

	if !artifact.url.is_empty() {
	    return ModelStatus::Active;
	}

	ModelStatus::Unknown
    }
}

pub fn new(namespace: &str, name: &str, url: &str, suspend: bool) -> OCIRepository {
    let mut model = OCIRepository::new(name, OCIRepositorySpec{
	url: url.to_string(),
	reference: None,
	interval: None,
	suspend: suspend,
	extra: BTreeMap::new(),
    });
    model.metadata.namespace = Some(namespace.to_string());

    model
}
