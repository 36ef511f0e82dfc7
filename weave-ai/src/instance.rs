use crate::activation;
use crate::context::WorkflowCtx;
use crate::errors::{Error, Result};
use crate::names;
use crate::poller;
use crate::store::ResourceRef;
use weave_ai_api as api;

use api::condition::{AVAILABLE, STATUS_TRUE};
use api::languagemodel::ENGINE_PORT;
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use k8s_openapi::api::apps::v1::DeploymentSpec as KubeDeploymentSpec;
use k8s_openapi::api::core::v1::Capabilities as KubeCapabilities;
use k8s_openapi::api::core::v1::Container as KubeContainer;
use k8s_openapi::api::core::v1::ContainerPort as KubeContainerPort;
use k8s_openapi::api::core::v1::EnvVar as KubeEnvVar;
use k8s_openapi::api::core::v1::PodSecurityContext as KubePodSecurityContext;
use k8s_openapi::api::core::v1::PodSpec as KubePodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec as KubePodTemplateSpec;
use k8s_openapi::api::core::v1::SecurityContext as KubeSecurityContext;
use k8s_openapi::api::core::v1::Service as KubeService;
use k8s_openapi::api::core::v1::ServicePort as KubeServicePort;
use k8s_openapi::api::core::v1::ServiceSpec as KubeServiceSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector as KubeLabelSelector;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference as KubeOwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;

pub const CHAT_APP_IMAGE: &str = "ghcr.io/weave-ai/weave-chat-app:v0.2.0";
pub const CHAT_APP_CONTAINER: &str = "chat-app";
pub const CHAT_APP_PORT: u16 = 8501;
pub const ENGINE_CONTAINER: &str = "engine";

/* uid of the nonroot user in distroless images */
const NONROOT_UID: i64 = 65532;

/*
 * What the user asked for when deploying a language model.
 */
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub model: api::languagemodel::CrossNamespaceSourceReference,
    pub name: Option<String>,
    pub namespace: String,
    pub service_type: api::ServiceType,
    pub cpu: String,
    pub ui: bool,
}

impl InstanceOptions {

    pub fn model_ref(&self) -> ResourceRef {
	let namespace = self.model.namespace.as_deref().unwrap_or(&self.namespace);
	ResourceRef::new(namespace, &self.model.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ChatApp {
    pub service: ResourceRef,
    pub endpoint: Endpoint,
    pub ready: bool,
}

/*
 * The outcome of deploy: what was created and where to reach it. An
 * endpoint is None when the platform did not publish it in time.
 */
#[derive(Debug, Clone)]
pub struct Deployed {
    pub instance: ResourceRef,
    pub ready: bool,
    pub service: ResourceRef,
    pub endpoint: Option<Endpoint>,
    pub chat_app: Option<ChatApp>,
}

fn service_host(svc: &ResourceRef, cluster_domain: &str) -> String {
    format!("{}.{}.svc.{}", svc.name, svc.namespace, cluster_domain)
}

pub fn chat_app_name(instance: &str) -> String {
    format!("{}-chat-app", instance)
}

/*
 * First ingress address handed out by the load balancer, if any.
 */
pub fn ingress_ip(svc: &KubeService) -> Option<String> {
    svc.status.as_ref()
	.and_then(|status| status.load_balancer.as_ref())
	.and_then(|lb| lb.ingress.as_ref())
	.and_then(|ingress| ingress.iter().find_map(|entry| entry.ip.clone().filter(|ip| !ip.is_empty())))
}

pub fn is_available(deploy: &KubeDeployment) -> bool {
    deploy.status.as_ref()
	.and_then(|status| status.conditions.as_ref())
	.and_then(|conditions| conditions.iter().find(|cond| cond.type_ == AVAILABLE))
	.map_or(false, |cond| cond.status == STATUS_TRUE)
}

pub fn build_instance(opts: &InstanceOptions, name: &str) -> api::LanguageModel {
    let model = opts.model_ref();
    let engine = api::languagemodel::engine(opts.service_type, &opts.cpu);

    api::languagemodel::new(&opts.namespace, name, &model.namespace, &model.name, engine)
}

fn chat_app_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(String::from("app"), name.to_string());
    labels
}

/*
 * The chat UI talking to the engine of `lm` through its in-cluster
 * service, owned by `lm` so deleting the LanguageModel removes it too.
 */
pub fn chat_app_deployment(lm: &api::LanguageModel, owner: KubeOwnerReference, cluster_domain: &str) -> KubeDeployment {
    let instance = ResourceRef::of(lm);
    let name = chat_app_name(&instance.name);
    let labels = chat_app_labels(&name);

    let container = KubeContainer{
	name: CHAT_APP_CONTAINER.to_string(),
	image: Some(CHAT_APP_IMAGE.to_string()),
	env: Some(vec![KubeEnvVar{
	    name: String::from("LLM_API_HOST"),
	    value: Some(format!("{}:{}", service_host(&instance, cluster_domain), ENGINE_PORT)),
	    value_from: None,
	}]),
	ports: Some(vec![KubeContainerPort{
	    container_port: i32::from(CHAT_APP_PORT),
	    name: Some(String::from("http")),
	    protocol: Some(String::from("TCP")),
	    ..KubeContainerPort::default()
	}]),
	security_context: Some(KubeSecurityContext{
	    privileged: Some(false),
	    run_as_non_root: Some(true),
	    run_as_user: Some(NONROOT_UID),
	    capabilities: Some(KubeCapabilities{
		drop: Some(vec![String::from("ALL")]),
		add: None,
	    }),
	    ..KubeSecurityContext::default()
	}),
	..KubeContainer::default()
    };

    KubeDeployment{
	metadata: ObjectMeta{
	    name: Some(name.clone()),
	    namespace: Some(instance.namespace.clone()),
	    labels: Some(labels.clone()),
	    owner_references: Some(vec![owner]),
	    ..ObjectMeta::default()
	},
	spec: Some(KubeDeploymentSpec{
	    replicas: Some(1),
	    selector: KubeLabelSelector{
		match_labels: Some(labels.clone()),
		match_expressions: None,
	    },
	    template: KubePodTemplateSpec{
		metadata: Some(ObjectMeta{
		    labels: Some(labels),
		    ..ObjectMeta::default()
		}),
		spec: Some(KubePodSpec{
		    security_context: Some(KubePodSecurityContext{
			run_as_user: Some(NONROOT_UID),
			run_as_non_root: Some(true),
			..KubePodSecurityContext::default()
		    }),
		    containers: vec![container],
		    ..KubePodSpec::default()
		}),
	    },
	    ..KubeDeploymentSpec::default()
	}),
	status: None,
    }
}

pub fn chat_app_service(lm: &api::LanguageModel, owner: KubeOwnerReference) -> KubeService {
    let instance = ResourceRef::of(lm);
    let name = chat_app_name(&instance.name);
    let labels = chat_app_labels(&name);

    KubeService{
	metadata: ObjectMeta{
	    name: Some(name),
	    namespace: Some(instance.namespace),
	    labels: Some(labels.clone()),
	    owner_references: Some(vec![owner]),
	    ..ObjectMeta::default()
	},
	spec: Some(KubeServiceSpec{
	    selector: Some(labels),
	    type_: Some(String::from("ClusterIP")),
	    ports: Some(vec![KubeServicePort{
		name: Some(String::from("http")),
		port: i32::from(CHAT_APP_PORT),
		target_port: Some(IntOrString::Int(i32::from(CHAT_APP_PORT))),
		..KubeServicePort::default()
	    }]),
	    ..KubeServiceSpec::default()
	}),
	status: None,
    }
}

/*
 * Create the chat app for `lm` and wait for its deployment to become
 * Available.
 */
async fn provision_chat_app(ctx: &WorkflowCtx<'_>, lm: &api::LanguageModel) -> Result<ChatApp> {
    let instance = ResourceRef::of(lm);
    let owner = match lm.controller_owner_ref(&()) {
	Some(owner) => owner,
	None => {
	    let errmsg = format!("LanguageModel {} has no uid yet, it can't own the chat app", instance);
	    return Err(Error::Other(errmsg));
	}
    };

    let deploy = chat_app_deployment(lm, owner.clone(), &ctx.settings.cluster_domain);
    let svc = chat_app_service(lm, owner);
    let app = ResourceRef::of(&deploy);

    if ctx.settings.verbose {
	log_object(ctx, &deploy);
	log_object(ctx, &svc);
    }

    ctx.progress.action(format!("creating chat app {}", app));
    ctx.deadline.run("creating the chat app deployment", ctx.store.create_deployment(&deploy)).await?;
    ctx.deadline.run("creating the chat app service", ctx.store.create_service(&svc)).await?;

    ctx.progress.waiting(format!("waiting for {} to be ready", app));
    let what = format!("deployment {}", app);
    let outcome = poller::poll_until(
	&ctx.settings.poll,
	&ctx.deadline,
	&what,
	|| ctx.store.get_deployment(&app),
	is_available,
    ).await;

    let ready = outcome.is_ready();
    if ready {
	ctx.progress.success(format!("chat app {} is ready", app));
    } else {
	ctx.progress.warning(format!("chat app {} is not ready yet", app));
    }

    Ok(ChatApp{
	endpoint: Endpoint{
	    host: service_host(&app, &ctx.settings.cluster_domain),
	    port: CHAT_APP_PORT,
	},
	service: app,
	ready: ready,
    })
}

fn log_object<K: serde::Serialize>(ctx: &WorkflowCtx<'_>, obj: &K) {
    match serde_yaml::to_string(obj) {
	Ok(yaml) => ctx.progress.generate(format!("generated object:\n{}", yaml)),
	Err(err) => log::warn!("unable to render object as yaml: {}", err),
    }
}

/*
 * deploy creates a LanguageModel for an activated model and resolves where
 * it can be reached, optionally with the chat UI in front of it.
 *
 * Every one-shot read or write aborts the whole deploy on failure. The
 * readiness waits don't: what didn't become ready in time is reported and
 * left to reconcile on its own.
 */
pub async fn deploy(ctx: &WorkflowCtx<'_>, opts: &InstanceOptions) -> Result<Deployed> {
    activation::activate_model(ctx, &opts.model_ref(), true).await?;

    let name = match &opts.name {
	Some(name) => name.clone(),
	None => names::random_object_name(0),
    };
    let lm = build_instance(opts, &name);
    let instance = ResourceRef::of(&lm);
    if ctx.settings.verbose {
	log_object(ctx, &lm);
    }

    ctx.progress.action(format!("creating new LLM instance {}", instance));
    let lm = ctx.deadline.run("creating the LLM instance", ctx.store.create_instance(&lm)).await?;

    ctx.progress.waiting(format!("waiting for {} to be ready", instance));
    let what = format!("LanguageModel {}", instance);
    let outcome = poller::poll_until(
	&ctx.settings.poll,
	&ctx.deadline,
	&what,
	|| ctx.store.get_instance(&instance),
	|lm| lm.is_ready(),
    ).await;

    let ready = outcome.is_ready();
    if ready {
	ctx.progress.success(format!("LLM instance {} is ready", instance));
    } else {
	ctx.progress.warning(format!("LLM instance {} is not ready yet", instance));
    }

    /* the lm-controller names the engine's service after the LanguageModel */
    let service = instance.clone();
    let svc = ctx.deadline.run("fetching the LLM service", ctx.store.get_service(&service)).await?;

    let endpoint = if opts.service_type.is_external() {
	let ip = match ingress_ip(&svc) {
	    Some(ip) => Some(ip),
	    None => {
		ctx.progress.waiting(format!("waiting for language model {} to be published", instance));
		let what = format!("load balancer of service {}", service);
		let outcome = poller::poll_until(
		    &ctx.settings.poll,
		    &ctx.deadline,
		    &what,
		    || ctx.store.get_service(&service),
		    |svc| ingress_ip(svc).is_some(),
		).await;
		outcome.ready().and_then(|svc| ingress_ip(&svc))
	    },
	};

	match ip {
	    Some(ip) => {
		let endpoint = Endpoint{ host: ip, port: ENGINE_PORT };
		ctx.progress.success(format!("your LLM is ready at {}", endpoint));
		Some(endpoint)
	    },
	    None => {
		ctx.progress.warning(format!("language model {} has not been published yet", instance));
		None
	    },
	}
    } else {
	Some(Endpoint{
	    host: service_host(&service, &ctx.settings.cluster_domain),
	    port: ENGINE_PORT,
	})
    };

    let chat_app = if opts.ui {
	Some(provision_chat_app(ctx, &lm).await?)
    } else {
	None
    };

    Ok(Deployed{
	instance: instance,
	ready: ready,
	service: service,
	endpoint: endpoint,
	chat_app: chat_app,
    })
}
