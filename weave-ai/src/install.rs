/*
 * Installing the lm-controller and the model catalog into a cluster.
 */
use crate::apply::{self, Applier};
use crate::context::WorkflowCtx;
use crate::deadline::Deadline;
use crate::errors::{Error, Result};
use crate::instance;
use crate::poller;
use crate::store::ResourceRef;
use weave_ai_api::ocirepository;

use serde_json::Value;

pub const LM_CONTROLLER_VERSION: &str = "v0.8.0";
pub const LM_CONTROLLER: &str = "lm-controller";
const LM_CONTROLLER_MANIFESTS: &[&str] = &["crds", "rbac", "deployment"];

pub const DEFAULT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /* release of the model catalog */
    pub version: String,
    pub namespace: String,
    pub export: bool,
    pub with_model_catalog: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
	Self{
	    version: DEFAULT_VERSION.to_string(),
	    namespace: crate::config::DEFAULT_NAMESPACE.to_string(),
	    export: false,
	    with_model_catalog: true,
	}
    }
}

pub fn namespace_manifest(namespace: &str) -> Value {
    serde_json::json!({
	"apiVersion": "v1",
	"kind": "Namespace",
	"metadata": {
	    "name": namespace,
	},
    })
}

pub fn manifest_urls(opts: &InstallOptions) -> Vec<String> {
    let mut urls: Vec<String> = LM_CONTROLLER_MANIFESTS.iter()
	.map(|part| format!(
	    "https://github.com/weave-ai/lm-controller/releases/download/{}/lm-controller.{}.yaml",
	    LM_CONTROLLER_VERSION, part,
	))
	.collect();

    if opts.with_model_catalog {
	urls.push(format!(
	    "https://github.com/weave-ai/weave-ai/releases/download/{}/model-catalog.yaml",
	    opts.version,
	));
    }
    urls
}

async fn fetch_manifest(deadline: &Deadline, url: &str) -> Result<String> {
    log::debug!("fetching {}", url);
    let what = format!("fetching {}", url);
    deadline.run(&what, async {
	let resp = reqwest::get(url).await?.error_for_status()?;
	Ok(resp.text().await?)
    }).await
}

/*
 * The install namespace followed by every fetched manifest, moved into
 * that namespace and ordered for apply.
 */
pub fn compose(namespace: &str, manifests: &[String]) -> Result<Vec<Value>> {
    let mut objects = vec![namespace_manifest(namespace)];
    for manifest in manifests {
	objects.extend(apply::parse_documents(manifest)?);
    }

    apply::set_namespace(&mut objects, namespace);
    apply::sort_objects(&mut objects);
    Ok(objects)
}

async fn build(deadline: &Deadline, opts: &InstallOptions) -> Result<Vec<Value>> {
    let mut manifests = Vec::new();
    for url in manifest_urls(opts) {
	manifests.push(fetch_manifest(deadline, &url).await?);
    }
    compose(&opts.namespace, &manifests)
}

/*
 * Objects applied by install are waited on, except the model catalog
 * entries: those stay suspended until a model is activated.
 */
pub fn should_wait(object: &apply::ObjMeta) -> bool {
    object.kind != ocirepository::KIND
}

/*
 * export renders everything install would apply without talking to the
 * cluster.
 */
pub async fn export(deadline: &Deadline, opts: &InstallOptions) -> Result<String> {
    let objects = build(deadline, opts).await.map_err(Error::install)?;
    apply::to_yaml(&objects).map_err(Error::install)
}

async fn verify(ctx: &WorkflowCtx<'_>, namespace: &str) -> Result<()> {
    let controller = ResourceRef::new(namespace, LM_CONTROLLER);

    ctx.progress.waiting("verifying installation");
    let what = format!("deployment {}", controller);
    let outcome = poller::poll_until(
	&ctx.settings.poll,
	&ctx.deadline,
	&what,
	|| ctx.store.get_deployment(&controller),
	instance::is_available,
    ).await;

    if outcome.is_ready() {
	Ok(())
    } else {
	Err(Error::NotReady(format!("deployment {} to become available", controller)))
    }
}

async fn install_inner(ctx: &WorkflowCtx<'_>, applier: &Applier, opts: &InstallOptions) -> Result<()> {
    ctx.progress.generate("generating manifests");
    let objects = build(&ctx.deadline, opts).await?;
    ctx.progress.success("manifests build completed");

    ctx.progress.action(format!("installing components in {} namespace", opts.namespace));
    let report = applier.apply(&objects, should_wait).await?;
    for line in report.to_string().lines() {
	ctx.progress.success(line);
    }

    verify(ctx, &opts.namespace).await?;
    ctx.progress.success("install finished");
    Ok(())
}

/*
 * install applies the lm-controller (and the model catalog) and waits for
 * the controller to come up. Unlike the other workflows, a controller that
 * doesn't become available in time fails the command.
 */
pub async fn install(ctx: &WorkflowCtx<'_>, applier: &Applier, opts: &InstallOptions) -> Result<()> {
    install_inner(ctx, applier, opts).await.map_err(Error::install)
}
