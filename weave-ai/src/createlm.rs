use crate::activation;
use crate::context::WorkflowCtx;
use crate::errors::Result;
use crate::instance::{self, InstanceOptions};
use crate::poller;
use crate::store::ResourceRef;
use weave_ai_api as api;

#[derive(Debug, Clone)]
pub struct CreateLmOptions {
    /* `instance.name` is always set for create-lm */
    pub instance: InstanceOptions,
    pub export: bool,
    pub wait: bool,
}

impl CreateLmOptions {

    fn build(&self) -> api::LanguageModel {
	let name = self.instance.name.clone().unwrap_or_default();
	instance::build_instance(&self.instance, &name)
    }
}

pub fn export(opts: &CreateLmOptions) -> Result<String> {
    Ok(serde_yaml::to_string(&opts.build())?)
}

/*
 * create_lm activates the model and creates a LanguageModel for it,
 * without the endpoint resolution and log following of `run`. Returns
 * whether the instance was seen Ready.
 */
pub async fn create_lm(ctx: &WorkflowCtx<'_>, opts: &CreateLmOptions) -> Result<bool> {
    activation::activate_model(ctx, &opts.instance.model_ref(), true).await?;

    let lm = opts.build();
    let instance = ResourceRef::of(&lm);
    ctx.progress.action(format!("creating new LLM instance {}", instance));
    ctx.deadline.run("creating the LLM instance", ctx.store.create_instance(&lm)).await?;

    if !opts.wait {
	ctx.progress.success(format!("LLM instance {} created", instance));
	return Ok(false);
    }

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
    Ok(ready)
}
