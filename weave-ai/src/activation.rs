use crate::context::WorkflowCtx;
use crate::errors::Result;
use crate::poller::{self, PollOutcome};
use crate::store::ResourceRef;

/*
 * What activating a model amounted to.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Activation {
    /* nothing to do, no write issued */
    AlreadyActive,

    /* resumed (or already resuming) and not waited for */
    Resumed,

    /* resumed and observed to have a usable artifact */
    Ready,

    /* resumed, but the artifact did not show up before we gave up */
    NotReady,
}

/*
 * activate_model turns a dormant model into an active one: it clears the
 * suspend flag and, when `wait` is set, polls until the source-controller
 * has produced a usable artifact.
 *
 * Reading the model is a hard failure, so is losing the update to a
 * concurrent writer. Giving up on the wait is not: the model keeps
 * reconciling on its own and the caller decides what to do next.
 */
pub async fn activate_model(ctx: &WorkflowCtx<'_>, model_ref: &ResourceRef, wait: bool) -> Result<Activation> {
    ctx.progress.action(format!("checking if model {} exists and is active", model_ref));

    let mut model = ctx.deadline.run("fetching the model", ctx.store.get_model(model_ref)).await?;
    if model.is_active() {
	ctx.progress.success(format!("model {} is already active", model_ref));
	return Ok(Activation::AlreadyActive);
    }

    if model.spec.suspend {
	ctx.progress.action(format!("activating model {}", model_ref));
	model.spec.suspend = false;
	ctx.deadline.run("activating the model", ctx.store.update_model(&model)).await?;
    } else {
	/* someone resumed it already, its artifact is on the way */
	log::debug!("model {} is not suspended but has no usable artifact yet", model_ref);
    }

    if !wait {
	return Ok(Activation::Resumed);
    }

    ctx.progress.waiting(format!("waiting for model {} to be active", model_ref));
    let what = format!("model {}", model_ref);
    let outcome = poller::poll_until(
	&ctx.settings.poll,
	&ctx.deadline,
	&what,
	|| ctx.store.get_model(model_ref),
	|model| model.has_usable_artifact(),
    ).await;

    match outcome {
	PollOutcome::Ready(_) => {
	    ctx.progress.success(format!("model {} is active", model_ref));
	    Ok(Activation::Ready)
	},
	PollOutcome::Pending | PollOutcome::Cancelled => {
	    ctx.progress.warning(format!("model {} is not active yet, it will keep activating in the background", model_ref));
	    Ok(Activation::NotReady)
	},
    }
}
