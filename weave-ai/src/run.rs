use crate::context::WorkflowCtx;
use crate::errors::Result;
use crate::instance::{self, Deployed, InstanceOptions};
use crate::logs::{self, AttachConfig};
use weave_ai_api::languagemodel::ENGINE_PORT;

use std::io::Write;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub instance: InstanceOptions,

    /* return once ready instead of following the logs */
    pub detach: bool,
}

/*
 * The pods and container whose log `run` follows: the chat app when there
 * is one, the engine otherwise.
 */
pub fn log_source(deployed: &Deployed) -> (String, &'static str) {
    match &deployed.chat_app {
	Some(app) => (format!("app={}", app.service.name), instance::CHAT_APP_CONTAINER),
	None => (format!("app={}", deployed.instance.name), instance::ENGINE_CONTAINER),
    }
}

pub fn port_forward_hints(deployed: &Deployed) -> Vec<String> {
    let mut hints = vec![format!(
	"to connect to your LLM:\n  kubectl port-forward -n {} svc/{} {}:{}",
	deployed.service.namespace, deployed.service.name, ENGINE_PORT, ENGINE_PORT,
    )];

    if let Some(app) = &deployed.chat_app {
	hints.push(format!(
	    "to connect to the UI:\n  kubectl port-forward -n {} svc/{} {}:{}",
	    app.service.namespace, app.service.name, instance::CHAT_APP_PORT, instance::CHAT_APP_PORT,
	));
    }

    hints
}

/*
 * run deploys a language model and either follows its log on `out` or,
 * detached, tells the user how to reach it.
 */
pub async fn run<W: Write>(ctx: &WorkflowCtx<'_>, opts: &RunOptions, attach: &AttachConfig, out: &mut W) -> Result<Deployed> {
    let deployed = instance::deploy(ctx, &opts.instance).await?;

    if opts.detach {
	for hint in port_forward_hints(&deployed) {
	    ctx.progress.success(hint);
	}
	return Ok(deployed);
    }

    let (selector, container) = log_source(&deployed);
    let (pod, stream) = logs::attach(
	ctx.store,
	&ctx.deadline,
	attach,
	&deployed.instance.namespace,
	&selector,
	container,
    ).await?;

    ctx.progress.action(format!("following logs of {} container {}", pod, container));
    let copied = logs::copy_stream(stream, out).await;
    log::debug!("copied {} bytes of logs from {}", copied, pod);

    Ok(deployed)
}
