/*
 * Command line surface of weave-ai. Parsed arguments are turned once into
 * Settings and per-command options, then handed to the workflows.
 */
use crate::activation;
use crate::apply::Applier;
use crate::config::{self, PollConfig, Settings};
use crate::context::WorkflowCtx;
use crate::createlm::{self, CreateLmOptions};
use crate::deadline::Deadline;
use crate::errors::{Error, Result};
use crate::install::{self, InstallOptions};
use crate::instance::InstanceOptions;
use crate::logs::AttachConfig;
use crate::models;
use crate::progress::Progress;
use crate::run::{self, RunOptions};
use crate::store::{KubeStore, ResourceRef};
use weave_ai_api as api;

use clap::{ArgAction, Args, Parser, Subcommand};
use kube::Client as KubeClient;
use std::io::Write;
use std::time::Duration;

const RUN_NAMESPACE: &str = "default";

#[derive(Parser, Debug)]
#[command(name = "weave-ai", version, about = "Weave AI CLI")]
#[command(long_about = "Weave AI CLI - the command line interface for Weave AI.\n\n# Install Weave AI.\nweave-ai install")]
pub struct Cli {

    /// timeout for this operation
    #[arg(long, global = true, default_value = "2m", value_parser = config::parse_duration)]
    pub timeout: Duration,

    /// give up a single readiness wait after this long, the operation timeout still applies
    #[arg(long, global = true, value_parser = config::parse_duration)]
    pub poll_timeout: Option<Duration>,

    /// cluster domain used to build in-cluster service addresses
    #[arg(long, global = true, default_value = config::DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// print generated objects
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Activate a model so its artifact gets pulled into the cluster
    ActivateModel(ActivateModelArgs),

    /// Run a language model, following its logs
    Run(RunArgs),

    /// Install Weave AI
    Install(InstallArgs),

    /// List the models of the catalog
    #[command(visible_aliases = ["list-model", "models"])]
    ListModels(ListModelsArgs),

    /// Create and deploy a language model
    #[command(visible_aliases = ["create-language-model", "create-llm"])]
    CreateLm(CreateLmArgs),
}

#[derive(Args, Debug)]
pub struct ActivateModelArgs {

    /// [namespace/]model
    pub model: String,

    /// wait for the model to be activated
    #[arg(short, long, default_value_t = true, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub wait: bool,

    /// namespace of the model
    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {

    /// [namespace/]model
    pub model: String,

    /// name of the LLM, generated when not given
    #[arg(long)]
    pub name: Option<String>,

    /// publish the LLM, which means it will be exposed as a LoadBalancer service
    #[arg(short, long)]
    pub publish: bool,

    #[arg(short, long, default_value = "4")]
    pub cpu: String,

    /// detach from the process e.g. not follow the logs
    #[arg(short, long)]
    pub detach: bool,

    /// start the Weave Chat UI along side the LLM
    #[arg(long)]
    pub ui: bool,

    /// namespace of the LLM
    #[arg(short, long, default_value = RUN_NAMESPACE)]
    pub namespace: String,
}

#[derive(Args, Debug)]
pub struct InstallArgs {

    /// version of Weave AI to install
    #[arg(short, long, default_value = install::DEFAULT_VERSION)]
    pub version: String,

    /// export manifests instead of installing
    #[arg(long)]
    pub export: bool,

    /// install the model catalog
    #[arg(long, default_value_t = true, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub with_model_catalog: bool,

    /// namespace to install into
    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListModelsArgs {

    /// show models from all namespaces
    #[arg(short = 'A', long)]
    pub all: bool,

    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Args, Debug)]
pub struct CreateLmArgs {

    /// name of the LanguageModel
    pub name: String,

    /// model name
    #[arg(short, long, default_value = "zephyr-7b-beta")]
    pub model: String,

    /// model namespace, the default namespace when not given
    #[arg(short = 'N', long)]
    pub model_ns: Option<String>,

    #[arg(long, default_value = "ClusterIP")]
    pub service_type: api::ServiceType,

    #[arg(short, long, default_value = "4")]
    pub cpu: String,

    /// print the LanguageModel instead of creating it
    #[arg(long)]
    pub export: bool,

    /// wait for the LanguageModel to be ready
    #[arg(short, long)]
    pub wait: bool,

    /// namespace of the LanguageModel
    #[arg(short, long, default_value = RUN_NAMESPACE)]
    pub namespace: String,
}

fn checked_namespace(namespace: &str) -> Result<&str> {
    if config::is_dns_label(namespace) {
	Ok(namespace)
    } else {
	Err(Error::InvalidArgument(format!("namespace must be a valid DNS label: {:?}", namespace)))
    }
}

fn checked_name(name: &str) -> Result<&str> {
    if config::is_dns_label(name) {
	Ok(name)
    } else {
	Err(Error::InvalidArgument(format!("name must be a valid DNS label: {:?}", name)))
    }
}

fn source_ref(model: &ResourceRef) -> api::languagemodel::CrossNamespaceSourceReference {
    api::languagemodel::CrossNamespaceSourceReference{
	kind: api::ocirepository::KIND.to_string(),
	name: model.name.clone(),
	namespace: Some(model.namespace.clone()),
    }
}

impl Cli {

    /*
     * The explicit --namespace of the subcommand, if it has one that
     * overrides the default namespace.
     */
    fn namespace_flag(&self) -> Option<&str> {
	match &self.command {
	    Command::ActivateModel(args) => args.namespace.as_deref(),
	    Command::Install(args) => args.namespace.as_deref(),
	    Command::ListModels(args) => args.namespace.as_deref(),
	    Command::Run(_) | Command::CreateLm(_) => None,
	}
    }

    /*
     * Settings of this invocation. `from_env` is the value of
     * WEAVE_AI_NAMESPACE: an invalid one is only warned about, an invalid
     * --namespace fails.
     */
    pub fn settings(&self, from_env: Option<String>, progress: &Progress) -> Result<Settings> {
	let namespace = match self.namespace_flag() {
	    Some(ns) => checked_namespace(ns)?.to_string(),
	    None => config::default_namespace(from_env, progress),
	};

	Ok(Settings{
	    namespace: namespace,
	    timeout: self.timeout,
	    poll: PollConfig{
		timeout: self.poll_timeout,
		..PollConfig::default()
	    },
	    cluster_domain: self.cluster_domain.clone(),
	    verbose: self.verbose,
	})
    }
}

impl RunArgs {

    pub fn options(&self, settings: &Settings) -> Result<RunOptions> {
	let model = ResourceRef::parse(&self.model, &settings.namespace)?;
	if let Some(name) = &self.name {
	    checked_name(name)?;
	}

	Ok(RunOptions{
	    instance: InstanceOptions{
		model: source_ref(&model),
		name: self.name.clone(),
		namespace: checked_namespace(&self.namespace)?.to_string(),
		service_type: if self.publish { api::ServiceType::LoadBalancer } else { api::ServiceType::ClusterIP },
		cpu: self.cpu.clone(),
		ui: self.ui,
	    },
	    detach: self.detach,
	})
    }
}

impl InstallArgs {

    pub fn options(&self, settings: &Settings) -> InstallOptions {
	InstallOptions{
	    version: self.version.clone(),
	    namespace: settings.namespace.clone(),
	    export: self.export,
	    with_model_catalog: self.with_model_catalog,
	}
    }
}

impl CreateLmArgs {

    pub fn options(&self, settings: &Settings) -> Result<CreateLmOptions> {
	let model_ns = match &self.model_ns {
	    Some(ns) => checked_namespace(ns)?,
	    None => settings.namespace.as_str(),
	};
	let model = ResourceRef::new(model_ns, &self.model);

	Ok(CreateLmOptions{
	    instance: InstanceOptions{
		model: source_ref(&model),
		name: Some(checked_name(&self.name)?.to_string()),
		namespace: checked_namespace(&self.namespace)?.to_string(),
		service_type: self.service_type,
		cpu: self.cpu.clone(),
		ui: false,
	    },
	    export: self.export,
	    wait: self.wait,
	})
    }
}

async fn connect() -> Result<KubeClient> {
    Ok(KubeClient::try_default().await?)
}

/*
 * execute runs the parsed command to completion. Anything meant for
 * piping (logs, exported manifests, tables) goes to stdout, progress to
 * stderr.
 */
pub async fn execute(cli: Cli, progress: Progress) -> Result<()> {
    let settings = cli.settings(std::env::var(config::NAMESPACE_ENV).ok(), &progress)?;
    let deadline = Deadline::after(settings.timeout);
    let mut stdout = std::io::stdout();

    match &cli.command {
	Command::ActivateModel(args) => {
	    let model = ResourceRef::parse(&args.model, &settings.namespace)?;
	    let store = KubeStore::new(connect().await?);
	    let ctx = WorkflowCtx::new(&store, &settings, deadline, progress);
	    activation::activate_model(&ctx, &model, args.wait).await?;
	},
	Command::Run(args) => {
	    let opts = args.options(&settings)?;
	    let store = KubeStore::new(connect().await?);
	    let ctx = WorkflowCtx::new(&store, &settings, deadline, progress);
	    run::run(&ctx, &opts, &AttachConfig::default(), &mut stdout).await?;
	},
	Command::Install(args) => {
	    let opts = args.options(&settings);
	    if opts.export {
		let yaml = install::export(&deadline, &opts).await?;
		stdout.write_all(yaml.as_bytes())?;
		stdout.flush()?;
		return Ok(());
	    }

	    let kube_client = connect().await.map_err(Error::install)?;
	    let applier = Applier::new(kube_client.clone(), settings.poll.clone(), deadline.clone());
	    let store = KubeStore::new(kube_client);
	    let ctx = WorkflowCtx::new(&store, &settings, deadline, progress);
	    install::install(&ctx, &applier, &opts).await?;
	},
	Command::ListModels(args) => {
	    let namespace = if args.all { None } else { Some(settings.namespace.as_str()) };
	    let store = KubeStore::new(connect().await?);
	    let ctx = WorkflowCtx::new(&store, &settings, deadline, progress);
	    let table = models::list_models(&ctx, namespace).await?;
	    stdout.write_all(table.as_bytes())?;
	},
	Command::CreateLm(args) => {
	    let opts = args.options(&settings)?;
	    if opts.export {
		stdout.write_all(createlm::export(&opts)?.as_bytes())?;
		stdout.flush()?;
		return Ok(());
	    }

	    let store = KubeStore::new(connect().await?);
	    let ctx = WorkflowCtx::new(&store, &settings, deadline, progress);
	    createlm::create_lm(&ctx, &opts).await?;
	},
    }

    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress;

    fn parse(args: &[&str]) -> Cli {
	Cli::try_parse_from(std::iter::once("weave-ai").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_is_consistent() {
	use clap::CommandFactory;
	Cli::command().debug_assert();
    }

    #[test]
    fn global_flags() {
	let cli = parse(&["list-models", "--timeout", "90s", "--poll-timeout", "10s", "--verbose"]);
	let settings = cli.settings(None, &Progress::silent()).unwrap();

	assert_eq!(settings.timeout, Duration::from_secs(90));
	assert_eq!(settings.poll.timeout, Some(Duration::from_secs(10)));
	assert_eq!(settings.poll.interval, config::DEFAULT_POLL_INTERVAL);
	assert_eq!(settings.cluster_domain, "cluster.local");
	assert!(settings.verbose);

	let settings = parse(&["models"]).settings(None, &Progress::silent()).unwrap();
	assert_eq!(settings.timeout, Duration::from_secs(120));
	assert_eq!(settings.poll.timeout, None);
    }

    #[test]
    fn namespace_resolution() {
	let (progress, buffer) = Progress::buffered();

	let settings = parse(&["activate-model", "zephyr"]).settings(Some(String::from("ai")), &progress).unwrap();
	assert_eq!(settings.namespace, "ai");

	let settings = parse(&["activate-model", "zephyr", "-n", "models"]).settings(Some(String::from("ai")), &progress).unwrap();
	assert_eq!(settings.namespace, "models");

	let settings = parse(&["activate-model", "zephyr"]).settings(Some(String::from("Bad_NS")), &progress).unwrap();
	assert_eq!(settings.namespace, config::DEFAULT_NAMESPACE);
	assert_eq!(progress::lines(&buffer), vec!["⚠ ignoring invalid WEAVE_AI_NAMESPACE: Bad_NS"]);

	let err = parse(&["activate-model", "zephyr", "-n", "Bad_NS"]).settings(None, &progress).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn wait_flag_forms() {
	let wait = |args: &[&str]| match parse(args).command {
	    Command::ActivateModel(args) => args.wait,
	    other => panic!("unexpected command {:?}", other),
	};

	assert!(wait(&["activate-model", "m"]));
	assert!(wait(&["activate-model", "m", "--wait"]));
	assert!(!wait(&["activate-model", "m", "--wait=false"]));
	assert!(!wait(&["activate-model", "m", "-w", "false"]));
    }

    #[test]
    fn run_options() {
	let cli = parse(&["run", "weave-ai/zephyr-7b-beta", "-p", "--ui", "-d", "--cpu", "2", "--name", "my-llm"]);
	let settings = cli.settings(None, &Progress::silent()).unwrap();
	let opts = match &cli.command {
	    Command::Run(args) => args.options(&settings).unwrap(),
	    other => panic!("unexpected command {:?}", other),
	};

	assert!(opts.detach);
	assert_eq!(opts.instance.namespace, "default");
	assert_eq!(opts.instance.service_type, api::ServiceType::LoadBalancer);
	assert_eq!(opts.instance.cpu, "2");
	assert!(opts.instance.ui);
	assert_eq!(opts.instance.name.as_deref(), Some("my-llm"));
	assert_eq!(opts.instance.model_ref(), ResourceRef::new("weave-ai", "zephyr-7b-beta"));
    }

    #[test]
    fn run_model_defaults_to_the_default_namespace() {
	let cli = parse(&["run", "mistral-7b", "-n", "team-a"]);
	let settings = cli.settings(Some(String::from("catalog")), &Progress::silent()).unwrap();
	let opts = match &cli.command {
	    Command::Run(args) => args.options(&settings).unwrap(),
	    other => panic!("unexpected command {:?}", other),
	};

	assert_eq!(opts.instance.model_ref(), ResourceRef::new("catalog", "mistral-7b"));
	assert_eq!(opts.instance.namespace, "team-a");
	assert_eq!(opts.instance.service_type, api::ServiceType::ClusterIP);
	assert_eq!(opts.instance.name, None);
    }

    #[test]
    fn run_rejects_bad_input() {
	let settings = Settings::default();
	let options = |args: &[&str]| match parse(args).command {
	    Command::Run(args) => args.options(&settings),
	    other => panic!("unexpected command {:?}", other),
	};

	assert!(matches!(options(&["run", "m", "-n", "Team_A"]), Err(Error::InvalidArgument(_))));
	assert!(matches!(options(&["run", "ns/"]), Err(Error::InvalidArgument(_))));
	assert!(matches!(options(&["run", "m", "--name", "my_llm"]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn install_flags() {
	let cli = parse(&["install", "--export", "--with-model-catalog=false", "-v", "v0.9.0"]);
	let settings = cli.settings(None, &Progress::silent()).unwrap();
	let opts = match &cli.command {
	    Command::Install(args) => args.options(&settings),
	    other => panic!("unexpected command {:?}", other),
	};

	assert!(opts.export);
	assert!(!opts.with_model_catalog);
	assert_eq!(opts.version, "v0.9.0");
	assert_eq!(opts.namespace, "weave-ai");

	let opts = match parse(&["install"]).command {
	    Command::Install(args) => args.options(&settings),
	    other => panic!("unexpected command {:?}", other),
	};
	assert!(opts.with_model_catalog);
	assert_eq!(opts.version, install::DEFAULT_VERSION);
    }

    #[test]
    fn list_models_aliases() {
	for name in ["list-models", "list-model", "models"] {
	    match parse(&[name, "-A"]).command {
		Command::ListModels(args) => assert!(args.all),
		other => panic!("unexpected command {:?}", other),
	    }
	}
    }

    #[test]
    fn create_lm_options() {
	for name in ["create-lm", "create-language-model", "create-llm"] {
	    let cli = parse(&[name, "my-llm", "--service-type", "LoadBalancer", "--wait"]);
	    let settings = cli.settings(None, &Progress::silent()).unwrap();
	    let opts = match &cli.command {
		Command::CreateLm(args) => args.options(&settings).unwrap(),
		other => panic!("unexpected command {:?}", other),
	    };

	    assert!(opts.wait);
	    assert!(!opts.export);
	    assert_eq!(opts.instance.name.as_deref(), Some("my-llm"));
	    assert_eq!(opts.instance.service_type, api::ServiceType::LoadBalancer);
	    assert_eq!(opts.instance.model_ref(), ResourceRef::new("weave-ai", "zephyr-7b-beta"));
	}

	assert!(Cli::try_parse_from(["weave-ai", "create-lm", "x", "--service-type", "Ingress"]).is_err());
    }
}
