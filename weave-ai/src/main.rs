mod activation;
mod apply;
mod cli;
mod config;
mod context;
mod createlm;
mod deadline;
mod errors;
mod install;
mod instance;
mod logs;
mod models;
mod names;
mod poller;
mod progress;
mod run;
mod store;

#[cfg(test)]
mod testing;

use clap::Parser;
use progress::Progress;

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = cli::Cli::parse();
    let progress = Progress::stderr();
    tokio::select! {
	res = cli::execute(cli, progress.clone()) => {
	    if let Err(err) = res {
		progress.failure(&err);
		std::process::exit(1);
	    }
	},

	// handle CTRL^C as gracefully as we can.
	_ = tokio::signal::ctrl_c() => {
	    progress.warning("interrupted");
	    std::process::exit(130);
	},
    }
}
