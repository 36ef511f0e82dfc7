use crate::errors::{Error, Result};

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/*
 * Deadline is the overall time budget of one command. Every remote call
 * and every wait loop is bound to it, when it fires in-flight calls are
 * dropped and wait loops return.
 */
#[derive(Clone, Debug)]
pub struct Deadline {
    token: CancellationToken,
}

impl Deadline {

    /*
     * Starts a timer task that cancels the deadline after `timeout`. The
     * task ends early if the deadline is cancelled by other means.
     */
    pub fn after(timeout: Duration) -> Self {
	let token = CancellationToken::new();
	let timer = token.clone();

	tokio::spawn(async move {
	    tokio::select! {
		_ = tokio::time::sleep(timeout) => {
		    log::debug!("deadline of {:?} reached", timeout);
		    timer.cancel();
		},
		_ = timer.cancelled() => {},
	    }
	});

	Self{ token: token }
    }

    /*
     * A deadline that only fires when cancelled explicitly.
     */
    #[cfg(test)]
    pub fn manual() -> Self {
	Self{ token: CancellationToken::new() }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
	self.token.cancel();
    }

    #[cfg(test)]
    pub fn is_expired(&self) -> bool {
	self.token.is_cancelled()
    }

    /*
     * A token for one wait loop: cancelled with the deadline, but
     * cancelling it leaves the deadline and sibling loops alone.
     */
    pub fn child(&self) -> CancellationToken {
	self.token.child_token()
    }

    /*
     * Runs a one-shot remote call, giving up with Error::Cancelled when the
     * deadline fires first.
     */
    pub async fn run<T, F>(&self, what: &str, call: F) -> Result<T>
    where
	F: Future<Output = Result<T>>,
    {
	tokio::select! {
	    res = call => res,
	    _ = self.token.cancelled() => Err(Error::Cancelled(what.to_string())),
	}
    }
}
