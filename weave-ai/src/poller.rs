use crate::config::PollConfig;
use crate::deadline::Deadline;

use std::fmt::Display;
use std::future::Future;
use tokio::time::Instant;

/*
 * How a wait loop ended.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /* the predicate held for this freshly fetched state */
    Ready(T),

    /* the per-loop timeout elapsed while still not ready */
    Pending,

    /* the overall deadline fired while still not ready */
    Cancelled,
}

impl<T> PollOutcome<T> {

    pub fn is_ready(&self) -> bool {
	matches!(self, PollOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
	match self {
	    PollOutcome::Ready(value) => Some(value),
	    _ => None,
	}
    }
}

/*
 * poll_until re-fetches a resource with `refresh` every `config.interval`
 * until `ready` holds for it, or the loop is bounded by the per-loop
 * timeout or the deadline.
 *
 * A failing refresh is not terminal: the store is expected to recover,
 * so the error is logged and the next tick tries again.
 */
pub async fn poll_until<T, E, F, Fut, P>(
    config: &PollConfig,
    deadline: &Deadline,
    what: &str,
    mut refresh: F,
    mut ready: P,
) -> PollOutcome<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let cancel = deadline.child();
    let _guard = cancel.clone().drop_guard();
    let give_up_at = config.timeout.map(|timeout| Instant::now() + timeout);
    let mut tick: u64 = 0;

    loop {
	tick += 1;

	let fetched = tokio::select! {
	    res = refresh() => res,
	    _ = cancel.cancelled() => return PollOutcome::Cancelled,
	};

	match fetched {
	    Ok(state) => {
		if ready(&state) {
		    log::debug!("{} is ready after {} tick(s)", what, tick);
		    return PollOutcome::Ready(state);
		}
		log::debug!("{} is not ready yet (tick {})", what, tick);
	    },
	    Err(err) => {
		log::debug!("unable to refresh {} (tick {}), retrying: {}", what, tick, err);
	    },
	}

	let sleep = match give_up_at {
	    Some(at) => {
		let now = Instant::now();
		if now >= at {
		    log::warn!("gave up waiting for {} after {} tick(s)", what, tick);
		    return PollOutcome::Pending;
		}
		std::cmp::min(config.interval, at - now)
	    },
	    None => config.interval,
	};

	tokio::select! {
	    _ = tokio::time::sleep(sleep) => {},
	    _ = cancel.cancelled() => return PollOutcome::Cancelled,
	}
    }
}
