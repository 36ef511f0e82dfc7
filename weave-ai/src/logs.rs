use crate::deadline::Deadline;
use crate::errors::{Error, Result};
use crate::store::{LogStream, ResourceRef, ResourceStore};

use futures::AsyncReadExt;
use std::io::Write;
use std::time::Duration;

pub const MAX_OPEN_ATTEMPTS: u32 = 10;
pub const OPEN_RETRY_DELAY: Duration = Duration::from_secs(1);

const READ_BUFFER_SIZE: usize = 2000;

#[derive(Debug, Clone)]
pub struct AttachConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for AttachConfig {
    fn default() -> Self {
	Self{
	    max_attempts: MAX_OPEN_ATTEMPTS,
	    retry_delay: OPEN_RETRY_DELAY,
	}
    }
}

/*
 * attach opens the log of `container` in the first pod matching
 * `selector`. A freshly scheduled container may not be streamable yet, so
 * opening is retried at a fixed pace up to `config.max_attempts` times.
 *
 * Finding the pod is bound to the command's deadline. The stream itself
 * isn't: following a log outlives it.
 */
pub async fn attach(
    store: &dyn ResourceStore,
    deadline: &Deadline,
    config: &AttachConfig,
    namespace: &str,
    selector: &str,
    container: &str,
) -> Result<(ResourceRef, LogStream)> {
    let pods = deadline.run("listing pods", store.list_pods(namespace, selector)).await?;

    let pod = match pods.first().and_then(|pod| pod.metadata.name.as_deref()) {
	Some(name) => ResourceRef::new(namespace, name),
	None => {
	    return Err(Error::NoPodsFound{
		namespace: namespace.to_string(),
		selector: selector.to_string(),
	    });
	}
    };

    let mut attempt = 0;
    loop {
	attempt += 1;

	match store.open_log_stream(&pod, container).await {
	    Ok(stream) => {
		log::debug!("streaming logs of {} container {} (attempt {})", pod, container, attempt);
		return Ok((pod, stream));
	    },
	    Err(err) => {
		if attempt >= config.max_attempts {
		    log::error!("unable to stream logs of {}: {}", pod, err);
		    return Err(Error::StreamUnavailable{
			pod: pod.to_string(),
			attempts: attempt,
		    });
		}
		log::debug!("unable to stream logs of {} (attempt {}/{}), retrying: {}", pod, attempt, config.max_attempts, err);
	    },
	}

	tokio::time::sleep(config.retry_delay).await;
    }
}

/*
 * Copies the stream to `out` until it ends. The first read or write error
 * ends the copy as well, the log is gone at that point and there is
 * nothing to recover. Returns how many bytes were copied.
 */
pub async fn copy_stream<W: Write>(mut stream: LogStream, out: &mut W) -> u64 {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut copied: u64 = 0;

    loop {
	let n = match stream.read(&mut buf).await {
	    Ok(0) => break,
	    Ok(n) => n,
	    Err(err) => {
		log::debug!("log stream ended: {}", err);
		break;
	    },
	};

	if let Err(err) = out.write_all(&buf[..n]).and_then(|_| out.flush()) {
	    log::debug!("unable to write logs: {}", err);
	    break;
	}
	copied += n as u64;
    }

    copied
}
