use crate::progress::Progress;

use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "weave-ai";
pub const NAMESPACE_ENV: &str = "WEAVE_AI_NAMESPACE";
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/*
 * Every readiness wait ticks at the same pace.
 */
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,

    /*
     * Optional bound for a single wait loop. When unset a loop runs until
     * its predicate holds or the overall deadline of the command fires.
     */
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
	Self{
	    interval: DEFAULT_POLL_INTERVAL,
	    timeout: None,
	}
    }
}

/*
 * Settings shared by every command of one invocation. Built once from the
 * command line and the environment, then only borrowed.
 */
#[derive(Debug, Clone)]
pub struct Settings {
    pub namespace: String,
    pub timeout: Duration,
    pub poll: PollConfig,
    pub cluster_domain: String,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
	Self{
	    namespace: DEFAULT_NAMESPACE.to_string(),
	    timeout: DEFAULT_TIMEOUT,
	    poll: PollConfig::default(),
	    cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
	    verbose: false,
	}
    }
}

/*
 * RFC 1123 label: at most 63 lowercase alphanumerics or '-', starting and
 * ending with an alphanumeric.
 */
pub fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
	return false;
    }

    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(&bytes[0]) || !alnum(&bytes[bytes.len() - 1]) {
	return false;
    }

    bytes.iter().all(|b| alnum(b) || *b == b'-')
}

/*
 * The namespace used when none is given on the command line. The
 * environment may not have been set by the user on purpose, so an
 * invalid value is reported and ignored.
 */
pub fn default_namespace(from_env: Option<String>, progress: &Progress) -> String {
    match from_env {
	Some(ns) if ns.is_empty() => DEFAULT_NAMESPACE.to_string(),
	Some(ns) if is_dns_label(&ns) => ns,
	Some(ns) => {
	    progress.warning(format!("ignoring invalid {}: {}", NAMESPACE_ENV, ns));
	    DEFAULT_NAMESPACE.to_string()
	},
	None => DEFAULT_NAMESPACE.to_string(),
    }
}

/*
 * Parse durations the way users type them on a command line: "90s",
 * "2m", "1h30m", "500ms", or a bare number of seconds.
 */
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
	return Err(String::from("empty duration"));
    }

    if let Ok(secs) = value.parse::<u64>() {
	return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
	let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
	if digits == 0 {
	    return Err(format!("invalid duration {:?}", value));
	}
	let amount: u64 = rest[..digits].parse().map_err(|_| format!("invalid duration {:?}", value))?;
	rest = &rest[digits..];

	let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
	let unit = &rest[..unit_len];
	rest = &rest[unit_len..];

	let too_large = || format!("duration {:?} too large", value);
	let part = match unit {
	    "ms" => Duration::from_millis(amount),
	    "s" => Duration::from_secs(amount),
	    "m" => Duration::from_secs(amount.checked_mul(60).ok_or_else(too_large)?),
	    "h" => Duration::from_secs(amount.checked_mul(3600).ok_or_else(too_large)?),
	    _ => return Err(format!("invalid unit {:?} in duration {:?}", unit, value)),
	};
	total = total.checked_add(part).ok_or_else(too_large)?;
    }

    Ok(total)
}
