use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /* a remote call failed for any other reason than the ones below */
    #[error("kube error: {0}")]
    Transport(#[from] kube::Error),

    #[error("{kind} {name} was modified concurrently, please retry")]
    Conflict { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("could not stream logs from pod {pod} after {attempts} attempts")]
    StreamUnavailable { pod: String, attempts: u32 },

    #[error("no pods found in namespace {namespace} matching {selector}")]
    NoPodsFound { namespace: String, selector: String },

    #[error("deadline exceeded while {0}")]
    Cancelled(String),

    #[error("timed out waiting for {0}")]
    NotReady(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("install failed: {0}")]
    Install(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{0}`")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {

    /*
     * Classify a kube error returned by an operation on `kind` `name` into
     * our taxonomy, using the status code of the API server response.
     */
    pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
	if let kube::Error::Api(response) = &err {
	    match response.code {
		404 => return Error::NotFound{ kind: kind, name: name.to_string() },
		409 if response.reason == "AlreadyExists" => {
		    return Error::AlreadyExists{ kind: kind, name: name.to_string() };
		},
		409 => return Error::Conflict{ kind: kind, name: name.to_string() },
		_ => {},
	    }
	}
	Error::Transport(err)
    }

    /*
     * Prefix install failures so the user knows which step broke.
     */
    pub fn install(err: impl std::fmt::Display) -> Self {
	Error::Install(err.to_string())
    }
}

#[cfg(test)]
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse{
	status: String::from("Failure"),
	message: format!("injected {}", reason),
	reason: reason.to_string(),
	code: code,
    })
}
