/*
 * weave-ai/api - the custom resources the weave-ai CLI reads and writes.
 * Their controllers live elsewhere, we only talk to them through the
 * kubernetes API.
 */

pub mod condition;
pub use condition::Condition;

pub mod ocirepository;
pub use ocirepository::OCIRepository;
pub use ocirepository::OCIRepositorySpec;
pub use ocirepository::OCIRepositoryStatus;
pub use ocirepository::Artifact;
pub use ocirepository::ModelStatus;

pub mod languagemodel;
pub use languagemodel::LanguageModel;
pub use languagemodel::LanguageModelSpec;
pub use languagemodel::LanguageModelStatus;
pub use languagemodel::EngineSpec;
pub use languagemodel::ServiceType;

pub const MODEL_LABEL: &str = "ai.contrib.fluxcd.io/model";
pub const MODEL_NAMESPACE_LABEL: &str = "ai.contrib.fluxcd.io/model-namespace";

/*
 * OCIRepositories carrying this label (with LANGUAGE_MODEL_KIND) are the
 * model catalog.
 */
pub const ARTIFACT_KIND_LABEL: &str = "ai.contrib.fluxcd.io/artifact-kind";
pub const LANGUAGE_MODEL_KIND: &str = "language-model";
