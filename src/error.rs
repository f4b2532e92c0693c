pub use anyhow::Error as RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Output key '{key}' is provided by both '{first}' and '{second}'")]
    DuplicateOutput {
        key: String,
        first: String,
        second: String,
    },

    #[error("Node '{node}' produced the undeclared output key '{key}'")]
    UndeclaredOutput { node: String, key: String },

    #[error("Couldn't fingerprint the inputs of '{0}'.\n{1}")]
    Fingerprint(String, ciborium::ser::Error<std::io::Error>),

    #[error("Task '{0}':\n{1}")]
    Task(String, anyhow::Error),
}

/// Raised by task callbacks when an argument is looked up the wrong way.
#[derive(Debug, Error)]
pub enum ArgError {
    #[error("No parameter named '{0}'")]
    Missing(String),

    #[error("Parameter '{0}' is bound to a single key, not a list")]
    NotGather(String),

    #[error("Parameter '{0}' is bound to a list of keys, not a single key")]
    NotSingle(String),
}

#[derive(Debug, Error)]
#[error("Expected a value of shape {expected}, found {found}")]
pub struct ValueError {
    pub expected: &'static str,
    pub found: &'static str,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't encode state.\n{0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("Couldn't decode state.\n{0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Particle {particle} has common target {expected}, while a channel has {found}")]
    TargetMismatch {
        particle: String,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Error)]
pub enum FeiError {
    #[error("Unknown particle {0}: Not implemented in FEI")]
    UnknownParticle(String),

    #[error("Error while resolving stage {0}.\n{1}")]
    Resolve(usize, ResolveError),

    #[error("Error while building the sequence of stage {0}.\n{1}")]
    Sequence(usize, ResolveError),

    #[error("Checkpoint '{0}':\n{1}")]
    Checkpoint(camino::Utf8PathBuf, PersistError),

    #[error("Memo '{0}':\n{1}")]
    Memo(camino::Utf8PathBuf, PersistError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TeacherError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Training job '{0}' is malformed.\n{1}")]
    Job(camino::Utf8PathBuf, serde_json::Error),

    #[error("Couldn't build the training pool.\n{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid progress bar template.\n{0}")]
    Style(#[from] indicatif::style::TemplateError),
}
