use std::path::PathBuf;

use thiserror::Error;

/// Errors from catalog, configuration, and session setup.
///
/// Store and ledger failures during apply/revert never surface here; they are
/// reported per tweak through [`FailReason`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("unknown tweak: {0}")]
    UnknownTweak(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(#[from] twk_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of a non-store side effect.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    ExitStatus { program: String, status: String },

    #[error("empty command line")]
    EmptyCommand,

    #[error("{0}")]
    Other(String),
}

/// User-facing reason a tweak failed to apply or revert.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FailReason {
    #[error("Requires Administrator privileges. Restart as Admin to {verb} this tweak.")]
    ElevationRequired { verb: &'static str },

    #[error("Write rejected. The key may be protected by Windows or Group Policy.")]
    ProtectedByPolicy,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Tweak declares no store targets and no action.")]
    NoTargets,

    #[error("Action failed: {0}")]
    Action(String),
}
