use thiserror::Error;

use crate::content::FetchError;
use crate::resolution::AspectRatioError;

/// Fatal conditions that stop a host from ever reaching `Playing`.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    InvalidAspectRatio(#[from] AspectRatioError),
    #[error("header is missing main attribute with the path to the game script")]
    MissingEntrypoint,
    #[error("failed to fetch game script {path}")]
    FetchFailure {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to instantiate game module {name}")]
    InstantiationFailure {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("game init hook failed")]
    InitFailure(#[source] anyhow::Error),
    #[error("game load hook failed")]
    LoadFailure(#[source] anyhow::Error),
    #[error("renderer could not allocate the back buffer")]
    Renderer(#[source] anyhow::Error),
}

/// Failure of an on-demand state hook (`saveState`, `loadState`,
/// `getStateForAgent`).
#[derive(Debug, Error)]
#[error("{hook} hook failed")]
pub struct HookError {
    pub hook: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl HookError {
    pub fn new(hook: &'static str, source: anyhow::Error) -> Self {
        Self { hook, source }
    }
}
