use blocklab_core::{BlockError, ConfigError, StateError};
use blocklab_incremental::SuspenseError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Suspense error: {0}")]
    Suspense(#[from] SuspenseError),
}
