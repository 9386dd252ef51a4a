use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no place found for `{0}`")]
    ResolutionFailed(String),
    #[error("no encyclopedia summary for `{0}`")]
    EnrichmentUnavailable(String),
    #[error("`{0}` is already on the map")]
    DuplicateLocation(String),
    #[error("invalid input: {0:?}")]
    InvalidInput(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
}
