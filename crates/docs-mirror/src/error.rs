use mirror_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),

    #[error("document listed in docs manifest is missing on disk: {0}")]
    MissingDocument(String),

    #[error("check task failed: {0}")]
    Task(String),
}
