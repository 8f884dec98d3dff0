use icebox_error::ErrorStruct;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Icebox(#[from] icebox::Error),

    #[error(transparent)]
    Query(#[from] icebox_datafusion::Error),

    #[error("{0}")]
    InvalidConfig(ErrorStruct),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[track_caller]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig(ErrorStruct::permanent(format!(
            "invalid configuration: {}",
            reason.into()
        )))
    }
}
