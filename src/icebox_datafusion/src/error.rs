use datafusion::common::DataFusionError;
use icebox_error::ErrorStruct;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    DataFusion(ErrorStruct),

    /// The engine is in read-only mode and the statement would mutate state.
    #[error("{0}")]
    ReadOnlyViolation(ErrorStruct),

    #[error(transparent)]
    Icebox(#[from] icebox::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[track_caller]
    pub fn read_only_violation(keyword: &str) -> Self {
        Error::ReadOnlyViolation(ErrorStruct::permanent(format!(
            "statement starts with {keyword}; the engine is read-only - query through the catalog write path instead"
        )))
    }
}

impl From<DataFusionError> for Error {
    #[track_caller]
    fn from(source: DataFusionError) -> Self {
        Error::DataFusion(
            ErrorStruct::permanent(format!("DataFusion error: {source}")).with_source(source),
        )
    }
}
