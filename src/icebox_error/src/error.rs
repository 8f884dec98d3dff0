use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Error status categories
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Temporary errors that a caller may resolve by retrying (e.g., commit conflicts, timeouts)
    Temporary,
    /// Permanent errors that retrying cannot solve (e.g., missing namespace, corrupt metadata)
    Permanent,
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStatus::Temporary => write!(f, "temporary"),
            ErrorStatus::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error payload shared by all icebox error enums: a stable message, a retry
/// status, an optional source error, and the construction site.
#[derive(Clone, Debug)]
pub struct ErrorStruct {
    pub message: String,
    pub status: ErrorStatus,
    pub source: Option<Arc<anyhow::Error>>,
    pub location: Option<&'static Location<'static>>,
}

impl fmt::Display for ErrorStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)?;

        if let Some(location) = &self.location {
            write!(f, " at {}:{}:{}", location.file(), location.line(), location.column())?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl ErrorStruct {
    /// Creates a new ErrorStruct, recording the caller location.
    #[track_caller]
    pub fn new(message: String, status: ErrorStatus) -> Self {
        Self {
            message,
            status,
            source: None,
            location: Some(Location::caller()),
        }
    }

    /// Shorthand for a permanent error.
    #[track_caller]
    pub fn permanent(message: String) -> Self {
        Self::new(message, ErrorStatus::Permanent)
    }

    /// Shorthand for a temporary error.
    #[track_caller]
    pub fn temporary(message: String) -> Self {
        Self::new(message, ErrorStatus::Temporary)
    }

    /// Sets the source error for this error struct.
    ///
    /// # Panics
    ///
    /// Panics if the source error has already been set.
    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(src.into()));
        self
    }
}

impl error::Error for ErrorStruct {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|arc| arc.as_ref().as_ref())
    }
}
