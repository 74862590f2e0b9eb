use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
    #[error("invalid timing bounds: {0}")]
    InvalidBounds(String),
    #[error("usage error: {0}")]
    Usage(String),
    #[error("process error: {0}")]
    Process(String),
}

impl HarnessError {
    pub fn io<T: Into<String>>(msg: T) -> Self {
        HarnessError::Io(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        HarnessError::Config(msg.into())
    }

    pub fn invalid_timing<T: Into<String>>(msg: T) -> Self {
        HarnessError::InvalidTiming(msg.into())
    }

    pub fn invalid_bounds<T: Into<String>>(msg: T) -> Self {
        HarnessError::InvalidBounds(msg.into())
    }

    pub fn usage<T: Into<String>>(msg: T) -> Self {
        HarnessError::Usage(msg.into())
    }

    pub fn process<T: Into<String>>(msg: T) -> Self {
        HarnessError::Process(msg.into())
    }

    /// Wraps an I/O error together with the path it concerns.
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        HarnessError::Io(format!("{}: {err}", path.display()))
    }
}
