use thiserror::Error;

#[derive(Error, Debug)]
pub enum SatchelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("archive incomplete: missing {0}")]
    ArchiveIncomplete(String),

    #[error("receiver not found after {attempts} discovery attempts")]
    DiscoveryTimeout { attempts: u32 },

    #[error("no sender discovered within {}s", .0.as_secs())]
    AdvertiseTimeout(std::time::Duration),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("stream I/O error: {0}")]
    StreamIo(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("import failed: {0}")]
    ImportFailed(String),

    #[error("record store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("another transfer is already running")]
    Busy,

    #[error("transfer cancelled")]
    Cancelled,
}

impl SatchelError {
    pub fn stream(e: std::io::Error) -> Self {
        SatchelError::StreamIo(e.to_string())
    }

    /// Import-phase failures keep their cause in the message.
    pub fn into_import_failure(self) -> Self {
        match self {
            SatchelError::ImportFailed(_) | SatchelError::Cancelled => self,
            other => SatchelError::ImportFailed(other.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for SatchelError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => SatchelError::Io(io),
            other => SatchelError::ArchiveCorrupt(other.to_string()),
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, SatchelError>;
