//! Error types for hotswap-tls.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Result type alias for hotswap-tls operations.
pub type Result<T> = std::result::Result<T, CertError>;

/// Boxed error returned by consumers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can terminate certificate watching.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// A watched file is missing or could not be statted.
    #[error("statting {}: {source}", path.display())]
    Probe {
        /// The file that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A watched file could not be read.
    #[error("reading {}: {source}", path.display())]
    Read {
        /// The file that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The PEM material does not form a usable certificate and matching key.
    #[error("creating certificate object: {0}")]
    Parse(String),

    /// The consumer invocation returned an error of its own.
    #[error("consumer failed: {0}")]
    Consumer(#[source] BoxError),

    /// The consumer invocation panicked.
    #[error("consumer panicked: {0}")]
    ConsumerPanicked(String),

    /// A preempted invocation did not finish within the configured bound.
    #[error("preempted invocation still running after {0:?}")]
    DrainTimeout(Duration),

    /// The outer shutdown signal was observed.
    #[error("shutdown requested")]
    Shutdown,

    /// The receiving side of a certificate channel was dropped.
    #[error("certificate receiver closed")]
    ReceiverClosed,

    /// A key pair record could not be decoded.
    #[error("decoding JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The subprocess output ended in the middle of a record.
    #[error("command output ended mid-record")]
    TruncatedStream,

    /// The subprocess could not be started.
    #[error("starting `{command}`: {source}")]
    Spawn {
        /// The shell command line
        command: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The subprocess exited unsuccessfully, or its output could not be used.
    #[error("waiting for `{command}`: exited with {status}")]
    CommandExit {
        /// The shell command line
        command: String,
        /// Exit status of the child
        status: ExitStatus,
        /// What went wrong while reading its output, if anything
        #[source]
        cause: Option<Box<CertError>>,
    },

    /// A certificate could not be written to the output.
    #[error("writing certificate: {0}")]
    Emit(#[source] std::io::Error),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// Failed to load settings.
    #[error("Failed to load settings: {0}")]
    Config(String),

    /// Settings validation failed.
    #[error("Settings validation failed: {0}")]
    Validation(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`CertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A watched file is missing or unreadable at poll time.
    ProbeFailure,
    /// Reading or parsing the certificate failed.
    LoadFailure,
    /// The consumer ended with a failure.
    ConsumerFailure,
    /// Outer cancellation was observed.
    ShutdownRequested,
    /// Nobody is listening for certificates anymore.
    DeliveryClosed,
    /// A subprocess source failed.
    SourceFailure,
    /// Settings were missing or invalid.
    Configuration,
    /// Certificates could not be written out.
    OutputFailure,
    /// A task inside the crate died.
    Internal,
}

impl CertError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Probe { .. } => ErrorKind::ProbeFailure,
            Self::Read { .. } | Self::Parse(_) => ErrorKind::LoadFailure,
            Self::Consumer(_) | Self::ConsumerPanicked(_) | Self::DrainTimeout(_) => {
                ErrorKind::ConsumerFailure
            }
            Self::Shutdown => ErrorKind::ShutdownRequested,
            Self::ReceiverClosed => ErrorKind::DeliveryClosed,
            Self::Decode(_)
            | Self::TruncatedStream
            | Self::Spawn { .. }
            | Self::CommandExit { .. }
            | Self::Io(_) => ErrorKind::SourceFailure,
            Self::Config(_) | Self::Validation(_) => ErrorKind::Configuration,
            Self::Emit(_) => ErrorKind::OutputFailure,
            Self::TaskFailed(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is the outer shutdown signal.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// What a consumer invocation may return.
///
/// Return [`ConsumerError::Cancelled`] once the invocation's token has fired;
/// anything else ends certificate watching as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The invocation stopped because its token was cancelled.
    #[error("invocation cancelled")]
    Cancelled,

    /// The invocation hit a failure of its own.
    #[error("{0}")]
    Failed(#[source] BoxError),
}

impl ConsumerError {
    /// Wrap any error as a consumer failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

impl From<std::io::Error> for ConsumerError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(Box::new(err))
    }
}

/// Validation error for watcher settings.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for CertError {
    fn from(err: ValidationError) -> Self {
        CertError::Validation(err.to_string())
    }
}
