//! Error types for quarry-build.

use thiserror::Error;

use crate::platform::Platform;

/// Result type for quarry-build operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for quarry-build.
#[derive(Error, Debug)]
pub enum Error {
    /// A requested command path is not registered
    #[error("command {0} does not exist")]
    CommandNotFound(String),

    /// A command path was registered twice
    #[error("command {0} has already been registered")]
    CommandAlreadyRegistered(String),

    /// A command transitively demanded itself
    #[error("dependency cycle detected")]
    DependencyCycle,

    /// The in-progress command stack exceeded its bound
    #[error("maximum length of stack reached")]
    StackOverflow,

    /// Execution was cancelled through the context
    #[error("execution cancelled")]
    Cancelled,

    /// A command panicked instead of returning an error
    #[error("command panicked: {0}")]
    CommandPanicked(String),

    /// Downloaded payload does not hash to the declared checksum
    #[error("checksum does not match: expected {expected}, actual {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Declared checksum is not of the form `algo:hex`
    #[error("incorrect checksum format: {0}")]
    InvalidChecksum(String),

    /// Declared checksum uses an algorithm other than sha256
    #[error("unsupported hashing algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    /// URL extension maps to no known archive format
    #[error("unknown archive format: {0}")]
    UnknownArchiveFormat(String),

    /// Archive contains an entry type the extractor cannot materialize
    #[error("unsupported file type: {0}")]
    UnsupportedArchiveEntry(String),

    /// Tool has no source for the requested platform
    #[error("tool {tool} is not configured for platform {platform}")]
    PlatformUnsupported { tool: String, platform: Platform },

    /// Tool is not present in the toolset
    #[error("tool {0} does not exist")]
    ToolNotFound(String),

    /// An error with tool context attached
    #[error("tool {tool}: {source}")]
    Tool {
        tool: String,
        #[source]
        source: Box<Error>,
    },

    /// Several independent failures, reported together
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<Error>),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive error
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// General error with message
    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

fn format_aggregate(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_joins_messages() {
        let err = Error::Aggregate(vec![
            Error::Other("first".into()),
            Error::Other("second".into()),
        ]);
        assert_eq!(err.to_string(), "first\nsecond");
    }

    #[test]
    fn tool_context_wraps_source() {
        let err = Error::Tool {
            tool: "jq".into(),
            source: Box::new(Error::ChecksumMismatch {
                expected: "aa".into(),
                actual: "bb".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "tool jq: checksum does not match: expected aa, actual bb"
        );
    }
}
