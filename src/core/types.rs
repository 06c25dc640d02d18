/// Core types used throughout profpack: the error taxonomy and the profile kinds
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("unrecognized profile format: missing `<kind> profile: total <count>` header")]
    UnrecognizedFormat,
    #[error("malformed profile format at line {line}: {reason}")]
    MalformedFormat { line: usize, reason: String },
    #[error("index {index} out of range for {array} (len {len})")]
    IndexOutOfRange {
        array: &'static str,
        index: usize,
        len: usize,
    },
    #[error("failed to decode merged artifact: {0}")]
    DecodeFailure(String),
    #[error("failed to decompress profile data")]
    DecompressFailure(#[source] std::io::Error),
    #[error("input {input} references unknown {kind} id {id}")]
    InvalidReference {
        input: usize,
        kind: &'static str,
        id: u64,
    },
    #[error("I/O error while writing artifact")]
    Io(#[from] std::io::Error),
}

impl From<prost::DecodeError> for ProfileError {
    fn from(error: prost::DecodeError) -> Self {
        ProfileError::DecodeFailure(error.to_string())
    }
}

impl ProfileError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ProfileError::MalformedFormat {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        ProfileError::DecodeFailure(reason.into())
    }
}

/// The shapes of profile that can be merged and unpacked by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// pprof sampled profiles (heap, CPU, ...)
    Sampled,
    /// goroutine stack dumps in the `debug=1` text format
    StackDump,
    /// opaque pre-encoded blobs, stored without interpretation
    Opaque,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ProfileKind::Sampled => "sampled",
            ProfileKind::StackDump => "stack-dump",
            ProfileKind::Opaque => "opaque",
        };
        write!(f, "{}", name)
    }
}
