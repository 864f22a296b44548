use std::fmt::Display;

/// emberdb errors.
#[derive(Debug)]
pub enum Error {
    /// An I/O error from the backing file.
    IoError(std::io::Error),
    /// Stored data failed a consistency check: mismatched record lengths,
    /// missing magic markers, or an exhausted recovery scan.
    Corrupt(String),
    /// The file was written by an incompatible format version.
    VersionMismatch { found: u32 },
    /// Invalid user input, typically key or value constraint violations.
    InvalidInput(String),
    /// A flush was attempted on a read-only snapshot.
    ReadOnly,
    /// A flush was attempted on a store with no backing file.
    MemoryOnly,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "io error: {err}"),
            Error::Corrupt(msg) => write!(f, "corrupt store: {msg}"),
            Error::VersionMismatch { found } => write!(
                f,
                "version mismatch: current version: {} != found version: {found}",
                crate::store::VERSION
            ),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::ReadOnly => write!(f, "flush attempted on read-only snapshot"),
            Error::MemoryOnly => write!(f, "no file / memory-only store, so cannot flush"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(format!("bad roots json: {err}"))
    }
}

/// Constructs an Error::Corrupt for the given format string.
#[macro_export]
macro_rules! corrupt {
    ($($args:tt)*) => { $crate::error::Error::Corrupt(format!($($args)*)) };
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)) };
}

/// An emberdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;
