//! Error taxonomy for every store operation.

use thiserror::Error;


/// Coarse failure classes callers can branch on without matching every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The handle has no active backend.
    NotInitialized,
    /// A path did not resolve to exactly one key.
    Resolution,
    /// The storage medium rejected a read or write.
    Storage,
    /// The caller supplied a path, connection string or document that
    /// cannot be parsed.
    MalformedInput,
}


#[derive(Debug, Error)]
pub enum ConfiError {
    #[error("not initialized")]
    NotInitialized,

    #[error("no backend registered for connection string \"{0}\"")]
    UnknownScheme(String),

    #[error("path {path} doesn't exist")]
    NotFound { path: String },

    #[error("path {path} is ambiguous: {matches} keys named \"{key}\"")]
    Ambiguous {
        path: String,
        key: String,
        matches: usize,
    },

    #[error("configuration \"{0}\" not found")]
    ConfigNotFound(String),

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(String),
}

impl ConfiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfiError::NotInitialized | ConfiError::UnknownScheme(_) => ErrorKind::NotInitialized,
            ConfiError::NotFound { .. }
            | ConfiError::Ambiguous { .. }
            | ConfiError::ConfigNotFound(_) => ErrorKind::Resolution,
            ConfiError::Malformed(_) | ConfiError::Unsupported { .. } => {
                ErrorKind::MalformedInput
            }
            ConfiError::Sqlite(_) | ConfiError::Io(_) | ConfiError::Settings(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        ConfiError::NotFound { path: path.into() }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ConfiError::Malformed(msg.into())
    }
}


pub type Result<T> = std::result::Result<T, ConfiError>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ConfiError::NotInitialized.kind(), ErrorKind::NotInitialized);
        assert_eq!(ConfiError::not_found("/a").kind(), ErrorKind::Resolution);
        assert_eq!(
            ConfiError::Ambiguous { path: "/a".into(), key: "a".into(), matches: 2 }.kind(),
            ErrorKind::Resolution
        );
        assert_eq!(ConfiError::malformed("x").kind(), ErrorKind::MalformedInput);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(ConfiError::from(io).kind(), ErrorKind::Storage);
    }

    #[test]
    fn messages_name_the_path() {
        let e = ConfiError::not_found("/folder/key1");
        assert_eq!(e.to_string(), "path /folder/key1 doesn't exist");
    }
}
