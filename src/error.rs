use std::fmt;
use thiserror::Error;

/// Why a caller was turned away at the session gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    InvalidToken,
    SessionExpired,
    Rejected(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::MissingHeader => write!(f, "No authorization header"),
            AuthFailure::InvalidToken => write!(f, "Invalid token"),
            AuthFailure::SessionExpired => {
                write!(f, "Session expired, run `taskdeck login` again")
            }
            AuthFailure::Rejected(message) => write!(f, "{}", message),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Unauthorized(AuthFailure),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Store request failed: {0}")]
    Upstream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// The categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Validation,
    Upstream,
    Local,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Upstream(_) | Error::Http(_) | Error::Json(_) => ErrorKind::Upstream,
            Error::InvalidConfig(_)
            | Error::Io(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => ErrorKind::Local,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }
}

pub type Result<T> = std::result::Result<T, Error>;
